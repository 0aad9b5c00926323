//! Custom Resource Definitions for Ocular.
//!
//! API group `ocular.crashoverride.run/v1beta1`. Each module owns one kind
//! (plus its cluster-scoped variant, where the spec names one); shared
//! value types live in `types`.

pub mod cron_search;
pub mod crawler;
pub mod downloader;
pub mod pipeline;
pub mod profile;
pub mod search;
pub mod types;
pub mod uploader;

pub use cron_search::{CronSearch, CronSearchSpec, CronSearchStatus};
pub use crawler::{ClusterCrawler, ClusterCrawlerSpec, Crawler, CrawlerSpec};
pub use downloader::{ClusterDownloader, ClusterDownloaderSpec, Downloader, DownloaderSpec};
pub use pipeline::{Pipeline, PipelinePhase, PipelineSpec, PipelineStatus, StageStatus};
pub use profile::{Profile, ProfileSpec};
pub use search::{
    Search, SearchPhase, SearchSpec, SearchStatus, DEFAULT_DISPATCH_INTERVAL_SECONDS, SEARCH_LABEL,
};
pub use types::*;
pub use uploader::{ClusterUploader, ClusterUploaderSpec, Uploader, UploaderSpec};
