//! Search: a long-running execution — a crawler that discovers Targets
//! (and nested Crawler references) and dispatches Pipelines and child
//! Searches for them via the scheduler sidecar.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::pipeline::PipelineSpec;
use super::types::{Condition, ParameterizedObjectReference};

/// Label applied to every Pipeline the scheduler sidecar creates from a
/// Search's pipeline-fifo, naming the parent Search's UID.
pub const SEARCH_LABEL: &str = "ocular.crashoverride.run/search";

/// Default dispatch interval used when a Search's `intervalSeconds` is
/// absent, zero or negative.
pub const DEFAULT_DISPATCH_INTERVAL_SECONDS: i64 = 60;

#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "ocular.crashoverride.run",
    version = "v1beta1",
    kind = "Search",
    namespaced,
    status = "SearchStatus",
    shortname = "srch",
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Crawler","type":"string","jsonPath":".spec.crawler.name"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct SearchSpec {
    /// The Crawler (or ClusterCrawler) reference plus parameter values.
    pub crawler: ParameterizedObjectReference,

    /// Template used to instantiate a Pipeline for every Target record the
    /// crawler writes to `$OCULAR_PIPELINE_FIFO`. `None` means the crawler
    /// only emits sub-search records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline_template: Option<PipelineSpec>,

    /// Seconds the scheduler sidecar sleeps between dispatches on a single
    /// FIFO. Values that are absent, zero or negative fall back to
    /// `DEFAULT_DISPATCH_INTERVAL_SECONDS`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_seconds: Option<i64>,

    /// Service account the Search's pod runs as. When absent the engine
    /// provisions a disposable one scoped to this Search.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_seconds_max_lifetime: Option<i64>,
}

impl SearchSpec {
    pub fn effective_interval(&self) -> i64 {
        match self.interval_seconds {
            Some(s) if s > 0 => s,
            _ => DEFAULT_DISPATCH_INTERVAL_SECONDS,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum SearchPhase {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SearchStatus {
    #[serde(default)]
    pub phase: SearchPhase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion_time: Option<String>,
    #[serde(default)]
    pub pipelines_created: i64,
    #[serde(default)]
    pub searches_created: i64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}
