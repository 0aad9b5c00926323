//! Operator CLI/environment configuration.

use clap::Parser;

use crate::gateway::ContextSource;

/// Flags for the `ocular-operator` binary. Every flag also accepts its
/// SCREAMING_SNAKE_CASE environment variable form via clap's `env`
/// feature, e.g. `--workload-timeout-seconds` / `OCULAR_WORKLOAD_TIMEOUT_SECONDS`.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct OperatorArgs {
    /// Additional cluster contexts as `name=kubeconfig-path`. The operator
    /// always has an implicit in-cluster "default" context; these are
    /// layered on top of it.
    #[arg(long = "context", env = "OCULAR_CONTEXTS", value_delimiter = ',')]
    pub contexts: Vec<ContextSource>,

    /// Name of the context new Pipelines/Searches resolve against when
    /// their resource doesn't otherwise pin one. Defaults to "default",
    /// the implicit in-cluster context.
    #[arg(long, env = "OCULAR_DEFAULT_CONTEXT", default_value = "default")]
    pub default_context: String,

    /// Upper bound on how long a scan or upload Job may run before the
    /// Pipeline Engine marks it failed, absent an explicit
    /// `ttlSecondsMaxLifetime` on the Pipeline itself.
    #[arg(
        long,
        env = "OCULAR_WORKLOAD_TIMEOUT_SECONDS",
        default_value_t = 45 * 60
    )]
    pub workload_timeout_seconds: i64,

    /// Default dispatch interval used by the scheduler sidecar when a
    /// Search doesn't set `intervalSeconds`.
    #[arg(long, env = "OCULAR_DISPATCH_INTERVAL_SECONDS", default_value_t = 60)]
    pub dispatch_interval_seconds: i64,

    /// Enable the health/metrics REST surface.
    #[arg(long, env = "OCULAR_ENABLE_REST_API", default_value_t = true)]
    pub enable_rest_api: bool,

    /// Port the health/metrics REST surface listens on.
    #[arg(long, env = "OCULAR_REST_API_PORT", default_value_t = 8080)]
    pub rest_api_port: u16,
}

/// Flags for the `ocular-extractor` binary, shared by its extract/receive
/// subcommands.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct ExtractorArgs {
    /// Port the receive-side HTTP server listens on.
    #[arg(long, env = "OCULAR_EXTRACTOR_PORT", default_value_t = 8090)]
    pub port: u16,

    /// Number of retry attempts for a single file PUT before giving up and
    /// escalating via `DELETE /fail`.
    #[arg(long, env = "OCULAR_EXTRACTOR_PUT_RETRIES", default_value_t = 6)]
    pub put_retries: u32,

    /// Base delay, in milliseconds, of the extractor's linear PUT retry
    /// backoff: attempt N waits `N * base_delay_ms`.
    #[arg(long, env = "OCULAR_EXTRACTOR_RETRY_BASE_MS", default_value_t = 500)]
    pub retry_base_delay_ms: u64,
}

/// Flags for the `ocular-scheduler-sidecar` binary.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct SchedulerSidecarArgs {
    #[arg(long, env = "OCULAR_SEARCH_NAME")]
    pub search_name: String,

    #[arg(long, env = "OCULAR_SEARCH_NAMESPACE")]
    pub search_namespace: String,

    #[arg(long, env = "OCULAR_DISPATCH_INTERVAL_SECONDS", default_value_t = 60)]
    pub dispatch_interval_seconds: i64,

    #[arg(
        long,
        env = "OCULAR_PIPELINE_FIFO",
        default_value = "/var/run/ocular/pipeline-fifo"
    )]
    pub pipeline_fifo_path: String,

    #[arg(
        long,
        env = "OCULAR_SEARCH_FIFO",
        default_value = "/var/run/ocular/search-fifo"
    )]
    pub search_fifo_path: String,

    /// Sentinel file the crawler container creates once it has finished
    /// writing to both FIFOs. Its presence tells the sidecar to drain the
    /// remaining FIFO contents and exit rather than block forever.
    #[arg(
        long,
        env = "OCULAR_SIDECAR_SCHEDULER_COMPLETE_PATH",
        default_value = "/var/run/ocular/complete"
    )]
    pub complete_sentinel_path: String,

    /// How often the sidecar polls for the completion sentinel.
    #[arg(long, env = "OCULAR_SIDECAR_POLL_SECONDS", default_value_t = 5)]
    pub poll_interval_seconds: u64,
}
