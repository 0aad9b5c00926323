//! Prometheus metrics for the Ocular operator.
//!
//! The `/metrics` endpoint (when built with `--features metrics`) exports:
//! - `ocular_reconcile_duration_seconds` (histogram): reconcile duration labeled by controller.
//! - `ocular_reconcile_errors_total` (counter): reconcile errors labeled by controller and kind.
//! - `ocular_pipelines_phase` (gauge): count of Pipelines last observed in each phase.
//! - `ocular_searches_phase` (gauge): count of Searches last observed in each phase.
//! - `pipelines_completed_total` (counter): Pipelines that reached a terminal phase.
//! - `scan_pods_created_total` / `upload_pods_created_total` (counters): scan/upload
//!   workload Jobs created by the Pipeline reconciler.
//! - `pipelines_running` (gauge): Pipelines currently between Downloading and completion.
//! - `pipeline_duration_seconds` (histogram, the client's stand-in for a summary): time
//!   from a Pipeline's start to its completion or failure.

use std::sync::atomic::{AtomicI64, AtomicU64};

use once_cell::sync::Lazy;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;

/// Labels for operator reconcile metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ReconcileLabels {
    /// Controller name, e.g. "pipeline", "search", "cronsearch"
    pub controller: String,
}

/// Labels for operator error metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ErrorLabels {
    pub controller: String,
    /// Error kind from [`crate::error::ErrorKind`], e.g. "BadRequest", "Conflict"
    pub kind: String,
}

/// Labels for per-phase execution gauges
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct PhaseLabels {
    pub phase: String,
}

pub static RECONCILE_DURATION_SECONDS: Lazy<Family<ReconcileLabels, Histogram>> = Lazy::new(|| {
    fn reconcile_histogram() -> Histogram {
        // 1ms .. ~32s across 16 buckets.
        Histogram::new(exponential_buckets(0.001, 2.0, 16))
    }
    Family::new_with_constructor(reconcile_histogram)
});

pub static RECONCILE_ERRORS_TOTAL: Lazy<Family<ErrorLabels, Counter<u64, AtomicU64>>> =
    Lazy::new(Family::default);

pub static PIPELINES_PHASE: Lazy<Family<PhaseLabels, Gauge<i64, AtomicI64>>> =
    Lazy::new(Family::default);

pub static SEARCHES_PHASE: Lazy<Family<PhaseLabels, Gauge<i64, AtomicI64>>> =
    Lazy::new(Family::default);

pub static PIPELINES_COMPLETED_TOTAL: Lazy<Counter<u64, AtomicU64>> = Lazy::new(Counter::default);

pub static SCAN_PODS_CREATED_TOTAL: Lazy<Counter<u64, AtomicU64>> = Lazy::new(Counter::default);

pub static UPLOAD_PODS_CREATED_TOTAL: Lazy<Counter<u64, AtomicU64>> = Lazy::new(Counter::default);

pub static PIPELINES_RUNNING: Lazy<Gauge<i64, AtomicI64>> = Lazy::new(Gauge::default);

pub static PIPELINE_DURATION_SECONDS: Lazy<Histogram> =
    Lazy::new(|| Histogram::new(exponential_buckets(1.0, 2.0, 12)));

pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let mut registry = Registry::default();

    registry.register(
        "ocular_reconcile_duration_seconds",
        "Duration of reconcile loops in seconds",
        RECONCILE_DURATION_SECONDS.clone(),
    );
    registry.register(
        "ocular_reconcile_errors_total",
        "Total number of reconcile errors",
        RECONCILE_ERRORS_TOTAL.clone(),
    );
    registry.register(
        "ocular_pipelines_phase",
        "Count of Pipelines last observed in each phase",
        PIPELINES_PHASE.clone(),
    );
    registry.register(
        "ocular_searches_phase",
        "Count of Searches last observed in each phase",
        SEARCHES_PHASE.clone(),
    );
    registry.register(
        "pipelines_completed_total",
        "Total number of Pipelines that reached a terminal phase",
        PIPELINES_COMPLETED_TOTAL.clone(),
    );
    registry.register(
        "scan_pods_created_total",
        "Total number of scan workload Jobs created",
        SCAN_PODS_CREATED_TOTAL.clone(),
    );
    registry.register(
        "upload_pods_created_total",
        "Total number of upload workload Jobs created",
        UPLOAD_PODS_CREATED_TOTAL.clone(),
    );
    registry.register(
        "pipelines_running",
        "Number of Pipelines currently running (past Pending, not yet terminal)",
        PIPELINES_RUNNING.clone(),
    );
    registry.register(
        "pipeline_duration_seconds",
        "Time from a Pipeline's start to its completion or failure",
        PIPELINE_DURATION_SECONDS.clone(),
    );

    registry
});

pub fn observe_reconcile_duration_seconds(controller: &str, seconds: f64) {
    RECONCILE_DURATION_SECONDS
        .get_or_create(&ReconcileLabels {
            controller: controller.to_string(),
        })
        .observe(seconds);
}

pub fn inc_reconcile_error(controller: &str, kind: &str) {
    RECONCILE_ERRORS_TOTAL
        .get_or_create(&ErrorLabels {
            controller: controller.to_string(),
            kind: kind.to_string(),
        })
        .inc();
}

pub fn set_pipelines_phase(phase: &str, count: i64) {
    PIPELINES_PHASE
        .get_or_create(&PhaseLabels {
            phase: phase.to_string(),
        })
        .set(count);
}

pub fn set_searches_phase(phase: &str, count: i64) {
    SEARCHES_PHASE
        .get_or_create(&PhaseLabels {
            phase: phase.to_string(),
        })
        .set(count);
}

pub fn inc_pipelines_completed() {
    PIPELINES_COMPLETED_TOTAL.inc();
}

pub fn inc_scan_pods_created() {
    SCAN_PODS_CREATED_TOTAL.inc();
}

pub fn inc_upload_pods_created() {
    UPLOAD_PODS_CREATED_TOTAL.inc();
}

pub fn inc_pipelines_running() {
    PIPELINES_RUNNING.inc();
}

pub fn dec_pipelines_running() {
    PIPELINES_RUNNING.dec();
}

pub fn observe_pipeline_duration_seconds(seconds: f64) {
    PIPELINE_DURATION_SECONDS.observe(seconds);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reconcile_metrics_do_not_panic() {
        observe_reconcile_duration_seconds("pipeline", 0.25);
        inc_reconcile_error("search", "Conflict");
        set_pipelines_phase("Running", 3);
        set_searches_phase("Pending", 1);
    }

    #[test]
    fn pipeline_engine_metrics_do_not_panic() {
        inc_pipelines_completed();
        inc_scan_pods_created();
        inc_upload_pods_created();
        inc_pipelines_running();
        dec_pipelines_running();
        observe_pipeline_duration_seconds(42.0);
    }

    #[test]
    fn registry_registration() {
        let _registry = &*REGISTRY;
    }
}
