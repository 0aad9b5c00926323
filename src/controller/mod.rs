//! Controller orchestration: runs the Pipeline, Search and CronSearch
//! reconcilers side by side against a shared [`crate::gateway::Gateway`].

pub mod conditions;
#[cfg(feature = "metrics")]
pub mod metrics;

use std::sync::Arc;

use crate::gateway::Gateway;

/// Run every reconciler concurrently until one of them exits (normally only
/// on shutdown signal, since each loop runs forever otherwise).
pub async fn run_controllers(gateway: Arc<Gateway>) {
    tokio::join!(
        crate::pipeline::reconciler::run(gateway.clone()),
        crate::search::reconciler::run(gateway.clone()),
        crate::cron_search::reconciler::run(gateway),
    );
}
