//! `ocular-scheduler-sidecar`: runs alongside a Search's crawler
//! container, dispatching Pipelines/Searches from its two FIFOs.

use clap::Parser;
use ocular::config::SchedulerSidecarArgs;
use ocular::{scheduler, telemetry, Error};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Error> {
    telemetry::init();

    let args = SchedulerSidecarArgs::parse();
    info!(search = %args.search_name, namespace = %args.search_namespace, "starting scheduler sidecar");

    if let Err(e) = scheduler::run(args).await {
        error!(error = %e, "scheduler sidecar exited with error");
        return Err(e);
    }
    Ok(())
}
