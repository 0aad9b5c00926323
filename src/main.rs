//! Ocular Operator Entry Point
//!
//! Starts the Pipeline/Search/CronSearch controllers and, when the
//! `rest-api` feature is enabled, the health/metrics HTTP surface.

use std::sync::Arc;

use clap::Parser;
use ocular::config::OperatorArgs;
use ocular::gateway::Gateway;
use ocular::{controller, telemetry, Error};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Error> {
    telemetry::init();

    let args = OperatorArgs::parse();

    info!("Starting Ocular Operator v{}", env!("CARGO_PKG_VERSION"));

    let gateway = if args.contexts.is_empty() {
        Gateway::in_cluster().await?
    } else {
        Gateway::from_sources(&args.contexts, &args.default_context).await?
    };
    let gateway = Arc::new(gateway);

    info!("Connected to Kubernetes cluster");

    #[cfg(feature = "rest-api")]
    {
        if args.enable_rest_api {
            let port = args.rest_api_port;
            tokio::spawn(async move {
                if let Err(e) = ocular::rest_api::run_server(port).await {
                    tracing::error!(error = %e, "REST API server error");
                }
            });
        }
    }

    controller::run_controllers(gateway).await;

    Ok(())
}
