//! Axum HTTP server exposing the operator's health and metrics surface.

use std::net::SocketAddr;

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::error::{Error, Result};

use super::handlers;

#[cfg(feature = "metrics")]
async fn metrics_handler() -> String {
    use prometheus_client::encoding::text::encode;
    let mut buffer = String::new();
    encode(&mut buffer, &crate::controller::metrics::REGISTRY).unwrap();
    buffer
}

/// Serve `/health` (and, with the `metrics` feature, `/metrics`) until the
/// process is killed. The operator spawns this alongside the reconcilers;
/// it is not part of the Pipeline/Search control flow itself.
pub async fn run_server(port: u16) -> Result<()> {
    let mut app = Router::new().route("/health", get(handlers::health));

    #[cfg(feature = "metrics")]
    {
        app = app.route("/metrics", get(metrics_handler));
    }

    let app = app.layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "REST API server listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(Error::IoError)?;

    axum::serve(listener, app)
        .await
        .map_err(Error::IoError)?;

    Ok(())
}
