//! The extractor's `receive` mode: an axum HTTP server embedded in the
//! upload Pod's init container, accepting the scan side's artifact PUTs
//! and shutting itself down cleanly once the manifest is complete.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path as AxumPath, State};
use axum::http::StatusCode;
use axum::routing::{delete, put};
use axum::Router;
use tokio::sync::oneshot;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::extractor::manifest::Manifest;

/// Directories the receiver will write under; anything else is rejected.
pub const ALLOWED_ROOTS: &[&str] = &["/mnt/results", "/mnt/metadata"];

struct ServerState {
    manifest: Arc<Manifest>,
    roots: Vec<PathBuf>,
    shutdown: std::sync::Mutex<Option<oneshot::Sender<()>>>,
    succeeded: Arc<AtomicBool>,
}

fn is_whitelisted(path: &Path, roots: &[PathBuf]) -> bool {
    path.is_absolute() && roots.iter().any(|root| path.starts_with(root))
}

async fn put_file(
    State(state): State<Arc<ServerState>>,
    AxumPath(raw_path): AxumPath<String>,
    body: Bytes,
) -> StatusCode {
    let decoded = format!("/{raw_path}");
    let path = PathBuf::from(&decoded);

    if !is_whitelisted(&path, &state.roots) {
        warn!(path = %decoded, "rejected PUT outside whitelisted roots");
        return StatusCode::BAD_REQUEST;
    }

    if !state.manifest.contains(&decoded) {
        return StatusCode::NOT_FOUND;
    }

    let zero_length = body.is_empty();
    if let Err(e) = state.manifest.resolve(&decoded, zero_length) {
        return match e {
            Error::Conflict(_) => StatusCode::CONFLICT,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
    }

    if zero_length {
        info!(path = %decoded, "missing file, zero-length PUT recorded");
    } else {
        if let Some(parent) = path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                warn!(path = %decoded, error = %e, "failed to create parent directory");
                return StatusCode::INTERNAL_SERVER_ERROR;
            }
        }
        if let Err(e) = tokio::fs::write(&path, &body).await {
            warn!(path = %decoded, error = %e, "failed to write artifact to disk");
            return StatusCode::INTERNAL_SERVER_ERROR;
        }
        info!(path = %decoded, bytes = body.len(), "received artifact");
    }

    if state.manifest.is_complete() {
        state.succeeded.store(true, Ordering::SeqCst);
        if let Some(tx) = state.shutdown.lock().unwrap().take() {
            let _ = tx.send(());
        }
    }

    StatusCode::OK
}

async fn fail(State(state): State<Arc<ServerState>>) -> StatusCode {
    warn!("scan side signalled it will not complete, shutting down");
    state.succeeded.store(false, Ordering::SeqCst);
    if let Some(tx) = state.shutdown.lock().unwrap().take() {
        let _ = tx.send(());
    }
    StatusCode::OK
}

/// Run the receiver until every manifest entry resolves, or until the
/// scan side calls `DELETE /fail`. Returns `Ok(true)` on a clean finish,
/// `Ok(false)` if the scan side signalled failure.
pub async fn run_receive(expected_paths: Vec<String>, port: u16) -> Result<bool> {
    let roots = ALLOWED_ROOTS.iter().map(PathBuf::from).collect();
    let manifest = Arc::new(Manifest::new(expected_paths));
    let (tx, rx) = oneshot::channel();
    let succeeded = Arc::new(AtomicBool::new(false));
    let state = Arc::new(ServerState {
        manifest,
        roots,
        shutdown: std::sync::Mutex::new(Some(tx)),
        succeeded: succeeded.clone(),
    });

    let app = Router::new()
        .route("/upload/{*path}", put(put_file))
        .route("/fail", delete(fail))
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(Error::IoError)?;
    info!(%addr, "extractor receiver listening");

    let server = axum::serve(listener, app).with_graceful_shutdown(async {
        rx.await.ok();
    });

    server.await.map_err(Error::IoError)?;
    Ok(succeeded.load(Ordering::SeqCst))
}
