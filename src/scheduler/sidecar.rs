//! Entry point run inside the `scheduler-sidecar` container: create both
//! FIFOs, run a reader+dispatcher pair per FIFO, and watch for the
//! completion sentinel the crawler container's exit leaves behind.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use kube::{Api, Client};
use tokio::sync::{mpsc, watch};
use tracing::info;

use crate::config::SchedulerSidecarArgs;
use crate::crd::Search;
use crate::error::{Error, Result};
use crate::scheduler::{dispatcher, fifo};

const CHANNEL_CAPACITY: usize = 64;

pub async fn run(args: SchedulerSidecarArgs) -> Result<()> {
    let client = Client::try_default().await.map_err(Error::KubeError)?;
    let search_api: Api<Search> = Api::namespaced(client.clone(), &args.search_namespace);
    let search = Arc::new(
        search_api
            .get(&args.search_name)
            .await
            .map_err(Error::KubeError)?,
    );

    let pipeline_fifo_path = PathBuf::from(&args.pipeline_fifo_path);
    let search_fifo_path = PathBuf::from(&args.search_fifo_path);
    fifo::create(&pipeline_fifo_path)?;
    fifo::create(&search_fifo_path)?;
    info!(
        pipeline_fifo = %pipeline_fifo_path.display(),
        search_fifo = %search_fifo_path.display(),
        "fifos ready, crawler may start writing"
    );

    let interval = Duration::from_secs(match search.spec.interval_seconds {
        Some(s) if s > 0 => s as u64,
        _ => args.dispatch_interval_seconds.max(1) as u64,
    });

    let (cancel_tx, cancel_rx) = watch::channel(false);
    let (pipeline_tx, pipeline_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (search_tx, search_rx) = mpsc::channel(CHANNEL_CAPACITY);

    // Readers run on the blocking pool: their `read`s genuinely block
    // once the fifo is attached, which would stall the async runtime.
    tokio::task::spawn_blocking({
        let path = pipeline_fifo_path.clone();
        let cancel = cancel_rx.clone();
        move || fifo::read_loop(path, pipeline_tx, cancel)
    });
    tokio::task::spawn_blocking({
        let path = search_fifo_path.clone();
        let cancel = cancel_rx.clone();
        move || fifo::read_loop(path, search_tx, cancel)
    });

    let pipeline_dispatcher = tokio::spawn(dispatcher::run_pipeline_dispatcher(
        client.clone(),
        args.search_namespace.clone(),
        search.clone(),
        pipeline_rx,
        interval,
        cancel_rx.clone(),
    ));
    let search_dispatcher = tokio::spawn(dispatcher::run_search_dispatcher(
        client,
        args.search_namespace.clone(),
        search,
        search_rx,
        interval,
        cancel_rx,
    ));

    watch_completion_sentinel(
        args.complete_sentinel_path.clone(),
        Duration::from_secs(args.poll_interval_seconds),
    )
    .await;
    info!("completion sentinel observed, shutting down scheduler sidecar");

    let _ = cancel_tx.send(true);
    let _ = tokio::join!(pipeline_dispatcher, search_dispatcher);

    // Readers may still be blocked inside a `read` syscall on an
    // attached-but-idle fifo; they are reaped when this process exits
    // rather than joined here.
    let _ = std::fs::remove_file(&pipeline_fifo_path);
    let _ = std::fs::remove_file(&search_fifo_path);

    Ok(())
}

async fn watch_completion_sentinel(path: String, poll: Duration) {
    loop {
        if tokio::fs::metadata(&path).await.is_ok() {
            return;
        }
        tokio::time::sleep(poll).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn completion_sentinel_returns_once_file_exists() {
        let dir = tempfile::tempdir().unwrap();
        let sentinel = dir.path().join("complete");
        let path = sentinel.to_string_lossy().to_string();

        let watcher = tokio::spawn(watch_completion_sentinel(path, Duration::from_millis(10)));
        tokio::time::sleep(Duration::from_millis(30)).await;
        std::fs::write(&sentinel, b"").unwrap();

        tokio::time::timeout(Duration::from_secs(2), watcher)
            .await
            .expect("sentinel watcher should return promptly")
            .unwrap();
    }
}
