//! The extractor's `extract` mode: the scan-side sidecar client that PUTs
//! each expected artifact to the upload receiver, with linear-backoff
//! retry and a `DELETE /fail` escalation path.
//!
//! Runs as a sidecar alongside the scanner containers, so a path may not
//! exist on disk yet the moment this starts — `wait_for_path` polls for it
//! up to `wait_attempts * wait_interval` before treating it as genuinely
//! absent.

use std::path::Path;
use std::time::Duration;

use tracing::{info, warn};

use crate::error::{Error, Result};

pub const MAX_ATTEMPTS: u32 = 6;
pub const ARTIFACT_WAIT_ATTEMPTS: u32 = 30;
pub const ARTIFACT_WAIT_INTERVAL: Duration = Duration::from_secs(2);

/// Upload every expected path to `base_url`. A path absent on disk after
/// the wait window is sent as a zero-length PUT (the receiver records it
/// as "missing" and moves on); presence is otherwise reported with the
/// file's exact size.
pub async fn run_extract(
    client: &reqwest::Client,
    base_url: &str,
    expected_paths: &[String],
    retry_base_delay: Duration,
) -> Result<()> {
    for path in expected_paths {
        if let Err(e) = put_one(
            client,
            base_url,
            path,
            retry_base_delay,
            ARTIFACT_WAIT_ATTEMPTS,
            ARTIFACT_WAIT_INTERVAL,
        )
        .await
        {
            warn!(path, error = %e, "giving up on artifact, signalling failure");
            signal_fail(client, base_url).await;
            return Err(e);
        }
    }
    Ok(())
}

async fn wait_for_path(path: &str, wait_attempts: u32, wait_interval: Duration) -> bool {
    for _ in 0..wait_attempts {
        if tokio::fs::metadata(path).await.is_ok() {
            return true;
        }
        tokio::time::sleep(wait_interval).await;
    }
    tokio::fs::metadata(path).await.is_ok()
}

async fn put_one(
    client: &reqwest::Client,
    base_url: &str,
    path: &str,
    retry_base_delay: Duration,
    wait_attempts: u32,
    wait_interval: Duration,
) -> Result<()> {
    let body = if wait_for_path(path, wait_attempts, wait_interval).await {
        tokio::fs::read(Path::new(path)).await.unwrap_or_default()
    } else {
        info!(path, "artifact did not appear before timeout, sending zero-length PUT");
        Vec::new()
    };

    let url = format!("{base_url}/upload{path}");
    let mut last_error = None;

    for attempt in 1..=MAX_ATTEMPTS {
        match client.put(&url).body(body.clone()).send().await {
            Ok(resp) if resp.status().is_success() => return Ok(()),
            Ok(resp) if resp.status().is_server_error() => {
                last_error = Some(Error::HttpError(
                    resp.error_for_status().unwrap_err(),
                ));
            }
            Ok(resp) => {
                return Err(Error::ValidationError(format!(
                    "extractor receiver rejected {path} with {}",
                    resp.status()
                )));
            }
            Err(e) => last_error = Some(Error::HttpError(e)),
        }

        if attempt < MAX_ATTEMPTS {
            tokio::time::sleep(retry_base_delay * attempt).await;
        }
    }

    Err(last_error.unwrap_or_else(|| Error::ValidationError(format!("failed to PUT {path}"))))
}

async fn signal_fail(client: &reqwest::Client, base_url: &str) {
    let url = format!("{base_url}/fail");
    if let Err(e) = client.delete(&url).send().await {
        warn!(error = %e, "failed to signal extractor failure to receiver");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_one_sends_zero_length_body_for_missing_file() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("PUT"))
            .and(wiremock::matchers::path("/upload/mnt/results/missing.json"))
            .and(wiremock::matchers::body_bytes(Vec::<u8>::new()))
            .respond_with(wiremock::ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        put_one(
            &client,
            &server.uri(),
            "/mnt/results/missing.json",
            Duration::from_millis(1),
            1,
            Duration::from_millis(1),
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn put_one_retries_on_server_error_then_succeeds() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("PUT"))
            .and(wiremock::matchers::path("/upload/mnt/results/a.json"))
            .respond_with(wiremock::ResponseTemplate::new(500))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        wiremock::Mock::given(wiremock::matchers::method("PUT"))
            .and(wiremock::matchers::path("/upload/mnt/results/a.json"))
            .respond_with(wiremock::ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        put_one(
            &client,
            &server.uri(),
            "/mnt/results/a.json",
            Duration::from_millis(1),
            1,
            Duration::from_millis(1),
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn put_one_waits_for_a_path_that_appears_mid_poll() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("slow.json");
        let path_str = path.to_str().unwrap().to_string();

        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("PUT"))
            .and(wiremock::matchers::path(format!("/upload{path_str}")))
            .and(wiremock::matchers::body_bytes(b"hello".to_vec()))
            .respond_with(wiremock::ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let writer_path = path.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            tokio::fs::write(writer_path, b"hello").await.unwrap();
        });

        let client = reqwest::Client::new();
        put_one(
            &client,
            &server.uri(),
            &path_str,
            Duration::from_millis(1),
            20,
            Duration::from_millis(10),
        )
        .await
        .unwrap();
    }
}
