//! Extractor: the in-cluster HTTP file-transfer helper run as a sidecar
//! (scan side, `extract` mode) and init container (upload side, `receive`
//! mode). `ignore` mode is used when a Profile has no uploaders — the
//! scan Pod still needs an extractor container to keep its spec uniform,
//! but it has nothing to transfer.

pub mod client;
pub mod manifest;
pub mod server;

use std::time::Duration;

use crate::error::Result;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExtractorMode {
    Extract,
    Receive,
    Ignore,
}

impl std::str::FromStr for ExtractorMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "extract" => Ok(ExtractorMode::Extract),
            "receive" => Ok(ExtractorMode::Receive),
            "ignore" => Ok(ExtractorMode::Ignore),
            other => Err(format!("unknown extractor mode {other:?}")),
        }
    }
}

pub async fn run_extract(base_url: &str, expected_paths: &[String], retry_base_delay: Duration) -> Result<()> {
    let client = reqwest::Client::new();
    client::run_extract(&client, base_url, expected_paths, retry_base_delay).await
}

pub async fn run_receive(expected_paths: Vec<String>, port: u16) -> Result<bool> {
    server::run_receive(expected_paths, port).await
}
