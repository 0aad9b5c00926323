//! `ocular-extractor`: the scan-side `extract` sidecar, the upload-side
//! `receive` init container, and the no-op `ignore` mode used when a
//! Profile binds no uploaders. Mode is chosen by the operator via the
//! container's first argument, matching the three args the Pipeline
//! Engine's workload builders set (`extract`/`receive`/`ignore`).

use std::time::Duration;

use clap::Parser;
use ocular::config::ExtractorArgs;
use ocular::extractor::{self, ExtractorMode};
use ocular::{telemetry, Error};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// `extract`, `receive` or `ignore`.
    mode: String,

    /// Artifact paths, passed after a `--` separator.
    #[arg(last = true)]
    artifact_paths: Vec<String>,

    #[command(flatten)]
    args: ExtractorArgs,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    telemetry::init();

    let cli = Cli::parse();
    let mode: ExtractorMode = cli.mode.parse().map_err(Error::ValidationError)?;

    match mode {
        ExtractorMode::Ignore => {
            info!("no uploaders bound, extractor has nothing to transfer");
            Ok(())
        }
        ExtractorMode::Extract => {
            let base_url = std::env::var("OCULAR_UPLOADER_HOST").map_err(|_| {
                Error::ConfigError("OCULAR_UPLOADER_HOST is required in extract mode".to_string())
            })?;
            let paths = cli.artifact_paths;
            info!(%base_url, paths = paths.len(), "starting artifact extraction");
            let retry_base_delay = Duration::from_millis(cli.args.retry_base_delay_ms);
            if let Err(e) = extractor::run_extract(&base_url, &paths, retry_base_delay).await {
                error!(error = %e, "extraction failed");
                return Err(e);
            }
            Ok(())
        }
        ExtractorMode::Receive => {
            let paths = cli.artifact_paths;
            info!(port = cli.args.port, paths = paths.len(), "starting artifact receiver");
            match extractor::run_receive(paths, cli.args.port).await {
                Ok(true) => {
                    info!("all artifacts received");
                    Ok(())
                }
                Ok(false) => {
                    error!("scan side signalled failure before transfer completed");
                    Err(Error::ValidationError(
                        "upstream signalled extraction failure".to_string(),
                    ))
                }
                Err(e) => {
                    error!(error = %e, "receiver failed");
                    Err(e)
                }
            }
        }
    }
}
