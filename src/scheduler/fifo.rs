//! Named-pipe plumbing: creation at mode 0622 and the read-reopen loop
//! that streams JSON values off one FIFO until cancelled.

use std::os::unix::io::FromRawFd;
use std::path::{Path, PathBuf};
use std::time::Duration;

use nix::fcntl::{fcntl, open, FcntlArg, OFlag};
use nix::sys::stat::Mode;
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Create the FIFO at `path` if it doesn't already exist. Mode 0622: the
/// sidecar owns it, everyone else may write.
pub fn create(path: &Path) -> Result<()> {
    if path.exists() {
        return Ok(());
    }
    nix::unistd::mkfifo(path, Mode::from_bits_truncate(0o622))
        .map_err(|e| Error::ConfigError(format!("mkfifo {path:?} failed: {e}")))
}

fn nix_to_io(e: nix::Error) -> std::io::Error {
    std::io::Error::from_raw_os_error(e as i32)
}

fn open_nonblocking(path: &Path) -> std::io::Result<std::fs::File> {
    let fd = open(path, OFlag::O_RDONLY | OFlag::O_NONBLOCK, Mode::empty()).map_err(nix_to_io)?;
    // Reads block normally once attached; only the open itself must not
    // wait for a writer.
    fcntl(fd, FcntlArg::F_SETFL(OFlag::empty())).map_err(nix_to_io)?;
    Ok(unsafe { std::fs::File::from_raw_fd(fd) })
}

/// Blocking read-reopen loop: open the FIFO non-blocking, stream JSON
/// values off it, and on EOF or a decode error close and reopen after a
/// short delay. Runs on a blocking-pool thread (`spawn_blocking`), not as
/// an async task — `blocking_send` is the bridge back into async land.
pub fn read_loop(path: PathBuf, tx: mpsc::Sender<Value>, cancel: watch::Receiver<bool>) {
    while !*cancel.borrow() {
        let file = match open_nonblocking(&path) {
            Ok(f) => f,
            Err(e) => {
                warn!(?path, error = %e, "failed to open fifo, retrying");
                std::thread::sleep(Duration::from_secs(1));
                continue;
            }
        };

        let mut stream = serde_json::Deserializer::from_reader(file).into_iter::<Value>();
        loop {
            if *cancel.borrow() {
                return;
            }
            match stream.next() {
                Some(Ok(value)) => {
                    if tx.blocking_send(value).is_err() {
                        return;
                    }
                }
                Some(Err(e)) if e.is_eof() => {
                    debug!(?path, "fifo writer closed, reopening");
                    break;
                }
                Some(Err(e)) => {
                    warn!(?path, error = %e, "fifo decode error, reopening");
                    break;
                }
                None => break,
            }
        }
        std::thread::sleep(Duration::from_secs(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::unix::fs::FileTypeExt;

    #[test]
    fn create_is_idempotent_and_makes_a_fifo() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test-fifo");

        create(&path).unwrap();
        create(&path).unwrap();

        let meta = std::fs::metadata(&path).unwrap();
        assert!(meta.file_type().is_fifo());
    }

    #[test]
    fn read_loop_streams_values_until_cancelled() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records-fifo");
        create(&path).unwrap();

        let (tx, mut rx) = mpsc::channel(8);
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let reader_path = path.clone();
        let reader = std::thread::spawn(move || read_loop(reader_path, tx, cancel_rx));

        let mut writer = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
        writeln!(writer, r#"{{"kind":"pipeline"}}"#).unwrap();
        writeln!(writer, r#"{{"kind":"search"}}"#).unwrap();
        drop(writer);

        let first = rx.blocking_recv().unwrap();
        assert_eq!(first["kind"], "pipeline");
        let second = rx.blocking_recv().unwrap();
        assert_eq!(second["kind"], "search");

        // The writer already closed, so the reader's stream hits EOF on its
        // own; cancel just stops it from reopening the fifo afterward.
        cancel_tx.send(true).unwrap();
        reader.join().unwrap();
    }
}
