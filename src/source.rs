//! Line ingestion layer: defines a generic interface for producing raw log lines.
//!
//! The pipeline depends on the `LineSource` abstraction instead of a concrete
//! file reader, so alternative backends (stdin, sockets) can be plugged in
//! without touching the parser or sink stages.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::Sender;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::record::RawLine;

/// Generic trait for line sources.
///
/// Implementors continuously send complete lines (delimiter stripped) to the
/// provided channel until cancelled or a fatal I/O error occurs.
#[async_trait::async_trait]
pub trait LineSource {
    async fn stream(self, tx: Sender<RawLine>, shutdown: CancellationToken) -> Result<()>;
}

/// Concrete file-tail source: reads a file from the start and keeps following
/// it as it grows, like `tail -f` but beginning at byte 0.
pub struct FileTailSource {
    pub path: PathBuf,
    pub poll_interval: Duration,
}

#[async_trait::async_trait]
impl LineSource for FileTailSource {
    async fn stream(self, tx: Sender<RawLine>, shutdown: CancellationToken) -> Result<()> {
        let file = File::open(&self.path)
            .await
            .with_context(|| format!("open log file {}", self.path.display()))?;
        let mut reader = BufReader::new(file);
        let mut buf: Vec<u8> = Vec::new();
        loop {
            let read = tokio::select! {
                res = reader.read_until(b'\n', &mut buf) => {
                    res.with_context(|| format!("read log file {}", self.path.display()))?
                }
                _ = shutdown.cancelled() => return Ok(()),
            };
            if read == 0 || buf.last() != Some(&b'\n') {
                // End of file, or a line whose newline has not been written
                // yet. Bytes already read stay in `buf` until it arrives.
                tokio::select! {
                    _ = sleep(self.poll_interval) => continue,
                    _ = shutdown.cancelled() => return Ok(()),
                }
            }
            buf.pop();
            if buf.last() == Some(&b'\r') {
                buf.pop();
            }
            let line = std::mem::take(&mut buf);
            tokio::select! {
                res = tx.send(line) => {
                    if res.is_err() {
                        return Ok(()); // receiver gone
                    }
                }
                _ = shutdown.cancelled() => return Ok(()),
            }
        }
    }
}
