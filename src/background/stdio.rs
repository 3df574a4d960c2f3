//! Newline-delimited JSON feed of handoff batches.
//!
//! Each line is one [`PendingFireBatch`]. Lines that fail to parse are
//! logged and skipped; the previous batch stays armed.

use super::BackgroundHostHandle;
use crate::error::Result;
use crate::notification::PendingFireBatch;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, info, warn};

/// Forward every batch read from `reader` to `host` until EOF.
///
/// Returns the number of batches accepted.
pub async fn serve_batches<R>(reader: R, host: &BackgroundHostHandle) -> Result<u64>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut accepted = 0u64;
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match PendingFireBatch::from_json(line) {
            Ok(batch) => {
                debug!(fires = batch.len(), "batch received on stdin");
                host.schedule(batch)?;
                accepted += 1;
            }
            Err(e) => warn!(error = %e, "ignoring malformed batch line"),
        }
    }
    info!(accepted, "batch input closed");
    Ok(accepted)
}
