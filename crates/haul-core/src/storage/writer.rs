//! Sequential writer for an in-progress download file.
//!
//! Unlike the teacher's segmented writer, this engine downloads a URL as a
//! single stream (§4.C: no multi-segment/multipart — see Non-goals), so there
//! is exactly one writer per download and no concurrent `write_at` offsets.
//! The destination path passed in is already the final path: there is no
//! `.part` suffix or rename-on-finalize step, since resume negotiation keys
//! off the existing file's length directly (§6).

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Writer for a download's destination file. The worker appends chunks to it
/// in order as they arrive from the transfer.
pub struct StorageWriter {
    file: File,
    path: PathBuf,
    written: u64,
}

impl StorageWriter {
    pub(crate) fn from_file(file: File, path: PathBuf, written: u64) -> Self {
        StorageWriter { file, path, written }
    }

    /// Appends `data` to the file. Chunks must arrive in order; the engine
    /// has no segment index to reorder them.
    pub fn write_chunk(&mut self, data: &[u8]) -> Result<()> {
        self.file
            .write_all(data)
            .with_context(|| format!("write failed for {}", self.path.display()))?;
        self.written += data.len() as u64;
        Ok(())
    }

    /// Bytes written to the file so far this session (not counting bytes
    /// already on disk from a previous resumed run).
    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Discards everything written so far and repositions at byte 0 (§4.C
    /// step 5: the server ignored our `Range` request, so the partial file
    /// on disk no longer corresponds to what the fresh response will send).
    pub fn truncate_and_restart(&mut self) -> Result<()> {
        self.file.set_len(0).context("failed to truncate for restart")?;
        self.file
            .seek(SeekFrom::Start(0))
            .context("failed to seek to start for restart")?;
        self.written = 0;
        Ok(())
    }

    /// Flushes file data to disk. Called periodically by the worker and once
    /// before it exits (§4.C: "persist progress to the store every 5 seconds").
    pub fn sync(&self) -> Result<()> {
        self.file.sync_all().context("storage sync failed")?;
        Ok(())
    }
}
