//! Opens (or resumes) a download's destination file.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{Seek, SeekFrom};
use std::path::{Path, PathBuf};

use super::writer::StorageWriter;

/// Builder for a download's destination file. Opens the file (creating it
/// and any missing parent directories if needed), reports how many bytes are
/// already on disk from a prior run, and hands back a `StorageWriter`
/// positioned to append from the resume point.
pub struct StorageWriterBuilder {
    file: File,
    path: PathBuf,
    resume_offset: u64,
}

impl StorageWriterBuilder {
    /// Opens `path` for resumable writing. An existing file is kept as-is
    /// (its length is the resume offset); a missing one is created empty.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory: {}", parent.display()))?;
        }
        let file = File::options()
            .create(true)
            .read(true)
            .write(true)
            .open(path)
            .with_context(|| format!("failed to open destination file: {}", path.display()))?;
        let resume_offset = file
            .metadata()
            .with_context(|| format!("failed to stat destination file: {}", path.display()))?
            .len();
        Ok(StorageWriterBuilder {
            file,
            path: path.to_path_buf(),
            resume_offset,
        })
    }

    /// Bytes already present on disk (the resume point).
    pub fn resume_offset(&self) -> u64 {
        self.resume_offset
    }

    /// Finish building: seeks to the resume point and returns a writer ready
    /// for the worker to append subsequent chunks to.
    pub fn build(self) -> Result<StorageWriter> {
        let mut file = self.file;
        file.seek(SeekFrom::Start(self.resume_offset))
            .context("failed to seek to resume offset")?;
        Ok(StorageWriter::from_file(file, self.path, 0))
    }
}
