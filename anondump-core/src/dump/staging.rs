//! Staging area for per-table output.
//!
//! Each worker writes its table to its own file inside a temporary
//! directory. The orchestrator records finished files in a slot array indexed
//! by table position and drains the slots in ascending order, which restores
//! catalog order whatever order the workers finished in. The directory is
//! removed when the `StagingArea` is dropped.

use crate::{Result, error::DumpError};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};

/// Temporary directory plus the ordered slot array.
#[derive(Debug)]
pub struct StagingArea {
    dir: TempDir,
    slots: Vec<Option<PathBuf>>,
}

impl StagingArea {
    /// Creates an empty staging area with one slot per enumerated table.
    ///
    /// # Errors
    /// Returns an I/O error if the temporary directory cannot be created.
    pub fn new(tables: usize) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("anondump-")
            .tempdir()
            .map_err(|e| DumpError::io("Failed to create staging directory", e))?;

        Ok(Self {
            dir,
            slots: vec![None; tables],
        })
    }

    /// Directory holding the staging files.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Sink path for the table at `index`.
    pub fn sink_path(&self, index: usize) -> PathBuf {
        self.dir.path().join(format!("{:05}.sql", index))
    }

    /// Records a finished table.
    ///
    /// # Errors
    /// Returns a worker error for an index outside the catalog or a slot
    /// that was already filled.
    pub fn fill(&mut self, index: usize, path: PathBuf) -> Result<()> {
        let slot = self.slots.get_mut(index).ok_or_else(|| DumpError::Worker {
            context: format!("table index {} outside the catalog", index),
        })?;
        if slot.is_some() {
            return Err(DumpError::Worker {
                context: format!("table index {} reported twice", index),
            });
        }
        *slot = Some(path);
        Ok(())
    }

    /// Copies filled slots to `out` in ascending index order; empty slots
    /// (ignored tables) are skipped.
    ///
    /// # Errors
    /// Returns an I/O error if a staging file cannot be read or the output
    /// cannot be written.
    pub async fn drain_into<W>(&self, out: &mut W) -> Result<u64>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let mut copied = 0u64;
        for path in self.slots.iter().flatten() {
            let mut file = tokio::fs::File::open(path).await.map_err(|e| {
                DumpError::io(format!("Failed to open staging file {}", path.display()), e)
            })?;
            copied += tokio::io::copy(&mut file, out).await.map_err(|e| {
                DumpError::io(format!("Failed to copy staging file {}", path.display()), e)
            })?;
        }
        Ok(copied)
    }
}

/// Buffered writer for one table's staging file.
#[derive(Debug)]
pub struct TableSink {
    path: PathBuf,
    writer: BufWriter<tokio::fs::File>,
}

impl TableSink {
    /// Creates (or truncates) the staging file.
    ///
    /// # Errors
    /// Returns an I/O error if the file cannot be created.
    pub async fn create(path: &Path) -> Result<Self> {
        let file = tokio::fs::File::create(path).await.map_err(|e| {
            DumpError::io(format!("Failed to create staging file {}", path.display()), e)
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
        })
    }

    /// Appends text or raw statement bytes.
    pub async fn write(&mut self, data: impl AsRef<[u8]>) -> Result<()> {
        self.writer.write_all(data.as_ref()).await.map_err(|e| {
            DumpError::io(
                format!("Failed to write staging file {}", self.path.display()),
                e,
            )
        })
    }

    /// Flushes buffered output and returns the file path.
    pub async fn finish(mut self) -> Result<PathBuf> {
        self.writer.flush().await.map_err(|e| {
            DumpError::io(
                format!("Failed to flush staging file {}", self.path.display()),
                e,
            )
        })?;
        Ok(self.path)
    }

    /// Drops the sink and deletes its file.
    pub async fn discard(self) {
        let Self { path, writer } = self;
        drop(writer);
        if let Err(e) = tokio::fs::remove_file(&path).await {
            tracing::debug!("Could not remove staging file {}: {}", path.display(), e);
        }
    }
}
