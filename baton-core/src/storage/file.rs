/*!
File-backed checkpoint storage for process mode.
*/

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::StateBackend;
use crate::metadata::{Checkpoint, CheckpointDocument};
use crate::{BatonError, Result};

/// Local filesystem checkpoint storage
///
/// The checkpoint is a JSON document at a single path. Construction fails
/// with [`BatonError::StorageUnwritable`] unless the file (if present) or
/// its containing directory (if not) can be written. Flushes go through a
/// temporary file in the same directory and are renamed into place.
///
/// # Example
/// ```rust
/// use baton_core::storage::{FileBackend, StateBackend};
///
/// let dir = tempfile::tempdir()?;
/// let mut backend = FileBackend::new(dir.path().join("job.checkpoint"))?;
/// assert!(backend.load()?.is_none());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone)]
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    /// Create a backend for `path`, verifying that it can be written
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        ensure_writable(&path)?;
        debug!(path = %path.display(), "Checkpoint file is writable");
        Ok(Self { path })
    }

    /// Path of the checkpoint file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a checkpoint file currently exists
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    fn directory(&self) -> &Path {
        parent_dir(&self.path)
    }
}

/// Read and verify the checkpoint at `path` without constructing a backend
///
/// Used by tooling that inspects checkpoints it does not own.
pub fn read_checkpoint(path: &Path) -> Result<CheckpointDocument> {
    let bytes = fs::read(path).map_err(|e| {
        BatonError::storage(format!(
            "Failed to read checkpoint from {}: {}",
            path.display(),
            e
        ))
    })?;
    Ok(serde_json::from_slice(&bytes)?)
}

impl StateBackend for FileBackend {
    fn load(&mut self) -> Result<Option<Checkpoint>> {
        if !self.exists() {
            return Ok(None);
        }

        let checkpoint = read_checkpoint(&self.path)?.open()?;
        info!(
            path = %self.path.display(),
            epoch = checkpoint.epoch,
            "Loaded checkpoint"
        );
        Ok(Some(checkpoint))
    }

    fn flush(&mut self, checkpoint: &Checkpoint) -> Result<()> {
        let document = checkpoint.seal()?;

        let mut staged = tempfile::Builder::new()
            .prefix(".baton-")
            .tempfile_in(self.directory())
            .map_err(|e| {
                BatonError::storage(format!(
                    "Failed to stage checkpoint in {}: {}",
                    self.directory().display(),
                    e
                ))
            })?;
        serde_json::to_writer_pretty(staged.as_file_mut(), &document)?;
        staged.as_file_mut().flush()?;

        staged.persist(&self.path).map_err(|e| {
            BatonError::storage(format!(
                "Failed to write checkpoint to {}: {}",
                self.path.display(),
                e
            ))
        })?;

        info!(
            path = %self.path.display(),
            epoch = checkpoint.epoch,
            checkpoint_id = %document.metadata.checkpoint_id,
            "Flushed checkpoint"
        );
        Ok(())
    }

    fn clean(&mut self) -> Result<()> {
        if self.exists() {
            fs::remove_file(&self.path).map_err(|e| {
                BatonError::storage(format!(
                    "Failed to delete checkpoint {}: {}",
                    self.path.display(),
                    e
                ))
            })?;
            info!(path = %self.path.display(), "Removed checkpoint");
        }
        Ok(())
    }

    fn describe(&self) -> String {
        format!("file {}", self.path.display())
    }
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

fn ensure_writable(path: &Path) -> Result<()> {
    let unwritable = |target: &Path, e: std::io::Error| {
        BatonError::StorageUnwritable(format!("{}: {}", target.display(), e))
    };

    if path.exists() {
        OpenOptions::new()
            .append(true)
            .open(path)
            .map_err(|e| unwritable(path, e))?;
    } else {
        let dir = parent_dir(path);
        tempfile::Builder::new()
            .prefix(".baton-probe-")
            .tempfile_in(dir)
            .map_err(|e| unwritable(dir, e))?;
    }
    Ok(())
}
