//! Atomic snapshot persistence
//!
//! A snapshot is written to a temporary file in the data directory, synced,
//! and then renamed over the target. The rename is the only operation that
//! touches the target path, so readers see either the previous file or the
//! complete new one.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use super::{Dataset, Snapshot, SnapshotError};

/// Reads and writes the dataset files of one data directory
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    /// Store rooted at `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Data directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Target path of a dataset
    pub fn path_for(&self, dataset: Dataset) -> PathBuf {
        self.dir.join(dataset.file_name())
    }

    /// Create the data directory if needed
    pub fn ensure_dir(&self) -> Result<(), SnapshotError> {
        fs::create_dir_all(&self.dir).map_err(|e| SnapshotError::io(&self.dir, e))
    }

    /// Serialize `snapshot` into a synced temporary file next to the target.
    ///
    /// Nothing is visible at the target path until [`StagedSnapshot::commit`].
    pub fn stage<T: Serialize>(
        &self,
        dataset: Dataset,
        snapshot: &Snapshot<T>,
    ) -> Result<StagedSnapshot, SnapshotError> {
        self.ensure_dir()?;
        let target = self.path_for(dataset);

        let temp = tempfile::Builder::new()
            .prefix(&format!(".{}.", dataset.file_name()))
            .suffix(".tmp")
            .tempfile_in(&self.dir)
            .map_err(|e| SnapshotError::io(&self.dir, e))?;

        {
            let mut writer = BufWriter::new(temp.as_file());
            serde_json::to_writer(&mut writer, snapshot)?;
            writer.flush().map_err(|e| SnapshotError::io(temp.path(), e))?;
        }
        temp.as_file()
            .sync_all()
            .map_err(|e| SnapshotError::io(temp.path(), e))?;

        debug!(dataset = %dataset, temp = %temp.path().display(), "Snapshot staged");
        Ok(StagedSnapshot {
            dataset,
            temp,
            target,
        })
    }

    /// Stage and commit in one step
    pub fn write<T: Serialize>(
        &self,
        dataset: Dataset,
        snapshot: &Snapshot<T>,
    ) -> Result<PathBuf, SnapshotError> {
        self.stage(dataset, snapshot)?.commit()
    }

    /// Read a dataset back; `Ok(None)` when the file does not exist
    pub fn read<T: DeserializeOwned>(
        &self,
        dataset: Dataset,
    ) -> Result<Option<Snapshot<T>>, SnapshotError> {
        let path = self.path_for(dataset);
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(SnapshotError::io(path, e)),
        };
        let snapshot = serde_json::from_reader(BufReader::new(file))?;
        Ok(Some(snapshot))
    }
}

/// A fully written snapshot waiting to be renamed into place.
///
/// Dropping it without committing deletes the temporary file and leaves the
/// target untouched.
#[derive(Debug)]
pub struct StagedSnapshot {
    dataset: Dataset,
    temp: NamedTempFile,
    target: PathBuf,
}

impl StagedSnapshot {
    /// Path of the temporary file
    pub fn temp_path(&self) -> &Path {
        self.temp.path()
    }

    /// Path the snapshot will be renamed to
    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Rename the temporary file over the target
    pub fn commit(self) -> Result<PathBuf, SnapshotError> {
        let StagedSnapshot {
            dataset,
            temp,
            target,
        } = self;

        temp.persist(&target)
            .map_err(|e| SnapshotError::io(&target, e.error))?;

        // Make the rename itself durable
        #[cfg(unix)]
        if let Some(parent) = target.parent() {
            if let Err(e) = sync_dir(parent) {
                warn!(
                    dataset = %dataset,
                    dir = %parent.display(),
                    error = %e,
                    "Failed to sync data directory after rename"
                );
            }
        }

        info!(dataset = %dataset, path = %target.display(), "Snapshot written");
        Ok(target)
    }
}

/// Flush a directory's entries to disk
#[cfg(unix)]
fn sync_dir(dir: &Path) -> std::io::Result<()> {
    File::open(dir)?.sync_all()
}
