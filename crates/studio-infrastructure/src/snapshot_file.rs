//! Atomic single-file snapshot storage.
//!
//! The conversation store persists its entire state as one blob under one
//! well-known file. Writes go through a temp file + fsync + atomic rename,
//! guarded by an advisory file lock, so a crash mid-write never leaves a
//! torn snapshot behind.

use std::fs::{self, File, OpenOptions};
use std::io::Write as IoWrite;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use studio_core::{SnapshotStorage, StoreError};

/// Snapshot storage backed by one file on the local disk.
pub struct FileSnapshotStorage {
    path: PathBuf,
}

impl FileSnapshotStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Creates the storage at the platform-default snapshot location.
    pub fn default_location() -> Result<Self, StoreError> {
        Ok(Self::new(crate::paths::StudioPaths::snapshot_file()?))
    }

    fn read_blocking(path: &Path) -> Result<Option<String>, StoreError> {
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(content))
    }

    fn write_blocking(path: &Path, blob: &str) -> Result<(), StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let _lock = FileLock::acquire(path)?;

        let tmp_path = temp_path(path)?;
        let mut tmp_file = File::create(&tmp_path)?;
        tmp_file.write_all(blob.as_bytes())?;

        // Data must hit the disk before the rename makes it visible.
        tmp_file.sync_all()?;
        drop(tmp_file);

        fs::rename(&tmp_path, path)?;
        Ok(())
    }
}

#[async_trait]
impl SnapshotStorage for FileSnapshotStorage {
    async fn load(&self) -> Result<Option<String>, StoreError> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || Self::read_blocking(&path))
            .await
            .map_err(|err| StoreError::Io(format!("snapshot read task failed: {err}")))?
    }

    async fn save(&self, blob: &str) -> Result<(), StoreError> {
        let path = self.path.clone();
        let blob = blob.to_string();
        tokio::task::spawn_blocking(move || Self::write_blocking(&path, &blob))
            .await
            .map_err(|err| StoreError::Io(format!("snapshot write task failed: {err}")))?
    }
}

fn temp_path(path: &Path) -> Result<PathBuf, StoreError> {
    let parent = path
        .parent()
        .ok_or_else(|| StoreError::Io("snapshot path has no parent directory".to_string()))?;
    let file_name = path
        .file_name()
        .ok_or_else(|| StoreError::Io("snapshot path has no file name".to_string()))?;

    let tmp_name = format!(".{}.tmp", file_name.to_string_lossy());
    Ok(parent.join(tmp_name))
}

/// Advisory lock guard; the lock file is removed best-effort on drop.
struct FileLock {
    #[allow(dead_code)]
    file: File,
    lock_path: PathBuf,
}

impl FileLock {
    fn acquire(path: &Path) -> Result<Self, StoreError> {
        let lock_path = path.with_extension("lock");

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;

        #[cfg(unix)]
        {
            use fs2::FileExt;
            file.lock_exclusive()
                .map_err(|err| StoreError::Io(format!("failed to acquire snapshot lock: {err}")))?;
        }

        Ok(FileLock { file, lock_path })
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.lock_path);
    }
}
