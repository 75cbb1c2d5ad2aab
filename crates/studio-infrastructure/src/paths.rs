//! Path resolution for Studio's client-local data.
//!
//! # Directory structure
//!
//! ```text
//! <platform data dir>/studio/
//! └── conversations.json    # conversation store snapshot
//! ```

use std::path::PathBuf;

use studio_core::StoreError;

/// Resolves platform-specific locations for Studio files.
pub struct StudioPaths;

impl StudioPaths {
    /// Returns the Studio data directory, e.g. `~/.local/share/studio`.
    ///
    /// # Errors
    ///
    /// Fails when the platform data directory cannot be determined.
    pub fn data_dir() -> Result<PathBuf, StoreError> {
        dirs::data_dir()
            .map(|dir| dir.join("studio"))
            .ok_or_else(|| StoreError::Io("cannot determine platform data directory".to_string()))
    }

    /// Returns the conversation snapshot file path.
    pub fn snapshot_file() -> Result<PathBuf, StoreError> {
        Ok(Self::data_dir()?.join("conversations.json"))
    }
}
