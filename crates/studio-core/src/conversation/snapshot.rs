//! Persistence port for the local conversation store.

use async_trait::async_trait;
use thiserror::Error;

/// Errors from the conversation store and its persistence port.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Referenced conversation is absent from the store.
    #[error("conversation not found: {id}")]
    NotFound { id: String },

    /// Snapshot file could not be read or written.
    #[error("snapshot I/O error: {0}")]
    Io(String),

    /// Snapshot blob could not be serialized or deserialized.
    #[error("snapshot serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Read/write access to the single serialized blob that backs the
/// conversation store.
///
/// The port is constructed once per session and injected into the store;
/// no other component touches the slot. The blob format is the store's
/// concern; implementations move opaque strings.
#[async_trait]
pub trait SnapshotStorage: Send + Sync {
    /// Loads the persisted blob, or `None` when nothing has been saved yet.
    async fn load(&self) -> Result<Option<String>, StoreError>;

    /// Replaces the persisted blob with `blob`.
    async fn save(&self, blob: &str) -> Result<(), StoreError>;
}
