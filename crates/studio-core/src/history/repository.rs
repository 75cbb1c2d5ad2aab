//! History repository trait.
//!
//! Defines the contract for durable, multi-client storage of conversation
//! records, decoupled from the transport (remote HTTP API, in-memory test
//! double).

use async_trait::async_trait;
use thiserror::Error;

use super::model::{HistoryRecord, NewHistoryRecord};

/// Errors from the history repository.
#[derive(Debug, Clone, Error)]
pub enum HistoryError {
    /// Malformed or missing required fields. Never retried.
    #[error("history validation failed: {0}")]
    Validation(String),

    /// Referenced record is absent.
    #[error("history record not found: {id}")]
    NotFound { id: String },

    /// Transport-level failure reaching the history API.
    #[error("history API unavailable: {0}")]
    Unavailable(String),

    /// The API reported a failure in its response envelope.
    #[error("history API error: {0}")]
    Remote(String),
}

impl HistoryError {
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Durable storage of history records, keyed by a server-assigned id.
///
/// The repository performs no authorization; scoping records by user is the
/// excluded auth collaborator's responsibility. There is no update
/// operation: records are written once and amended only via delete +
/// recreate. Last writer wins; callers must not issue concurrent conflicting
/// operations against the same id.
#[async_trait]
pub trait HistoryRepository: Send + Sync {
    /// Stores a new record and returns it with its server-assigned id.
    ///
    /// # Errors
    ///
    /// `Validation` when `user_id`, `topic`, or `messages` is missing.
    async fn create(&self, record: NewHistoryRecord) -> Result<HistoryRecord, HistoryError>;

    /// Fetches one record by id.
    async fn get(&self, id: &str) -> Result<HistoryRecord, HistoryError>;

    /// Lists all records visible to the caller.
    async fn list(&self) -> Result<Vec<HistoryRecord>, HistoryError>;

    /// Deletes one record and returns it.
    ///
    /// Deleting an absent id reports `NotFound`, not a crash; the second
    /// delete of the same id is a clean `NotFound`.
    async fn delete(&self, id: &str) -> Result<HistoryRecord, HistoryError>;
}
