//! History record model.
//!
//! A history record is the remote, durable projection of a conversation plus
//! session metadata. One conversation maps to at most one record; the record
//! is written once at session close and treated as an immutable archive;
//! amending history means delete + recreate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One paired user/assistant exchange inside a history record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryExchange {
    /// The user's message.
    pub message: String,
    /// The assistant's reply (or the failure notice recorded in its place).
    pub response: String,
    /// When the exchange started, i.e. the user turn's timestamp.
    pub timestamp: DateTime<Utc>,
}

/// Create-side payload for a history record, before the server assigns an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewHistoryRecord {
    /// Owner of the record, supplied by the auth collaborator.
    pub user_id: String,
    /// Equivalent to the conversation title.
    pub topic: String,
    /// Ordered exchanges, each with its own timestamp.
    pub messages: Vec<HistoryExchange>,
    pub start_time: DateTime<Utc>,
    /// Set when the session is explicitly closed; absent while still active.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
}

/// A stored history record.
///
/// `id` is server-assigned and distinct from the local conversation id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    pub user_id: String,
    pub topic: String,
    pub messages: Vec<HistoryExchange>,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
}
