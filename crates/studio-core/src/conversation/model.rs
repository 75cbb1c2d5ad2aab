//! Conversation domain model.
//!
//! A conversation is an ordered, append-only sequence of turns with a stable
//! identity and a title derived once from its first turn. Turns are immutable
//! after they are appended; the append order is the dialogue order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Characters kept when deriving a conversation title.
const TITLE_MAX_CHARS: usize = 30;
/// Characters kept in a sidebar-style preview.
const PREVIEW_MAX_CHARS: usize = 50;

/// The author of a single turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    /// Message typed by the user.
    User,
    /// Reply produced by the model (or a failure notice standing in for one).
    Assistant,
}

/// An opaque attachment reference supplied by the upload collaborator.
///
/// The payload arrives already base64-encoded; this crate never decodes or
/// inspects it, it is only forwarded to the completion provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRef {
    /// Original file name, used for display and title fallback.
    pub file_name: String,
    /// MIME type reported by the upload collaborator.
    pub media_type: String,
    /// Base64-encoded file content.
    pub data: String,
}

/// One message in a conversation.
///
/// `text` may be empty only when an attachment is present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub text: String,
    pub sender: Sender,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<AttachmentRef>,
    pub created_at: DateTime<Utc>,
}

impl Turn {
    /// Creates a user turn stamped with the current time.
    pub fn user(text: impl Into<String>, attachment: Option<AttachmentRef>) -> Self {
        Self {
            text: text.into(),
            sender: Sender::User,
            attachment,
            created_at: Utc::now(),
        }
    }

    /// Creates an assistant turn stamped with the current time.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            sender: Sender::Assistant,
            attachment: None,
            created_at: Utc::now(),
        }
    }
}

/// An ordered, append-only sequence of turns with a stable identity.
///
/// The title is derived from the first turn at creation and never recomputed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    /// Opaque identifier, stable for the conversation's lifetime.
    pub id: String,
    pub title: String,
    pub turns: Vec<Turn>,
}

impl Conversation {
    /// Starts a new conversation from its first turn.
    pub fn start(first_turn: Turn) -> Self {
        let title = derive_title(&first_turn);
        Self {
            id: Uuid::new_v4().to_string(),
            title,
            turns: vec![first_turn],
        }
    }

    /// Appends a turn. Turns are never removed or reordered.
    pub fn append(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last_turn(&self) -> Option<&Turn> {
        self.turns.last()
    }

    /// Short preview of the latest turn for list displays.
    pub fn preview(&self) -> String {
        self.last_turn()
            .map(|turn| truncate_chars(turn.text.trim(), PREVIEW_MAX_CHARS))
            .unwrap_or_default()
    }
}

/// Derives a title from the first turn: the first line of its text truncated
/// to [`TITLE_MAX_CHARS`]. Attachment-only turns fall back to the attachment
/// file name.
fn derive_title(turn: &Turn) -> String {
    let first_line = turn.text.lines().next().unwrap_or("").trim();
    if !first_line.is_empty() {
        return truncate_chars(first_line, TITLE_MAX_CHARS);
    }

    turn.attachment
        .as_ref()
        .map(|attachment| truncate_chars(&attachment.file_name, TITLE_MAX_CHARS))
        .filter(|title| !title.is_empty())
        .unwrap_or_else(|| "Untitled".to_string())
}

fn truncate_chars(source: &str, max_chars: usize) -> String {
    if source.chars().count() <= max_chars {
        return source.to_string();
    }
    source.chars().take(max_chars).collect::<String>() + "…"
}
