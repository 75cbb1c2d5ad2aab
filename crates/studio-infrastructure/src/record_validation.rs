//! Required-field validation for history records.
//!
//! Both repository implementations enforce the same schema the remote store
//! declares: `userId`, `topic`, and `messages` are required. Validation runs
//! before any network traffic so a malformed record is never sent.

use studio_core::{HistoryError, NewHistoryRecord};

pub(crate) fn validate_new_record(record: &NewHistoryRecord) -> Result<(), HistoryError> {
    if record.user_id.trim().is_empty() {
        return Err(HistoryError::Validation("userId is required".to_string()));
    }
    if record.topic.trim().is_empty() {
        return Err(HistoryError::Validation("topic is required".to_string()));
    }
    if record.messages.is_empty() {
        return Err(HistoryError::Validation(
            "messages must not be empty".to_string(),
        ));
    }
    Ok(())
}
