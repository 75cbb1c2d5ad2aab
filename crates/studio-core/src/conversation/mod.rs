//! Conversation domain model and its persistence port.

mod model;
mod snapshot;

pub use model::{AttachmentRef, Conversation, Sender, Turn};
pub use snapshot::{SnapshotStorage, StoreError};
