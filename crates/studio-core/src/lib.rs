//! Domain layer for the Studio conversation pipeline.
//!
//! This crate holds the conversation and history models, the typed failure
//! taxonomies, and the trait seams that the network and persistence crates
//! implement. It performs no I/O of its own.

pub mod catalog;
pub mod conversation;
pub mod dispatch;
pub mod history;

pub use catalog::{CatalogClient, CatalogError, ModelCatalog, ModelId};
pub use conversation::{AttachmentRef, Conversation, Sender, SnapshotStorage, StoreError, Turn};
pub use dispatch::{DispatchError, DispatchRequest, Dispatcher};
pub use history::{
    HistoryError, HistoryExchange, HistoryRecord, HistoryRepository, NewHistoryRecord,
};
