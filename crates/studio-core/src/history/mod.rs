//! Durable history records and the repository seam.

mod model;
mod repository;

pub use model::{HistoryExchange, HistoryRecord, NewHistoryRecord};
pub use repository::{HistoryError, HistoryRepository};
