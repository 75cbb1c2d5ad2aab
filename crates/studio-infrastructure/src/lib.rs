//! Persistence adapters for the Studio conversation pipeline.
//!
//! - [`FileSnapshotStorage`]: the client-local snapshot slot behind the
//!   conversation store, one JSON blob in one file, written atomically.
//! - [`HttpHistoryRepository`]: the remote history API client.
//! - [`InMemoryHistoryRepository`]: the same contract without a network,
//!   for tests and offline runs.
//! - [`StudioPaths`]: platform path resolution for the local data.

mod http_history_repository;
mod memory_history_repository;
mod paths;
mod record_validation;
mod snapshot_file;

pub use http_history_repository::HttpHistoryRepository;
pub use memory_history_repository::InMemoryHistoryRepository;
pub use paths::StudioPaths;
pub use snapshot_file::FileSnapshotStorage;
