//! In-memory history repository.
//!
//! Same contract as the remote API (server-assigned record ids, required
//! fields, idempotent-on-absence deletes) without a network. Backs tests
//! and offline runs.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use studio_core::{HistoryError, HistoryRecord, HistoryRepository, NewHistoryRecord};

use crate::record_validation::validate_new_record;

#[derive(Default)]
pub struct InMemoryHistoryRepository {
    records: Mutex<HashMap<String, HistoryRecord>>,
}

impl InMemoryHistoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HistoryRepository for InMemoryHistoryRepository {
    async fn create(&self, record: NewHistoryRecord) -> Result<HistoryRecord, HistoryError> {
        validate_new_record(&record)?;

        let stored = HistoryRecord {
            id: Uuid::new_v4().to_string(),
            user_id: record.user_id,
            topic: record.topic,
            messages: record.messages,
            start_time: record.start_time,
            end_time: record.end_time,
        };

        let mut records = self.records.lock().await;
        records.insert(stored.id.clone(), stored.clone());
        Ok(stored)
    }

    async fn get(&self, id: &str) -> Result<HistoryRecord, HistoryError> {
        let records = self.records.lock().await;
        records
            .get(id)
            .cloned()
            .ok_or_else(|| HistoryError::not_found(id))
    }

    async fn list(&self) -> Result<Vec<HistoryRecord>, HistoryError> {
        let records = self.records.lock().await;
        let mut all: Vec<HistoryRecord> = records.values().cloned().collect();
        // Most recent session first, like the remote listing.
        all.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        Ok(all)
    }

    async fn delete(&self, id: &str) -> Result<HistoryRecord, HistoryError> {
        let mut records = self.records.lock().await;
        records
            .remove(id)
            .ok_or_else(|| HistoryError::not_found(id))
    }
}
