//! The local conversation store.
//!
//! Owns all in-memory conversations for the client session: one optional
//! active conversation plus the archived list, most recently archived first.
//! Every mutation re-serializes the whole state to the injected snapshot
//! port (write-through); on startup the persisted blob is read back, with
//! absent or corrupt blobs treated as empty state, never fatal.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use studio_core::{Conversation, SnapshotStorage, StoreError, Turn};

/// Serialized form of the whole store: one blob under one key.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoreSnapshot {
    active: Option<Conversation>,
    /// Index 0 is the most recently archived conversation.
    archived: Vec<Conversation>,
}

/// Owns every conversation in the client session.
///
/// The persistent slot is mutated only through this store; callers hold
/// conversation ids, never references into it.
pub struct ConversationStore {
    inner: RwLock<StoreSnapshot>,
    storage: Arc<dyn SnapshotStorage>,
}

impl ConversationStore {
    /// Loads the store through the persistence port.
    pub async fn load(storage: Arc<dyn SnapshotStorage>) -> Self {
        let snapshot = match storage.load().await {
            Ok(Some(blob)) => match serde_json::from_str::<StoreSnapshot>(&blob) {
                Ok(snapshot) => snapshot,
                Err(err) => {
                    tracing::warn!("discarding corrupt conversation snapshot: {err}");
                    StoreSnapshot::default()
                }
            },
            Ok(None) => StoreSnapshot::default(),
            Err(err) => {
                tracing::warn!("failed to read conversation snapshot, starting empty: {err}");
                StoreSnapshot::default()
            }
        };

        Self {
            inner: RwLock::new(snapshot),
            storage,
        }
    }

    /// Installs a freshly started conversation as the active one. Any
    /// previous non-empty active conversation joins the archived list first.
    pub async fn begin(&self, conversation: Conversation) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        archive_active_locked(&mut inner);
        inner.active = Some(conversation);
        self.persist(&inner).await
    }

    /// The current active conversation, if any.
    pub async fn active(&self) -> Option<Conversation> {
        self.inner.read().await.active.clone()
    }

    /// Appends a turn to the conversation with the given id, wherever it
    /// currently lives, active or archived.
    ///
    /// # Errors
    ///
    /// `NotFound` when the conversation has been removed from the store.
    pub async fn append_turn(&self, id: &str, turn: Turn) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let Some(conversation) = find_mut(&mut inner, id) else {
            return Err(StoreError::not_found(id));
        };
        conversation.append(turn);
        self.persist(&inner).await
    }

    /// Moves the active conversation to the front of the archived list and
    /// clears the active slot. Zero-turn conversations are dropped instead
    /// of archived.
    pub async fn archive_active(&self) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        archive_active_locked(&mut inner);
        self.persist(&inner).await
    }

    /// Promotes an archived conversation into the active slot. A non-empty
    /// previous active conversation is archived in its place.
    pub async fn select(&self, id: &str) -> Result<Conversation, StoreError> {
        let mut inner = self.inner.write().await;

        if let Some(active) = inner.active.as_ref() {
            if active.id == id {
                return Ok(active.clone());
            }
        }

        let Some(index) = inner.archived.iter().position(|c| c.id == id) else {
            return Err(StoreError::not_found(id));
        };
        let conversation = inner.archived.remove(index);
        archive_active_locked(&mut inner);
        inner.active = Some(conversation.clone());
        self.persist(&inner).await?;
        Ok(conversation)
    }

    /// Removes a conversation outright. Late replies against it are dropped
    /// by the caller.
    pub async fn remove(&self, id: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;

        if inner.active.as_ref().is_some_and(|c| c.id == id) {
            inner.active = None;
            return self.persist(&inner).await;
        }

        let Some(index) = inner.archived.iter().position(|c| c.id == id) else {
            return Err(StoreError::not_found(id));
        };
        inner.archived.remove(index);
        self.persist(&inner).await
    }

    /// Archived conversations, most recently archived first.
    pub async fn archived(&self) -> Vec<Conversation> {
        self.inner.read().await.archived.clone()
    }

    /// Looks up any conversation by id, active or archived.
    pub async fn find(&self, id: &str) -> Option<Conversation> {
        let inner = self.inner.read().await;
        if let Some(active) = inner.active.as_ref() {
            if active.id == id {
                return Some(active.clone());
            }
        }
        inner.archived.iter().find(|c| c.id == id).cloned()
    }

    async fn persist(&self, snapshot: &StoreSnapshot) -> Result<(), StoreError> {
        let blob = serde_json::to_string(snapshot)?;
        self.storage.save(&blob).await
    }
}

fn archive_active_locked(snapshot: &mut StoreSnapshot) {
    if let Some(active) = snapshot.active.take() {
        if active.is_empty() {
            return;
        }
        snapshot.archived.insert(0, active);
    }
}

fn find_mut<'a>(snapshot: &'a mut StoreSnapshot, id: &str) -> Option<&'a mut Conversation> {
    if let Some(active) = snapshot.active.as_mut() {
        if active.id == id {
            return Some(active);
        }
    }
    snapshot.archived.iter_mut().find(|c| c.id == id)
}
