//! The conversation controller.
//!
//! Orchestrates the active-conversation state machine: gates sends on the
//! model catalog, turns user input into dispatches, applies replies
//! optimistically to the local store, and writes session archives to the
//! history repository. No dispatcher, catalog, or history failure ever
//! crashes the session; each surfaces as a typed error or a transcript
//! entry.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::Utc;
use thiserror::Error;
use tokio::sync::RwLock;

use studio_core::{
    AttachmentRef, CatalogClient, CatalogError, Conversation, DispatchError, DispatchRequest,
    Dispatcher, HistoryError, HistoryExchange, HistoryRecord, HistoryRepository, ModelCatalog,
    ModelId, NewHistoryRecord, Sender, StoreError, Turn,
};

use crate::store::ConversationStore;

/// Transcript entry recorded when a dispatch fails, so the conversation
/// stays a faithful record of what happened.
pub const DISPATCH_FAILURE_NOTICE: &str = "Something went wrong. Please try again.";

/// UI-facing session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    /// The model catalog has not been fetched yet.
    CatalogLoading,
    /// The catalog fetch failed; sends are not possible.
    CatalogFailed,
    /// Catalog ready, no active conversation.
    Idle,
    /// An active conversation exists and input is accepted.
    Composing,
    /// At least one dispatch is in flight.
    Sending,
}

/// Errors surfaced by [`ConversationController::send_turn`].
#[derive(Debug, Error)]
pub enum SendError {
    /// No usable catalog has been obtained yet; sends are gated until then.
    #[error("model catalog is not available")]
    CatalogUnavailable,

    /// The selected model is not in the current catalog.
    #[error("unknown model: {0}")]
    UnknownModel(ModelId),

    /// Neither text nor an attachment was provided.
    #[error("a turn needs text or an attachment")]
    EmptyTurn,

    /// The dispatch failed. A failure notice was appended to the transcript;
    /// the user's turn was not rolled back.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// The local store rejected the update.
    #[error(transparent)]
    Store(#[from] StoreError),
}

enum CatalogState {
    Loading,
    Failed,
    Ready(ModelCatalog),
}

/// The orchestrator. Holds at most a transient reference (an id) to the
/// active conversation; the store owns every conversation object.
pub struct ConversationController {
    store: Arc<ConversationStore>,
    dispatcher: Arc<dyn Dispatcher>,
    catalog_client: Arc<dyn CatalogClient>,
    history: Arc<dyn HistoryRepository>,
    catalog: RwLock<CatalogState>,
    /// Owner id supplied by the auth collaborator; required before any
    /// history write.
    user_id: RwLock<Option<String>>,
    in_flight: AtomicUsize,
}

impl ConversationController {
    pub fn new(
        store: Arc<ConversationStore>,
        dispatcher: Arc<dyn Dispatcher>,
        catalog_client: Arc<dyn CatalogClient>,
        history: Arc<dyn HistoryRepository>,
    ) -> Self {
        Self {
            store,
            dispatcher,
            catalog_client,
            history,
            catalog: RwLock::new(CatalogState::Loading),
            user_id: RwLock::new(None),
            in_flight: AtomicUsize::new(0),
        }
    }

    /// Fetches the model catalog. A non-empty catalog must be obtained at
    /// least once per session before the first send is accepted; once
    /// obtained, a later failed refresh does not revoke it.
    pub async fn load_catalog(&self) -> Result<ModelCatalog, CatalogError> {
        match self.catalog_client.list_models().await {
            Ok(catalog) if !catalog.is_empty() => {
                *self.catalog.write().await = CatalogState::Ready(catalog.clone());
                Ok(catalog)
            }
            Ok(_) => {
                self.mark_catalog_failed().await;
                Err(CatalogError::Unavailable(
                    "provider returned an empty model catalog".to_string(),
                ))
            }
            Err(err) => {
                self.mark_catalog_failed().await;
                Err(err)
            }
        }
    }

    async fn mark_catalog_failed(&self) {
        let mut catalog = self.catalog.write().await;
        if !matches!(*catalog, CatalogState::Ready(_)) {
            *catalog = CatalogState::Failed;
        }
    }

    /// Supplies the owner id from the auth collaborator.
    pub async fn set_user(&self, user_id: impl Into<String>) {
        *self.user_id.write().await = Some(user_id.into());
    }

    pub async fn state(&self) -> ControllerState {
        match &*self.catalog.read().await {
            CatalogState::Loading => return ControllerState::CatalogLoading,
            CatalogState::Failed => return ControllerState::CatalogFailed,
            CatalogState::Ready(_) => {}
        }
        if self.in_flight.load(Ordering::SeqCst) > 0 {
            return ControllerState::Sending;
        }
        if self.store.active().await.is_some() {
            ControllerState::Composing
        } else {
            ControllerState::Idle
        }
    }

    /// Sends one user turn against the given model.
    ///
    /// The user turn is appended to the active conversation (creating one if
    /// none exists) and persisted before the dispatch suspends; it is never
    /// rolled back. Exactly one assistant turn is appended per call: the
    /// model's reply, or [`DISPATCH_FAILURE_NOTICE`] when the dispatch
    /// fails, in which case the dispatch error is also returned as a
    /// separate signal.
    ///
    /// Concurrent calls are permitted and may resolve out of order. Each
    /// call captures its conversation id by value and applies the reply to
    /// that conversation, not to whatever is active when the reply lands;
    /// callers must not assume reply ordering matches send ordering.
    pub async fn send_turn(
        &self,
        text: &str,
        attachment: Option<AttachmentRef>,
        model: &ModelId,
    ) -> Result<String, SendError> {
        if text.trim().is_empty() && attachment.is_none() {
            return Err(SendError::EmptyTurn);
        }
        {
            let catalog = self.catalog.read().await;
            let CatalogState::Ready(catalog) = &*catalog else {
                return Err(SendError::CatalogUnavailable);
            };
            if !catalog.contains(model) {
                return Err(SendError::UnknownModel(model.clone()));
            }
        }

        let user_turn = Turn::user(text, attachment);

        // Capture the target id by value; the reply resolves against it even
        // if the active conversation changes while the dispatch is in flight.
        let (conversation_id, prior_turns) = match self.store.active().await {
            Some(conversation) => {
                let prior = conversation.turns.clone();
                self.store
                    .append_turn(&conversation.id, user_turn.clone())
                    .await?;
                (conversation.id, prior)
            }
            None => {
                let conversation = Conversation::start(user_turn.clone());
                let id = conversation.id.clone();
                self.store.begin(conversation).await?;
                (id, Vec::new())
            }
        };

        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let outcome = self
            .dispatcher
            .dispatch(DispatchRequest {
                prior_turns: &prior_turns,
                text: &user_turn.text,
                model,
                attachment: user_turn.attachment.as_ref(),
            })
            .await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let (reply_turn, result) = match outcome {
            Ok(reply) => (Turn::assistant(reply.clone()), Ok(reply)),
            Err(err) => (
                Turn::assistant(DISPATCH_FAILURE_NOTICE),
                Err(SendError::Dispatch(err)),
            ),
        };

        match self.store.append_turn(&conversation_id, reply_turn).await {
            Ok(()) => {}
            Err(err) if err.is_not_found() => {
                // The conversation was deleted while the dispatch was in
                // flight; the late reply is dropped.
                tracing::warn!(
                    conversation_id = %conversation_id,
                    "dropping reply for a deleted conversation"
                );
            }
            Err(err) => return Err(SendError::Store(err)),
        }

        result
    }

    /// Archives the current active conversation (if non-empty) and clears
    /// the active slot. Purely local; no network call.
    pub async fn new_conversation(&self) -> Result<(), StoreError> {
        self.store.archive_active().await
    }

    /// Loads a previously archived conversation into the active slot.
    ///
    /// # Errors
    ///
    /// `NotFound` when no conversation with that id exists locally.
    pub async fn select_conversation(&self, id: &str) -> Result<Conversation, StoreError> {
        self.store.select(id).await
    }

    pub async fn active_conversation(&self) -> Option<Conversation> {
        self.store.active().await
    }

    /// Archived conversations, most recently archived first.
    pub async fn archived_conversations(&self) -> Vec<Conversation> {
        self.store.archived().await
    }

    /// Closes the session: projects the active conversation into a durable
    /// history record, writes it to the history repository, then archives
    /// the conversation locally.
    ///
    /// Returns `Ok(None)` when there is nothing durable to record: no
    /// active conversation, or one without a single completed exchange.
    /// Zero-turn conversations are never persisted remotely.
    ///
    /// # Errors
    ///
    /// A missing user id is a precondition failure reported as
    /// `Validation`; the store is left untouched so the close can be retried
    /// once the auth collaborator has supplied one.
    pub async fn close_session(&self) -> Result<Option<HistoryRecord>, HistoryError> {
        let Some(conversation) = self.store.active().await else {
            return Ok(None);
        };
        if conversation.is_empty() {
            return Ok(None);
        }

        let user_id = self.user_id.read().await.clone().ok_or_else(|| {
            HistoryError::Validation("no user id supplied for history archival".to_string())
        })?;

        let record = project_history_record(&conversation, user_id);
        if record.messages.is_empty() {
            // Nothing durable yet (e.g. a lone unreplied turn); archive
            // locally and skip the remote write.
            if let Err(err) = self.store.archive_active().await {
                tracing::warn!("failed to archive conversation: {err}");
            }
            return Ok(None);
        }

        let stored = self.history.create(record).await?;

        if let Err(err) = self.store.archive_active().await {
            tracing::warn!("failed to archive conversation after history write: {err}");
        }

        Ok(Some(stored))
    }

    /// Lists all durable history records.
    pub async fn history(&self) -> Result<Vec<HistoryRecord>, HistoryError> {
        self.history.list().await
    }

    /// Deletes a history record. An explicit user action, never automatic.
    pub async fn delete_history(&self, id: &str) -> Result<HistoryRecord, HistoryError> {
        self.history.delete(id).await
    }
}

/// Projects a conversation into the remote record shape: paired
/// user/assistant exchanges, each stamped with its user turn's timestamp.
/// Unreplied trailing user turns are left out; only complete pairs are
/// durable.
fn project_history_record(conversation: &Conversation, user_id: String) -> NewHistoryRecord {
    let mut messages = Vec::new();
    for window in conversation.turns.windows(2) {
        let [first, second] = window else {
            continue;
        };
        if first.sender == Sender::User && second.sender == Sender::Assistant {
            messages.push(HistoryExchange {
                message: first.text.clone(),
                response: second.text.clone(),
                timestamp: first.created_at,
            });
        }
    }

    let start_time = conversation
        .turns
        .first()
        .map(|turn| turn.created_at)
        .unwrap_or_else(Utc::now);

    NewHistoryRecord {
        user_id,
        topic: conversation.title.clone(),
        messages,
        start_time,
        end_time: Some(Utc::now()),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use tokio::sync::Notify;

    use studio_core::SnapshotStorage;

    use super::*;

    #[derive(Default)]
    struct MemoryStorage {
        blob: Mutex<Option<String>>,
    }

    #[async_trait]
    impl SnapshotStorage for MemoryStorage {
        async fn load(&self) -> Result<Option<String>, StoreError> {
            Ok(self.blob.lock().unwrap().clone())
        }

        async fn save(&self, blob: &str) -> Result<(), StoreError> {
            *self.blob.lock().unwrap() = Some(blob.to_string());
            Ok(())
        }
    }

    /// Dispatcher double that pops scripted outcomes and records what it was
    /// asked to send.
    #[derive(Default)]
    struct ScriptedDispatcher {
        outcomes: Mutex<VecDeque<Result<String, DispatchError>>>,
        seen_prior_lens: Mutex<Vec<usize>>,
    }

    impl ScriptedDispatcher {
        fn replying(replies: &[&str]) -> Self {
            Self {
                outcomes: Mutex::new(
                    replies.iter().map(|r| Ok(r.to_string())).collect(),
                ),
                seen_prior_lens: Mutex::new(Vec::new()),
            }
        }

        fn failing(err: DispatchError) -> Self {
            Self {
                outcomes: Mutex::new(VecDeque::from([Err(err)])),
                seen_prior_lens: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Dispatcher for ScriptedDispatcher {
        async fn dispatch(
            &self,
            request: DispatchRequest<'_>,
        ) -> Result<String, DispatchError> {
            self.seen_prior_lens
                .lock()
                .unwrap()
                .push(request.prior_turns.len());
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(DispatchError::EmptyResponse))
        }
    }

    /// Dispatcher double that blocks until released, for in-flight tests.
    struct GatedDispatcher {
        gate: Arc<Notify>,
        reply: String,
    }

    #[async_trait]
    impl Dispatcher for GatedDispatcher {
        async fn dispatch(
            &self,
            _request: DispatchRequest<'_>,
        ) -> Result<String, DispatchError> {
            self.gate.notified().await;
            Ok(self.reply.clone())
        }
    }

    struct FixedCatalog(Result<ModelCatalog, CatalogError>);

    #[async_trait]
    impl CatalogClient for FixedCatalog {
        async fn list_models(&self) -> Result<ModelCatalog, CatalogError> {
            self.0.clone()
        }
    }

    #[derive(Default)]
    struct MemoryHistory {
        records: Mutex<HashMap<String, HistoryRecord>>,
        next_id: Mutex<u32>,
    }

    #[async_trait]
    impl HistoryRepository for MemoryHistory {
        async fn create(
            &self,
            record: NewHistoryRecord,
        ) -> Result<HistoryRecord, HistoryError> {
            if record.user_id.trim().is_empty() {
                return Err(HistoryError::Validation("userId is required".into()));
            }
            let mut next_id = self.next_id.lock().unwrap();
            *next_id += 1;
            let stored = HistoryRecord {
                id: format!("rec-{next_id}"),
                user_id: record.user_id,
                topic: record.topic,
                messages: record.messages,
                start_time: record.start_time,
                end_time: record.end_time,
            };
            self.records
                .lock()
                .unwrap()
                .insert(stored.id.clone(), stored.clone());
            Ok(stored)
        }

        async fn get(&self, id: &str) -> Result<HistoryRecord, HistoryError> {
            self.records
                .lock()
                .unwrap()
                .get(id)
                .cloned()
                .ok_or_else(|| HistoryError::not_found(id))
        }

        async fn list(&self) -> Result<Vec<HistoryRecord>, HistoryError> {
            Ok(self.records.lock().unwrap().values().cloned().collect())
        }

        async fn delete(&self, id: &str) -> Result<HistoryRecord, HistoryError> {
            self.records
                .lock()
                .unwrap()
                .remove(id)
                .ok_or_else(|| HistoryError::not_found(id))
        }
    }

    fn catalog_of(models: &[&str]) -> ModelCatalog {
        ModelCatalog::new(models.iter().map(|m| ModelId::from(*m)).collect())
    }

    struct Harness {
        store: Arc<ConversationStore>,
        controller: Arc<ConversationController>,
        history: Arc<MemoryHistory>,
    }

    async fn harness_with(dispatcher: Arc<dyn Dispatcher>) -> Harness {
        let store = Arc::new(ConversationStore::load(Arc::new(MemoryStorage::default())).await);
        let history = Arc::new(MemoryHistory::default());
        let controller = Arc::new(ConversationController::new(
            store.clone(),
            dispatcher,
            Arc::new(FixedCatalog(Ok(catalog_of(&["m1", "m2"])))),
            history.clone(),
        ));
        controller.load_catalog().await.unwrap();
        Harness {
            store,
            controller,
            history,
        }
    }

    #[tokio::test]
    async fn successful_send_appends_one_user_and_one_assistant_turn() {
        let harness =
            harness_with(Arc::new(ScriptedDispatcher::replying(&["Hi there"]))).await;
        let controller = &harness.controller;

        let reply = controller
            .send_turn("Hello", None, &ModelId::from("m1"))
            .await
            .unwrap();
        assert_eq!(reply, "Hi there");

        let conversation = controller.active_conversation().await.unwrap();
        assert_eq!(conversation.title, "Hello");
        assert_eq!(conversation.turns.len(), 2);
        assert_eq!(conversation.turns[0].sender, Sender::User);
        assert_eq!(conversation.turns[0].text, "Hello");
        assert_eq!(conversation.turns[1].sender, Sender::Assistant);
        assert_eq!(conversation.turns[1].text, "Hi there");
        assert_eq!(controller.state().await, ControllerState::Composing);
    }

    #[tokio::test]
    async fn failed_dispatch_keeps_the_user_turn_and_records_a_notice() {
        let harness = harness_with(Arc::new(ScriptedDispatcher::failing(
            DispatchError::NetworkFailure("connection reset".into()),
        )))
        .await;
        let controller = &harness.controller;

        let err = controller
            .send_turn("Hello", None, &ModelId::from("m1"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SendError::Dispatch(DispatchError::NetworkFailure(_))
        ));

        // The transcript stays a faithful record: original turn untouched,
        // exactly one assistant turn carrying the notice.
        let conversation = controller.active_conversation().await.unwrap();
        assert_eq!(conversation.turns.len(), 2);
        assert_eq!(conversation.turns[0].text, "Hello");
        assert_eq!(conversation.turns[1].sender, Sender::Assistant);
        assert_eq!(conversation.turns[1].text, DISPATCH_FAILURE_NOTICE);
        assert_eq!(controller.state().await, ControllerState::Composing);
    }

    #[tokio::test]
    async fn every_dispatch_outcome_appends_exactly_one_assistant_turn() {
        for outcome in [
            Err(DispatchError::NetworkFailure("down".into())),
            Err(DispatchError::ProviderError {
                status: Some(500),
                message: "boom".into(),
            }),
            Err(DispatchError::EmptyResponse),
            Ok("Hi there".to_string()),
        ] {
            let dispatcher = ScriptedDispatcher {
                outcomes: Mutex::new(VecDeque::from([outcome])),
                seen_prior_lens: Mutex::new(Vec::new()),
            };
            let harness = harness_with(Arc::new(dispatcher)).await;

            let _ = harness
                .controller
                .send_turn("Hello", None, &ModelId::from("m1"))
                .await;

            let conversation = harness.controller.active_conversation().await.unwrap();
            let assistant_turns = conversation
                .turns
                .iter()
                .filter(|t| t.sender == Sender::Assistant)
                .count();
            assert_eq!(assistant_turns, 1);
        }
    }

    #[tokio::test]
    async fn full_history_is_replayed_on_each_dispatch() {
        let dispatcher = Arc::new(ScriptedDispatcher::replying(&["one", "two"]));
        let harness = harness_with(dispatcher.clone()).await;
        let controller = &harness.controller;
        let model = ModelId::from("m1");

        controller.send_turn("Hello", None, &model).await.unwrap();
        controller
            .send_turn("How are you?", None, &model)
            .await
            .unwrap();

        // First dispatch carries no prior turns, the second carries both
        // turns of the first exchange.
        assert_eq!(*dispatcher.seen_prior_lens.lock().unwrap(), vec![0, 2]);
    }

    #[tokio::test]
    async fn empty_turn_is_rejected_without_mutating_the_store() {
        let harness = harness_with(Arc::new(ScriptedDispatcher::default())).await;
        let controller = &harness.controller;

        let err = controller
            .send_turn("   ", None, &ModelId::from("m1"))
            .await
            .unwrap_err();
        assert!(matches!(err, SendError::EmptyTurn));
        assert!(controller.active_conversation().await.is_none());
    }

    #[tokio::test]
    async fn attachment_only_turn_is_accepted() {
        let harness =
            harness_with(Arc::new(ScriptedDispatcher::replying(&["Got it"]))).await;
        let attachment = AttachmentRef {
            file_name: "diagram.png".to_string(),
            media_type: "image/png".to_string(),
            data: "aGVsbG8=".to_string(),
        };

        harness
            .controller
            .send_turn("", Some(attachment), &ModelId::from("m1"))
            .await
            .unwrap();

        let conversation = harness.controller.active_conversation().await.unwrap();
        assert_eq!(conversation.title, "diagram.png");
        assert!(conversation.turns[0].attachment.is_some());
    }

    #[tokio::test]
    async fn unknown_model_is_rejected() {
        let harness = harness_with(Arc::new(ScriptedDispatcher::default())).await;

        let err = harness
            .controller
            .send_turn("Hello", None, &ModelId::from("m3"))
            .await
            .unwrap_err();
        assert!(matches!(err, SendError::UnknownModel(_)));
    }

    #[tokio::test]
    async fn sends_are_gated_until_a_catalog_is_loaded() {
        let store = Arc::new(ConversationStore::load(Arc::new(MemoryStorage::default())).await);
        let controller = ConversationController::new(
            store,
            Arc::new(ScriptedDispatcher::default()),
            Arc::new(FixedCatalog(Err(CatalogError::Unauthenticated(
                "bad key".into(),
            )))),
            Arc::new(MemoryHistory::default()),
        );

        assert_eq!(controller.state().await, ControllerState::CatalogLoading);

        let err = controller.load_catalog().await.unwrap_err();
        assert!(matches!(err, CatalogError::Unauthenticated(_)));
        assert_eq!(controller.state().await, ControllerState::CatalogFailed);

        let err = controller
            .send_turn("Hello", None, &ModelId::from("m1"))
            .await
            .unwrap_err();
        assert!(matches!(err, SendError::CatalogUnavailable));
    }

    #[tokio::test]
    async fn empty_catalog_counts_as_failed() {
        let store = Arc::new(ConversationStore::load(Arc::new(MemoryStorage::default())).await);
        let controller = ConversationController::new(
            store,
            Arc::new(ScriptedDispatcher::default()),
            Arc::new(FixedCatalog(Ok(ModelCatalog::default()))),
            Arc::new(MemoryHistory::default()),
        );

        assert!(controller.load_catalog().await.is_err());
        assert_eq!(controller.state().await, ControllerState::CatalogFailed);
    }

    #[tokio::test]
    async fn new_conversation_archives_and_a_new_send_gets_a_new_id() {
        let harness =
            harness_with(Arc::new(ScriptedDispatcher::replying(&["one", "two"]))).await;
        let controller = &harness.controller;
        let model = ModelId::from("m1");

        controller.send_turn("Hello", None, &model).await.unwrap();
        let first_id = controller.active_conversation().await.unwrap().id;

        controller.new_conversation().await.unwrap();
        assert!(controller.active_conversation().await.is_none());
        assert_eq!(controller.state().await, ControllerState::Idle);

        let archived = controller.archived_conversations().await;
        assert_eq!(archived.len(), 1);
        assert_eq!(archived[0].id, first_id);
        assert_eq!(archived[0].turns.len(), 2);

        controller.send_turn("Again", None, &model).await.unwrap();
        let second_id = controller.active_conversation().await.unwrap().id;
        assert_ne!(first_id, second_id);
    }

    #[tokio::test]
    async fn select_conversation_restores_an_archived_one() {
        let harness =
            harness_with(Arc::new(ScriptedDispatcher::replying(&["one"]))).await;
        let controller = &harness.controller;

        controller
            .send_turn("Hello", None, &ModelId::from("m1"))
            .await
            .unwrap();
        let id = controller.active_conversation().await.unwrap().id;
        controller.new_conversation().await.unwrap();

        let restored = controller.select_conversation(&id).await.unwrap();
        assert_eq!(restored.id, id);
        assert_eq!(controller.state().await, ControllerState::Composing);

        let err = controller.select_conversation("missing").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn reply_lands_in_its_own_conversation_after_it_was_archived() {
        let gate = Arc::new(Notify::new());
        let harness = harness_with(Arc::new(GatedDispatcher {
            gate: gate.clone(),
            reply: "Late reply".to_string(),
        }))
        .await;
        let controller = harness.controller.clone();

        let send = tokio::spawn({
            let controller = controller.clone();
            async move {
                controller
                    .send_turn("Hello", None, &ModelId::from("m1"))
                    .await
            }
        });

        // Let the send reach the dispatcher, then switch conversations
        // while it is still in flight.
        while controller.state().await != ControllerState::Sending {
            tokio::task::yield_now().await;
        }
        let in_flight_id = controller.active_conversation().await.unwrap().id;
        controller.new_conversation().await.unwrap();

        gate.notify_one();
        send.await.unwrap().unwrap();

        // The reply was appended to the archived conversation it was issued
        // against, not to the (empty) active slot.
        assert!(controller.active_conversation().await.is_none());
        let archived = controller.archived_conversations().await;
        assert_eq!(archived[0].id, in_flight_id);
        assert_eq!(archived[0].turns.len(), 2);
        assert_eq!(archived[0].turns[1].text, "Late reply");
    }

    #[tokio::test]
    async fn reply_for_a_deleted_conversation_is_discarded() {
        let gate = Arc::new(Notify::new());
        let harness = harness_with(Arc::new(GatedDispatcher {
            gate: gate.clone(),
            reply: "Late reply".to_string(),
        }))
        .await;
        let controller = harness.controller.clone();

        let send = tokio::spawn({
            let controller = controller.clone();
            async move {
                controller
                    .send_turn("Hello", None, &ModelId::from("m1"))
                    .await
            }
        });

        while controller.state().await != ControllerState::Sending {
            tokio::task::yield_now().await;
        }
        let id = controller.active_conversation().await.unwrap().id;
        harness.store.remove(&id).await.unwrap();

        gate.notify_one();
        // The send itself still reports its reply; the store no longer has
        // anywhere to put it.
        send.await.unwrap().unwrap();

        assert!(controller.active_conversation().await.is_none());
        assert!(controller.archived_conversations().await.is_empty());
    }

    #[tokio::test]
    async fn close_session_requires_a_user_id() {
        let harness =
            harness_with(Arc::new(ScriptedDispatcher::replying(&["Hi there"]))).await;
        let controller = &harness.controller;

        controller
            .send_turn("Hello", None, &ModelId::from("m1"))
            .await
            .unwrap();

        let err = controller.close_session().await.unwrap_err();
        assert!(matches!(err, HistoryError::Validation(_)));
        // The store is untouched so the close can be retried.
        assert!(controller.active_conversation().await.is_some());
    }

    #[tokio::test]
    async fn close_session_writes_paired_exchanges_and_archives() {
        let harness =
            harness_with(Arc::new(ScriptedDispatcher::replying(&["Hi there"]))).await;
        let controller = &harness.controller;
        controller.set_user("user-1").await;

        controller
            .send_turn("Hello", None, &ModelId::from("m1"))
            .await
            .unwrap();

        let record = controller.close_session().await.unwrap().unwrap();
        assert_eq!(record.user_id, "user-1");
        assert_eq!(record.topic, "Hello");
        assert_eq!(record.messages.len(), 1);
        assert_eq!(record.messages[0].message, "Hello");
        assert_eq!(record.messages[0].response, "Hi there");
        assert!(record.end_time.is_some());

        assert!(controller.active_conversation().await.is_none());
        assert_eq!(controller.archived_conversations().await.len(), 1);
        assert_eq!(harness.history.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn close_session_with_nothing_active_is_a_no_op() {
        let harness = harness_with(Arc::new(ScriptedDispatcher::default())).await;
        harness.controller.set_user("user-1").await;

        assert!(harness.controller.close_session().await.unwrap().is_none());
        assert!(harness.history.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn history_delete_passes_through_not_found() {
        let harness = harness_with(Arc::new(ScriptedDispatcher::default())).await;
        let err = harness.controller.delete_history("missing").await.unwrap_err();
        assert!(err.is_not_found());
    }
}
