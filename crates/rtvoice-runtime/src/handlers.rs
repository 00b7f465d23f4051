//! Core session event handlers.
//!
//! [`SessionHandlers`] ties the response bookkeeping (owned by the
//! transport), the playback pipeline and the conversation log together:
//!
//! - `response.created` marks the response active
//! - `response.audio.delta` feeds playback unless the response was canceled
//! - `conversation.item.created` (user) records the turn and barges in on an
//!   active response: flush playback, then cancel
//! - `response.done` / `response.error` close the response; `done` also
//!   records assistant turns and usage, then maybe summarizes
//! - `conversation.item.retrieved` backfills a transcript, then maybe
//!   summarizes
//!
//! Events are handled strictly one at a time, so no handler step races
//! another.

use std::sync::Arc;

use async_trait::async_trait;
use rtvoice_audio::AudioPlayer;
use rtvoice_context::{ContextManager, SummaryOutcome};
use rtvoice_core::events::{ConversationItem, ResponseBody, decode_audio};
use rtvoice_core::{
    ErrorCategory, EventHandler, EventSink, HandlerError, ResponseControl, Role, ServerEvent,
};

use crate::fetcher::TranscriptFetcher;

/// Wire tags served by [`SessionHandlers`].
pub const SESSION_EVENT_TYPES: &[&str] = &[
    "session.created",
    "session.updated",
    "response.created",
    "response.audio.delta",
    "response.done",
    "response.error",
    "conversation.item.created",
    "conversation.item.retrieved",
    "error",
];

/// The session's core event handlers.
pub struct SessionHandlers {
    link: Arc<dyn ResponseControl>,
    player: Arc<AudioPlayer>,
    context: Arc<ContextManager>,
    fetcher: Option<Arc<TranscriptFetcher>>,
}

impl SessionHandlers {
    /// Handlers over the given collaborators.
    pub fn new(link: Arc<dyn ResponseControl>, player: Arc<AudioPlayer>, context: Arc<ContextManager>) -> Self {
        Self {
            link,
            player,
            context,
            fetcher: None,
        }
    }

    /// Backfill missing user transcripts with `fetcher`.
    #[must_use]
    pub fn with_fetcher(mut self, fetcher: Arc<TranscriptFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    fn sink(&self) -> &dyn EventSink {
        &*self.link
    }

    fn on_response_created(&self, event: &ServerEvent) {
        if let Some(id) = event.response_id() {
            self.link.set_active_response(id);
            tracing::debug!(response_id = id, "response active");
        }
    }

    async fn on_audio_delta(&self, response_id: Option<&str>, audio: Option<&str>) -> Result<(), HandlerError> {
        let Some(response_id) = response_id else {
            return Ok(());
        };
        if self.link.is_canceled(response_id) {
            tracing::trace!(response_id, "dropping delta for canceled response");
            return Ok(());
        }
        self.link.set_active_response(response_id);
        let Some(audio) = audio.filter(|a| !a.is_empty()) else {
            return Ok(());
        };
        match decode_audio(audio) {
            Ok(pcm) => self.player.feed(pcm).await.map_err(HandlerError::audio),
            Err(e) => {
                tracing::debug!(
                    response_id,
                    error = %e,
                    error_category = ErrorCategory::Protocol.as_str(),
                    "undecodable audio delta"
                );
                Ok(())
            }
        }
    }

    async fn on_item_created(&self, item: &ConversationItem) -> Result<(), HandlerError> {
        if item.role() != Some(Role::User) {
            return Ok(());
        }
        let item_id = item.id.as_deref().unwrap_or_default();
        if !item_id.is_empty()
            && self.context.observe_user_item(item_id, item.transcript())
            && let Some(fetcher) = &self.fetcher
        {
            let _ = fetcher.request(item_id);
        }

        let Some(response_id) = self.link.active_response() else {
            return Ok(());
        };
        self.player.flush().await.map_err(HandlerError::audio)?;
        let _ = self.link.cancel_active_response().await?;
        tracing::info!(response_id = %response_id, turn_id = item_id, "barge_in");
        Ok(())
    }

    async fn on_response_done(&self, event: &ServerEvent, body: Option<&ResponseBody>) -> Result<(), HandlerError> {
        if let Some(id) = event.response_id() {
            self.link.finish_response(id);
        }
        let Some(body) = body else {
            return self.summarize().await;
        };
        for item in body.output.iter().filter(|i| i.role() == Some(Role::Assistant)) {
            let item_id = item.id.as_deref().unwrap_or_default();
            self.context.append(Role::Assistant, item_id, item.transcript());
        }
        self.context
            .record_usage(body.usage.map_or(0, |u| u.total_tokens));
        if let Some(fetcher) = &self.fetcher {
            let _ = fetcher.request_missing();
        }
        self.summarize().await
    }

    fn on_response_error(&self, event: &ServerEvent, error: Option<&serde_json::Value>) {
        if let Some(id) = event.response_id() {
            self.link.finish_response(id);
        }
        tracing::warn!(
            response_id = ?event.response_id(),
            error = ?error,
            error_category = ErrorCategory::Api.as_str(),
            "response failed"
        );
    }

    async fn on_item_retrieved(&self, item: &ConversationItem, item_id: Option<&str>) -> Result<(), HandlerError> {
        let Some(item_id) = item.id.as_deref().or(item_id).filter(|id| !id.is_empty()) else {
            return Ok(());
        };
        let Some(transcript) = item.transcript() else {
            return Ok(());
        };
        let role = item.role().unwrap_or(Role::User);
        let _ = self.context.backfill(item_id, role, Some(transcript));
        self.summarize().await
    }

    async fn summarize(&self) -> Result<(), HandlerError> {
        match self.context.maybe_summarize(self.sink()).await? {
            SummaryOutcome::Committed { summary_id, pruned } => {
                tracing::debug!(summary_id = %summary_id, pruned = ?pruned, "summary externalised");
            }
            SummaryOutcome::Deferred => {
                if let Some(fetcher) = &self.fetcher {
                    let _ = fetcher.request_missing();
                }
            }
            SummaryOutcome::Aborted | SummaryOutcome::Failed | SummaryOutcome::Skipped => {}
        }
        Ok(())
    }
}

#[async_trait]
impl EventHandler for SessionHandlers {
    async fn handle(&self, event: &ServerEvent) -> Result<(), HandlerError> {
        match event {
            ServerEvent::SessionCreated { .. } | ServerEvent::SessionUpdated { .. } => {
                tracing::debug!(event_type = event.event_type(), "session configured");
                Ok(())
            }
            ServerEvent::ResponseCreated { .. } => {
                self.on_response_created(event);
                Ok(())
            }
            ServerEvent::ResponseAudioDelta { response_id, audio } => {
                self.on_audio_delta(response_id.as_deref(), audio.as_deref()).await
            }
            ServerEvent::ItemCreated { item } => self.on_item_created(item).await,
            ServerEvent::ResponseDone { response, .. } => self.on_response_done(event, response.as_ref()).await,
            ServerEvent::ResponseError { error, .. } => {
                self.on_response_error(event, error.as_ref());
                Ok(())
            }
            ServerEvent::ItemRetrieved { item, item_id } => {
                self.on_item_retrieved(item, item_id.as_deref()).await
            }
            ServerEvent::Error { error } => {
                tracing::warn!(error = ?error, error_category = ErrorCategory::Api.as_str(), "server error");
                Ok(())
            }
            ServerEvent::OutputItemCreate { .. } | ServerEvent::Unknown => Ok(()),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::time::Duration;

    use parking_lot::Mutex;
    use rtvoice_audio::{MemoryDevice, PcmFormat, PlayerConfig};
    use rtvoice_context::{ConversationState, Summarizer, SummarizerError, SummaryPolicy, Turn};
    use rtvoice_core::TransportError;
    use rtvoice_core::events::ClientEvent;
    use rtvoice_core::metrics::SessionMetrics;
    use rtvoice_settings::LanguagePolicy;
    use serde_json::{Value, json};

    /// In-memory stand-in for the transport's response bookkeeping.
    #[derive(Default)]
    struct FakeLink {
        sent: Mutex<Vec<Value>>,
        active: Mutex<Option<String>>,
        canceled: Mutex<HashSet<String>>,
    }

    impl FakeLink {
        fn sent(&self) -> Vec<Value> {
            self.sent.lock().clone()
        }
    }

    #[async_trait]
    impl EventSink for FakeLink {
        async fn send_event(&self, event: &ClientEvent) -> Result<(), TransportError> {
            self.sent.lock().push(serde_json::to_value(event)?);
            Ok(())
        }
    }

    #[async_trait]
    impl ResponseControl for FakeLink {
        fn active_response(&self) -> Option<String> {
            self.active.lock().clone()
        }
        fn set_active_response(&self, response_id: &str) {
            *self.active.lock() = Some(response_id.to_owned());
        }
        fn is_canceled(&self, response_id: &str) -> bool {
            self.canceled.lock().contains(response_id)
        }
        fn finish_response(&self, response_id: &str) {
            let mut active = self.active.lock();
            if active.as_deref() == Some(response_id) {
                *active = None;
            }
            let _ = self.canceled.lock().remove(response_id);
        }
        async fn cancel_active_response(&self) -> Result<Option<String>, TransportError> {
            let Some(id) = self.active.lock().take() else {
                return Ok(None);
            };
            let _ = self.canceled.lock().insert(id.clone());
            self.send_event(&ClientEvent::ResponseCancel {
                response_id: id.clone(),
            })
            .await?;
            Ok(Some(id))
        }
    }

    /// Counts calls and answers with a fixed text.
    #[derive(Default)]
    struct CountingSummarizer {
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl Summarizer for CountingSummarizer {
        async fn summarize(&self, _turns: &[Turn], _language: &str) -> Result<String, SummarizerError> {
            *self.calls.lock() += 1;
            Ok("Summary: test".into())
        }
    }

    struct Fixture {
        link: Arc<FakeLink>,
        device: Arc<MemoryDevice>,
        player: Arc<AudioPlayer>,
        context: Arc<ContextManager>,
        summarizer: Arc<CountingSummarizer>,
        handlers: SessionHandlers,
    }

    fn fixture(threshold: u64, keep: usize, state: ConversationState) -> Fixture {
        let link = Arc::new(FakeLink::default());
        let device = Arc::new(MemoryDevice::new());
        let metrics = SessionMetrics::new();
        let player = Arc::new(AudioPlayer::new(
            PlayerConfig {
                format: PcmFormat::pcm16_mono(24_000),
                jitter_ms: 0,
                queue_capacity: 16,
            },
            Arc::clone(&device) as Arc<dyn rtvoice_audio::OutputDevice>,
            metrics.audio_output_dropped.clone(),
            metrics.audio_output_queue_depth.clone(),
        ));
        let summarizer = Arc::new(CountingSummarizer::default());
        let context = Arc::new(
            ContextManager::new(
                SummaryPolicy::new(threshold, keep, LanguagePolicy::Fixed),
                Arc::clone(&summarizer) as Arc<dyn Summarizer>,
                metrics,
            )
            .with_state(state),
        );
        let handlers = SessionHandlers::new(
            Arc::clone(&link) as Arc<dyn ResponseControl>,
            Arc::clone(&player),
            Arc::clone(&context),
        );
        Fixture {
            link,
            device,
            player,
            context,
            summarizer,
            handlers,
        }
    }

    fn event(value: Value) -> ServerEvent {
        serde_json::from_value(value).unwrap()
    }

    fn state(turns: &[(Role, &str, Option<&str>)]) -> ConversationState {
        let mut state = ConversationState::new();
        for (role, id, text) in turns {
            state.append(Turn::new(*role, *id, text.map(str::to_owned)));
        }
        state
    }

    fn ids(context: &ContextManager) -> Vec<String> {
        context.history().into_iter().map(|t| t.item_id).collect()
    }

    fn deleted(link: &FakeLink) -> Vec<String> {
        link.sent()
            .iter()
            .filter(|v| v["type"] == "conversation.item.delete")
            .filter_map(|v| v["item_id"].as_str().map(str::to_owned))
            .collect()
    }

    #[tokio::test]
    async fn barge_in_cancels_flushes_and_drops_late_deltas() {
        let f = fixture(1000, 2, ConversationState::new());
        let h = &f.handlers;

        h.handle(&event(json!({"type": "response.created", "response": {"id": "r1"}})))
            .await
            .unwrap();
        h.handle(&event(json!({"type": "response.audio.delta", "response_id": "r1", "audio": "AAAA"})))
            .await
            .unwrap();
        assert!(f.device.wait_for_writes(1, Duration::from_secs(2)).await);
        let epochs = f.player.epochs().await;

        h.handle(&event(json!({
            "type": "conversation.item.created",
            "item": {"id": "u1", "role": "user", "content": [{"transcript": "wait"}]}
        })))
        .await
        .unwrap();

        assert_eq!(f.link.sent(), vec![json!({"type": "response.cancel", "response_id": "r1"})]);
        assert_eq!(f.link.active_response(), None);
        assert!(f.link.is_canceled("r1"));
        assert_eq!(f.device.stops(), 1);

        h.handle(&event(json!({"type": "response.audio.delta", "response_id": "r1", "audio": "AAAA"})))
            .await
            .unwrap();
        assert_eq!(f.player.epochs().await, epochs);
        assert_eq!(f.device.writes().len(), 1);
        assert_eq!(f.context.history()[0].text.as_deref(), Some("wait"));
    }

    #[tokio::test]
    async fn done_clears_active_so_no_barge_in_follows() {
        let f = fixture(1000, 2, ConversationState::new());
        let h = &f.handlers;

        h.handle(&event(json!({"type": "response.created", "response": {"id": "r1"}})))
            .await
            .unwrap();
        h.handle(&event(json!({"type": "response.done", "response": {"id": "r1"}})))
            .await
            .unwrap();
        h.handle(&event(json!({
            "type": "conversation.item.created",
            "item": {"id": "u1", "role": "user"}
        })))
        .await
        .unwrap();

        assert!(f.link.sent().is_empty());
        assert_eq!(f.device.stops(), 0);
        assert_eq!(f.context.history().len(), 1);
        assert!(!f.context.has_text("u1"));
    }

    #[tokio::test]
    async fn error_event_clears_cancel_record() {
        let f = fixture(1000, 2, ConversationState::new());
        let h = &f.handlers;
        f.link.set_active_response("r1");
        let _ = f.link.cancel_active_response().await.unwrap();
        assert!(f.link.is_canceled("r1"));

        h.handle(&event(json!({"type": "response.error", "response_id": "r1"})))
            .await
            .unwrap();

        assert!(!f.link.is_canceled("r1"));
    }

    #[tokio::test]
    async fn delta_without_response_id_is_ignored() {
        let f = fixture(1000, 2, ConversationState::new());
        f.handlers
            .handle(&event(json!({"type": "response.audio.delta", "audio": "AAAA"})))
            .await
            .unwrap();
        assert_eq!(f.player.epochs().await, 0);
        assert_eq!(f.link.active_response(), None);
    }

    #[tokio::test]
    async fn assistant_items_are_ignored_by_item_created() {
        let f = fixture(1000, 2, ConversationState::new());
        f.link.set_active_response("r1");
        f.handlers
            .handle(&event(json!({
                "type": "conversation.item.created",
                "item": {"id": "a1", "role": "assistant"}
            })))
            .await
            .unwrap();
        assert!(f.link.sent().is_empty());
        assert!(f.context.history().is_empty());
    }

    #[tokio::test]
    async fn response_done_records_assistant_turns_and_usage() {
        let f = fixture(1000, 2, ConversationState::new());
        f.handlers
            .handle(&event(json!({
                "type": "response.done",
                "response": {
                    "id": "r1",
                    "output": [
                        {"id": "a1", "role": "assistant", "content": [{"transcript": "hello"}]},
                        {"id": "t1", "role": "tool"}
                    ],
                    "usage": {"total_tokens": 42}
                }
            })))
            .await
            .unwrap();

        let history = f.context.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].role, Role::Assistant);
        assert_eq!(history[0].text.as_deref(), Some("hello"));
        assert_eq!(f.context.snapshot().latest_tokens, 42);
    }

    #[tokio::test]
    async fn retrieved_uses_top_level_item_id_and_role_default() {
        let f = fixture(1000, 2, ConversationState::new());
        f.handlers
            .handle(&event(json!({
                "type": "conversation.item.retrieved",
                "item_id": "u9",
                "item": {"content": [{"text": "from text"}]}
            })))
            .await
            .unwrap();
        f.handlers
            .handle(&event(json!({
                "type": "conversation.item.retrieved",
                "item": {"id": "u10", "content": [{"transcript": ""}]}
            })))
            .await
            .unwrap();

        let history = f.context.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].item_id, "u9");
        assert_eq!(history[0].role, Role::User);
    }

    #[tokio::test]
    async fn summary_waits_for_backfill_then_prunes() {
        let f = fixture(
            10,
            3,
            state(&[
                (Role::User, "u1", None),
                (Role::Assistant, "a1", Some("hi")),
                (Role::User, "u2", Some("more")),
            ]),
        );
        let h = &f.handlers;

        h.handle(&event(json!({
            "type": "response.done",
            "response": {
                "id": "r1",
                "output": [{"id": "a2", "role": "assistant", "content": [{"transcript": "sure"}]}],
                "usage": {"total_tokens": 50}
            }
        })))
        .await
        .unwrap();
        h.handle(&event(json!({
            "type": "response.done",
            "response": {
                "id": "r2",
                "output": [{"id": "a3", "role": "assistant", "content": [{"transcript": "ok"}]}],
                "usage": {"total_tokens": 5}
            }
        })))
        .await
        .unwrap();

        assert_eq!(*f.summarizer.calls.lock(), 0);
        assert!(f.link.sent().is_empty());
        assert_eq!(ids(&f.context), vec!["u1", "a1", "u2", "a2", "a3"]);

        h.handle(&event(json!({
            "type": "conversation.item.retrieved",
            "item": {"id": "u1", "role": "user", "content": [{"transcript": "hola"}]}
        })))
        .await
        .unwrap();

        assert_eq!(*f.summarizer.calls.lock(), 1);
        assert_eq!(ids(&f.context), vec!["summary-1", "u2", "a2", "a3"]);
        assert_eq!(f.context.history()[0].role, Role::System);
        assert_eq!(deleted(&f.link), vec!["u1", "a1"]);
        let sent = f.link.sent();
        assert_eq!(sent[0]["type"], "conversation.item.create");
        assert_eq!(sent[0]["previous_item_id"], "root");
    }
}
