//! Background transcript backfill.
//!
//! User items often arrive before their transcription. For each such item a
//! task asks the server to resend it (`conversation.item.retrieve`) with a
//! linearly growing delay until the turn has text or the attempts run out.
//! The reply lands in the item-retrieved handler, which fills the turn.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rtvoice_context::ContextManager;
use rtvoice_core::events::ClientEvent;
use rtvoice_core::EventSink;
use rtvoice_core::retry::{PollPolicy, poll_with_backoff};
use rtvoice_settings::TranscriptSettings;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Spawns and tracks transcript fetch tasks.
pub struct TranscriptFetcher {
    sink: Arc<dyn EventSink>,
    context: Arc<ContextManager>,
    policy: PollPolicy,
    in_flight: Arc<Mutex<HashSet<String>>>,
    stop: CancellationToken,
    tasks: TaskTracker,
}

impl TranscriptFetcher {
    /// Fetcher sending retrieve requests through `sink`.
    pub fn new(
        sink: Arc<dyn EventSink>,
        context: Arc<ContextManager>,
        policy: PollPolicy,
        stop: CancellationToken,
    ) -> Self {
        Self {
            sink,
            context,
            policy,
            in_flight: Arc::default(),
            stop,
            tasks: TaskTracker::new(),
        }
    }

    /// Retry schedule from settings.
    pub fn policy_from_settings(settings: &TranscriptSettings) -> PollPolicy {
        PollPolicy {
            max_attempts: settings.fetch_attempts,
            base_delay: Duration::from_millis(settings.fetch_delay_ms),
        }
    }

    /// Start fetching `item_id` unless a fetch for it is already running.
    ///
    /// Returns `false` when nothing was started (duplicate, or shut down).
    pub fn request(&self, item_id: &str) -> bool {
        if self.stop.is_cancelled() || item_id.is_empty() {
            return false;
        }
        if !self.in_flight.lock().insert(item_id.to_owned()) {
            tracing::trace!(turn_id = item_id, "transcript fetch already running");
            return false;
        }

        let item_id = item_id.to_owned();
        let sink = Arc::clone(&self.sink);
        let context = Arc::clone(&self.context);
        let in_flight = Arc::clone(&self.in_flight);
        let stop = self.stop.clone();
        let policy = self.policy;
        let _ = self.tasks.spawn(async move {
            tokio::select! {
                biased;
                () = stop.cancelled() => {}
                found = fetch(sink.as_ref(), &context, policy, &item_id) => {
                    if !found {
                        tracing::debug!(
                            turn_id = %item_id,
                            attempts = policy.max_attempts,
                            "transcript fetch gave up"
                        );
                    }
                }
            }
            let _ = in_flight.lock().remove(&item_id);
        });
        true
    }

    /// Request every user turn that still lacks text.
    pub fn request_missing(&self) -> usize {
        self.context
            .user_turns_missing_text()
            .iter()
            .filter(|id| self.request(id))
            .count()
    }

    /// Fetches currently running.
    pub fn in_flight(&self) -> usize {
        self.in_flight.lock().len()
    }

    /// Cancel every fetch and wait for the tasks to unwind.
    pub async fn shutdown(&self) {
        self.stop.cancel();
        let _ = self.tasks.close();
        self.tasks.wait().await;
    }
}

async fn fetch(sink: &dyn EventSink, context: &ContextManager, policy: PollPolicy, item_id: &str) -> bool {
    poll_with_backoff(policy, |attempt| async move {
        if context.has_text(item_id) {
            return Some(());
        }
        let request = ClientEvent::ItemRetrieve {
            item_id: item_id.to_owned(),
        };
        if let Err(e) = sink.send_event(&request).await {
            tracing::debug!(turn_id = item_id, attempt, error = %e, "transcript retrieve not sent");
        }
        None
    })
    .await
    .is_some()
        || context.has_text(item_id)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rtvoice_context::{ExtractiveSummarizer, SummaryPolicy};
    use rtvoice_core::metrics::SessionMetrics;
    use rtvoice_core::{Role, TransportError};
    use rtvoice_settings::LanguagePolicy;

    #[derive(Default)]
    struct RecordingSink {
        sent: Mutex<Vec<ClientEvent>>,
    }

    #[async_trait]
    impl EventSink for RecordingSink {
        async fn send_event(&self, event: &ClientEvent) -> Result<(), TransportError> {
            self.sent.lock().push(event.clone());
            Ok(())
        }
    }

    impl RecordingSink {
        fn retrieves(&self) -> usize {
            self.sent
                .lock()
                .iter()
                .filter(|e| matches!(e, ClientEvent::ItemRetrieve { .. }))
                .count()
        }
    }

    fn context() -> Arc<ContextManager> {
        Arc::new(ContextManager::new(
            SummaryPolicy::new(1000, 2, LanguagePolicy::Auto),
            Arc::new(ExtractiveSummarizer),
            SessionMetrics::new(),
        ))
    }

    fn fetcher(sink: &Arc<RecordingSink>, context: &Arc<ContextManager>) -> TranscriptFetcher {
        TranscriptFetcher::new(
            Arc::clone(sink) as Arc<dyn EventSink>,
            Arc::clone(context),
            PollPolicy {
                max_attempts: 3,
                base_delay: Duration::from_millis(100),
            },
            CancellationToken::new(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn stops_once_the_turn_has_text() {
        let sink = Arc::new(RecordingSink::default());
        let ctx = context();
        ctx.append(Role::User, "u1", None);
        let f = fetcher(&sink, &ctx);

        assert!(f.request("u1"));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(sink.retrieves(), 1);

        let _ = ctx.backfill("u1", Role::User, Some("hola"));
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(sink.retrieves(), 1);
        assert_eq!(f.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let sink = Arc::new(RecordingSink::default());
        let ctx = context();
        ctx.append(Role::User, "u1", None);
        let f = fetcher(&sink, &ctx);

        assert!(f.request("u1"));
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(sink.retrieves(), 3);
        assert_eq!(f.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_requests_are_suppressed() {
        let sink = Arc::new(RecordingSink::default());
        let ctx = context();
        ctx.append(Role::User, "u1", None);
        let f = fetcher(&sink, &ctx);

        assert!(f.request("u1"));
        assert!(!f.request("u1"));
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(sink.retrieves(), 1);
        assert_eq!(f.in_flight(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn request_missing_covers_pending_user_turns() {
        let sink = Arc::new(RecordingSink::default());
        let ctx = context();
        ctx.append(Role::User, "u1", None);
        ctx.append(Role::Assistant, "a1", Some("hi"));
        ctx.append(Role::User, "u2", None);
        let f = fetcher(&sink, &ctx);

        assert_eq!(f.request_missing(), 2);
        assert_eq!(f.request_missing(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancels_running_fetches() {
        let sink = Arc::new(RecordingSink::default());
        let ctx = context();
        ctx.append(Role::User, "u1", None);
        let f = fetcher(&sink, &ctx);

        assert!(f.request("u1"));
        tokio::time::sleep(Duration::from_millis(10)).await;
        f.shutdown().await;
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(sink.retrieves(), 1);
        assert_eq!(f.in_flight(), 0);
        assert!(!f.request("u2"));
    }
}
