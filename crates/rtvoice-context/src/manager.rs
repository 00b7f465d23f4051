//! The conversation context manager.
//!
//! Owns the [`ConversationState`] behind a synchronous lock that is never held
//! across an `.await`. Summarization snapshots the log, releases the lock for
//! the summarizer call, then re-validates before committing, so concurrent
//! backfills cannot cause an unconfirmed turn to be pruned.

use std::sync::Arc;

use parking_lot::Mutex;
use rtvoice_core::events::ClientEvent;
use rtvoice_core::metrics::SessionMetrics;
use rtvoice_core::{ErrorCategory, EventSink, Role, TransportError};

use crate::conversation::{ConversationState, Turn};
use crate::policy::SummaryPolicy;
use crate::redaction::Redact;
use crate::summarizer::Summarizer;

/// Result of a transcript backfill.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Backfill {
    /// An existing turn received its transcript.
    Filled,
    /// No turn matched; a new one was appended.
    Appended,
    /// Nothing to do (empty transcript or missing ID).
    Ignored,
}

/// Result of a summarize-and-prune attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SummaryOutcome {
    /// Summary committed and externalised.
    Committed {
        /// ID of the new system turn.
        summary_id: String,
        /// IDs of the pruned turns, in their original order.
        pruned: Vec<String>,
    },
    /// A turn in the prefix still lacks a transcript; nothing changed.
    Deferred,
    /// The prefix gained a pending turn while the summarizer ran; nothing changed.
    Aborted,
    /// The summarizer failed; nothing changed.
    Failed,
    /// A summary is already in flight, or there is nothing to prune.
    Skipped,
}

/// Clears the in-flight flag on drop unless disarmed.
struct InFlight<'a> {
    state: &'a Mutex<ConversationState>,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.state.lock().summarizing = false;
    }
}

/// Conversation log plus summarization.
pub struct ContextManager {
    state: Mutex<ConversationState>,
    policy: SummaryPolicy,
    summarizer: Arc<dyn Summarizer>,
    redactor: Option<Arc<dyn Redact>>,
    metrics: SessionMetrics,
}

impl ContextManager {
    /// New empty log.
    pub fn new(policy: SummaryPolicy, summarizer: Arc<dyn Summarizer>, metrics: SessionMetrics) -> Self {
        Self {
            state: Mutex::new(ConversationState::new()),
            policy,
            summarizer,
            redactor: None,
            metrics,
        }
    }

    /// Redact every transcript before storing it.
    #[must_use]
    pub fn with_redactor(mut self, redactor: Arc<dyn Redact>) -> Self {
        self.redactor = Some(redactor);
        self
    }

    /// Start from an existing state.
    #[must_use]
    pub fn with_state(self, state: ConversationState) -> Self {
        *self.state.lock() = state;
        self
    }

    /// The active policy.
    pub fn policy(&self) -> &SummaryPolicy {
        &self.policy
    }

    /// Copy of the current state.
    pub fn snapshot(&self) -> ConversationState {
        self.state.lock().clone()
    }

    /// Copy of the current history.
    pub fn history(&self) -> Vec<Turn> {
        self.state.lock().history.clone()
    }

    /// Whether the turn exists and has a transcript.
    pub fn has_text(&self, item_id: &str) -> bool {
        self.state.lock().find(item_id).is_some_and(Turn::has_text)
    }

    /// IDs of user turns still waiting for a transcript.
    pub fn user_turns_missing_text(&self) -> Vec<String> {
        self.state.lock().user_turns_missing_text()
    }

    fn redact(&self, text: Option<&str>) -> Option<String> {
        let text = text.filter(|t| !t.is_empty())?;
        Some(match &self.redactor {
            Some(r) => r.redact(text),
            None => text.to_string(),
        })
    }

    fn push(&self, state: &mut ConversationState, turn: Turn) {
        let total = self.metrics.turns.inc();
        tracing::debug!(
            turn_id = %turn.item_id,
            role = %turn.role,
            has_text = turn.has_text(),
            turns_total = total,
            "turn appended"
        );
        state.append(turn);
    }

    /// Append a turn (redacting its text). A duplicate item ID replaces the
    /// existing turn's text when new text is given, and is otherwise a no-op.
    pub fn append(&self, role: Role, item_id: &str, text: Option<&str>) {
        let text = self.redact(text);
        let mut state = self.state.lock();
        match state.position(item_id) {
            Some(i) => {
                if text.is_some() {
                    state.history[i].text = text;
                }
            }
            None => self.push(&mut state, Turn::new(role, item_id, text)),
        }
    }

    /// A user item was created. Appends a placeholder (or the inline
    /// transcript) for a new ID; an inline transcript for a known ID
    /// replaces its text.
    ///
    /// Returns `true` when the turn still lacks a transcript and the caller
    /// should request it.
    pub fn observe_user_item(&self, item_id: &str, transcript: Option<&str>) -> bool {
        self.append(Role::User, item_id, transcript);
        !self.has_text(item_id)
    }

    /// A transcript arrived for `item_id`: fill the first matching turn, or
    /// append a new one with `role` if none matches.
    pub fn backfill(&self, item_id: &str, role: Role, transcript: Option<&str>) -> Backfill {
        if item_id.is_empty() {
            return Backfill::Ignored;
        }
        let Some(text) = self.redact(transcript) else {
            return Backfill::Ignored;
        };
        let mut state = self.state.lock();
        if let Some(i) = state.position(item_id) {
            state.history[i].text = Some(text);
            tracing::debug!(turn_id = item_id, "transcript backfilled");
            Backfill::Filled
        } else {
            self.push(&mut state, Turn::new(role, item_id, Some(text)));
            Backfill::Appended
        }
    }

    /// Record usage reported by a completed response.
    pub fn record_usage(&self, total_tokens: u64) {
        let mut state = self.state.lock();
        state.record_usage(total_tokens);
        tracing::debug!(
            tokens_total = total_tokens,
            pending_tokens = state.pending_summary_tokens,
            "usage recorded"
        );
    }

    /// Trigger rule against the current state.
    pub fn should_summarize(&self) -> bool {
        self.policy.should_summarize(&self.state.lock())
    }

    /// Summarize if the trigger rule holds.
    pub async fn maybe_summarize(&self, sink: &dyn EventSink) -> Result<SummaryOutcome, TransportError> {
        if !self.should_summarize() {
            return Ok(SummaryOutcome::Skipped);
        }
        let language = self.policy.determine_language(&self.state.lock().history);
        self.summarize_and_prune(sink, &language).await
    }

    /// Compress everything but the last `keep_last_turns` turns into one
    /// system turn, then tell the server: one item create for the summary,
    /// one item delete per pruned turn.
    ///
    /// Only a failed send is an error; deferral, abort and summarizer failure
    /// are ordinary outcomes that leave the state untouched.
    pub async fn summarize_and_prune(
        &self,
        sink: &dyn EventSink,
        language: &str,
    ) -> Result<SummaryOutcome, TransportError> {
        let keep = self.policy.keep_last_turns;

        let snapshot = {
            let mut state = self.state.lock();
            if state.summarizing || state.history.len() <= keep {
                return Ok(SummaryOutcome::Skipped);
            }
            if state.has_pending_in_prefix(keep) {
                tracing::debug!(
                    pending = ?state.user_turns_missing_text(),
                    "summary deferred, transcripts pending"
                );
                return Ok(SummaryOutcome::Deferred);
            }
            state.summarizing = true;
            state.history.clone()
        };
        let in_flight = InFlight { state: &self.state };

        let text = match self.summarizer.summarize(&snapshot, language).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    error_category = ErrorCategory::Api.as_str(),
                    "summarizer failed, keeping history"
                );
                return Ok(SummaryOutcome::Failed);
            }
        };

        let (summary_id, pruned) = {
            let mut state = self.state.lock();
            if state.history.len() <= keep || state.has_pending_in_prefix(keep) {
                drop(state);
                tracing::debug!("summary aborted, history changed while summarizing");
                return Ok(SummaryOutcome::Aborted);
            }
            state.summary_count += 1;
            let summary_id = format!("summary-{}", state.summary_count);
            let split = state.prune_len(keep);
            let recent = state.history.split_off(split);
            let old = std::mem::take(&mut state.history);
            state.history.push(Turn::new(Role::System, summary_id.clone(), Some(text.clone())));
            state.history.extend(recent);
            state.latest_tokens = 0;
            state.pending_summary_tokens = 0;
            (summary_id, old.into_iter().map(|t| t.item_id).collect::<Vec<_>>())
        };
        drop(in_flight);

        let summaries = self.metrics.summaries.inc();
        tracing::info!(
            summary_id = %summary_id,
            pruned = pruned.len(),
            language,
            summaries_total = summaries,
            "conversation summarized"
        );

        sink.send_event(&ClientEvent::system_summary(summary_id.clone(), text))
            .await?;
        for item_id in &pruned {
            sink.send_event(&ClientEvent::ItemDelete {
                item_id: item_id.clone(),
            })
            .await?;
        }

        Ok(SummaryOutcome::Committed { summary_id, pruned })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
