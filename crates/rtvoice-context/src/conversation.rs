//! Conversation log types.

use rtvoice_core::Role;
use serde::Serialize;

/// One utterance in the conversation log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Turn {
    /// Speaker.
    pub role: Role,
    /// Server-assigned item ID (or `summary-N` for synthesized summaries).
    pub item_id: String,
    /// Transcript; `None` until it arrives.
    pub text: Option<String>,
}

impl Turn {
    /// New turn.
    pub fn new(role: Role, item_id: impl Into<String>, text: Option<String>) -> Self {
        Self {
            role,
            item_id: item_id.into(),
            text,
        }
    }

    /// Whether the transcript is present and not blank.
    pub fn has_text(&self) -> bool {
        self.text.as_deref().is_some_and(|t| !t.trim().is_empty())
    }

    /// Whether pruning this turn would lose an unconfirmed transcript.
    pub fn is_pending(&self) -> bool {
        self.role != Role::System && !self.has_text()
    }
}

/// Authoritative client-side conversation state.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConversationState {
    /// Turns in dialogue order. Item IDs are unique.
    pub history: Vec<Turn>,
    /// Token count from the most recent completed response.
    pub latest_tokens: u64,
    /// Peak of `latest_tokens` since the last summary.
    pub pending_summary_tokens: u64,
    /// A summary is in flight.
    pub summarizing: bool,
    /// Summaries committed so far.
    pub summary_count: u64,
}

impl ConversationState {
    /// Empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a turn as-is.
    pub fn append(&mut self, turn: Turn) {
        self.history.push(turn);
    }

    /// Index of the first turn with `item_id`.
    pub fn position(&self, item_id: &str) -> Option<usize> {
        self.history.iter().position(|t| t.item_id == item_id)
    }

    /// The first turn with `item_id`.
    pub fn find(&self, item_id: &str) -> Option<&Turn> {
        self.history.iter().find(|t| t.item_id == item_id)
    }

    /// Record reported usage, keeping the peak until the next summary.
    pub fn record_usage(&mut self, total_tokens: u64) {
        self.latest_tokens = total_tokens;
        self.pending_summary_tokens = self.pending_summary_tokens.max(total_tokens);
    }

    /// Token count the trigger compares against.
    pub fn effective_tokens(&self) -> u64 {
        self.latest_tokens.max(self.pending_summary_tokens)
    }

    /// Trigger rule: enough tokens, history longer than the kept tail, and
    /// no summary in flight.
    pub fn should_summarize(&self, threshold_tokens: u64, keep_last_turns: usize) -> bool {
        self.effective_tokens() >= threshold_tokens
            && self.history.len() > keep_last_turns
            && !self.summarizing
    }

    /// Number of leading turns that a summary would prune.
    pub fn prune_len(&self, keep_last_turns: usize) -> usize {
        self.history.len().saturating_sub(keep_last_turns)
    }

    /// Whether any turn in the would-be-pruned prefix lacks a transcript.
    pub fn has_pending_in_prefix(&self, keep_last_turns: usize) -> bool {
        self.history[..self.prune_len(keep_last_turns)]
            .iter()
            .any(Turn::is_pending)
    }

    /// IDs of user turns still waiting for a transcript.
    pub fn user_turns_missing_text(&self) -> Vec<String> {
        self.history
            .iter()
            .filter(|t| t.role == Role::User && !t.has_text())
            .map(|t| t.item_id.clone())
            .collect()
    }
}
