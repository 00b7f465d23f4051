//! When to summarize, and in which language.

use rtvoice_settings::LanguagePolicy;

use crate::conversation::{ConversationState, Turn};

/// Characteristic words per language, checked in order.
const LANGUAGE_KEYWORDS: &[(&str, &[&str])] = &[
    ("es", &["hola", "gracias", "por favor", "buenos", "adiós", "señor"]),
    ("fr", &["bonjour", "merci", "s'il vous plaît", "bonsoir", "oui"]),
    ("de", &["hallo", "danke", "bitte", "guten", "tschüss"]),
    ("it", &["ciao", "grazie", "prego", "buongiorno"]),
    ("pt", &["olá", "obrigado", "obrigada", "bom dia"]),
];

/// Summarization configuration. Stateless; evaluated against a state snapshot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SummaryPolicy {
    /// Token count that triggers a summary.
    pub threshold_tokens: u64,
    /// Turns kept verbatim after a summary.
    pub keep_last_turns: usize,
    /// How the summary language is chosen.
    pub language_policy: LanguagePolicy,
    /// Fallback language.
    pub base_language: String,
}

impl SummaryPolicy {
    /// Policy with the default base language (`en`).
    pub fn new(threshold_tokens: u64, keep_last_turns: usize, language_policy: LanguagePolicy) -> Self {
        Self {
            threshold_tokens,
            keep_last_turns,
            language_policy,
            base_language: "en".to_string(),
        }
    }

    /// Trigger rule applied to `state`.
    pub fn should_summarize(&self, state: &ConversationState) -> bool {
        state.should_summarize(self.threshold_tokens, self.keep_last_turns)
    }

    /// Summary language for `history`.
    pub fn determine_language(&self, history: &[Turn]) -> String {
        match self.language_policy {
            LanguagePolicy::Fixed => self.base_language.clone(),
            LanguagePolicy::Auto | LanguagePolicy::Force => {
                detect_language(history).map_or_else(|| self.base_language.clone(), str::to_owned)
            }
        }
    }
}

impl Default for SummaryPolicy {
    fn default() -> Self {
        Self::new(2000, 2, LanguagePolicy::Auto)
    }
}

/// First language with a keyword in any non-empty turn.
fn detect_language(history: &[Turn]) -> Option<&'static str> {
    let texts: Vec<String> = history
        .iter()
        .filter_map(|t| t.text.as_deref())
        .filter(|t| !t.trim().is_empty())
        .map(str::to_lowercase)
        .collect();
    LANGUAGE_KEYWORDS
        .iter()
        .find(|(_, words)| {
            texts
                .iter()
                .any(|text| words.iter().any(|w| contains_word(text, w)))
        })
        .map(|(lang, _)| *lang)
}

/// Whole-word (or whole-phrase) containment.
fn contains_word(haystack: &str, needle: &str) -> bool {
    haystack.match_indices(needle).any(|(start, _)| {
        let end = start + needle.len();
        let before_ok = haystack[..start]
            .chars()
            .next_back()
            .is_none_or(|c| !c.is_alphanumeric());
        let after_ok = haystack[end..]
            .chars()
            .next()
            .is_none_or(|c| !c.is_alphanumeric());
        before_ok && after_ok
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rtvoice_core::Role;

    fn turn(role: Role, id: &str, text: &str) -> Turn {
        Turn::new(role, id, Some(text.to_string()))
    }

    fn spanish_history() -> Vec<Turn> {
        vec![
            turn(Role::User, "u1", "hola"),
            turn(Role::Assistant, "a1", "hola"),
            turn(Role::User, "u2", "gracias"),
        ]
    }

    #[test]
    fn auto_detects_spanish() {
        let policy = SummaryPolicy::new(100, 2, LanguagePolicy::Auto);
        assert_eq!(policy.determine_language(&spanish_history()), "es");
    }

    #[test]
    fn fixed_policy_skips_detection() {
        let policy = SummaryPolicy::new(100, 2, LanguagePolicy::Fixed);
        assert_eq!(policy.determine_language(&spanish_history()), "en");
    }

    #[test]
    fn force_policy_detects_too() {
        let policy = SummaryPolicy::new(100, 2, LanguagePolicy::Force);
        assert_eq!(
            policy.determine_language(&[turn(Role::User, "u1", "Bonjour tout le monde")]),
            "fr"
        );
    }

    #[test]
    fn falls_back_to_base_language() {
        let mut policy = SummaryPolicy::default();
        policy.base_language = "nl".to_string();
        assert_eq!(
            policy.determine_language(&[turn(Role::User, "u1", "good morning")]),
            "nl"
        );
        assert_eq!(policy.determine_language(&[]), "nl");
    }

    #[test]
    fn keywords_match_whole_words_only() {
        // "chola" contains "hola" but is not the greeting.
        assert!(!contains_word("chola", "hola"));
        assert!(contains_word("¡hola!", "hola"));
        assert!(contains_word("dime, por favor.", "por favor"));
    }

    #[test]
    fn trigger_uses_state_counters() {
        let policy = SummaryPolicy::new(100, 2, LanguagePolicy::Auto);
        let mut state = ConversationState::new();
        for t in spanish_history() {
            state.append(t);
        }
        state.record_usage(150);
        assert!(policy.should_summarize(&state));
    }
}
