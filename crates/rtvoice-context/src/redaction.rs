//! PII masking applied to transcripts before they are stored.

use regex::Regex;

/// Pure text transform. Must not fail.
pub trait Redact: Send + Sync {
    /// Return `text` with sensitive spans replaced.
    fn redact(&self, text: &str) -> String;
}

const EMAIL_PATTERN: &str = r"[\w.\-]+@[\w.\-]+";
const PHONE_PATTERN: &str = r"\b(?:\d{3}[ -]?){2}\d{4}\b";

/// Regex-based redactor for e-mail addresses and US phone numbers.
#[derive(Clone, Debug)]
pub struct Redactor {
    enabled: bool,
    patterns: Vec<Regex>,
    replacement: String,
}

impl Redactor {
    /// Default patterns with `[REDACTED]` as the replacement.
    pub fn new(enabled: bool) -> Self {
        let patterns = [EMAIL_PATTERN, PHONE_PATTERN]
            .iter()
            .filter_map(|p| Regex::new(p).ok())
            .collect();
        Self {
            enabled,
            patterns,
            replacement: "[REDACTED]".to_string(),
        }
    }

    /// Add a custom pattern.
    pub fn with_pattern(mut self, pattern: &str) -> Result<Self, regex::Error> {
        self.patterns.push(Regex::new(pattern)?);
        Ok(self)
    }

    /// Use a different replacement string.
    #[must_use]
    pub fn with_replacement(mut self, replacement: impl Into<String>) -> Self {
        self.replacement = replacement.into();
        self
    }
}

impl Default for Redactor {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Redact for Redactor {
    fn redact(&self, text: &str) -> String {
        if !self.enabled {
            return text.to_string();
        }
        self.patterns.iter().fold(text.to_string(), |acc, re| {
            re.replace_all(&acc, self.replacement.as_str()).into_owned()
        })
    }
}
