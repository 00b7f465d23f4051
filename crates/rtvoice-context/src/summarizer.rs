//! Summary text generation.
//!
//! The context manager treats a [`Summarizer`] as a black box: turns and a
//! target language in, one string out.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::conversation::Turn;

/// Summary generation failures.
#[derive(Debug, thiserror::Error)]
pub enum SummarizerError {
    /// Request could not be sent or the body could not be read.
    #[error("summary request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The API answered with a non-success status.
    #[error("summary API returned {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body (truncated).
        body: String,
    },
    /// The API answered without any summary text.
    #[error("summary API returned no content")]
    Empty,
}

/// Produces a compact summary of conversation turns.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Summarize `turns` in `language` (ISO 639-1 code).
    async fn summarize(&self, turns: &[Turn], language: &str) -> Result<String, SummarizerError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// ExtractiveSummarizer
// ─────────────────────────────────────────────────────────────────────────────

/// Offline summarizer: joins the texts of the last three turns.
#[derive(Clone, Copy, Debug, Default)]
pub struct ExtractiveSummarizer;

#[async_trait]
impl Summarizer for ExtractiveSummarizer {
    async fn summarize(&self, turns: &[Turn], _language: &str) -> Result<String, SummarizerError> {
        let start = turns.len().saturating_sub(3);
        let joined = turns[start..]
            .iter()
            .filter_map(|t| t.text.as_deref())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" | ");
        if joined.is_empty() {
            Ok("Summary: (no content)".to_string())
        } else {
            Ok(format!("Summary: {joined}"))
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// OpenAiSummarizer
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<ChatMessage>,
}

#[derive(Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// Summaries from the chat completions endpoint.
#[derive(Clone, Debug)]
pub struct OpenAiSummarizer {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiSummarizer {
    /// Summarizer against `base_url` (e.g. `https://api.openai.com`).
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self, SummarizerError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
        })
    }

    fn prompt(language: &str) -> String {
        format!(
            "You compress voice conversations. Summarize the dialogue below in one short \
             paragraph written in the language with ISO code '{language}'. Keep names, \
             decisions, open questions, and user preferences. Do not add anything new."
        )
    }

    fn transcript(turns: &[Turn]) -> String {
        turns
            .iter()
            .filter_map(|t| t.text.as_deref().map(|text| format!("{}: {text}", t.role)))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[async_trait]
impl Summarizer for OpenAiSummarizer {
    async fn summarize(&self, turns: &[Turn], language: &str) -> Result<String, SummarizerError> {
        let request = ChatRequest {
            model: &self.model,
            temperature: 0.0,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: Some(Self::prompt(language)),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: Some(Self::transcript(turns)),
                },
            ],
        };
        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SummarizerError::Status {
                status: status.as_u16(),
                body: rtvoice_core::text::truncate_str(&body, 512).to_string(),
            });
        }

        let parsed: ChatResponse = response.json().await?;
        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .unwrap_or_default();
        if text.is_empty() {
            return Err(SummarizerError::Empty);
        }
        tracing::debug!(language, chars = text.len(), "summary generated");
        Ok(text)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rtvoice_core::Role;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn turns() -> Vec<Turn> {
        vec![
            Turn::new(Role::User, "u1", Some("hola".into())),
            Turn::new(Role::Assistant, "a1", Some("¿qué tal?".into())),
        ]
    }

    #[tokio::test]
    async fn extractive_joins_last_three() {
        let turns: Vec<Turn> = (0..5)
            .map(|i| Turn::new(Role::User, i.to_string(), Some(format!("t{i}"))))
            .collect();
        let s = ExtractiveSummarizer.summarize(&turns, "en").await.unwrap();
        assert_eq!(s, "Summary: t2 | t3 | t4");
    }

    #[tokio::test]
    async fn extractive_skips_missing_text() {
        let turns = vec![
            Turn::new(Role::User, "u1", Some("hello".into())),
            Turn::new(Role::User, "u2", None),
        ];
        let s = ExtractiveSummarizer.summarize(&turns, "en").await.unwrap();
        assert_eq!(s, "Summary: hello");
        let s = ExtractiveSummarizer.summarize(&[], "en").await.unwrap();
        assert_eq!(s, "Summary: (no content)");
    }

    #[tokio::test]
    async fn openai_posts_chat_completion() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(serde_json::json!({
                "model": "gpt-4o-mini",
                "temperature": 0.0
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": "  Resumen breve.  "}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let s = OpenAiSummarizer::new(server.uri(), "sk-test", "gpt-4o-mini").unwrap();
        let text = s.summarize(&turns(), "es").await.unwrap();
        assert_eq!(text, "Resumen breve.");
    }

    #[tokio::test]
    async fn openai_reports_status_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let s = OpenAiSummarizer::new(server.uri(), "sk", "m").unwrap();
        let err = s.summarize(&turns(), "en").await.unwrap_err();
        assert_matches!(err, SummarizerError::Status { status: 429, ref body } if body == "slow down");
    }

    #[tokio::test]
    async fn openai_empty_content_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"choices": []})),
            )
            .mount(&server)
            .await;

        let s = OpenAiSummarizer::new(server.uri(), "sk", "m").unwrap();
        assert_matches!(s.summarize(&turns(), "en").await, Err(SummarizerError::Empty));
    }

    #[test]
    fn transcript_lines_are_role_prefixed() {
        assert_eq!(OpenAiSummarizer::transcript(&turns()), "user: hola\nassistant: ¿qué tal?");
    }
}
