//! Remote service settings.

use serde::{Deserialize, Serialize};

/// Which realtime endpoint flavour to build.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// `api.openai.com` (or a compatible `baseUrl`).
    #[default]
    OpenAi,
    /// Azure `OpenAI` deployment.
    Azure,
}

/// API and model settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApiSettings {
    /// Endpoint flavour.
    pub provider: Provider,
    /// API key for the `OpenAI` provider.
    pub api_key: String,
    /// Override for the HTTP base URL (`https://api.openai.com` when unset).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Realtime model name.
    pub realtime_model: String,
    /// Input transcription model.
    pub transcribe_model: String,
    /// Output voice.
    pub voice: String,
    /// Chat model used for summaries.
    pub summary_model: String,
    /// Azure resource endpoint (`https://<name>.openai.azure.com`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub azure_endpoint: Option<String>,
    /// Azure API key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub azure_api_key: Option<String>,
    /// Azure API version.
    pub azure_api_version: String,
    /// Azure deployment name (falls back to `realtimeModel`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub azure_deployment: Option<String>,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            provider: Provider::OpenAi,
            api_key: String::new(),
            base_url: None,
            realtime_model: "gpt-4o-realtime-preview".to_string(),
            transcribe_model: "gpt-4o-transcribe".to_string(),
            voice: "shimmer".to_string(),
            summary_model: "gpt-4o-mini".to_string(),
            azure_endpoint: None,
            azure_api_key: None,
            azure_api_version: "2024-10-01-preview".to_string(),
            azure_deployment: None,
        }
    }
}

impl ApiSettings {
    /// HTTP base URL for non-realtime calls.
    pub fn http_base_url(&self) -> &str {
        self.base_url.as_deref().unwrap_or("https://api.openai.com")
    }
}
