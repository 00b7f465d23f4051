//! Realtime endpoint URL and handshake headers.

use rtvoice_core::TransportError;
use rtvoice_settings::{ApiSettings, Provider};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};

const OPENAI_REALTIME_URL: &str = "wss://api.openai.com/v1/realtime";

/// Where to connect and what to send with the upgrade request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
    /// `ws://` or `wss://` URL.
    pub url: String,
    /// Extra handshake headers.
    pub headers: Vec<(String, String)>,
}

impl Endpoint {
    /// Arbitrary URL without extra headers.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
        }
    }

    /// Add a handshake header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// `OpenAI` realtime endpoint. `base_url` (http or ws scheme) replaces
    /// the public host when set.
    pub fn openai(base_url: Option<&str>, model: &str, api_key: &str) -> Self {
        let root = base_url.map_or_else(
            || OPENAI_REALTIME_URL.to_string(),
            |base| format!("{}/v1/realtime", to_ws_scheme(base.trim_end_matches('/'))),
        );
        Self::new(format!("{root}?model={model}"))
            .with_header("Authorization", format!("Bearer {api_key}"))
            .with_header("OpenAI-Beta", "realtime=v1")
    }

    /// Azure `OpenAI` realtime endpoint.
    pub fn azure(endpoint: &str, api_version: &str, deployment: &str, api_key: &str) -> Self {
        let host = to_ws_scheme(endpoint.trim_end_matches('/'));
        Self::new(format!(
            "{host}/openai/realtime?api-version={api_version}&deployment={deployment}"
        ))
        .with_header("api-key", api_key)
    }

    /// Endpoint for the configured provider.
    pub fn from_settings(api: &ApiSettings) -> Self {
        match api.provider {
            Provider::OpenAi => Self::openai(api.base_url.as_deref(), &api.realtime_model, &api.api_key),
            Provider::Azure => Self::azure(
                api.azure_endpoint.as_deref().unwrap_or_default(),
                &api.azure_api_version,
                api.azure_deployment.as_deref().unwrap_or(&api.realtime_model),
                api.azure_api_key.as_deref().unwrap_or(&api.api_key),
            ),
        }
    }

    /// Build the upgrade request.
    pub fn request(&self) -> Result<Request, TransportError> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        for (name, value) in &self.headers {
            let value = HeaderValue::from_str(value)
                .map_err(|e| TransportError::Connect(format!("invalid header {name}: {e}")))?;
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| TransportError::Connect(format!("invalid header name: {e}")))?;
            let _ = request.headers_mut().insert(name, value);
        }
        Ok(request)
    }
}

fn to_ws_scheme(url: &str) -> String {
    if let Some(rest) = url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else if url.starts_with("ws://") || url.starts_with("wss://") {
        url.to_string()
    } else {
        format!("wss://{url}")
    }
}
