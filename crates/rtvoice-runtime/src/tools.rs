//! Model-invocable tools.
//!
//! The registry advertises its tools in `session.update` and serves
//! `response.output_item.create` tool calls, answering each with a
//! `tool_result` item carrying the tool's text output.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rtvoice_core::events::ClientEvent;
use rtvoice_core::{ErrorCategory, EventHandler, EventSink, HandlerError, ServerEvent};
use serde_json::{Value, json};

/// Tool failures. Reported back to the model as the result text.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// Arguments missing or of the wrong shape.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    /// The HTTP request failed.
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The server answered with an error status.
    #[error("HTTP {0}")]
    Status(u16),
}

/// A tool the model can call.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name.
    fn name(&self) -> &str;
    /// One-line description shown to the model.
    fn description(&self) -> &str;
    /// JSON schema for the arguments object.
    fn parameters(&self) -> Value;
    /// Run the tool.
    async fn call(&self, arguments: Value) -> Result<String, ToolError>;
}

/// Ordered name → tool table.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// `clock` and `http_get`.
    pub fn builtin(http_timeout: Duration) -> Result<Self, ToolError> {
        let mut registry = Self::new();
        registry.register(Arc::new(ClockTool::new()));
        registry.register(Arc::new(HttpGetTool::new(http_timeout)?));
        Ok(registry)
    }

    /// Add a tool. A tool with the same name is replaced in place.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        match self.tools.iter().position(|t| t.name() == tool.name()) {
            Some(i) => self.tools[i] = tool,
            None => self.tools.push(tool),
        }
    }

    /// Look a tool up by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name).cloned()
    }

    /// Registered names, in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    /// Whether no tool is registered.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Manifest entries for `session.update`.
    pub fn specs(&self) -> Vec<Value> {
        self.tools
            .iter()
            .map(|t| {
                json!({
                    "type": "function",
                    "name": t.name(),
                    "description": t.description(),
                    "parameters": t.parameters(),
                })
            })
            .collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Built-in tools
// ─────────────────────────────────────────────────────────────────────────────

type TimeSource = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Current UTC time as RFC 3339.
pub struct ClockTool {
    now: TimeSource,
}

impl ClockTool {
    /// Clock backed by the system time.
    pub fn new() -> Self {
        Self::with_source(Utc::now)
    }

    /// Clock backed by `now`.
    pub fn with_source(now: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        Self { now: Arc::new(now) }
    }
}

impl Default for ClockTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for ClockTool {
    fn name(&self) -> &str {
        "clock"
    }

    fn description(&self) -> &str {
        "Current UTC time"
    }

    fn parameters(&self) -> Value {
        json!({"type": "object", "properties": {}, "required": []})
    }

    async fn call(&self, _arguments: Value) -> Result<String, ToolError> {
        Ok((self.now)().to_rfc3339_opts(SecondsFormat::Secs, true))
    }
}

/// GET a URL and return the body as text.
pub struct HttpGetTool {
    client: reqwest::Client,
}

impl HttpGetTool {
    /// Tool whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, ToolError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Tool for HttpGetTool {
    fn name(&self) -> &str {
        "http_get"
    }

    fn description(&self) -> &str {
        "Fetch a URL via HTTP GET"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"url": {"type": "string"}},
            "required": ["url"],
        })
    }

    async fn call(&self, arguments: Value) -> Result<String, ToolError> {
        let url = arguments
            .get("url")
            .and_then(Value::as_str)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| ToolError::InvalidArguments("missing required string 'url'".into()))?;
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ToolError::Status(status.as_u16()));
        }
        Ok(response.text().await?)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tool call handler
// ─────────────────────────────────────────────────────────────────────────────

/// Serves tool calls from the model.
pub struct ToolCallHandler {
    sink: Arc<dyn EventSink>,
    registry: Arc<ToolRegistry>,
}

impl ToolCallHandler {
    /// Handler answering through `sink`.
    pub fn new(sink: Arc<dyn EventSink>, registry: Arc<ToolRegistry>) -> Self {
        Self { sink, registry }
    }
}

/// Arguments arrive either as an object or as a JSON-encoded string.
fn normalize_arguments(arguments: Option<&Value>) -> Value {
    match arguments {
        Some(Value::String(raw)) => serde_json::from_str(raw).unwrap_or_else(|_| json!({})),
        Some(Value::Null) | None => json!({}),
        Some(other) => other.clone(),
    }
}

#[async_trait]
impl EventHandler for ToolCallHandler {
    async fn handle(&self, event: &ServerEvent) -> Result<(), HandlerError> {
        let ServerEvent::OutputItemCreate { response_id, item } = event else {
            return Ok(());
        };
        if !item.is_tool_call() {
            return Ok(());
        }
        let name = item.name.as_deref().unwrap_or_default();
        let Some(tool) = self.registry.get(name) else {
            tracing::debug!(tool = name, "unknown tool, ignoring call");
            return Ok(());
        };

        let text = match tool.call(normalize_arguments(item.arguments.as_ref())).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(
                    tool = name,
                    error = %e,
                    error_category = ErrorCategory::Api.as_str(),
                    "tool failed"
                );
                e.to_string()
            }
        };
        tracing::info!(tool = name, call_id = ?item.call_id, bytes = text.len(), "tool call answered");

        self.sink
            .send_event(&ClientEvent::tool_result(
                response_id.clone(),
                item.call_id.clone(),
                text,
            ))
            .await?;
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
