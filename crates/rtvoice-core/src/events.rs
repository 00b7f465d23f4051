//! Wire event types for the realtime protocol.
//!
//! Two event families:
//!
//! - **[`ServerEvent`]**: inbound events from the remote speech service
//!   (session lifecycle, response lifecycle, audio deltas, conversation items).
//! - **[`ClientEvent`]**: outbound events produced by this client
//!   (session configuration, audio append, cancel, item create/delete/retrieve).
//!
//! Inbound frames are decoded in two phases. [`Envelope::parse`] turns the raw
//! text into JSON and extracts the `type` tag; [`Envelope::decode`] maps the
//! payload onto a [`ServerEvent`]. Unrecognised tags decode to
//! [`ServerEvent::Unknown`] rather than failing.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ─────────────────────────────────────────────────────────────────────────────
// Shared item shapes
// ─────────────────────────────────────────────────────────────────────────────

/// Speaker of a conversation item.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The human speaking into the microphone.
    User,
    /// The remote model.
    Assistant,
    /// Synthesized context (summaries).
    System,
}

impl Role {
    /// Wire spelling.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }

    /// Parse a wire role. Unknown roles yield `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            "system" => Some(Self::System),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One content part of a conversation item.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentPart {
    /// Part kind (`input_text`, `input_audio`, `audio`, `output_text`, ...).
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub part_type: Option<String>,
    /// Speech transcript, present on audio parts once transcribed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,
    /// Plain text, present on text parts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl ContentPart {
    /// A text part of the given kind.
    pub fn text(part_type: &str, text: impl Into<String>) -> Self {
        Self {
            part_type: Some(part_type.to_owned()),
            transcript: None,
            text: Some(text.into()),
        }
    }

    /// The transcript if non-empty, otherwise the text if non-empty.
    pub fn transcript_or_text(&self) -> Option<&str> {
        self.transcript
            .as_deref()
            .filter(|t| !t.is_empty())
            .or_else(|| self.text.as_deref().filter(|t| !t.is_empty()))
    }
}

/// A conversation item as carried by item and response events.
///
/// Every field is optional on the wire; missing fields decode to `None` or
/// empty so handlers can apply the same lenient access the service expects.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationItem {
    /// Server-assigned item ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Item kind (`message`, `tool_call`, ...).
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub item_type: Option<String>,
    /// Raw role string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Content parts.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub content: Vec<ContentPart>,
    /// Tool name (tool calls only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Tool call correlation ID (tool calls only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
    /// Tool arguments (tool calls only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
}

impl ConversationItem {
    /// Parsed role, if present and recognised.
    pub fn role(&self) -> Option<Role> {
        self.role.as_deref().and_then(Role::parse)
    }

    /// First non-empty transcript or text among the content parts.
    pub fn transcript(&self) -> Option<&str> {
        self.content.iter().find_map(ContentPart::transcript_or_text)
    }

    /// Whether this item is a tool invocation request.
    pub fn is_tool_call(&self) -> bool {
        self.item_type.as_deref() == Some("tool_call")
    }
}

/// Token usage attached to a completed response.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Total tokens consumed by the session context.
    #[serde(default)]
    pub total_tokens: u64,
    /// Input tokens.
    #[serde(default)]
    pub input_tokens: u64,
    /// Output tokens.
    #[serde(default)]
    pub output_tokens: u64,
}

/// The `response` object carried by response lifecycle events.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseBody {
    /// Response ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Terminal status (`completed`, `cancelled`, `failed`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Output items (assistant messages).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub output: Vec<ConversationItem>,
    /// Token usage, present on `response.done`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

// ─────────────────────────────────────────────────────────────────────────────
// ServerEvent: inbound
// ─────────────────────────────────────────────────────────────────────────────

/// Events received from the realtime service.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// Session opened.
    #[serde(rename = "session.created")]
    SessionCreated {
        /// Effective session configuration.
        #[serde(default)]
        session: Option<Value>,
    },

    /// Session configuration acknowledged.
    #[serde(rename = "session.updated")]
    SessionUpdated {
        /// Effective session configuration.
        #[serde(default)]
        session: Option<Value>,
    },

    /// A response started streaming.
    #[serde(rename = "response.created")]
    ResponseCreated {
        /// Response object.
        #[serde(default)]
        response: Option<ResponseBody>,
        /// Top-level response ID (some servers send it here).
        #[serde(default)]
        response_id: Option<String>,
    },

    /// A chunk of synthesized reply audio.
    #[serde(rename = "response.audio.delta")]
    ResponseAudioDelta {
        /// Response the chunk belongs to.
        #[serde(default)]
        response_id: Option<String>,
        /// Base64-encoded PCM16.
        #[serde(default, alias = "delta")]
        audio: Option<String>,
    },

    /// A response finished.
    #[serde(rename = "response.done")]
    ResponseDone {
        /// Response object with output items and usage.
        #[serde(default)]
        response: Option<ResponseBody>,
        /// Top-level response ID.
        #[serde(default)]
        response_id: Option<String>,
    },

    /// A response failed.
    #[serde(rename = "response.error")]
    ResponseError {
        /// Response object.
        #[serde(default)]
        response: Option<ResponseBody>,
        /// Top-level response ID.
        #[serde(default)]
        response_id: Option<String>,
        /// Error detail.
        #[serde(default)]
        error: Option<Value>,
    },

    /// A conversation item was added.
    #[serde(rename = "conversation.item.created")]
    ItemCreated {
        /// The new item.
        #[serde(default)]
        item: ConversationItem,
    },

    /// Reply to a `conversation.item.retrieve` request.
    #[serde(rename = "conversation.item.retrieved")]
    ItemRetrieved {
        /// The retrieved item.
        #[serde(default)]
        item: ConversationItem,
        /// Top-level item ID, used when `item.id` is absent.
        #[serde(default)]
        item_id: Option<String>,
    },

    /// The model requests a tool invocation.
    #[serde(rename = "response.output_item.create")]
    OutputItemCreate {
        /// Response requesting the tool.
        #[serde(default)]
        response_id: Option<String>,
        /// Tool call item.
        #[serde(default)]
        item: ConversationItem,
    },

    /// Session-level error.
    #[serde(rename = "error")]
    Error {
        /// Error detail.
        #[serde(default)]
        error: Option<Value>,
    },

    /// Any other event type.
    #[serde(other)]
    Unknown,
}

impl ServerEvent {
    /// Wire tag of this event (`"unknown"` for unrecognised tags).
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::SessionCreated { .. } => "session.created",
            Self::SessionUpdated { .. } => "session.updated",
            Self::ResponseCreated { .. } => "response.created",
            Self::ResponseAudioDelta { .. } => "response.audio.delta",
            Self::ResponseDone { .. } => "response.done",
            Self::ResponseError { .. } => "response.error",
            Self::ItemCreated { .. } => "conversation.item.created",
            Self::ItemRetrieved { .. } => "conversation.item.retrieved",
            Self::OutputItemCreate { .. } => "response.output_item.create",
            Self::Error { .. } => "error",
            Self::Unknown => "unknown",
        }
    }

    /// Response ID from the nested `response.id` or the top-level `response_id`.
    pub fn response_id(&self) -> Option<&str> {
        match self {
            Self::ResponseCreated {
                response,
                response_id,
            }
            | Self::ResponseDone {
                response,
                response_id,
            }
            | Self::ResponseError {
                response,
                response_id,
                ..
            } => response
                .as_ref()
                .and_then(|r| r.id.as_deref())
                .or(response_id.as_deref()),
            Self::ResponseAudioDelta { response_id, .. }
            | Self::OutputItemCreate { response_id, .. } => response_id.as_deref(),
            _ => None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Envelope: two-phase decoding
// ─────────────────────────────────────────────────────────────────────────────

/// Why an inbound frame could not be decoded.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// Not valid JSON.
    #[error("invalid JSON: {0}")]
    Json(#[source] serde_json::Error),
    /// Valid JSON but not an object.
    #[error("frame is not a JSON object")]
    NotAnObject,
    /// Known tag whose payload does not match the expected shape.
    #[error("invalid {event_type} payload: {source}")]
    Payload {
        /// The event tag.
        event_type: String,
        /// Underlying serde error.
        #[source]
        source: serde_json::Error,
    },
}

/// A parsed but not yet typed inbound frame.
#[derive(Clone, Debug, PartialEq)]
pub struct Envelope {
    /// Value of the `type` field, empty when absent.
    pub event_type: String,
    /// The full JSON object.
    pub payload: Value,
}

impl Envelope {
    /// Parse raw frame text into an envelope.
    pub fn parse(raw: &str) -> Result<Self, DecodeError> {
        let payload: Value = serde_json::from_str(raw).map_err(DecodeError::Json)?;
        if !payload.is_object() {
            return Err(DecodeError::NotAnObject);
        }
        let event_type = payload
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned();
        Ok(Self {
            event_type,
            payload,
        })
    }

    /// Map the payload onto a typed event.
    pub fn decode(&self) -> Result<ServerEvent, DecodeError> {
        if self.event_type.is_empty() {
            return Ok(ServerEvent::Unknown);
        }
        ServerEvent::deserialize(&self.payload).map_err(|source| DecodeError::Payload {
            event_type: self.event_type.clone(),
            source,
        })
    }
}

/// Parse and decode a raw frame in one step.
pub fn decode_frame(raw: &str) -> Result<ServerEvent, DecodeError> {
    Envelope::parse(raw)?.decode()
}

// ─────────────────────────────────────────────────────────────────────────────
// ClientEvent: outbound
// ─────────────────────────────────────────────────────────────────────────────

/// A message item created by this client (summaries).
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MessageItem {
    /// Client-chosen item ID.
    pub id: String,
    /// Always `"message"`.
    #[serde(rename = "type")]
    pub item_type: &'static str,
    /// Speaker.
    pub role: Role,
    /// Content parts.
    pub content: Vec<ContentPart>,
}

/// Events sent to the realtime service.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    /// Configure the session (voice, formats, transcription, tools).
    #[serde(rename = "session.update")]
    SessionUpdate {
        /// Session configuration object.
        session: Value,
    },

    /// Append microphone audio to the input buffer.
    #[serde(rename = "input_audio_buffer.append")]
    InputAudioAppend {
        /// Base64-encoded PCM16.
        audio: String,
    },

    /// Cancel an in-progress response.
    #[serde(rename = "response.cancel")]
    ResponseCancel {
        /// Response to cancel.
        response_id: String,
    },

    /// Insert an item into the server-side conversation.
    #[serde(rename = "conversation.item.create")]
    ItemCreate {
        /// Insertion point (`"root"` for the start of the conversation).
        previous_item_id: String,
        /// The item to insert.
        item: MessageItem,
    },

    /// Delete an item from the server-side conversation.
    #[serde(rename = "conversation.item.delete")]
    ItemDelete {
        /// Item to delete.
        item_id: String,
    },

    /// Ask the server to resend an item (transcript backfill).
    #[serde(rename = "conversation.item.retrieve")]
    ItemRetrieve {
        /// Item to retrieve.
        item_id: String,
    },

    /// Return a tool result to the model.
    #[serde(rename = "response.output_item.create")]
    ToolResult {
        /// Response that requested the tool.
        #[serde(skip_serializing_if = "Option::is_none")]
        response_id: Option<String>,
        /// Result item.
        item: Value,
    },
}

impl ClientEvent {
    /// Audio append event for raw PCM bytes.
    pub fn audio_append(pcm: &[u8]) -> Self {
        Self::InputAudioAppend {
            audio: BASE64.encode(pcm),
        }
    }

    /// Summary message inserted at the conversation root.
    pub fn system_summary(item_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::ItemCreate {
            previous_item_id: "root".to_owned(),
            item: MessageItem {
                id: item_id.into(),
                item_type: "message",
                role: Role::System,
                content: vec![ContentPart::text("input_text", text)],
            },
        }
    }

    /// Tool result for `call_id`, carried as a single `output_text` part.
    pub fn tool_result(
        response_id: Option<String>,
        call_id: Option<String>,
        text: impl Into<String>,
    ) -> Self {
        Self::ToolResult {
            response_id,
            item: serde_json::json!({
                "type": "tool_result",
                "call_id": call_id,
                "content": [{"type": "output_text", "text": text.into()}],
            }),
        }
    }

    /// Wire tag of this event.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::SessionUpdate { .. } => "session.update",
            Self::InputAudioAppend { .. } => "input_audio_buffer.append",
            Self::ResponseCancel { .. } => "response.cancel",
            Self::ItemCreate { .. } => "conversation.item.create",
            Self::ItemDelete { .. } => "conversation.item.delete",
            Self::ItemRetrieve { .. } => "conversation.item.retrieve",
            Self::ToolResult { .. } => "response.output_item.create",
        }
    }
}

/// Decode a base64 audio payload.
pub fn decode_audio(b64: &str) -> Result<Vec<u8>, base64::DecodeError> {
    BASE64.decode(b64)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
