//! Browser ↔ inspector gateway protocol definitions.
//!
//! All communication uses JSON frames over a single WebSocket per browser tab.
//!
//! Frame types:
//! - `RequestFrame`:  browser → gateway command (`initialize_client`, `send_message`, ...)
//! - `ResponseFrame`: gateway → browser acknowledgement of a command
//! - `EventFrame`:    gateway → browser server-push (`agent_response`, `debug_log`, ...)

use serde::{Deserialize, Serialize};

// ── Constants ────────────────────────────────────────────────────────────────

pub const PROTOCOL_VERSION: u32 = 1;
pub const MAX_PAYLOAD_BYTES: usize = 524_288; // 512 KB

/// Correlation id used for debug entries produced by the `/agent-card` route.
pub const HTTP_AGENT_CARD_ID: &str = "http-agent-card";

/// Text of the error event emitted for `send_message` before a client exists.
pub const NOT_INITIALIZED_MESSAGE: &str = "Client not initialized.";

// ── Commands and events ──────────────────────────────────────────────────────

pub mod methods {
    pub const INITIALIZE_CLIENT: &str = "initialize_client";
    pub const SEND_MESSAGE: &str = "send_message";
    pub const CANCEL_MESSAGE: &str = "cancel_message";
    pub const CLEAR_DEBUG_LOG: &str = "clear_debug_log";
    pub const GET_DEBUG_LOG: &str = "get_debug_log";
    pub const GET_EVENT_JSON: &str = "get_event_json";
}

pub mod events {
    pub const CONNECTED: &str = "connected";
    pub const CLIENT_INITIALIZED: &str = "client_initialized";
    pub const AGENT_RESPONSE: &str = "agent_response";
    pub const DEBUG_LOG: &str = "debug_log";
}

// ── Error codes ──────────────────────────────────────────────────────────────

pub mod error_codes {
    pub const UNKNOWN_METHOD: &str = "UNKNOWN_METHOD";
    pub const INVALID_REQUEST: &str = "INVALID_REQUEST";
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const UNAVAILABLE: &str = "UNAVAILABLE";
    pub const PAYLOAD_TOO_LARGE: &str = "PAYLOAD_TOO_LARGE";
}

// ── Error shape ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorShape {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorShape {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }
}

// ── Frames ───────────────────────────────────────────────────────────────────

/// Browser → gateway command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestFrame {
    pub r#type: String, // always "req"
    pub id: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

/// Gateway → browser command acknowledgement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseFrame {
    pub r#type: String, // always "res"
    pub id: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorShape>,
}

impl ResponseFrame {
    pub fn ok(id: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            r#type: "res".into(),
            id: id.into(),
            ok: true,
            payload: Some(payload),
            error: None,
        }
    }

    pub fn err(id: impl Into<String>, error: ErrorShape) -> Self {
        Self {
            r#type: "res".into(),
            id: id.into(),
            ok: false,
            payload: None,
            error: Some(error),
        }
    }
}

/// Gateway → browser server-push event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventFrame {
    pub r#type: String, // always "event"
    pub event: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
}

impl EventFrame {
    pub fn new(event: impl Into<String>, payload: serde_json::Value, seq: u64) -> Self {
        Self {
            r#type: "event".into(),
            event: event.into(),
            payload: Some(payload),
            seq: Some(seq),
        }
    }
}

// ── Command parameters ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitializeClientParams {
    pub url: String,
}

/// Parameters of `send_message`. Older pages send `message`/`id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMessageParams {
    #[serde(alias = "message")]
    pub text: String,
    #[serde(
        default,
        alias = "correlationId",
        skip_serializing_if = "Option::is_none"
    )]
    pub id: Option<String>,
}

/// Parameters of commands addressing one exchange by correlation id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationParams {
    #[serde(alias = "correlationId")]
    pub id: String,
}

// ── Event payloads ───────────────────────────────────────────────────────────

/// Pushed once per connection so the page can address HTTP routes by `sid`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connected {
    pub sid: String,
    pub protocol: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InitStatus {
    Success,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientInitialized {
    pub status: InitStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub validation_errors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub card: Option<serde_json::Value>,
}

impl ClientInitialized {
    pub fn success(card: serde_json::Value, validation_errors: Vec<String>) -> Self {
        Self {
            status: InitStatus::Success,
            message: None,
            validation_errors,
            card: Some(card),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: InitStatus::Error,
            message: Some(message.into()),
            validation_errors: Vec::new(),
            card: None,
        }
    }
}

/// Which side of the wire a debug entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebugDirection {
    Request,
    Response,
    Error,
    ValidationError,
}

/// One raw entry of the debug console. `data` is passed through verbatim so
/// unrecognized agent extensions survive untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebugLogEntry {
    #[serde(rename = "type")]
    pub direction: DebugDirection,
    pub data: serde_json::Value,
    #[serde(rename = "id")]
    pub correlation_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    Task,
    StatusUpdate,
    ArtifactUpdate,
    Message,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilePart {
    pub uri: String,
    pub mime_type: String,
}

/// A single renderable line of the chat view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DisplayItem {
    /// Markdown-rendered, HTML-escaped text.
    Text { html: String },
    /// A file produced by the agent.
    Link {
        uri: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
        label: String,
    },
    /// A task progress line.
    Progress { html: String },
}

/// Display-ready form of one protocol envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedEvent {
    pub kind: EventKind,
    pub correlation_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_state: Option<String>,
    #[serde(default)]
    pub text_parts: Vec<String>,
    #[serde(default)]
    pub file_parts: Vec<FilePart>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_message: Option<String>,
    #[serde(default)]
    pub validation_errors: Vec<String>,
    #[serde(default)]
    pub display: Vec<DisplayItem>,
}

impl NormalizedEvent {
    /// One `agent_response` payload per display item, in display order.
    pub fn responses(&self) -> Vec<AgentResponse> {
        self.display
            .iter()
            .map(|item| AgentResponse {
                id: self.correlation_id.clone(),
                kind: self.kind,
                status_state: self.status_state.clone(),
                text_parts: self.text_parts.clone(),
                file_parts: self.file_parts.clone(),
                final_message: self.final_message.clone(),
                validation_errors: self.validation_errors.clone(),
                display: item.clone(),
            })
            .collect()
    }
}

/// Payload of the `agent_response` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentResponse {
    pub id: String,
    pub kind: EventKind,
    #[serde(
        rename = "statusState",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub status_state: Option<String>,
    #[serde(rename = "textParts", default)]
    pub text_parts: Vec<String>,
    #[serde(rename = "fileParts", default)]
    pub file_parts: Vec<FilePart>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_message: Option<String>,
    #[serde(default)]
    pub validation_errors: Vec<String>,
    pub display: DisplayItem,
}
