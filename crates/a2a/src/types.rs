//! A2A protocol objects, as far as the inspector needs to understand them.
//!
//! Deserialization is deliberately lenient: agents under inspection are often
//! non-compliant, and shape problems are reported by [`crate::validate`]
//! rather than by a parse failure here.

use serde::{Deserialize, Serialize};

// ── Discriminators ───────────────────────────────────────────────────────────

pub const TASK_KIND: &str = "task";
pub const STATUS_UPDATE_KIND: &str = "status-update";
pub const ARTIFACT_UPDATE_KIND: &str = "artifact-update";
pub const MESSAGE_KIND: &str = "message";

// ── Agent card ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AgentCapabilities {
    pub streaming: Option<bool>,
    pub push_notifications: Option<bool>,
    pub state_transition_history: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AgentSkill {
    pub id: String,
    pub name: String,
    pub description: String,
    pub tags: Vec<String>,
    pub examples: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentInterface {
    pub url: String,
    pub transport: String,
}

/// Typed view over the fields of an agent card the client acts on.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AgentCard {
    pub name: String,
    pub description: String,
    pub url: String,
    pub version: String,
    pub protocol_version: Option<String>,
    pub preferred_transport: Option<String>,
    pub additional_interfaces: Vec<AgentInterface>,
    pub capabilities: AgentCapabilities,
    pub default_input_modes: Vec<String>,
    pub default_output_modes: Vec<String>,
    pub skills: Vec<AgentSkill>,
}

impl AgentCard {
    pub fn supports_streaming(&self) -> bool {
        self.capabilities.streaming == Some(true)
    }
}

// ── Lenient field decoding ───────────────────────────────────────────────────

/// Field deserializers that never fail. A field of the wrong type decodes to
/// its default so one odd field cannot hide the rest of an event.
mod lenient {
    use {
        serde::{Deserialize, Deserializer, de::DeserializeOwned},
        serde_json::Value,
    };

    use super::Part;

    fn scalar_string(value: Value) -> Option<String> {
        match value {
            Value::String(s) => Some(s),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    pub fn string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
        Ok(scalar_string(Value::deserialize(d)?).unwrap_or_default())
    }

    pub fn opt_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        Ok(scalar_string(Value::deserialize(d)?))
    }

    pub fn flag<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
        Ok(Value::deserialize(d)?.as_bool().unwrap_or(false))
    }

    pub fn opt_flag<'de, D: Deserializer<'de>>(d: D) -> Result<Option<bool>, D::Error> {
        Ok(Value::deserialize(d)?.as_bool())
    }

    pub fn or_default<'de, D, T>(d: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned + Default,
    {
        Ok(serde_json::from_value(Value::deserialize(d)?).unwrap_or_default())
    }

    pub fn optional<'de, D, T>(d: D) -> Result<Option<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned,
    {
        Ok(serde_json::from_value(Value::deserialize(d)?).ok())
    }

    /// Items that do not decode are skipped.
    pub fn list<'de, D, T>(d: D) -> Result<Vec<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned,
    {
        Ok(match Value::deserialize(d)? {
            Value::Array(items) => items
                .into_iter()
                .filter_map(|item| serde_json::from_value(item).ok())
                .collect(),
            _ => Vec::new(),
        })
    }

    /// Parts keep their position; undecodable ones become [`Part::Unknown`].
    pub fn parts<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<Part>, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::Array(items) => items
                .into_iter()
                .map(|item| serde_json::from_value(item).unwrap_or(Part::Unknown))
                .collect(),
            _ => Vec::new(),
        })
    }
}

// ── Parts ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FileContent {
    #[serde(
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_string"
    )]
    pub uri: Option<String>,
    /// Base64 payload for inline files.
    #[serde(
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_string"
    )]
    pub bytes: Option<String>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_string"
    )]
    pub mime_type: Option<String>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_string"
    )]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Part {
    Text {
        #[serde(default, deserialize_with = "lenient::string")]
        text: String,
    },
    File {
        #[serde(default, deserialize_with = "lenient::or_default")]
        file: FileContent,
    },
    Data {
        #[serde(default)]
        data: serde_json::Value,
    },
    #[serde(other)]
    Unknown,
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Text of a text part, if non-empty.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } if !text.is_empty() => Some(text),
            _ => None,
        }
    }
}

// ── Messages and tasks ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Agent,
    #[default]
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Message {
    #[serde(deserialize_with = "lenient::or_default")]
    pub role: Role,
    #[serde(deserialize_with = "lenient::parts")]
    pub parts: Vec<Part>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_string"
    )]
    pub message_id: Option<String>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_string"
    )]
    pub task_id: Option<String>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_string"
    )]
    pub context_id: Option<String>,
}

impl Message {
    /// First part that carries non-empty text.
    pub fn first_text(&self) -> Option<&str> {
        self.parts.iter().find_map(Part::as_text)
    }

    /// Text of the first part, only when that part is a text part.
    pub fn leading_text(&self) -> Option<&str> {
        self.parts.first().and_then(Part::as_text)
    }
}

/// Task lifecycle state. States outside the protocol keep the agent's own
/// spelling in [`TaskState::Other`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TaskState {
    Submitted,
    Working,
    InputRequired,
    Completed,
    Canceled,
    Failed,
    Rejected,
    AuthRequired,
    #[default]
    Unknown,
    Other(String),
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Canceled | Self::Failed | Self::Rejected
        )
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Submitted => "submitted",
            Self::Working => "working",
            Self::InputRequired => "input-required",
            Self::Completed => "completed",
            Self::Canceled => "canceled",
            Self::Failed => "failed",
            Self::Rejected => "rejected",
            Self::AuthRequired => "auth-required",
            Self::Unknown => "unknown",
            Self::Other(state) => state,
        }
    }
}

impl From<&str> for TaskState {
    fn from(state: &str) -> Self {
        match state {
            "submitted" => Self::Submitted,
            "working" => Self::Working,
            "input-required" => Self::InputRequired,
            "completed" => Self::Completed,
            "canceled" => Self::Canceled,
            "failed" => Self::Failed,
            "rejected" => Self::Rejected,
            "auth-required" => Self::AuthRequired,
            "unknown" => Self::Unknown,
            other => Self::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for TaskState {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for TaskState {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match serde_json::Value::deserialize(deserializer)? {
            serde_json::Value::String(state) => Self::from(state.as_str()),
            serde_json::Value::Null => Self::Unknown,
            other => Self::Other(other.to_string()),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskStatus {
    pub state: TaskState,
    #[serde(
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::optional"
    )]
    pub message: Option<Message>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_string"
    )]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Artifact {
    #[serde(deserialize_with = "lenient::string")]
    pub artifact_id: String,
    #[serde(
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_string"
    )]
    pub name: Option<String>,
    #[serde(deserialize_with = "lenient::parts")]
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Task {
    #[serde(deserialize_with = "lenient::string")]
    pub id: String,
    #[serde(
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_string"
    )]
    pub context_id: Option<String>,
    #[serde(deserialize_with = "lenient::or_default")]
    pub status: TaskStatus,
    #[serde(deserialize_with = "lenient::list")]
    pub artifacts: Vec<Artifact>,
    #[serde(deserialize_with = "lenient::list")]
    pub history: Vec<Message>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TaskStatusUpdateEvent {
    #[serde(deserialize_with = "lenient::string")]
    pub task_id: String,
    #[serde(
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_string"
    )]
    pub context_id: Option<String>,
    #[serde(deserialize_with = "lenient::or_default")]
    pub status: TaskStatus,
    #[serde(rename = "final", deserialize_with = "lenient::flag")]
    pub is_final: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TaskArtifactUpdateEvent {
    #[serde(deserialize_with = "lenient::string")]
    pub task_id: String,
    #[serde(
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_string"
    )]
    pub context_id: Option<String>,
    #[serde(deserialize_with = "lenient::or_default")]
    pub artifact: Artifact,
    #[serde(
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_flag"
    )]
    pub append: Option<bool>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_flag"
    )]
    pub last_chunk: Option<bool>,
}

/// Result object of a `message/send` or `message/stream` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum AgentEvent {
    #[serde(rename = "task")]
    Task(Task),
    #[serde(rename = "status-update")]
    StatusUpdate(TaskStatusUpdateEvent),
    #[serde(rename = "artifact-update")]
    ArtifactUpdate(TaskArtifactUpdateEvent),
    #[serde(rename = "message")]
    Message(Message),
}

impl AgentEvent {
    /// Parse a result object; `None` for unknown kinds or non-object results.
    pub fn from_value(value: &serde_json::Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }

    pub fn status(&self) -> Option<&TaskStatus> {
        match self {
            Self::Task(task) => Some(&task.status),
            Self::StatusUpdate(update) => Some(&update.status),
            Self::ArtifactUpdate(_) | Self::Message(_) => None,
        }
    }

    /// Whether this event ends a streamed exchange.
    pub fn is_terminal(&self) -> bool {
        match self {
            Self::Task(task) => task.status.state.is_terminal(),
            Self::StatusUpdate(update) => update.is_final,
            Self::ArtifactUpdate(_) | Self::Message(_) => false,
        }
    }
}

// ── Request parameters ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingMessage {
    pub role: Role,
    pub parts: Vec<Part>,
    pub message_id: String,
    pub kind: String,
}

impl OutgoingMessage {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            parts: vec![Part::text(text)],
            message_id: uuid::Uuid::new_v4().to_string(),
            kind: MESSAGE_KIND.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageSendConfiguration {
    pub accepted_output_modes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageSendParams {
    pub message: OutgoingMessage,
    pub configuration: MessageSendConfiguration,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use {super::*, serde_json::json};

    #[test]
    fn parses_status_update_with_text() {
        let value = json!({
            "kind": "status-update",
            "taskId": "t-1",
            "contextId": "c-1",
            "final": false,
            "status": {
                "state": "working",
                "message": {
                    "kind": "message",
                    "role": "agent",
                    "messageId": "m-9",
                    "parts": [{ "kind": "text", "text": "thinking" }]
                }
            }
        });
        let event = AgentEvent::from_value(&value).unwrap();
        match &event {
            AgentEvent::StatusUpdate(update) => {
                assert_eq!(update.status.state, TaskState::Working);
                assert_eq!(
                    update.status.message.as_ref().unwrap().first_text(),
                    Some("thinking")
                );
            },
            other => panic!("unexpected event {other:?}"),
        }
        assert!(!event.is_terminal());
    }

    #[test]
    fn unknown_part_kind_is_tolerated() {
        let value = json!({
            "kind": "message",
            "role": "agent",
            "parts": [{ "kind": "hologram", "beam": 1 }, { "kind": "text", "text": "hi" }]
        });
        let Some(AgentEvent::Message(message)) = AgentEvent::from_value(&value) else {
            panic!("expected message");
        };
        assert_eq!(message.parts[0], Part::Unknown);
        assert_eq!(message.first_text(), Some("hi"));
        assert_eq!(message.leading_text(), None);
    }

    #[test]
    fn non_standard_task_state_keeps_its_spelling() {
        let value = json!({ "kind": "task", "id": "t", "status": { "state": "dreaming" } });
        let Some(AgentEvent::Task(task)) = AgentEvent::from_value(&value) else {
            panic!("expected task");
        };
        assert_eq!(task.status.state, TaskState::Other("dreaming".into()));
        assert_eq!(task.status.state.to_string(), "dreaming");
        assert!(!task.status.state.is_terminal());
        assert_eq!(serde_json::to_value(&task.status.state).unwrap(), json!("dreaming"));
    }

    #[test]
    fn missing_task_state_is_unknown() {
        let value = json!({ "kind": "task", "id": "t", "status": {} });
        let Some(AgentEvent::Task(task)) = AgentEvent::from_value(&value) else {
            panic!("expected task");
        };
        assert_eq!(task.status.state, TaskState::Unknown);
    }

    #[test]
    fn mistyped_identifiers_do_not_hide_a_message() {
        let value = json!({
            "kind": "message",
            "role": "agent",
            "messageId": 42,
            "contextId": { "nested": true },
            "parts": [{ "kind": "text", "text": "hi" }]
        });
        let Some(AgentEvent::Message(message)) = AgentEvent::from_value(&value) else {
            panic!("expected message");
        };
        assert_eq!(message.message_id.as_deref(), Some("42"));
        assert_eq!(message.context_id, None);
        assert_eq!(message.first_text(), Some("hi"));
    }

    #[test]
    fn null_final_flag_and_numeric_timestamp_are_tolerated() {
        let value = json!({
            "kind": "status-update",
            "taskId": 7,
            "final": null,
            "status": {
                "state": "working",
                "timestamp": 1_700_000_000,
                "message": { "role": "agent", "parts": [{ "kind": "text", "text": "working on it" }] }
            }
        });
        let Some(AgentEvent::StatusUpdate(update)) = AgentEvent::from_value(&value) else {
            panic!("expected status-update");
        };
        assert!(!update.is_final);
        assert_eq!(update.task_id, "7");
        assert_eq!(update.status.timestamp.as_deref(), Some("1700000000"));
        assert_eq!(
            update.status.message.as_ref().and_then(Message::first_text),
            Some("working on it")
        );
    }

    #[test]
    fn broken_part_keeps_its_slot() {
        let value = json!({
            "kind": "artifact-update",
            "artifact": {
                "artifactId": "a",
                "parts": [
                    { "kind": "file", "file": "oops" },
                    { "text": "no kind" },
                    { "kind": "text", "text": "ok" }
                ]
            },
            "append": "yes"
        });
        let Some(AgentEvent::ArtifactUpdate(update)) = AgentEvent::from_value(&value) else {
            panic!("expected artifact-update");
        };
        assert_eq!(update.append, None);
        assert_eq!(update.artifact.parts.len(), 3);
        assert_eq!(update.artifact.parts[0], Part::File { file: FileContent::default() });
        assert_eq!(update.artifact.parts[1], Part::Unknown);
        assert_eq!(update.artifact.parts[2].as_text(), Some("ok"));
    }

    #[test]
    fn unknown_kind_is_none() {
        assert!(AgentEvent::from_value(&json!({ "kind": "telemetry" })).is_none());
        assert!(AgentEvent::from_value(&json!({ "no": "kind" })).is_none());
    }

    #[test]
    fn terminal_task_states() {
        assert!(TaskState::Completed.is_terminal());
        assert!(TaskState::Failed.is_terminal());
        assert!(!TaskState::InputRequired.is_terminal());
        assert_eq!(TaskState::InputRequired.to_string(), "input-required");
    }

    #[test]
    fn outgoing_message_shape() {
        let json = serde_json::to_value(OutgoingMessage::user_text("hello")).unwrap();
        assert_eq!(json["role"], "user");
        assert_eq!(json["kind"], "message");
        assert_eq!(json["parts"][0], json!({ "kind": "text", "text": "hello" }));
        assert!(json["messageId"].as_str().is_some_and(|id| !id.is_empty()));
    }

    #[test]
    fn card_streaming_flag() {
        let card: AgentCard = serde_json::from_value(json!({
            "name": "echo",
            "capabilities": { "streaming": true }
        }))
        .unwrap();
        assert!(card.supports_streaming());
        assert!(!AgentCard::default().supports_streaming());
    }
}
