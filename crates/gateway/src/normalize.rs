//! Turns raw response envelopes into display-ready [`NormalizedEvent`]s.

use {
    inspector_a2a::{
        JsonRpcResponse,
        types::{AgentEvent, FileContent, Message, Part, Role, Task, TaskState},
    },
    inspector_protocol::{DisplayItem, EventKind, FilePart, NormalizedEvent},
};

use crate::markdown::render_markdown;

pub const FAILED_TASK_FALLBACK: &str = "Task failed with an unknown error.";
const DEFAULT_FILE_MIME: &str = "application/octet-stream";

/// Normalize one envelope of the exchange `correlation_id`.
///
/// Returns `None` when the envelope has nothing to show in the chat view.
/// `validation_errors` are the session's agent card findings and are copied
/// onto every event.
pub fn normalize(
    envelope: &JsonRpcResponse,
    correlation_id: &str,
    validation_errors: &[String],
) -> Option<NormalizedEvent> {
    let mut event = NormalizedEvent {
        kind: EventKind::Error,
        correlation_id: correlation_id.to_string(),
        status_state: None,
        text_parts: Vec::new(),
        file_parts: Vec::new(),
        final_message: None,
        validation_errors: validation_errors.to_vec(),
        display: Vec::new(),
    };

    let Some(result) = &envelope.result else {
        let message = envelope
            .error
            .as_ref()
            .map_or("Unknown error", |e| e.message.as_str());
        return Some(error_event(correlation_id, message, validation_errors));
    };

    let typed = AgentEvent::from_value(result);
    if let Some(typed) = &typed {
        event.status_state = typed.status().map(|s| s.state.to_string());
        for part in content_parts(typed) {
            match part {
                Part::Text { text } if !text.is_empty() => event.text_parts.push(text.clone()),
                Part::File { file } => event.file_parts.extend(file_part(file)),
                _ => {},
            }
        }
    }

    let explicit = result
        .get("final_message")
        .and_then(serde_json::Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    if let Some(final_message) = explicit.or_else(|| typed.as_ref().and_then(derive_final_message)) {
        event.kind = EventKind::Task;
        event.display.push(DisplayItem::Text {
            html: render_markdown(&final_message),
        });
        event.final_message = Some(final_message);
        return Some(event);
    }

    match typed? {
        AgentEvent::Task(task) => {
            event.kind = EventKind::Task;
            event.display.push(DisplayItem::Progress {
                html: render_markdown(&format!("Task status: **{}**", task.status.state)),
            });
        },
        AgentEvent::StatusUpdate(update) => {
            event.kind = EventKind::StatusUpdate;
            let text = update.status.message.as_ref().and_then(Message::first_text)?;
            event.display.push(DisplayItem::Text {
                html: render_markdown(text),
            });
        },
        AgentEvent::ArtifactUpdate(update) => {
            event.kind = EventKind::ArtifactUpdate;
            for part in &update.artifact.parts {
                match part {
                    Part::Text { text } if !text.is_empty() => {
                        event.display.push(DisplayItem::Text {
                            html: render_markdown(text),
                        });
                    },
                    Part::File { file } => {
                        if let Some(FilePart { uri, mime_type }) = file_part(file) {
                            let label = file_label(file, &uri);
                            event.display.push(DisplayItem::Link {
                                uri,
                                mime_type,
                                label,
                            });
                        }
                    },
                    _ => {},
                }
            }
        },
        AgentEvent::Message(message) => {
            event.kind = EventKind::Message;
            let text = message.first_text()?;
            event.display.push(DisplayItem::Text {
                html: render_markdown(text),
            });
        },
    }

    (!event.display.is_empty()).then_some(event)
}

/// An `error`-kind event carrying `message`.
pub fn error_event(
    correlation_id: &str,
    message: &str,
    validation_errors: &[String],
) -> NormalizedEvent {
    NormalizedEvent {
        kind: EventKind::Error,
        correlation_id: correlation_id.to_string(),
        status_state: None,
        text_parts: vec![message.to_string()],
        file_parts: Vec::new(),
        final_message: None,
        validation_errors: validation_errors.to_vec(),
        display: vec![DisplayItem::Text {
            html: render_markdown(message),
        }],
    }
}

/// The parts whose content an event carries.
fn content_parts(event: &AgentEvent) -> Vec<&Part> {
    match event {
        AgentEvent::Task(task) => task
            .artifacts
            .iter()
            .flat_map(|a| a.parts.iter())
            .chain(task.status.message.iter().flat_map(|m| m.parts.iter()))
            .collect(),
        AgentEvent::StatusUpdate(update) => update
            .status
            .message
            .iter()
            .flat_map(|m| m.parts.iter())
            .collect(),
        AgentEvent::ArtifactUpdate(update) => update.artifact.parts.iter().collect(),
        AgentEvent::Message(message) => message.parts.iter().collect(),
    }
}

/// Resolve a file part to a link target; inline bytes become a `data:` URI.
fn file_part(file: &FileContent) -> Option<FilePart> {
    let mime_type = file
        .mime_type
        .clone()
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| DEFAULT_FILE_MIME.to_string());
    let uri = match (&file.uri, &file.bytes) {
        (Some(uri), _) if !uri.is_empty() => uri.clone(),
        (_, Some(bytes)) if !bytes.is_empty() => format!("data:{mime_type};base64,{bytes}"),
        _ => return None,
    };
    Some(FilePart { uri, mime_type })
}

fn file_label(file: &FileContent, uri: &str) -> String {
    if let Some(name) = file.name.as_deref().filter(|n| !n.is_empty()) {
        return name.to_string();
    }
    if !uri.starts_with("data:")
        && let Some(segment) = uri
            .split(['?', '#'])
            .next()
            .and_then(|path| path.rsplit('/').next())
            .filter(|s| !s.is_empty())
    {
        return segment.to_string();
    }
    "file".to_string()
}

/// Pick the answer worth surfacing from an event, first match wins: a failed
/// status, the first artifact's text, the newest agent message with bold
/// text, the newest agent message with text.
///
/// A failed status whose leading text part is empty has no message yet and
/// defers to the later rules.
fn derive_final_message(event: &AgentEvent) -> Option<String> {
    if let Some(status) = event.status()
        && status.state == TaskState::Failed
    {
        let leading = status.message.as_ref().and_then(|m| m.parts.first());
        match leading {
            Some(Part::Text { text }) if text.is_empty() => {},
            Some(Part::Text { text }) => return Some(text.clone()),
            _ => return Some(FAILED_TASK_FALLBACK.to_string()),
        }
    }
    let AgentEvent::Task(task) = event else {
        return None;
    };
    task_answer(task).map(str::to_string)
}

fn task_answer(task: &Task) -> Option<&str> {
    if let Some(text) = task
        .artifacts
        .first()
        .and_then(|a| a.parts.first())
        .and_then(Part::as_text)
    {
        return Some(text);
    }
    let agent_texts = || {
        task.history
            .iter()
            .rev()
            .filter(|m| m.role == Role::Agent)
            .filter_map(Message::leading_text)
    };
    agent_texts()
        .find(|text| text.contains("**"))
        .or_else(|| agent_texts().next())
}
