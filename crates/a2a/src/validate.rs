//! Compliance checks for agent cards and response events.
//!
//! Both validators are pure: the same document always yields the same
//! findings, in rule order. Findings are advisory and never fail a caller.

use serde_json::{Map, Value};

use crate::types::AgentEvent;

/// Fields every agent card must declare.
pub const REQUIRED_CARD_FIELDS: &[&str] = &[
    "name",
    "description",
    "url",
    "version",
    "capabilities",
    "defaultInputModes",
    "defaultOutputModes",
    "skills",
];

/// Protocol minor versions this inspector understands (major 0).
const SUPPORTED_PROTOCOL_MINORS: std::ops::RangeInclusive<u64> = 1..=3;

const KNOWN_TRANSPORTS: &[&str] = &["JSONRPC", "GRPC", "HTTP+JSON"];

const BOOLEAN_CAPABILITIES: &[&str] = &["streaming", "pushNotifications", "stateTransitionHistory"];

type Rule = fn(&Map<String, Value>, &mut Vec<String>);

const CARD_RULES: &[Rule] = &[
    check_required_fields,
    check_identity_fields,
    check_url,
    check_protocol_version,
    check_capabilities,
    check_modes,
    check_skills,
    check_preferred_transport,
    check_additional_interfaces,
];

/// Validate an agent card document. Empty when compliant.
#[must_use]
pub fn validate_agent_card(card: &Value) -> Vec<String> {
    let Some(card) = card.as_object() else {
        return vec!["agent card must be a JSON object".into()];
    };
    let mut errors = Vec::new();
    for rule in CARD_RULES {
        rule(card, &mut errors);
    }
    errors
}

fn present<'a>(card: &'a Map<String, Value>, field: &str) -> Option<&'a Value> {
    card.get(field).filter(|v| !v.is_null())
}

fn check_required_fields(card: &Map<String, Value>, errors: &mut Vec<String>) {
    for field in REQUIRED_CARD_FIELDS {
        if present(card, field).is_none() {
            errors.push(format!("missing required field: {field}"));
        }
    }
}

fn check_identity_fields(card: &Map<String, Value>, errors: &mut Vec<String>) {
    for field in ["name", "description", "version"] {
        match present(card, field) {
            None => {},
            Some(Value::String(s)) if s.trim().is_empty() => {
                errors.push(format!("field '{field}' must not be empty"));
            },
            Some(Value::String(_)) => {},
            Some(_) => errors.push(format!("field '{field}' must be a string")),
        }
    }
}

fn is_http_url(raw: &str) -> bool {
    url::Url::parse(raw)
        .is_ok_and(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
}

fn check_url(card: &Map<String, Value>, errors: &mut Vec<String>) {
    match present(card, "url") {
        None => {},
        Some(Value::String(raw)) if is_http_url(raw) => {},
        Some(_) => errors.push(
            "field 'url' must be an absolute URL starting with http:// or https://".into(),
        ),
    }
}

/// Parse `major.minor[.patch]` into `(major, minor)`.
fn parse_version(raw: &str) -> Option<(u64, u64)> {
    let mut parts = raw.trim().split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next()?.parse().ok()?;
    if let Some(patch) = parts.next() {
        patch.parse::<u64>().ok()?;
    }
    if parts.next().is_some() {
        return None;
    }
    Some((major, minor))
}

fn check_protocol_version(card: &Map<String, Value>, errors: &mut Vec<String>) {
    let Some(value) = present(card, "protocolVersion") else {
        return;
    };
    let supported = value
        .as_str()
        .and_then(parse_version)
        .is_some_and(|(major, minor)| major == 0 && SUPPORTED_PROTOCOL_MINORS.contains(&minor));
    if !supported {
        let shown = value.as_str().map_or_else(|| value.to_string(), String::from);
        errors.push(format!(
            "unsupported protocolVersion '{shown}': expected 0.{}.x through 0.{}.x",
            SUPPORTED_PROTOCOL_MINORS.start(),
            SUPPORTED_PROTOCOL_MINORS.end()
        ));
    }
}

fn check_capabilities(card: &Map<String, Value>, errors: &mut Vec<String>) {
    let Some(value) = present(card, "capabilities") else {
        return;
    };
    let Some(caps) = value.as_object() else {
        errors.push("field 'capabilities' must be an object".into());
        return;
    };
    for key in BOOLEAN_CAPABILITIES {
        if let Some(v) = caps.get(*key)
            && !v.is_null()
            && !v.is_boolean()
        {
            errors.push(format!("field 'capabilities.{key}' must be a boolean"));
        }
    }
}

fn is_string_array(value: &Value) -> Option<bool> {
    value.as_array().map(|items| items.iter().all(Value::is_string))
}

fn check_modes(card: &Map<String, Value>, errors: &mut Vec<String>) {
    for field in ["defaultInputModes", "defaultOutputModes"] {
        let Some(value) = present(card, field) else {
            continue;
        };
        match is_string_array(value) {
            None => errors.push(format!("field '{field}' must be an array of strings")),
            Some(false) => errors.push(format!("all items in '{field}' must be strings")),
            Some(true) => {},
        }
    }
}

fn check_skills(card: &Map<String, Value>, errors: &mut Vec<String>) {
    let Some(value) = present(card, "skills") else {
        return;
    };
    let Some(skills) = value.as_array() else {
        errors.push("field 'skills' must be an array of AgentSkill objects".into());
        return;
    };
    if skills.is_empty() {
        errors.push("field 'skills' must declare at least one skill".into());
        return;
    }
    for (i, skill) in skills.iter().enumerate() {
        let Some(skill) = skill.as_object() else {
            errors.push(format!("skills[{i}] must be an object"));
            continue;
        };
        for field in ["id", "name", "description"] {
            let ok = skill
                .get(field)
                .and_then(Value::as_str)
                .is_some_and(|s| !s.trim().is_empty());
            if !ok {
                errors.push(format!("skills[{i}] missing required field: {field}"));
            }
        }
        for field in ["tags", "examples"] {
            if let Some(v) = skill.get(field)
                && !v.is_null()
                && is_string_array(v) != Some(true)
            {
                errors.push(format!("skills[{i}].{field} must be an array of strings"));
            }
        }
    }
}

fn check_preferred_transport(card: &Map<String, Value>, errors: &mut Vec<String>) {
    let Some(value) = present(card, "preferredTransport") else {
        return;
    };
    if !value.as_str().is_some_and(|t| KNOWN_TRANSPORTS.contains(&t)) {
        errors.push(format!(
            "field 'preferredTransport' must be one of {}",
            KNOWN_TRANSPORTS.join(", ")
        ));
    }
}

fn check_additional_interfaces(card: &Map<String, Value>, errors: &mut Vec<String>) {
    let Some(value) = present(card, "additionalInterfaces") else {
        return;
    };
    let Some(interfaces) = value.as_array() else {
        errors.push("field 'additionalInterfaces' must be an array".into());
        return;
    };
    for (i, iface) in interfaces.iter().enumerate() {
        let url_ok = iface
            .get("url")
            .and_then(Value::as_str)
            .is_some_and(is_http_url);
        if !url_ok {
            errors.push(format!(
                "additionalInterfaces[{i}].url must be an absolute http(s) URL"
            ));
        }
        let transport_ok = iface
            .get("transport")
            .and_then(Value::as_str)
            .is_some_and(|t| !t.trim().is_empty());
        if !transport_ok {
            errors.push(format!(
                "additionalInterfaces[{i}] missing required field: transport"
            ));
        }
    }
}

// ── Response events ──────────────────────────────────────────────────────────

fn status_state_present(data: &Value) -> bool {
    data.get("status")
        .and_then(|s| s.get("state"))
        .is_some_and(|s| !s.is_null())
}

fn non_empty_array(value: Option<&Value>) -> bool {
    value
        .and_then(Value::as_array)
        .is_some_and(|items| !items.is_empty())
}

/// Validate the `result` object of one response envelope.
#[must_use]
pub fn validate_event(data: &Value) -> Vec<String> {
    let Some(kind) = data.get("kind") else {
        return vec!["response from agent is missing required field: kind".into()];
    };
    let mut errors = Vec::new();
    match kind.as_str() {
        Some(crate::types::TASK_KIND) => {
            if data.get("id").is_none_or(Value::is_null) {
                errors.push("task missing required field: id".into());
            }
            if !status_state_present(data) {
                errors.push("task missing required field: status.state".into());
            }
        },
        Some(crate::types::STATUS_UPDATE_KIND) => {
            if !status_state_present(data) {
                errors.push("status-update missing required field: status.state".into());
            }
        },
        Some(crate::types::ARTIFACT_UPDATE_KIND) => match data.get("artifact") {
            None => errors.push("artifact-update missing required field: artifact".into()),
            Some(artifact) if !non_empty_array(artifact.get("parts")) => {
                errors.push("artifact must have a non-empty 'parts' array".into());
            },
            Some(_) => {},
        },
        Some(crate::types::MESSAGE_KIND) => {
            if !non_empty_array(data.get("parts")) {
                errors.push("message must have a non-empty 'parts' array".into());
            }
            if data.get("role").and_then(Value::as_str) != Some("agent") {
                errors.push("message from agent must have 'role' set to 'agent'".into());
            }
        },
        _ => {
            let shown = kind.as_str().map_or_else(|| kind.to_string(), String::from);
            errors.push(format!("unknown message kind received: '{shown}'"));
            return errors;
        },
    }
    if AgentEvent::from_value(data).is_none() {
        let kind = kind.as_str().unwrap_or_default();
        errors.push(format!("{kind} result could not be decoded"));
    }
    errors
}
