//! Agent card discovery.

use std::time::Duration;

use {
    reqwest::StatusCode,
    serde_json::Value,
    tracing::{debug, warn},
};

use crate::{
    error::{Error, Result},
    types::{AgentCapabilities, AgentCard},
    validate::validate_agent_card,
};

pub const DEFAULT_CARD_PATH: &str = "/.well-known/agent-card.json";
pub const LEGACY_CARD_PATH: &str = "/.well-known/agent.json";
pub const DEFAULT_CARD_TIMEOUT: Duration = Duration::from_secs(30);

/// A fetched agent card together with its compliance findings.
#[derive(Debug, Clone)]
pub struct AgentDescriptor {
    /// The URL the user asked to connect to.
    pub base_url: String,
    pub card: AgentCard,
    /// The document exactly as served, for display.
    pub raw: Value,
    pub validation_errors: Vec<String>,
}

impl AgentDescriptor {
    pub fn from_document(base_url: impl Into<String>, raw: Value) -> Self {
        let validation_errors = validate_agent_card(&raw);
        let card = card_from_document(&raw);
        Self {
            base_url: base_url.into(),
            card,
            raw,
            validation_errors,
        }
    }

    pub fn is_compliant(&self) -> bool {
        self.validation_errors.is_empty()
    }
}

/// Typed view of a card, salvaging the fields the client acts on when the
/// document does not fit the schema as a whole.
fn card_from_document(raw: &Value) -> AgentCard {
    if let Ok(card) = serde_json::from_value::<AgentCard>(raw.clone()) {
        return card;
    }
    let text = |field: &str| {
        raw.get(field)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    AgentCard {
        name: text("name"),
        description: text("description"),
        url: text("url"),
        version: text("version"),
        capabilities: AgentCapabilities {
            streaming: raw
                .pointer("/capabilities/streaming")
                .and_then(Value::as_bool),
            ..AgentCapabilities::default()
        },
        ..AgentCard::default()
    }
}

/// Fetches agent cards from an agent's well-known paths.
#[derive(Debug, Clone)]
pub struct CardResolver {
    http: reqwest::Client,
    card_path: String,
    legacy_card_path: String,
    timeout: Duration,
}

impl Default for CardResolver {
    fn default() -> Self {
        Self::new(reqwest::Client::new())
    }
}

impl CardResolver {
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            card_path: DEFAULT_CARD_PATH.into(),
            legacy_card_path: LEGACY_CARD_PATH.into(),
            timeout: DEFAULT_CARD_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_paths(mut self, card_path: impl Into<String>, legacy: impl Into<String>) -> Self {
        self.card_path = card_path.into();
        self.legacy_card_path = legacy.into();
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Fetch and validate the card of the agent at `base_url`.
    pub async fn fetch(&self, base_url: &str) -> Result<AgentDescriptor> {
        let base = base_url.trim().trim_end_matches('/');
        if url::Url::parse(base).is_err() {
            return Err(Error::descriptor_fetch(base_url, "not a valid URL"));
        }

        let primary = format!("{base}{}", self.card_path);
        let response = match self.get(&primary).await? {
            response if response.status() == StatusCode::NOT_FOUND => {
                let legacy = format!("{base}{}", self.legacy_card_path);
                warn!(url = %primary, fallback = %legacy, "agent card not found, trying legacy path");
                self.get(&legacy).await?
            },
            response => response,
        };

        let url = response.url().to_string();
        let status = response.status();
        if !status.is_success() {
            return Err(Error::descriptor_fetch(url, format!("HTTP {}", status.as_u16())));
        }
        let body = response
            .text()
            .await
            .map_err(|e| Error::descriptor_fetch(&url, e))?;
        let raw: Value = serde_json::from_str(&body)
            .map_err(|e| Error::descriptor_fetch(&url, format!("invalid JSON: {e}")))?;
        if !raw.is_object() {
            return Err(Error::descriptor_fetch(url, "agent card is not a JSON object"));
        }

        let descriptor = AgentDescriptor::from_document(base_url, raw);
        debug!(
            url = %url,
            name = %descriptor.card.name,
            findings = descriptor.validation_errors.len(),
            "fetched agent card"
        );
        Ok(descriptor)
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response> {
        self.http
            .get(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                let reason = if e.is_timeout() {
                    format!("timed out after {:?}", self.timeout)
                } else {
                    e.to_string()
                };
                Error::descriptor_fetch(url, reason)
            })
    }
}
