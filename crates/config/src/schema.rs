use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// Top-level configuration. Every field has a default, so an empty file (or
/// no file at all) is a valid configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InspectorConfig {
    pub server: ServerConfig,
    pub agent: AgentConfig,
    pub session: SessionConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".into(),
            port: 5001,
        }
    }
}

/// When to use `message/stream` instead of `message/send`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamingMode {
    /// Follow the agent card's `capabilities.streaming`.
    #[default]
    Auto,
    Always,
    Never,
}

impl FromStr for StreamingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "always" | "on" | "true" => Ok(Self::Always),
            "never" | "off" | "false" => Ok(Self::Never),
            other => Err(format!("unknown streaming mode '{other}'")),
        }
    }
}

impl fmt::Display for StreamingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => f.write_str("auto"),
            Self::Always => f.write_str("always"),
            Self::Never => f.write_str("never"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Well-known path of the agent card, relative to the agent URL.
    pub card_path: String,
    /// Tried when `card_path` answers 404.
    pub legacy_card_path: String,
    pub card_timeout_secs: u64,
    /// Upper bound for the agent to start answering a message.
    pub request_timeout_secs: u64,
    /// Longest silence tolerated between two chunks of a stream.
    pub stream_idle_timeout_secs: u64,
    pub accepted_output_modes: Vec<String>,
    pub streaming: StreamingMode,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            card_path: "/.well-known/agent-card.json".into(),
            legacy_card_path: "/.well-known/agent.json".into(),
            card_timeout_secs: 30,
            request_timeout_secs: 600,
            stream_idle_timeout_secs: 600,
            accepted_output_modes: vec!["text/plain".into(), "video/mp4".into()],
            streaming: StreamingMode::Auto,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Debug log entries kept per session; the oldest are evicted first.
    pub debug_log_limit: usize,
    /// Exchanges whose events stay cached per session; the oldest are evicted
    /// first.
    pub event_cache_limit: usize,
    /// Frames queued per connection before new ones are dropped.
    pub outbound_buffer: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            debug_log_limit: 1000,
            event_cache_limit: 256,
            outbound_buffer: 512,
        }
    }
}
