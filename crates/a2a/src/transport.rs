//! Seams between the session layer and the agent's network transport.
//!
//! The gateway only ever sees these traits, which lets tests drive sessions
//! with scripted envelope streams.

use std::sync::Arc;

use {async_trait::async_trait, futures::stream::BoxStream};

use crate::{card::AgentDescriptor, error::Result, jsonrpc::JsonRpcResponse};

/// Envelopes of one exchange in arrival order. An `Err` item is either a
/// malformed envelope (the stream continues) or a transport failure (the
/// stream ends after it).
pub type EnvelopeStream = BoxStream<'static, Result<JsonRpcResponse>>;

/// One outgoing chat message and the envelopes it produced.
pub struct Exchange {
    /// The JSON-RPC request as sent, for the debug log.
    pub request: serde_json::Value,
    /// Lazy: nothing is sent until the stream is first polled.
    pub envelopes: EnvelopeStream,
}

/// A connected agent endpoint.
pub trait AgentClient: Send + Sync {
    fn send_message(&self, text: &str, correlation_id: &str) -> Exchange;
}

/// Creates agent bindings from user-supplied URLs.
#[async_trait]
pub trait AgentConnector: Send + Sync {
    async fn fetch_descriptor(&self, base_url: &str) -> Result<AgentDescriptor>;

    async fn connect(&self, descriptor: &AgentDescriptor) -> Result<Arc<dyn AgentClient>>;
}
