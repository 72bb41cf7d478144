//! Client side of the A2A (agent-to-agent) JSON-RPC protocol as the inspector
//! sees it: wire types, descriptor discovery and validation, and a transport
//! adapter that turns one chat message into a stream of response envelopes.

pub mod card;
pub mod client;
pub mod error;
pub mod jsonrpc;
pub mod sse;
pub mod transport;
pub mod types;
pub mod validate;

pub use {
    card::{AgentDescriptor, CardResolver},
    client::{A2aClient, ClientOptions, HttpConnector, StreamingMode},
    error::{Error, Result},
    jsonrpc::{JsonRpcError, JsonRpcRequest, JsonRpcResponse},
    transport::{AgentClient, AgentConnector, EnvelopeStream, Exchange},
    validate::{validate_agent_card, validate_event},
};
