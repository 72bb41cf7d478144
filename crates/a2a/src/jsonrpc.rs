//! JSON-RPC 2.0 envelopes exchanged with the agent endpoint.

use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    types::MessageSendParams,
};

pub const JSONRPC_VERSION: &str = "2.0";

pub mod methods {
    pub const MESSAGE_SEND: &str = "message/send";
    pub const MESSAGE_STREAM: &str = "message/stream";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: String,
    pub method: String,
    pub params: MessageSendParams,
}

impl JsonRpcRequest {
    pub fn new(id: impl Into<String>, method: impl Into<String>, params: MessageSendParams) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.into(),
            id: id.into(),
            method: method.into(),
            params,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// One response envelope. Exactly one of `result` / `error` is set once
/// [`JsonRpcResponse::parse`] accepted it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn success(id: impl Into<String>, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.into(),
            id: Some(serde_json::Value::String(id.into())),
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: impl Into<String>, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.into(),
            id: Some(serde_json::Value::String(id.into())),
            result: None,
            error: Some(error),
        }
    }

    /// Parse one envelope from raw text, rejecting anything that is not a
    /// JSON-RPC response object.
    pub fn parse(raw: &str) -> Result<Self> {
        let value: serde_json::Value =
            serde_json::from_str(raw).map_err(|e| Error::malformed(raw, e))?;
        Self::from_value(value).map_err(|reason| Error::malformed(raw, reason))
    }

    pub fn from_value(value: serde_json::Value) -> std::result::Result<Self, String> {
        if !value.is_object() {
            return Err("envelope is not a JSON object".into());
        }
        let response: Self = serde_json::from_value(value).map_err(|e| e.to_string())?;
        match (&response.result, &response.error) {
            (None, None) => Err("envelope carries neither 'result' nor 'error'".into()),
            (Some(_), Some(_)) => Err("envelope carries both 'result' and 'error'".into()),
            _ => Ok(response),
        }
    }
}
