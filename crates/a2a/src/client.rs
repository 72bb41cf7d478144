//! JSON-RPC over HTTP client for a single agent endpoint.

use std::{sync::Arc, time::Duration};

use {
    async_trait::async_trait,
    futures::StreamExt,
    reqwest::header::{ACCEPT, CONTENT_TYPE},
    tracing::{debug, info, warn},
    url::Url,
};

pub use inspector_config::StreamingMode;

use crate::{
    card::{AgentDescriptor, CardResolver},
    error::{Error, Result},
    jsonrpc::{JsonRpcRequest, JsonRpcResponse, methods},
    sse::{SseDecoder, SseEvent},
    transport::{AgentClient, AgentConnector, Exchange},
    types::{AgentEvent, MessageSendConfiguration, MessageSendParams, OutgoingMessage},
};

const EVENT_STREAM: &str = "text/event-stream";

/// Tunables shared by every client a connector creates.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub streaming: StreamingMode,
    pub accepted_output_modes: Vec<String>,
    pub request_timeout: Duration,
    pub stream_idle_timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self::from(&inspector_config::AgentConfig::default())
    }
}

impl From<&inspector_config::AgentConfig> for ClientOptions {
    fn from(config: &inspector_config::AgentConfig) -> Self {
        Self {
            streaming: config.streaming,
            accepted_output_modes: config.accepted_output_modes.clone(),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            stream_idle_timeout: Duration::from_secs(config.stream_idle_timeout_secs),
        }
    }
}

/// Client bound to the JSON-RPC endpoint an agent card declares.
#[derive(Debug, Clone)]
pub struct A2aClient {
    http: reqwest::Client,
    endpoint: Url,
    streaming: bool,
    options: ClientOptions,
}

impl A2aClient {
    pub fn new(http: reqwest::Client, endpoint: Url, streaming: bool, options: ClientOptions) -> Self {
        Self {
            http,
            endpoint,
            streaming,
            options,
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    fn build_request(&self, text: &str, correlation_id: &str) -> JsonRpcRequest {
        let method = if self.streaming {
            methods::MESSAGE_STREAM
        } else {
            methods::MESSAGE_SEND
        };
        JsonRpcRequest::new(correlation_id, method, MessageSendParams {
            message: OutgoingMessage::user_text(text),
            configuration: MessageSendConfiguration {
                accepted_output_modes: self.options.accepted_output_modes.clone(),
            },
        })
    }
}

/// Whether an accepted envelope ends the exchange.
fn ends_exchange(envelope: &JsonRpcResponse) -> bool {
    envelope.error.is_some()
        || envelope
            .result
            .as_ref()
            .and_then(AgentEvent::from_value)
            .is_some_and(|event| event.is_terminal())
}

/// Decode one SSE event; `None` for events without payload.
fn decode_event(event: &SseEvent) -> Option<Result<JsonRpcResponse>> {
    let data = event.data.trim();
    if data.is_empty() {
        return None;
    }
    Some(JsonRpcResponse::parse(data))
}

impl AgentClient for A2aClient {
    fn send_message(&self, text: &str, correlation_id: &str) -> Exchange {
        let request = self.build_request(text, correlation_id);
        let request_json = serde_json::to_value(&request).unwrap_or_default();

        let http = self.http.clone();
        let endpoint = self.endpoint.to_string();
        let streaming = self.streaming;
        let request_timeout = self.options.request_timeout;
        let idle_timeout = self.options.stream_idle_timeout;
        let correlation_id = correlation_id.to_string();

        let envelopes = async_stream::stream! {
            let mut builder = http.post(&endpoint).json(&request);
            if streaming {
                builder = builder.header(ACCEPT, EVENT_STREAM);
            }
            debug!(%endpoint, %correlation_id, method = %request.method, "sending message");

            let response = match tokio::time::timeout(request_timeout, builder.send()).await {
                Err(_) => {
                    yield Err(Error::Timeout(request_timeout));
                    return;
                },
                Ok(Err(e)) => {
                    yield Err(Error::from_request(&endpoint, e, request_timeout));
                    return;
                },
                Ok(Ok(response)) => response,
            };

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                yield Err(Error::HttpStatus { status: status.as_u16(), body });
                return;
            }

            let is_event_stream = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .is_some_and(|ct| ct.starts_with(EVENT_STREAM));

            if !is_event_stream {
                if streaming {
                    debug!(%correlation_id, "streaming request answered with a single response");
                }
                match tokio::time::timeout(request_timeout, response.text()).await {
                    Err(_) => {
                        yield Err(Error::Timeout(request_timeout));
                    },
                    Ok(Err(e)) => {
                        yield Err(Error::from_request(&endpoint, e, request_timeout));
                    },
                    Ok(Ok(body)) => {
                        yield JsonRpcResponse::parse(&body);
                    },
                }
                return;
            }

            let mut bytes = response.bytes_stream();
            let mut decoder = SseDecoder::new();
            let mut finished = false;
            'read: loop {
                let chunk = match tokio::time::timeout(idle_timeout, bytes.next()).await {
                    Err(_) => {
                        warn!(%correlation_id, "agent stream went idle");
                        yield Err(Error::Timeout(idle_timeout));
                        finished = true;
                        break;
                    },
                    Ok(None) => break,
                    Ok(Some(Err(e))) => {
                        yield Err(Error::from_request(&endpoint, e, idle_timeout));
                        finished = true;
                        break;
                    },
                    Ok(Some(Ok(chunk))) => chunk,
                };
                for event in decoder.feed(&chunk) {
                    let Some(decoded) = decode_event(&event) else {
                        continue;
                    };
                    let terminal = decoded.as_ref().is_ok_and(ends_exchange);
                    yield decoded;
                    if terminal {
                        finished = true;
                        break 'read;
                    }
                }
            }
            if !finished
                && let Some(decoded) = decoder.finish().as_ref().and_then(decode_event)
            {
                yield decoded;
            }
            debug!(%correlation_id, "agent stream closed");
        };

        Exchange {
            request: request_json,
            envelopes: envelopes.boxed(),
        }
    }
}

// ── Connector ────────────────────────────────────────────────────────────────

/// Production [`AgentConnector`]: fetches cards over HTTP and binds
/// [`A2aClient`]s to the endpoints they declare.
#[derive(Debug, Clone)]
pub struct HttpConnector {
    http: reqwest::Client,
    resolver: CardResolver,
    options: ClientOptions,
}

impl HttpConnector {
    pub fn new(http: reqwest::Client, resolver: CardResolver, options: ClientOptions) -> Self {
        Self {
            http,
            resolver,
            options,
        }
    }

    pub fn from_config(config: &inspector_config::AgentConfig) -> Self {
        let http = reqwest::Client::new();
        let resolver = CardResolver::new(http.clone())
            .with_paths(&config.card_path, &config.legacy_card_path)
            .with_timeout(Duration::from_secs(config.card_timeout_secs));
        Self::new(http, resolver, ClientOptions::from(config))
    }

    /// Build a client without the trait-object wrapper.
    pub fn client_for(&self, descriptor: &AgentDescriptor) -> Result<A2aClient> {
        let declared = descriptor.card.url.trim();
        let endpoint = Url::parse(declared)
            .ok()
            .filter(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
            .ok_or_else(|| Error::Connect {
                url: declared.to_string(),
                reason: "agent card does not declare a usable JSON-RPC endpoint".into(),
            })?;
        let streaming = match self.options.streaming {
            StreamingMode::Always => true,
            StreamingMode::Never => false,
            StreamingMode::Auto => descriptor.card.supports_streaming(),
        };
        info!(endpoint = %endpoint, streaming, "bound agent client");
        Ok(A2aClient::new(
            self.http.clone(),
            endpoint,
            streaming,
            self.options.clone(),
        ))
    }
}

impl Default for HttpConnector {
    fn default() -> Self {
        Self::from_config(&inspector_config::AgentConfig::default())
    }
}

#[async_trait]
impl AgentConnector for HttpConnector {
    async fn fetch_descriptor(&self, base_url: &str) -> Result<AgentDescriptor> {
        self.resolver.fetch(base_url).await
    }

    async fn connect(&self, descriptor: &AgentDescriptor) -> Result<Arc<dyn AgentClient>> {
        Ok(Arc::new(self.client_for(descriptor)?))
    }
}
