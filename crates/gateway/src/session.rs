//! Inspector sessions: one per WebSocket connection, each bound to at most one
//! remote agent at a time.
//!
//! A session owns its debug log, its per-exchange event cache and the outbound
//! channel of its connection. Every mutation happens under the session's own
//! lock; sessions never share state.

use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
};

use {
    futures::StreamExt,
    inspector_a2a::{
        AgentClient, AgentConnector, AgentDescriptor, EnvelopeStream, Exchange, JsonRpcResponse,
        validate_event,
    },
    inspector_config::SessionConfig,
    inspector_protocol::{
        ClientInitialized, Connected, DebugDirection, DebugLogEntry, EventFrame,
        HTTP_AGENT_CARD_ID, NOT_INITIALIZED_MESSAGE, NormalizedEvent, PROTOCOL_VERSION, events,
    },
    serde::Serialize,
    serde_json::{Value, json},
    tokio::sync::{Mutex, RwLock, mpsc},
    tokio_util::sync::CancellationToken,
    tracing::{debug, error, info, warn},
};

use crate::{
    error::{Error, Result},
    normalize::{error_event, normalize},
};

// ── Session state ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Uninitialized,
    Ready,
    Active,
}

pub enum SessionState {
    Uninitialized,
    /// An agent card has been fetched but no client is bound.
    Ready { descriptor: AgentDescriptor },
    Active {
        descriptor: AgentDescriptor,
        client: Arc<dyn AgentClient>,
        /// Parent of every in-flight exchange token of this binding.
        cancel: CancellationToken,
    },
}

impl SessionState {
    fn phase(&self) -> SessionPhase {
        match self {
            Self::Uninitialized => SessionPhase::Uninitialized,
            Self::Ready { .. } => SessionPhase::Ready,
            Self::Active { .. } => SessionPhase::Active,
        }
    }

    fn descriptor(&self) -> Option<&AgentDescriptor> {
        match self {
            Self::Uninitialized => None,
            Self::Ready { descriptor } | Self::Active { descriptor, .. } => Some(descriptor),
        }
    }
}

pub struct Session {
    id: String,
    sender: mpsc::Sender<String>,
    seq: u64,
    state: SessionState,
    /// Bumped whenever the agent binding is released. Exchanges remember the
    /// generation they started in and go silent once it moves on.
    generation: u64,
    debug_log: VecDeque<DebugLogEntry>,
    debug_log_limit: usize,
    event_cache: HashMap<String, Vec<NormalizedEvent>>,
    /// Correlation ids of `event_cache`, oldest first.
    event_order: VecDeque<String>,
    event_cache_limit: usize,
    in_flight: HashMap<String, CancellationToken>,
}

impl Session {
    fn new(id: &str, sender: mpsc::Sender<String>, config: &SessionConfig) -> Self {
        Self {
            id: id.to_string(),
            sender,
            seq: 0,
            state: SessionState::Uninitialized,
            generation: 0,
            debug_log: VecDeque::new(),
            debug_log_limit: config.debug_log_limit,
            event_cache: HashMap::new(),
            event_order: VecDeque::new(),
            event_cache_limit: config.event_cache_limit,
            in_flight: HashMap::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn phase(&self) -> SessionPhase {
        self.state.phase()
    }

    pub fn descriptor(&self) -> Option<&AgentDescriptor> {
        self.state.descriptor()
    }

    pub fn debug_log(&self) -> Vec<DebugLogEntry> {
        self.debug_log.iter().cloned().collect()
    }

    pub fn events_for(&self, correlation_id: &str) -> Vec<NormalizedEvent> {
        self.event_cache
            .get(correlation_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Agent card findings of the current binding.
    fn findings(&self) -> Vec<String> {
        self.descriptor()
            .map(|d| d.validation_errors.clone())
            .unwrap_or_default()
    }

    /// Queue an event frame for this session's connection.
    ///
    /// Never blocks: when the connection's buffer is full the frame is dropped.
    fn emit(&mut self, event: &str, payload: impl Serialize) {
        let payload = match serde_json::to_value(payload) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(sid = %self.id, event, error = %e, "failed to serialize event payload");
                return;
            },
        };
        self.seq += 1;
        let frame = EventFrame::new(event, payload, self.seq);
        match serde_json::to_string(&frame) {
            Ok(text) => {
                if self.sender.try_send(text).is_err() {
                    warn!(sid = %self.id, event, "outbound buffer full or closed, dropping frame");
                }
            },
            Err(e) => warn!(sid = %self.id, event, error = %e, "failed to serialize event frame"),
        }
    }

    fn log_debug(&mut self, direction: DebugDirection, correlation_id: &str, data: Value) {
        let entry = DebugLogEntry {
            direction,
            data,
            correlation_id: correlation_id.to_string(),
        };
        if self.debug_log_limit > 0 && self.debug_log.len() >= self.debug_log_limit {
            self.debug_log.pop_front();
        }
        self.debug_log.push_back(entry.clone());
        self.emit(events::DEBUG_LOG, &entry);
    }

    fn clear_debug_log(&mut self) {
        self.debug_log.clear();
    }

    /// Cache an event and send one `agent_response` per display item.
    fn respond(&mut self, event: NormalizedEvent) {
        for response in event.responses() {
            self.emit(events::AGENT_RESPONSE, &response);
        }
        if !self.event_cache.contains_key(&event.correlation_id) {
            if self.event_cache_limit > 0
                && self.event_order.len() >= self.event_cache_limit
                && let Some(oldest) = self.event_order.pop_front()
            {
                self.event_cache.remove(&oldest);
            }
            self.event_order.push_back(event.correlation_id.clone());
        }
        self.event_cache
            .entry(event.correlation_id.clone())
            .or_default()
            .push(event);
    }

    /// Cancel the binding's exchanges and invalidate anything still running.
    fn release_binding(&mut self) {
        if let SessionState::Active { cancel, .. } = &self.state {
            cancel.cancel();
        }
        for (_, token) in self.in_flight.drain() {
            token.cancel();
        }
        self.generation += 1;
    }

    /// Back to a blank session: no binding, no log, no cached events.
    fn reset(&mut self) {
        self.release_binding();
        self.debug_log.clear();
        self.event_cache.clear();
        self.event_order.clear();
        self.state = SessionState::Uninitialized;
    }

    /// Tear down the agent binding but keep the fetched card.
    fn demote_to_ready(&mut self) {
        self.release_binding();
        self.state = match std::mem::replace(&mut self.state, SessionState::Uninitialized) {
            SessionState::Ready { descriptor } | SessionState::Active { descriptor, .. } => {
                SessionState::Ready { descriptor }
            },
            SessionState::Uninitialized => SessionState::Uninitialized,
        };
    }

    /// Handle one item of an exchange. Returns whether the exchange goes on.
    fn relay_item(
        &mut self,
        item: inspector_a2a::Result<JsonRpcResponse>,
        correlation_id: &str,
        findings: &[String],
    ) -> bool {
        match item {
            Ok(envelope) => {
                self.relay_envelope(&envelope, correlation_id, findings);
                true
            },
            Err(inspector_a2a::Error::MalformedEnvelope { raw, reason }) => {
                warn!(sid = %self.id, correlation_id, %reason, "malformed envelope");
                self.log_debug(
                    DebugDirection::ValidationError,
                    correlation_id,
                    json!({ "errors": [format!("malformed envelope: {reason}")], "raw": raw }),
                );
                true
            },
            Err(e) => {
                let fatal = e.is_fatal_connection();
                if fatal {
                    error!(sid = %self.id, correlation_id, error = %e, "agent connection lost");
                } else {
                    warn!(sid = %self.id, correlation_id, error = %e, "exchange failed");
                }
                self.log_debug(
                    DebugDirection::Error,
                    correlation_id,
                    json!({ "message": e.to_string() }),
                );
                let message = format!("Failed to send message: {e}");
                self.respond(error_event(correlation_id, &message, findings));
                if fatal {
                    self.demote_to_ready();
                }
                false
            },
        }
    }

    fn relay_envelope(&mut self, envelope: &JsonRpcResponse, correlation_id: &str, findings: &[String]) {
        let raw = serde_json::to_value(envelope).unwrap_or_default();
        if envelope.error.is_some() {
            self.log_debug(DebugDirection::Error, correlation_id, raw);
        } else if let Some(result) = &envelope.result {
            self.log_debug(DebugDirection::Response, correlation_id, raw);
            let problems = validate_event(result);
            if !problems.is_empty() {
                self.log_debug(
                    DebugDirection::ValidationError,
                    correlation_id,
                    json!({ "errors": problems }),
                );
            }
            if result.get("kind").is_none() {
                warn!(sid = %self.id, correlation_id, "dropping envelope without kind");
                return;
            }
        }
        match normalize(envelope, correlation_id, findings) {
            Some(event) => self.respond(event),
            None => debug!(sid = %self.id, correlation_id, "envelope has nothing to display"),
        }
    }
}

// ── Exchanges ────────────────────────────────────────────────────────────────

struct ExchangeScope {
    correlation_id: String,
    generation: u64,
    cancel: CancellationToken,
    findings: Vec<String>,
}

/// Relay one exchange's envelopes, in order, until it ends, is cancelled, or
/// its binding is superseded.
async fn run_exchange(session: Arc<Mutex<Session>>, mut envelopes: EnvelopeStream, scope: ExchangeScope) {
    let ExchangeScope {
        correlation_id,
        generation,
        cancel,
        findings,
    } = scope;

    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => None,
            next = envelopes.next() => next,
        };
        let Some(item) = next else {
            break;
        };
        let mut session = session.lock().await;
        if session.generation != generation || cancel.is_cancelled() {
            warn!(sid = %session.id, %correlation_id, "discarding envelope of a superseded exchange");
            break;
        }
        if !session.relay_item(item, &correlation_id, &findings) {
            break;
        }
    }

    let mut session = session.lock().await;
    if session.generation == generation && !cancel.is_cancelled() {
        session.in_flight.remove(&correlation_id);
    }
    debug!(sid = %session.id, %correlation_id, "exchange finished");
}

// ── Manager ──────────────────────────────────────────────────────────────────

/// All live sessions, keyed by connection id.
pub struct SessionManager {
    connector: Arc<dyn AgentConnector>,
    config: SessionConfig,
    sessions: RwLock<HashMap<String, Arc<Mutex<Session>>>>,
}

impl SessionManager {
    pub fn new(connector: Arc<dyn AgentConnector>, config: SessionConfig) -> Self {
        Self {
            connector,
            config,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Create the session of a new connection and greet it with `connected`.
    pub async fn open(&self, sid: &str, sender: mpsc::Sender<String>) {
        let mut session = Session::new(sid, sender, &self.config);
        session.emit(events::CONNECTED, Connected {
            sid: sid.to_string(),
            protocol: PROTOCOL_VERSION,
        });
        self.sessions
            .write()
            .await
            .insert(sid.to_string(), Arc::new(Mutex::new(session)));
        debug!(sid, "session opened");
    }

    /// Drop a session, cancelling everything it has in flight.
    pub async fn close(&self, sid: &str) {
        let removed = self.sessions.write().await.remove(sid);
        if let Some(session) = removed {
            session.lock().await.reset();
            debug!(sid, "session closed");
        }
    }

    pub async fn get(&self, sid: &str) -> Option<Arc<Mutex<Session>>> {
        self.sessions.read().await.get(sid).cloned()
    }

    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }

    async fn session(&self, sid: &str) -> Result<Arc<Mutex<Session>>> {
        self.get(sid)
            .await
            .ok_or_else(|| Error::SessionNotFound(sid.to_string()))
    }

    /// Fetch and validate an agent card on behalf of a session's page.
    ///
    /// Both sides of the HTTP exchange land in the session's debug log. A
    /// session without a bound client moves to [`SessionPhase::Ready`].
    pub async fn fetch_descriptor(&self, sid: &str, url: &str) -> Result<AgentDescriptor> {
        let session = self.session(sid).await?;
        let generation = {
            let mut session = session.lock().await;
            session.log_debug(
                DebugDirection::Request,
                HTTP_AGENT_CARD_ID,
                json!({ "endpoint": "/agent-card", "payload": { "url": url, "sid": sid } }),
            );
            session.generation
        };

        let fetched = self.connector.fetch_descriptor(url).await;

        let mut session = session.lock().await;
        match fetched {
            Ok(descriptor) => {
                session.log_debug(
                    DebugDirection::Response,
                    HTTP_AGENT_CARD_ID,
                    json!({
                        "status": 200,
                        "payload": {
                            "card": descriptor.raw,
                            "validation_errors": descriptor.validation_errors,
                        },
                    }),
                );
                if session.generation == generation && session.phase() != SessionPhase::Active {
                    session.state = SessionState::Ready {
                        descriptor: descriptor.clone(),
                    };
                }
                Ok(descriptor)
            },
            Err(e) => {
                warn!(sid, url, error = %e, "agent card fetch failed");
                session.log_debug(
                    DebugDirection::Response,
                    HTTP_AGENT_CARD_ID,
                    json!({ "status": 500, "payload": { "error": e.to_string() } }),
                );
                Err(e.into())
            },
        }
    }

    /// (Re)bind a session to the agent at `url`.
    ///
    /// The previous binding, debug log and event cache are discarded first.
    /// The outcome is reported through a `client_initialized` event; a newer
    /// initialize on the same session silences an older one.
    pub async fn initialize_client(&self, sid: &str, url: &str) -> Result<()> {
        match self.begin_initialize(sid, url).await? {
            Some(generation) => self.finish_initialize(sid, url, generation).await,
            None => Ok(()),
        }
    }

    /// First half of [`Self::initialize_client`]: validate `url`, wipe the
    /// session and claim a new generation.
    ///
    /// Requests are begun in arrival order, so the last one begun owns the
    /// session no matter which fetch completes first. Returns `None` when the
    /// request was rejected and already answered.
    pub async fn begin_initialize(&self, sid: &str, url: &str) -> Result<Option<u64>> {
        let session = self.session(sid).await?;
        let mut session = session.lock().await;
        if url.trim().is_empty() {
            session.emit(
                events::CLIENT_INITIALIZED,
                ClientInitialized::error("Agent URL is required."),
            );
            return Ok(None);
        }
        session.reset();
        Ok(Some(session.generation))
    }

    /// Second half of [`Self::initialize_client`]: fetch the card and bind a
    /// client, unless `generation` has been superseded meanwhile.
    pub async fn finish_initialize(&self, sid: &str, url: &str, generation: u64) -> Result<()> {
        let session = self.session(sid).await?;
        let url = url.trim();
        info!(sid, url, "initializing agent client");

        let descriptor = match self.connector.fetch_descriptor(url).await {
            Ok(descriptor) => descriptor,
            Err(e) => {
                let mut session = session.lock().await;
                if session.generation == generation {
                    warn!(sid, url, error = %e, "agent card fetch failed");
                    session.emit(events::CLIENT_INITIALIZED, ClientInitialized::error(e.to_string()));
                }
                return Ok(());
            },
        };

        {
            let mut session = session.lock().await;
            if session.generation != generation {
                debug!(sid, "initialize superseded before connect");
                return Ok(());
            }
            session.state = SessionState::Ready {
                descriptor: descriptor.clone(),
            };
        }

        let connected = self.connector.connect(&descriptor).await;

        let mut session = session.lock().await;
        if session.generation != generation {
            debug!(sid, "initialize superseded after connect");
            return Ok(());
        }
        match connected {
            Ok(client) => {
                info!(
                    sid,
                    agent = %descriptor.card.name,
                    findings = descriptor.validation_errors.len(),
                    "agent client initialized"
                );
                let payload =
                    ClientInitialized::success(descriptor.raw.clone(), descriptor.validation_errors.clone());
                session.state = SessionState::Active {
                    descriptor,
                    client,
                    cancel: CancellationToken::new(),
                };
                session.emit(events::CLIENT_INITIALIZED, payload);
            },
            Err(e) => {
                warn!(sid, url, error = %e, "agent client could not be created");
                session.emit(events::CLIENT_INITIALIZED, ClientInitialized::error(e.to_string()));
            },
        }
        Ok(())
    }

    /// Start an exchange. Returns the correlation id, generated when absent.
    pub async fn send_message(
        &self,
        sid: &str,
        text: &str,
        correlation_id: Option<String>,
    ) -> Result<String> {
        let session_ref = self.session(sid).await?;
        let correlation_id = correlation_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let mut session = session_ref.lock().await;
        let binding = match &session.state {
            SessionState::Active {
                descriptor,
                client,
                cancel,
            } => Some((
                Arc::clone(client),
                cancel.child_token(),
                descriptor.validation_errors.clone(),
            )),
            SessionState::Uninitialized | SessionState::Ready { .. } => None,
        };
        let Some((client, cancel, findings)) = binding else {
            debug!(sid, %correlation_id, "message sent before client initialization");
            let findings = session.findings();
            session.respond(error_event(&correlation_id, NOT_INITIALIZED_MESSAGE, &findings));
            return Ok(correlation_id);
        };
        if session.in_flight.contains_key(&correlation_id) {
            return Err(Error::DuplicateExchange(correlation_id));
        }

        let Exchange { request, envelopes } = client.send_message(text, &correlation_id);
        session.log_debug(DebugDirection::Request, &correlation_id, request);
        session
            .in_flight
            .insert(correlation_id.clone(), cancel.clone());
        let scope = ExchangeScope {
            correlation_id: correlation_id.clone(),
            generation: session.generation,
            cancel,
            findings,
        };
        drop(session);

        tokio::spawn(run_exchange(session_ref, envelopes, scope));
        Ok(correlation_id)
    }

    /// Stop relaying one in-flight exchange.
    pub async fn cancel_message(&self, sid: &str, correlation_id: &str) -> Result<()> {
        let session = self.session(sid).await?;
        let mut session = session.lock().await;
        let token = session
            .in_flight
            .remove(correlation_id)
            .ok_or_else(|| Error::ExchangeNotFound(correlation_id.to_string()))?;
        token.cancel();
        info!(sid, correlation_id, "exchange cancelled");
        Ok(())
    }

    pub async fn clear_debug_log(&self, sid: &str) -> Result<()> {
        let session = self.session(sid).await?;
        session.lock().await.clear_debug_log();
        Ok(())
    }

    pub async fn debug_log(&self, sid: &str) -> Result<Vec<DebugLogEntry>> {
        let session = self.session(sid).await?;
        let entries = session.lock().await.debug_log();
        Ok(entries)
    }

    pub async fn events_for(&self, sid: &str, correlation_id: &str) -> Result<Vec<NormalizedEvent>> {
        let session = self.session(sid).await?;
        let events = session.lock().await.events_for(correlation_id);
        Ok(events)
    }

    pub async fn phase(&self, sid: &str) -> Result<SessionPhase> {
        let session = self.session(sid).await?;
        let phase = session.lock().await.phase();
        Ok(phase)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {
        super::*,
        async_trait::async_trait,
        futures::channel::mpsc as fmpsc,
        inspector_a2a::{JsonRpcError, Result as A2aResult},
        std::{sync::Mutex as StdMutex, time::Duration},
    };

    type EnvelopeSender = fmpsc::UnboundedSender<A2aResult<JsonRpcResponse>>;

    /// Client whose exchanges are fed by the test through per-id channels.
    #[derive(Default)]
    struct ScriptedClient {
        exchanges: StdMutex<HashMap<String, EnvelopeSender>>,
    }

    impl ScriptedClient {
        fn push(&self, correlation_id: &str, item: A2aResult<JsonRpcResponse>) {
            let exchanges = self.exchanges.lock().unwrap();
            let _ = exchanges[correlation_id].unbounded_send(item);
        }

        fn finish(&self, correlation_id: &str) {
            self.exchanges.lock().unwrap().remove(correlation_id);
        }
    }

    impl AgentClient for ScriptedClient {
        fn send_message(&self, text: &str, correlation_id: &str) -> Exchange {
            let (tx, rx) = fmpsc::unbounded();
            self.exchanges
                .lock()
                .unwrap()
                .insert(correlation_id.to_string(), tx);
            Exchange {
                request: json!({ "id": correlation_id, "method": "message/send", "text": text }),
                envelopes: rx.boxed(),
            }
        }
    }

    struct FakeConnector {
        card: Option<Value>,
        refuse_connect: bool,
        client: Arc<ScriptedClient>,
    }

    impl FakeConnector {
        fn with_card(card: Value) -> Self {
            Self {
                card: Some(card),
                refuse_connect: false,
                client: Arc::new(ScriptedClient::default()),
            }
        }
    }

    #[async_trait]
    impl AgentConnector for FakeConnector {
        async fn fetch_descriptor(&self, base_url: &str) -> A2aResult<AgentDescriptor> {
            match &self.card {
                Some(card) => Ok(AgentDescriptor::from_document(base_url, card.clone())),
                None => Err(inspector_a2a::Error::descriptor_fetch(base_url, "connection refused")),
            }
        }

        async fn connect(&self, descriptor: &AgentDescriptor) -> A2aResult<Arc<dyn AgentClient>> {
            if self.refuse_connect {
                return Err(inspector_a2a::Error::Connect {
                    url: descriptor.card.url.clone(),
                    reason: "refused".into(),
                });
            }
            Ok(self.client.clone())
        }
    }

    /// Card without `capabilities`.
    fn card() -> Value {
        json!({
            "name": "Echo",
            "description": "echoes",
            "url": "http://localhost:5555/",
            "version": "1.0.0",
            "defaultInputModes": ["text/plain"],
            "defaultOutputModes": ["text/plain"],
            "skills": [{ "id": "echo", "name": "Echo", "description": "echo" }]
        })
    }

    const SID: &str = "conn-1";
    const URL: &str = "http://localhost:5555";

    struct Harness {
        manager: SessionManager,
        client: Arc<ScriptedClient>,
        rx: mpsc::Receiver<String>,
    }

    impl Harness {
        async fn new(connector: FakeConnector) -> Self {
            let client = Arc::clone(&connector.client);
            let manager = SessionManager::new(Arc::new(connector), SessionConfig::default());
            let (tx, rx) = mpsc::channel(64);
            manager.open(SID, tx).await;
            let mut harness = Self {
                manager,
                client,
                rx,
            };
            let connected = harness.next_frame().await;
            assert_eq!(connected["event"], "connected");
            assert_eq!(connected["payload"]["sid"], SID);
            harness
        }

        async fn initialized() -> Self {
            let mut harness = Self::new(FakeConnector::with_card(card())).await;
            harness.manager.initialize_client(SID, URL).await.unwrap();
            let frame = harness.next_frame().await;
            assert_eq!(frame["event"], "client_initialized");
            assert_eq!(frame["payload"]["status"], "success");
            harness
        }

        async fn next_frame(&mut self) -> Value {
            let text = tokio::time::timeout(Duration::from_secs(2), self.rx.recv())
                .await
                .expect("timed out waiting for a frame")
                .expect("channel closed");
            serde_json::from_str(&text).unwrap()
        }

        async fn next_event(&mut self, event: &str) -> Value {
            loop {
                let frame = self.next_frame().await;
                if frame["event"] == event {
                    return frame["payload"].clone();
                }
            }
        }

        /// Give spawned exchanges a chance to run, then collect what they sent.
        async fn settle(&mut self) -> Vec<Value> {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let mut frames = Vec::new();
            while let Ok(text) = self.rx.try_recv() {
                frames.push(serde_json::from_str(&text).unwrap());
            }
            frames
        }
    }

    fn status_text(text: &str) -> JsonRpcResponse {
        JsonRpcResponse::success("c-1", json!({
            "kind": "status-update",
            "taskId": "t-1",
            "status": {
                "state": "working",
                "message": { "role": "agent", "parts": [{ "kind": "text", "text": text }] }
            }
        }))
    }

    fn agent_reply(text: &str) -> JsonRpcResponse {
        JsonRpcResponse::success("c-1", json!({
            "kind": "message",
            "role": "agent",
            "messageId": "m-1",
            "parts": [{ "kind": "text", "text": text }]
        }))
    }

    #[tokio::test]
    async fn non_compliant_card_still_initializes_and_chats() {
        let mut h = Harness::new(FakeConnector::with_card(card())).await;

        h.manager.initialize_client(SID, URL).await.unwrap();
        let init = h.next_event("client_initialized").await;
        assert_eq!(init["status"], "success");
        assert_eq!(init["validation_errors"], json!(["missing required field: capabilities"]));
        assert_eq!(init["card"]["name"], "Echo");
        assert_eq!(h.manager.phase(SID).await.unwrap(), SessionPhase::Active);
        assert!(h.manager.debug_log(SID).await.unwrap().is_empty());

        let id = h
            .manager
            .send_message(SID, "hello", Some("c-1".into()))
            .await
            .unwrap();
        assert_eq!(id, "c-1");
        let request = h.next_event("debug_log").await;
        assert_eq!(request["type"], "request");
        assert_eq!(request["id"], "c-1");

        h.client.push("c-1", Ok(agent_reply("hi")));
        let response = h.next_event("debug_log").await;
        assert_eq!(response["type"], "response");
        let reply = h.next_event("agent_response").await;
        assert_eq!(reply["id"], "c-1");
        assert_eq!(reply["kind"], "message");
        assert_eq!(reply["display"], json!({ "type": "text", "html": "hi" }));
        assert_eq!(reply["validation_errors"], json!(["missing required field: capabilities"]));

        let cached = h.manager.events_for(SID, "c-1").await.unwrap();
        assert_eq!(cached.len(), 1);
    }

    #[tokio::test]
    async fn envelopes_keep_their_order() {
        let mut h = Harness::initialized().await;
        h.manager.send_message(SID, "go", Some("c-1".into())).await.unwrap();
        h.client.push("c-1", Ok(status_text("one")));
        h.client.push("c-1", Ok(status_text("two")));
        h.client.finish("c-1");

        let first = h.next_event("agent_response").await;
        let second = h.next_event("agent_response").await;
        assert_eq!(first["display"]["html"], "one");
        assert_eq!(second["display"]["html"], "two");
    }

    #[tokio::test]
    async fn send_before_initialize_is_an_error_event() {
        let mut h = Harness::new(FakeConnector::with_card(card())).await;
        let id = h.manager.send_message(SID, "hello", None).await.unwrap();
        assert!(uuid::Uuid::parse_str(&id).is_ok());
        let reply = h.next_event("agent_response").await;
        assert_eq!(reply["kind"], "error");
        assert_eq!(reply["textParts"], json!([NOT_INITIALIZED_MESSAGE]));
        assert_eq!(reply["id"], id);
    }

    #[tokio::test]
    async fn card_fetch_failure_reports_error() {
        let mut h = Harness::new(FakeConnector {
            card: None,
            refuse_connect: false,
            client: Arc::new(ScriptedClient::default()),
        })
        .await;
        h.manager.initialize_client(SID, URL).await.unwrap();
        let init = h.next_event("client_initialized").await;
        assert_eq!(init["status"], "error");
        assert!(init["message"].as_str().unwrap().contains("connection refused"));
        assert_eq!(h.manager.phase(SID).await.unwrap(), SessionPhase::Uninitialized);
    }

    #[tokio::test]
    async fn connect_failure_leaves_session_ready() {
        let mut connector = FakeConnector::with_card(card());
        connector.refuse_connect = true;
        let mut h = Harness::new(connector).await;
        h.manager.initialize_client(SID, URL).await.unwrap();
        let init = h.next_event("client_initialized").await;
        assert_eq!(init["status"], "error");
        assert_eq!(h.manager.phase(SID).await.unwrap(), SessionPhase::Ready);
    }

    #[tokio::test]
    async fn empty_url_is_rejected() {
        let mut h = Harness::new(FakeConnector::with_card(card())).await;
        h.manager.initialize_client(SID, "  ").await.unwrap();
        let init = h.next_event("client_initialized").await;
        assert_eq!(init["message"], "Agent URL is required.");
    }

    #[tokio::test]
    async fn last_initialize_begun_wins() {
        let mut h = Harness::new(FakeConnector::with_card(card())).await;
        let first = h.manager.begin_initialize(SID, "http://first:1").await.unwrap().unwrap();
        let second = h.manager.begin_initialize(SID, "http://second:2").await.unwrap().unwrap();
        assert!(second > first);

        h.manager.finish_initialize(SID, "http://second:2", second).await.unwrap();
        h.manager.finish_initialize(SID, "http://first:1", first).await.unwrap();

        let frames = h.settle().await;
        let outcomes: Vec<_> = frames
            .iter()
            .filter(|f| f["event"] == "client_initialized")
            .collect();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0]["payload"]["status"], "success");

        let session = h.manager.get(SID).await.unwrap();
        let session = session.lock().await;
        assert_eq!(session.phase(), SessionPhase::Active);
        assert_eq!(session.descriptor().unwrap().base_url, "http://second:2");
    }

    #[tokio::test]
    async fn empty_url_does_not_claim_the_session() {
        let mut h = Harness::initialized().await;
        assert_eq!(h.manager.begin_initialize(SID, "").await.unwrap(), None);
        assert_eq!(h.next_event("client_initialized").await["status"], "error");
        assert_eq!(h.manager.phase(SID).await.unwrap(), SessionPhase::Active);
    }

    #[tokio::test]
    async fn reinitialize_silences_superseded_exchange() {
        let mut h = Harness::initialized().await;
        h.manager.send_message(SID, "slow", Some("old".into())).await.unwrap();
        h.next_event("debug_log").await;

        h.manager.initialize_client(SID, URL).await.unwrap();
        assert_eq!(h.next_event("client_initialized").await["status"], "success");
        assert!(h.manager.debug_log(SID).await.unwrap().is_empty());
        assert!(h.manager.events_for(SID, "old").await.unwrap().is_empty());

        h.client.push("old", Ok(agent_reply("stale")));
        assert!(h.settle().await.is_empty());
        assert!(h.manager.debug_log(SID).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn cancelled_exchange_goes_silent() {
        let mut h = Harness::initialized().await;
        h.manager.send_message(SID, "stream", Some("c-1".into())).await.unwrap();
        h.client.push("c-1", Ok(status_text("partial")));
        assert_eq!(h.next_event("agent_response").await["display"]["html"], "partial");

        h.manager.cancel_message(SID, "c-1").await.unwrap();
        h.client.push("c-1", Ok(status_text("after cancel")));
        let frames = h.settle().await;
        assert!(frames.iter().all(|f| f["payload"]["id"] != "c-1"), "{frames:?}");

        let err = h.manager.cancel_message(SID, "c-1").await.unwrap_err();
        assert!(matches!(err, Error::ExchangeNotFound(_)));
    }

    #[tokio::test]
    async fn exchanges_are_independent() {
        let mut h = Harness::initialized().await;
        h.manager.send_message(SID, "a", Some("a".into())).await.unwrap();
        h.manager.send_message(SID, "b", Some("b".into())).await.unwrap();
        h.manager.cancel_message(SID, "a").await.unwrap();
        h.client.push("b", Ok(agent_reply("for b")));
        let reply = h.next_event("agent_response").await;
        assert_eq!(reply["id"], "b");
    }

    #[tokio::test]
    async fn duplicate_in_flight_id_is_rejected() {
        let h = Harness::initialized().await;
        h.manager.send_message(SID, "a", Some("dup".into())).await.unwrap();
        let err = h
            .manager
            .send_message(SID, "b", Some("dup".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateExchange(_)));
    }

    #[tokio::test]
    async fn fatal_connection_error_demotes_to_ready() {
        let mut h = Harness::initialized().await;
        h.manager.send_message(SID, "x", Some("c-1".into())).await.unwrap();
        h.client.push(
            "c-1",
            Err(inspector_a2a::Error::Connect {
                url: URL.into(),
                reason: "connection reset".into(),
            }),
        );
        let reply = h.next_event("agent_response").await;
        assert_eq!(reply["kind"], "error");
        assert!(reply["textParts"][0].as_str().unwrap().starts_with("Failed to send message"));
        assert_eq!(h.manager.phase(SID).await.unwrap(), SessionPhase::Ready);

        h.manager.send_message(SID, "again", None).await.unwrap();
        let reply = h.next_event("agent_response").await;
        assert_eq!(reply["textParts"], json!([NOT_INITIALIZED_MESSAGE]));
    }

    #[tokio::test]
    async fn exchange_error_keeps_binding() {
        let mut h = Harness::initialized().await;
        h.manager.send_message(SID, "x", Some("c-1".into())).await.unwrap();
        h.client.push("c-1", Err(inspector_a2a::Error::HttpStatus {
            status: 502,
            body: "bad gateway".into(),
        }));
        let reply = h.next_event("agent_response").await;
        assert_eq!(reply["kind"], "error");
        assert_eq!(h.manager.phase(SID).await.unwrap(), SessionPhase::Active);
    }

    #[tokio::test]
    async fn rpc_error_envelope_is_error_event() {
        let mut h = Harness::initialized().await;
        h.manager.send_message(SID, "x", Some("c-1".into())).await.unwrap();
        h.client.push(
            "c-1",
            Ok(JsonRpcResponse::failure("c-1", JsonRpcError {
                code: -32001,
                message: "Task not found".into(),
                data: None,
            })),
        );
        let entry = loop {
            let entry = h.next_event("debug_log").await;
            if entry["type"] == "error" {
                break entry;
            }
        };
        assert_eq!(entry["data"]["error"]["code"], -32001);
        let reply = h.next_event("agent_response").await;
        assert_eq!(reply["kind"], "error");
        assert_eq!(reply["textParts"], json!(["Task not found"]));
    }

    #[tokio::test]
    async fn malformed_envelopes_are_logged_not_displayed() {
        let mut h = Harness::initialized().await;
        h.manager.send_message(SID, "x", Some("c-1".into())).await.unwrap();
        h.client.push("c-1", Err(inspector_a2a::Error::malformed("{oops", "eof")));
        h.client.push("c-1", Ok(JsonRpcResponse::success("c-1", json!({ "parts": [] }))));
        h.client.push("c-1", Ok(agent_reply("still here")));

        let mut validation = Vec::new();
        let reply = loop {
            let frame = h.next_frame().await;
            match frame["event"].as_str() {
                Some("debug_log") if frame["payload"]["type"] == "validation_error" => {
                    validation.push(frame["payload"]["data"].clone());
                },
                Some("agent_response") => break frame["payload"].clone(),
                _ => {},
            }
        };
        assert_eq!(reply["display"]["html"], "still here");
        assert_eq!(validation.len(), 2);
        assert_eq!(validation[0]["raw"], "{oops");
        assert_eq!(
            validation[1]["errors"],
            json!(["response from agent is missing required field: kind"])
        );
    }

    #[tokio::test]
    async fn unknown_result_kind_is_logged_not_displayed() {
        let mut h = Harness::initialized().await;
        h.manager.send_message(SID, "x", Some("c-1".into())).await.unwrap();
        h.client.push("c-1", Ok(JsonRpcResponse::success("c-1", json!({ "kind": "telemetry" }))));
        h.client.push("c-1", Ok(agent_reply("after")));

        let mut entries = Vec::new();
        let reply = loop {
            let frame = h.next_frame().await;
            match frame["event"].as_str() {
                Some("debug_log") => entries.push(frame["payload"].clone()),
                Some("agent_response") => break frame["payload"].clone(),
                _ => {},
            }
        };
        assert_eq!(reply["display"]["html"], "after");

        let telemetry = entries
            .iter()
            .position(|e| e["type"] == "response" && e["data"]["result"]["kind"] == "telemetry")
            .expect("raw envelope logged");
        assert_eq!(entries[telemetry + 1]["type"], "validation_error");
        assert_eq!(
            entries[telemetry + 1]["data"]["errors"],
            json!(["unknown message kind received: 'telemetry'"])
        );

        let cached = h.manager.events_for(SID, "c-1").await.unwrap();
        assert_eq!(cached.len(), 1);
    }

    #[tokio::test]
    async fn event_cache_evicts_oldest_exchange() {
        let connector = FakeConnector::with_card(card());
        let manager = SessionManager::new(Arc::new(connector), SessionConfig {
            event_cache_limit: 2,
            ..SessionConfig::default()
        });
        let (tx, _rx) = mpsc::channel(64);
        manager.open(SID, tx).await;
        for id in ["a", "b", "a", "c"] {
            manager.send_message(SID, "hi", Some(id.into())).await.unwrap();
        }

        assert!(manager.events_for(SID, "a").await.unwrap().is_empty());
        assert_eq!(manager.events_for(SID, "b").await.unwrap().len(), 1);
        assert_eq!(manager.events_for(SID, "c").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn agent_card_route_moves_session_to_ready() {
        let mut h = Harness::new(FakeConnector::with_card(card())).await;
        let descriptor = h.manager.fetch_descriptor(SID, URL).await.unwrap();
        assert_eq!(descriptor.validation_errors.len(), 1);
        assert_eq!(h.manager.phase(SID).await.unwrap(), SessionPhase::Ready);

        let request = h.next_event("debug_log").await;
        assert_eq!(request["id"], HTTP_AGENT_CARD_ID);
        assert_eq!(request["type"], "request");
        let response = h.next_event("debug_log").await;
        assert_eq!(response["data"]["status"], 200);

        let err = h.manager.fetch_descriptor("nobody", URL).await.unwrap_err();
        assert!(matches!(err, Error::SessionNotFound(_)));
    }

    #[tokio::test]
    async fn debug_log_is_capped_and_clearable() {
        let connector = FakeConnector::with_card(card());
        let manager = SessionManager::new(Arc::new(connector), SessionConfig {
            debug_log_limit: 2,
            outbound_buffer: 64,
            ..SessionConfig::default()
        });
        let (tx, _rx) = mpsc::channel(64);
        manager.open(SID, tx).await;
        for _ in 0..3 {
            manager.fetch_descriptor(SID, URL).await.unwrap();
        }
        let log = manager.debug_log(SID).await.unwrap();
        assert_eq!(log.len(), 2);
        assert!(log.iter().all(|e| e.correlation_id == HTTP_AGENT_CARD_ID));

        manager.clear_debug_log(SID).await.unwrap();
        assert!(manager.debug_log(SID).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn close_cancels_in_flight_exchanges() {
        let mut h = Harness::initialized().await;
        h.manager.send_message(SID, "x", Some("c-1".into())).await.unwrap();
        let session = h.manager.get(SID).await.unwrap();
        h.manager.close(SID).await;
        assert_eq!(h.manager.count().await, 0);
        assert_eq!(session.lock().await.in_flight(), 0);

        h.client.push("c-1", Ok(agent_reply("late")));
        let frames = h.settle().await;
        assert!(frames.iter().all(|f| f["event"] != "agent_response"));
    }
}
