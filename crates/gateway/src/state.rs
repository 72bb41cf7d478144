use std::{collections::HashMap, net::SocketAddr, sync::Arc, time::Instant};

use {
    inspector_a2a::AgentConnector,
    inspector_config::InspectorConfig,
    tokio::sync::RwLock,
};

use crate::session::SessionManager;

// ── Connected client ─────────────────────────────────────────────────────────

/// A WebSocket client currently connected to the gateway.
#[derive(Debug)]
pub struct ConnectedClient {
    pub conn_id: String,
    pub connected_at: Instant,
    pub remote_addr: Option<SocketAddr>,
}

// ── Gateway state ────────────────────────────────────────────────────────────

/// Mutable gateway bookkeeping, behind a single lock.
#[derive(Default)]
pub struct GatewayInner {
    pub clients: HashMap<String, ConnectedClient>,
}

impl GatewayInner {
    fn register_client(&mut self, client: ConnectedClient) -> usize {
        self.clients.insert(client.conn_id.clone(), client);
        self.clients.len()
    }

    fn remove_client(&mut self, conn_id: &str) -> (Option<ConnectedClient>, usize) {
        let removed = self.clients.remove(conn_id);
        (removed, self.clients.len())
    }
}

/// Shared state of the running gateway.
pub struct GatewayState {
    pub version: String,
    pub config: InspectorConfig,
    pub sessions: SessionManager,
    pub inner: RwLock<GatewayInner>,
}

impl GatewayState {
    pub fn new(config: InspectorConfig, connector: Arc<dyn AgentConnector>) -> Arc<Self> {
        let sessions = SessionManager::new(connector, config.session.clone());
        Arc::new(Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            config,
            sessions,
            inner: RwLock::new(GatewayInner::default()),
        })
    }

    pub async fn register_client(&self, client: ConnectedClient) {
        let conn_id = client.conn_id.clone();
        let count = self.inner.write().await.register_client(client);
        tracing::debug!(%conn_id, connections = count, "client registered");
    }

    pub async fn remove_client(&self, conn_id: &str) -> Option<ConnectedClient> {
        let (removed, count) = self.inner.write().await.remove_client(conn_id);
        tracing::debug!(conn_id, connections = count, "client removed");
        removed
    }

    pub async fn client_count(&self) -> usize {
        self.inner.read().await.clients.len()
    }
}
