use std::{net::SocketAddr, sync::Arc};

use {
    anyhow::Context,
    axum::{
        Router,
        extract::{ConnectInfo, State, WebSocketUpgrade},
        http::StatusCode,
        response::{IntoResponse, Json, Response},
        routing::{get, post},
    },
    inspector_a2a::{AgentConnector, HttpConnector},
    inspector_config::InspectorConfig,
    inspector_protocol::PROTOCOL_VERSION,
    serde::Deserialize,
    serde_json::json,
    tower_http::{
        cors::{Any, CorsLayer},
        trace::TraceLayer,
    },
    tracing::info,
};

use crate::{error::Error, state::GatewayState, ws::handle_connection};

// ── Router ───────────────────────────────────────────────────────────────────

/// Build the gateway router (shared between production startup and tests).
pub fn build_gateway_app(state: Arc<GatewayState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/ws", get(ws_upgrade_handler))
        .route("/agent-card", post(agent_card_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Bind the listener and serve until the process is stopped.
pub async fn start_gateway(config: InspectorConfig) -> anyhow::Result<()> {
    let connector: Arc<dyn AgentConnector> = Arc::new(HttpConnector::from_config(&config.agent));
    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port)
        .parse()
        .context("invalid bind address")?;
    let state = GatewayState::new(config, connector);
    let app = build_gateway_app(Arc::clone(&state));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    let lines = [
        format!("a2a-inspector gateway v{}", state.version),
        format!("protocol v{PROTOCOL_VERSION}, listening on {addr}"),
        format!("streaming: {}", state.config.agent.streaming),
    ];
    let width = lines.iter().map(|l| l.len()).max().unwrap_or(0) + 4;
    info!("┌{}┐", "─".repeat(width));
    for line in &lines {
        info!("│  {:<w$}│", line, w = width - 2);
    }
    info!("└{}┘", "─".repeat(width));

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("gateway server failed")?;
    Ok(())
}

// ── Handlers ─────────────────────────────────────────────────────────────────

async fn health_handler(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    let count = state.client_count().await;
    Json(json!({
        "status": "ok",
        "version": state.version,
        "protocol": PROTOCOL_VERSION,
        "connections": count,
    }))
}

async fn ws_upgrade_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<Arc<GatewayState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state, addr))
}

#[derive(Debug, Default, Deserialize)]
struct AgentCardRequest {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    sid: Option<String>,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

/// Fetch an agent card for the page of session `sid`.
async fn agent_card_handler(State(state): State<Arc<GatewayState>>, body: axum::body::Bytes) -> Response {
    let Ok(request) = serde_json::from_slice::<AgentCardRequest>(&body) else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid request body.");
    };
    let url = request.url.filter(|u| !u.trim().is_empty());
    let sid = request.sid.filter(|s| !s.trim().is_empty());
    let (Some(url), Some(sid)) = (url, sid) else {
        return error_response(StatusCode::BAD_REQUEST, "Agent URL and SID are required.");
    };

    match state.sessions.fetch_descriptor(&sid, &url).await {
        Ok(descriptor) => Json(json!({
            "card": descriptor.raw,
            "validation_errors": descriptor.validation_errors,
        }))
        .into_response(),
        Err(Error::SessionNotFound(sid)) => {
            error_response(StatusCode::NOT_FOUND, format!("unknown session '{sid}'"))
        },
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}
