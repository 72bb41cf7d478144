//! WebSocket transport: one connection, one inspector session.
//!
//! Inbound `req` frames are routed to the [`SessionManager`](crate::session::SessionManager)
//! and acknowledged with a `res` frame. Everything the session produces
//! (`agent_response`, `debug_log`, ...) travels as `event` frames through the
//! same bounded outbound channel.

use std::{net::SocketAddr, sync::Arc, time::Instant};

use {
    axum::extract::ws::{Message, WebSocket},
    futures::{SinkExt, StreamExt},
    inspector_protocol::{
        CorrelationParams, ErrorShape, InitializeClientParams, MAX_PAYLOAD_BYTES, RequestFrame,
        ResponseFrame, SendMessageParams, error_codes, methods,
    },
    serde::de::DeserializeOwned,
    serde_json::{Value, json},
    tokio::sync::mpsc,
    tracing::{debug, info, warn},
};

use crate::state::{ConnectedClient, GatewayState};

/// Drive one WebSocket connection until the peer goes away.
pub async fn handle_connection(socket: WebSocket, state: Arc<GatewayState>, remote_addr: SocketAddr) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (tx, mut rx) = mpsc::channel::<String>(state.config.session.outbound_buffer.max(1));

    let write_conn_id = conn_id.clone();
    let write_loop = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if ws_tx.send(Message::Text(text.into())).await.is_err() {
                debug!(conn_id = %write_conn_id, "websocket send failed");
                break;
            }
        }
    });

    state
        .register_client(ConnectedClient {
            conn_id: conn_id.clone(),
            connected_at: Instant::now(),
            remote_addr: Some(remote_addr),
        })
        .await;
    state.sessions.open(&conn_id, tx.clone()).await;
    info!(%conn_id, %remote_addr, "client connected");

    while let Some(msg) = ws_rx.next().await {
        let text = match msg {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                debug!(%conn_id, error = %e, "websocket receive failed");
                break;
            },
        };
        if text.len() > MAX_PAYLOAD_BYTES {
            warn!(%conn_id, size = text.len(), "frame too large");
            send_response(
                &tx,
                ResponseFrame::err(
                    "",
                    ErrorShape::new(error_codes::PAYLOAD_TOO_LARGE, "frame exceeds payload limit"),
                ),
            );
            continue;
        }
        let frame = match serde_json::from_str::<RequestFrame>(text.as_str()) {
            Ok(frame) if frame.r#type == "req" => frame,
            Ok(frame) => {
                send_response(
                    &tx,
                    ResponseFrame::err(
                        frame.id,
                        ErrorShape::new(error_codes::INVALID_REQUEST, "expected a 'req' frame"),
                    ),
                );
                continue;
            },
            Err(e) => {
                send_response(
                    &tx,
                    ResponseFrame::err(
                        "",
                        ErrorShape::new(error_codes::INVALID_REQUEST, format!("invalid frame: {e}")),
                    ),
                );
                continue;
            },
        };
        debug!(%conn_id, id = %frame.id, method = %frame.method, "request");

        if frame.method == methods::INITIALIZE_CLIENT {
            start_initialize(&state, &conn_id, frame, &tx).await;
        } else {
            let response = handle_request(&state, &conn_id, frame).await;
            send_response(&tx, response);
        }
    }

    state.sessions.close(&conn_id).await;
    state.remove_client(&conn_id).await;
    write_loop.abort();
    info!(%conn_id, "client disconnected");
}

fn send_response(tx: &mpsc::Sender<String>, response: ResponseFrame) {
    match serde_json::to_string(&response) {
        Ok(text) => {
            if tx.try_send(text).is_err() {
                warn!(id = %response.id, "outbound buffer full or closed, dropping response");
            }
        },
        Err(e) => warn!(error = %e, "failed to serialize response frame"),
    }
}

/// Claim the session for an `initialize_client` request right away, then fetch
/// the card and bind the client in the background so reading goes on.
///
/// Requests claim the session in arrival order: the last one read wins even
/// when an earlier one's fetch completes later.
async fn start_initialize(
    state: &Arc<GatewayState>,
    sid: &str,
    frame: RequestFrame,
    tx: &mpsc::Sender<String>,
) {
    let RequestFrame { id, params, .. } = frame;
    let params: InitializeClientParams = match parse_params(params) {
        Ok(params) => params,
        Err(error) => {
            send_response(tx, ResponseFrame::err(id, error));
            return;
        },
    };
    let generation = match state.sessions.begin_initialize(sid, &params.url).await {
        Ok(Some(generation)) => generation,
        Ok(None) => {
            send_response(tx, ResponseFrame::ok(id, json!({ "url": params.url })));
            return;
        },
        Err(e) => {
            send_response(tx, ResponseFrame::err(id, e.to_shape()));
            return;
        },
    };

    let state = Arc::clone(state);
    let sid = sid.to_string();
    let tx = tx.clone();
    tokio::spawn(async move {
        let response = match state
            .sessions
            .finish_initialize(&sid, &params.url, generation)
            .await
        {
            Ok(()) => ResponseFrame::ok(id, json!({ "url": params.url })),
            Err(e) => ResponseFrame::err(id, e.to_shape()),
        };
        send_response(&tx, response);
    });
}

fn parse_params<T: DeserializeOwned>(params: Option<Value>) -> Result<T, ErrorShape> {
    serde_json::from_value(params.unwrap_or_else(|| json!({})))
        .map_err(|e| ErrorShape::new(error_codes::INVALID_REQUEST, format!("invalid params: {e}")))
}

/// Run one command and build its acknowledgement.
pub async fn handle_request(state: &GatewayState, sid: &str, frame: RequestFrame) -> ResponseFrame {
    let RequestFrame {
        id, method, params, ..
    } = frame;
    match dispatch(state, sid, &method, params).await {
        Ok(payload) => ResponseFrame::ok(id, payload),
        Err(error) => ResponseFrame::err(id, error),
    }
}

async fn dispatch(
    state: &GatewayState,
    sid: &str,
    method: &str,
    params: Option<Value>,
) -> Result<Value, ErrorShape> {
    let sessions = &state.sessions;
    match method {
        methods::INITIALIZE_CLIENT => {
            let params: InitializeClientParams = parse_params(params)?;
            sessions
                .initialize_client(sid, &params.url)
                .await
                .map_err(|e| e.to_shape())?;
            Ok(json!({ "url": params.url }))
        },
        methods::SEND_MESSAGE => {
            let params: SendMessageParams = parse_params(params)?;
            let id = sessions
                .send_message(sid, &params.text, params.id)
                .await
                .map_err(|e| e.to_shape())?;
            Ok(json!({ "id": id }))
        },
        methods::CANCEL_MESSAGE => {
            let params: CorrelationParams = parse_params(params)?;
            sessions
                .cancel_message(sid, &params.id)
                .await
                .map_err(|e| e.to_shape())?;
            Ok(json!({ "id": params.id }))
        },
        methods::CLEAR_DEBUG_LOG => {
            sessions.clear_debug_log(sid).await.map_err(|e| e.to_shape())?;
            Ok(json!({}))
        },
        methods::GET_DEBUG_LOG => {
            let entries = sessions.debug_log(sid).await.map_err(|e| e.to_shape())?;
            Ok(json!({ "entries": entries }))
        },
        methods::GET_EVENT_JSON => {
            let params: CorrelationParams = parse_params(params)?;
            let events = sessions
                .events_for(sid, &params.id)
                .await
                .map_err(|e| e.to_shape())?;
            Ok(json!({ "id": params.id, "events": events }))
        },
        other => Err(ErrorShape::new(
            error_codes::UNKNOWN_METHOD,
            format!("unknown method '{other}'"),
        )),
    }
}
