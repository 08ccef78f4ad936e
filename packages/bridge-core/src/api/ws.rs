//! ACS media WebSocket ingress handler.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::session::{ingress, AcsOutgoing, Session};

use super::AppState;

pub async fn ws_media_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let call_connection_id = header_value(&headers, "x-ms-call-connection-id");
    let correlation_id = header_value(&headers, "x-ms-call-correlation-id");
    ws.on_upgrade(move |socket| handle_socket(socket, state, call_connection_id, correlation_id))
}

fn header_value(headers: &HeaderMap, name: &str) -> String {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

async fn handle_socket(
    socket: WebSocket,
    state: AppState,
    call_connection_id: String,
    correlation_id: String,
) {
    log::info!("call {call_connection_id}: media websocket connected");

    let (mut ws_sink, mut ws_stream) = socket.split();
    let (acs_tx, mut acs_rx) = mpsc::unbounded_channel::<AcsOutgoing>();

    let session = Session::new(
        call_connection_id.clone(),
        correlation_id,
        state.config.clone(),
        state.grounding.clone(),
        acs_tx,
        state.shutdown.read().clone(),
    );
    state.calls.insert(call_connection_id.clone(), session.clone());

    let writer_task = tokio::spawn(async move {
        while let Some(frame) = acs_rx.recv().await {
            let Ok(text) = serde_json::to_string(&frame) else {
                continue;
            };
            if ws_sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(msg) = ws_stream.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                ingress::handle_incoming(&session, &text).await;
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                log::warn!("call {call_connection_id}: websocket error: {e}");
                break;
            }
        }
    }

    session.close();
    writer_task.abort();
    cleanup(&session).await;
    state.calls.remove(&call_connection_id);
    log::info!("call {call_connection_id}: media websocket closed");
}

async fn cleanup(session: &Arc<Session>) {
    session.cancel_fallback_timer().await;
    if let Some(mut client) = session.aoai.client.lock().await.take() {
        client.close().await;
    }
}
