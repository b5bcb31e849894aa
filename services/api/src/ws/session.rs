//! Lifecycle of one UI observer socket.

use crate::state::AppState;
use anyhow::Result;
use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt, stream::SplitSink};
use huddle_core::{UiEvent, broadcast::BOTH};
use std::sync::Arc;
use tracing::{Instrument, debug, error, info, info_span, warn};

/// Axum handler to upgrade an HTTP connection to a WebSocket.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (id, mut events) = state.connections.add();
    let span = info_span!("ui_socket", connection_id = %id);
    let (mut socket_tx, mut socket_rx) = socket.split();

    let greeting = UiEvent::Status {
        connected: state.primary_connected(),
        bot_type: BOTH.to_string(),
    };
    if let Err(e) = send_event(&mut socket_tx, &greeting).await {
        warn!(parent: &span, error = ?e, "Failed to greet UI connection");
        state.connections.remove(&id);
        return;
    }

    let writer = tokio::spawn(
        async move {
            while let Some(event) = events.recv().await {
                if let Err(e) = send_event(&mut socket_tx, &event).await {
                    debug!(error = ?e, "UI socket write failed");
                    break;
                }
            }
        }
        .instrument(span.clone()),
    );

    async {
        while let Some(message) = socket_rx.next().await {
            match message {
                Ok(Message::Text(text)) => debug!(%text, "Ignoring UI message"),
                Ok(Message::Close(_)) => {
                    info!("UI client sent close frame");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    error!("Error receiving from UI WebSocket: {:?}", e);
                    break;
                }
            }
        }
    }
    .instrument(span)
    .await;

    state.connections.remove(&id);
    writer.abort();
}

/// Serializes an event and writes it to the socket.
async fn send_event(socket_tx: &mut SplitSink<WebSocket, Message>, event: &UiEvent) -> Result<()> {
    let serialized = serde_json::to_string(event)?;
    socket_tx.send(Message::Text(serialized.into())).await?;
    Ok(())
}
