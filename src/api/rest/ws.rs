use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::SinkExt;
use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::debug;

use crate::realtime::Outbound;
use crate::state::AppState;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();
    let connection_id = state.ws.accept(outbound_tx);

    let mut send_task = tokio::spawn(async move {
        while let Some(outbound) = outbound_rx.recv().await {
            let frame = match outbound {
                Outbound::Text(text) => Message::Text(text),
                Outbound::Ping => Message::Ping(Vec::new()),
                Outbound::Close => {
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
            };

            if sender.send(frame).await.is_err() {
                break;
            }
        }
    });

    let registry = state.ws.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = receiver.next().await {
            match message {
                Message::Text(text) => registry.handle_text(&connection_id, &text),
                // axum answers pings itself; both directions prove the peer is alive
                Message::Pong(_) | Message::Ping(_) => registry.mark_alive(&connection_id),
                Message::Binary(_) => debug!(connection_id = %connection_id, "ignoring binary frame"),
                Message::Close(_) => break,
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.ws.disconnect(&connection_id);
}
