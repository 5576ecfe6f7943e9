//! WebSocket endpoint for audio streaming
//!
//! Protocol: the client sends binary PCM frames plus JSON control messages
//! (`end_of_speech`, `reset`); the server sends binary PCM frames plus JSON
//! control messages (`connected`, `status`, `done`). Each connection gets
//! its own session controller; the socket reader and writer are thin pumps
//! between the transport and the controller's channels.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use axum::{
    Router,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
    routing::get,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use super::AppState;
use crate::session::{OutboundMessage, SessionController, SessionEvent};

/// Incoming WebSocket control message from the client
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsIncoming {
    /// Explicit end of speech (button release)
    EndOfSpeech,
    /// Cancel everything and clear conversation state
    Reset,
}

/// Build the WebSocket router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ws/audio", get(ws_upgrade))
        .with_state(state)
}

/// Handle a WebSocket upgrade request
#[allow(clippy::unused_async)]
async fn ws_upgrade(State(state): State<Arc<AppState>>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Drive one WebSocket connection
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    state.connections.fetch_add(1, Ordering::Relaxed);
    let (mut sender, mut receiver) = socket.split();

    let (out_tx, mut out_rx) = mpsc::channel::<OutboundMessage>(64);
    let (event_tx, event_rx) = mpsc::channel::<SessionEvent>(64);

    let controller = SessionController::new(state.deps.clone(), out_tx, event_tx.clone());
    let session_id = controller.session_id().to_string();
    tracing::info!(session_id = %session_id, "client connected");

    let controller_task = tokio::spawn(controller.run(event_rx));

    // Writer: controller output → socket
    let mut send_task = tokio::spawn(async move {
        while let Some(message) = out_rx.recv().await {
            let ws_message = match message {
                OutboundMessage::Audio(pcm) => Message::Binary(pcm.into()),
                OutboundMessage::Control(control) => match serde_json::to_string(&control) {
                    Ok(text) => Message::Text(text.into()),
                    Err(e) => {
                        tracing::warn!(error = %e, "unserializable control message");
                        continue;
                    }
                },
            };
            if sender.send(ws_message).await.is_err() {
                break;
            }
        }
    });

    // Reader: socket → controller events
    let events = event_tx.clone();
    let reader_session_id = session_id.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = receiver.next().await {
            match message {
                Message::Binary(data) => {
                    if events.send(SessionEvent::Frame(data.to_vec())).await.is_err() {
                        break;
                    }
                }
                Message::Text(text) => match serde_json::from_str::<WsIncoming>(text.as_str()) {
                    Ok(WsIncoming::EndOfSpeech) => {
                        if events.send(SessionEvent::EndOfSpeech).await.is_err() {
                            break;
                        }
                    }
                    Ok(WsIncoming::Reset) => {
                        if events.send(SessionEvent::Reset).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        // Protocol errors are ignored; the connection stays open
                        tracing::warn!(
                            session_id = %reader_session_id,
                            error = %e,
                            "ignoring malformed client message"
                        );
                    }
                },
                Message::Close(_) => break,
                _ => {}
            }
        }
        let _ = events.send(SessionEvent::Closed).await;
    });

    // The reader ending (socket closed) lets the controller wind down and
    // drop its outbound sender, which ends the writer
    tokio::select! {
        _ = &mut recv_task => {}
        _ = &mut send_task => recv_task.abort(),
    }

    let _ = event_tx.send(SessionEvent::Closed).await;
    drop(event_tx);
    let _ = controller_task.await;
    send_task.abort();

    state.connections.fetch_sub(1, Ordering::Relaxed);
    tracing::info!(session_id = %session_id, "client disconnected");
}
