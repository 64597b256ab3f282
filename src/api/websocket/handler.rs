//! WebSocket connection handler

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use super::events::{ClientMessage, PongMessage, WelcomeMessage};
use super::state::AppState;

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle an individual WebSocket connection
async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>) {
    let (connection_id, mut pushes) = state.hub.attach();

    if let Err(e) = state.context.sessions.register(&connection_id).await {
        error!(connection_id = %connection_id, error = %e, "failed to register session");
        state.hub.detach(&connection_id);
        let _ = socket.send(Message::Close(None)).await;
        return;
    }

    let welcome = WelcomeMessage::new(connection_id.clone());
    let welcomed = match serde_json::to_string(&welcome) {
        Ok(json) => socket.send(Message::Text(json)).await.is_ok(),
        Err(_) => true,
    };
    if welcomed {
        serve_connection(&mut socket, &mut pushes).await;
    }

    state.hub.detach(&connection_id);
    if let Err(e) = state.context.sessions.unregister(&connection_id).await {
        warn!(connection_id = %connection_id, error = %e, "failed to unregister session");
    }
    debug!(connection_id = %connection_id, "connection closed");
}

async fn serve_connection(socket: &mut WebSocket, pushes: &mut mpsc::Receiver<Vec<u8>>) {
    loop {
        tokio::select! {
            // Pushed events to client
            payload = pushes.recv() => {
                match payload {
                    Some(bytes) => {
                        let text = String::from_utf8_lossy(&bytes).into_owned();
                        if socket.send(Message::Text(text)).await.is_err() {
                            break; // Client disconnected
                        }
                    }
                    None => break, // Detached from the hub
                }
            }

            // Handle client messages
            result = socket.recv() => {
                match result {
                    Some(Ok(msg)) => {
                        if !handle_client_message(msg, socket).await {
                            break;
                        }
                    }
                    Some(Err(_)) => break, // WebSocket error
                    None => break, // Client disconnected
                }
            }
        }
    }
}

/// Handle a message from the client
/// Returns false if the connection should be closed
async fn handle_client_message(msg: Message, socket: &mut WebSocket) -> bool {
    match msg {
        Message::Text(text) => {
            if let Ok(ClientMessage::Ping) = serde_json::from_str::<ClientMessage>(&text) {
                if let Ok(json) = serde_json::to_string(&PongMessage::default()) {
                    let _ = socket.send(Message::Text(json)).await;
                }
            }
            true
        }
        Message::Binary(_) => true, // Ignore binary messages
        Message::Ping(data) => {
            let _ = socket.send(Message::Pong(data)).await;
            true
        }
        Message::Pong(_) => true,
        Message::Close(_) => false, // Client requested close
    }
}
