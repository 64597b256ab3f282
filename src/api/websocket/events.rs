//! WebSocket control messages
//!
//! Pushed weather events are sent as their plain JSON form; only the control
//! messages below carry a `type` tag.

use serde::{Deserialize, Serialize};

/// Client message types
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Ping for heartbeat
    Ping,
}

/// Welcome message sent on connection
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WelcomeMessage {
    #[serde(rename = "type")]
    pub msg_type: String,
    pub connection_id: String,
}

impl WelcomeMessage {
    pub fn new(connection_id: impl Into<String>) -> Self {
        Self {
            msg_type: "connected".to_string(),
            connection_id: connection_id.into(),
        }
    }
}

/// Pong response message
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PongMessage {
    #[serde(rename = "type")]
    pub msg_type: String,
}

impl Default for PongMessage {
    fn default() -> Self {
        Self {
            msg_type: "pong".to_string(),
        }
    }
}
