//! Connection hub: live WebSocket senders keyed by connection id

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{TelemetryError, TelemetryResult};
use crate::fanout::PushChannel;

/// Payloads buffered per connection before pushes start waiting
pub const DEFAULT_CONNECTION_BUFFER: usize = 256;

/// Registry of open sockets, and the push channel that reaches them
pub struct ConnectionHub {
    connections: RwLock<HashMap<String, mpsc::Sender<Vec<u8>>>>,
    counter: AtomicU64,
    buffer: usize,
}

impl Default for ConnectionHub {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionHub {
    pub fn new() -> Self {
        Self::with_buffer(DEFAULT_CONNECTION_BUFFER)
    }

    pub fn with_buffer(buffer: usize) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            counter: AtomicU64::new(0),
            buffer: buffer.max(1),
        }
    }

    /// Unique id: start time in millis plus a per-hub counter
    fn next_connection_id(&self) -> String {
        let seq = self.counter.fetch_add(1, Ordering::SeqCst);
        let millis = chrono::Utc::now().timestamp_millis();
        format!("conn_{:x}{:04x}", millis, seq)
    }

    /// Open a channel for a new socket
    pub fn attach(&self) -> (String, mpsc::Receiver<Vec<u8>>) {
        let connection_id = self.next_connection_id();
        let (tx, rx) = mpsc::channel(self.buffer);
        self.connections.write().insert(connection_id.clone(), tx);
        debug!(connection_id = %connection_id, "connection attached");
        (connection_id, rx)
    }

    /// Drop a socket's channel; returns whether it was attached
    pub fn detach(&self, connection_id: &str) -> bool {
        let removed = self.connections.write().remove(connection_id).is_some();
        if removed {
            debug!(connection_id, "connection detached");
        }
        removed
    }

    pub fn is_connected(&self, connection_id: &str) -> bool {
        self.connections.read().contains_key(connection_id)
    }

    pub fn connection_count(&self) -> usize {
        self.connections.read().len()
    }
}

#[async_trait]
impl PushChannel for ConnectionHub {
    async fn post_to_connection(&self, connection_id: &str, payload: &[u8]) -> TelemetryResult<()> {
        let sender = self
            .connections
            .read()
            .get(connection_id)
            .cloned()
            .ok_or_else(|| TelemetryError::push(connection_id, "unknown connection"))?;

        sender
            .send(payload.to_vec())
            .await
            .map_err(|_| TelemetryError::push(connection_id, "connection closed"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_push_reaches_attached_connection() {
        let hub = ConnectionHub::new();
        let (id, mut rx) = hub.attach();
        assert!(hub.is_connected(&id));

        hub.post_to_connection(&id, b"{\"Value\":1}").await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), b"{\"Value\":1}".to_vec());
    }

    #[tokio::test]
    async fn test_unknown_or_closed_connection_fails() {
        let hub = ConnectionHub::new();
        let err = hub.post_to_connection("nobody", b"x").await.unwrap_err();
        assert!(matches!(err, TelemetryError::PushFailure { .. }));

        let (id, rx) = hub.attach();
        drop(rx);
        assert!(hub.post_to_connection(&id, b"x").await.is_err());
    }

    #[test]
    fn test_ids_are_unique_and_detach_is_idempotent() {
        let hub = ConnectionHub::new();
        let (a, _rx_a) = hub.attach();
        let (b, _rx_b) = hub.attach();
        assert_ne!(a, b);
        assert_eq!(hub.connection_count(), 2);

        assert!(hub.detach(&a));
        assert!(!hub.detach(&a));
        assert_eq!(hub.connection_count(), 1);
    }
}
