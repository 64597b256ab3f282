//! Live subscriber sessions, kept as rows in the time-series store

use tracing::{debug, info};

use crate::error::TelemetryResult;
use crate::store::TimeSeriesStore;

/// Registry of live connection ids
///
/// A connection is either registered or not; registering twice overwrites the
/// row and unregistering an unknown id is a no-op.
#[derive(Clone)]
pub struct SessionRegistry {
    store: TimeSeriesStore,
}

impl SessionRegistry {
    pub fn new(store: TimeSeriesStore) -> Self {
        Self { store }
    }

    /// Record a connection as live
    pub async fn register(&self, connection_id: &str) -> TelemetryResult<()> {
        self.store.put_session(connection_id).await?;
        info!(connection_id, "session registered");
        Ok(())
    }

    /// Forget a connection
    pub async fn unregister(&self, connection_id: &str) -> TelemetryResult<()> {
        self.store.delete_session(connection_id).await?;
        info!(connection_id, "session unregistered");
        Ok(())
    }

    /// Snapshot of every registered connection id
    pub async fn list_active(&self) -> TelemetryResult<Vec<String>> {
        let sessions = self.store.list_sessions().await?;
        debug!(count = sessions.len(), "active sessions");
        Ok(sessions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::store::MemoryBackend;

    fn registry() -> SessionRegistry {
        SessionRegistry::new(TimeSeriesStore::new(Arc::new(MemoryBackend::new())))
    }

    #[tokio::test]
    async fn test_register_and_list() {
        let registry = registry();
        registry.register("conn-a").await.unwrap();
        registry.register("conn-b").await.unwrap();

        let mut active = registry.list_active().await.unwrap();
        active.sort();
        assert_eq!(active, vec!["conn-a", "conn-b"]);
    }

    #[tokio::test]
    async fn test_register_twice_is_overwrite() {
        let registry = registry();
        registry.register("conn-a").await.unwrap();
        registry.register("conn-a").await.unwrap();
        assert_eq!(registry.list_active().await.unwrap(), vec!["conn-a"]);
    }

    #[tokio::test]
    async fn test_unregister_unknown_is_noop() {
        let registry = registry();
        registry.register("conn-a").await.unwrap();

        registry.unregister("never-seen").await.unwrap();
        assert_eq!(registry.list_active().await.unwrap(), vec!["conn-a"]);

        registry.unregister("conn-a").await.unwrap();
        registry.unregister("conn-a").await.unwrap();
        assert!(registry.list_active().await.unwrap().is_empty());
    }
}
