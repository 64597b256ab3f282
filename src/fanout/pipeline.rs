//! Change pipeline: store change feed → consumer → dispatcher

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, warn};

use super::dispatcher::{DispatchReport, FanoutDispatcher};
use crate::changes::ChangeConsumer;
use crate::types::ChangeBatch;

/// Long-running task feeding committed events to live sessions
///
/// Batches are handled one at a time, in feed order.
pub struct ChangePipeline {
    consumer: ChangeConsumer,
    dispatcher: Arc<FanoutDispatcher>,
    time_budget: Duration,
}

impl ChangePipeline {
    /// Create a pipeline using the dispatcher's configured budget
    pub fn new(dispatcher: Arc<FanoutDispatcher>) -> Self {
        let time_budget = dispatcher.config().time_budget;
        Self {
            consumer: ChangeConsumer::new(),
            dispatcher,
            time_budget,
        }
    }

    /// Consume and dispatch one change batch
    ///
    /// Returns `None` when the batch held nothing deliverable or the session
    /// snapshot failed.
    pub async fn handle_batch(&self, batch: &ChangeBatch) -> Option<DispatchReport> {
        let events = self.consumer.consume(batch);
        if events.is_empty() {
            debug!(records = batch.len(), "change batch without events, dropped");
            return None;
        }

        match self.dispatcher.dispatch(&events, self.time_budget).await {
            Ok(report) => Some(report),
            Err(e) => {
                error!(events = events.len(), error = %e, "dispatch failed");
                None
            }
        }
    }

    /// Run until the feed closes or `shutdown` flips
    pub async fn run(
        self,
        mut changes: broadcast::Receiver<ChangeBatch>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!(budget_ms = self.time_budget.as_millis() as u64, "change pipeline started");

        loop {
            tokio::select! {
                received = changes.recv() => {
                    match received {
                        Ok(batch) => {
                            self.handle_batch(&batch).await;
                        }
                        Err(broadcast::error::RecvError::Lagged(missed)) => {
                            warn!(missed, "change pipeline lagged, batches skipped");
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            debug!("change feed closed");
                            break;
                        }
                    }
                }
                _ = shutdown.changed() => {
                    debug!("change pipeline: shutdown requested");
                    break;
                }
            }
        }

        info!("change pipeline stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use crate::error::TelemetryResult;
    use crate::fanout::PushChannel;
    use crate::sessions::SessionRegistry;
    use crate::store::{MemoryBackend, TimeSeriesStore};
    use crate::types::{EventType, WeatherEvent};

    #[derive(Default)]
    struct RecordingChannel {
        payloads: Mutex<Vec<WeatherEvent>>,
    }

    #[async_trait]
    impl PushChannel for RecordingChannel {
        async fn post_to_connection(&self, _: &str, payload: &[u8]) -> TelemetryResult<()> {
            let event = serde_json::from_slice(payload)?;
            self.payloads.lock().push(event);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_session_writes_are_not_dispatched() {
        let store = TimeSeriesStore::new(Arc::new(MemoryBackend::new()));
        let registry = SessionRegistry::new(store.clone());
        let channel = Arc::new(RecordingChannel::default());
        let pipeline = ChangePipeline::new(Arc::new(FanoutDispatcher::new(registry.clone(), channel.clone())));

        let mut rx = store.subscribe_changes();
        registry.register("conn-1").await.unwrap();
        let batch = rx.recv().await.unwrap();

        assert!(pipeline.handle_batch(&batch).await.is_none());
        assert!(channel.payloads.lock().is_empty());
    }

    #[tokio::test]
    async fn test_run_delivers_and_stops_on_shutdown() {
        let store = TimeSeriesStore::new(Arc::new(MemoryBackend::new()));
        let registry = SessionRegistry::new(store.clone());
        registry.register("conn-1").await.unwrap();

        let channel = Arc::new(RecordingChannel::default());
        let pipeline = ChangePipeline::new(Arc::new(FanoutDispatcher::new(registry, channel.clone())));

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(pipeline.run(store.subscribe_changes(), rx));

        let event = WeatherEvent::at_unix(1001, 1000, EventType::Temperature, 20.5).unwrap();
        store.put(&event).await.unwrap();

        for _ in 0..100 {
            if !channel.payloads.lock().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(*channel.payloads.lock(), vec![event]);

        tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
