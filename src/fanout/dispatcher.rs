//! Fan-out dispatcher: pushes new events to every live session
//!
//! Each (session, event) pair is one push job. Jobs run as spawned tasks gated
//! by a semaphore, and the whole call is bounded by a time budget; jobs still
//! running at the deadline are aborted and reported as abandoned.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, error, info, warn};

use crate::error::{TelemetryError, TelemetryResult};
use crate::sessions::SessionRegistry;
use crate::types::WeatherEvent;

/// Transport that delivers a payload to one live connection
///
/// Any failure is reported as an error; the cause is not distinguished.
#[async_trait]
pub trait PushChannel: Send + Sync {
    async fn post_to_connection(&self, connection_id: &str, payload: &[u8]) -> TelemetryResult<()>;
}

/// Dispatcher limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchConfig {
    /// Upper bound on a whole dispatch call
    pub time_budget: Duration,
    /// Maximum push tasks alive at once
    pub max_in_flight: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            time_budget: Duration::from_secs(10),
            max_in_flight: 64,
        }
    }
}

/// Outcome of one dispatch call
///
/// `delivered + failed + abandoned == jobs`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    /// Sessions in the snapshot
    pub sessions: usize,
    /// Events with a payload
    pub events: usize,
    /// Push jobs (sessions x events)
    pub jobs: usize,
    /// Jobs whose push was started
    pub attempted: usize,
    pub delivered: usize,
    pub failed: usize,
    /// Jobs not finished by the deadline
    pub abandoned: usize,
    pub timed_out: bool,
}

#[derive(Default)]
struct Counters {
    attempted: AtomicUsize,
    delivered: AtomicUsize,
    failed: AtomicUsize,
}

/// Pushes events to every live session under a time budget
pub struct FanoutDispatcher {
    registry: SessionRegistry,
    channel: Arc<dyn PushChannel>,
    config: DispatchConfig,
    in_flight: Arc<Semaphore>,
}

impl FanoutDispatcher {
    pub fn new(registry: SessionRegistry, channel: Arc<dyn PushChannel>) -> Self {
        Self::with_config(registry, channel, DispatchConfig::default())
    }

    pub fn with_config(
        registry: SessionRegistry,
        channel: Arc<dyn PushChannel>,
        config: DispatchConfig,
    ) -> Self {
        let permits = config.max_in_flight.max(1);
        Self {
            registry,
            channel,
            config,
            in_flight: Arc::new(Semaphore::new(permits)),
        }
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Dispatch with the configured time budget
    pub async fn dispatch_default(&self, events: &[WeatherEvent]) -> TelemetryResult<DispatchReport> {
        self.dispatch(events, self.config.time_budget).await
    }

    /// Push every event to every live session
    ///
    /// Only a failed session snapshot is returned as an error; push failures
    /// are logged and counted in the report.
    pub async fn dispatch(
        &self,
        events: &[WeatherEvent],
        time_budget: Duration,
    ) -> TelemetryResult<DispatchReport> {
        let deadline = Instant::now() + time_budget;

        let payloads: Vec<Arc<[u8]>> = events
            .iter()
            .filter_map(|event| match serde_json::to_vec(event) {
                Ok(bytes) => Some(Arc::from(bytes)),
                Err(e) => {
                    warn!(device_id = event.device_id, error = %e, "failed to encode event, skipping");
                    None
                }
            })
            .collect();
        if payloads.is_empty() {
            debug!("no events to dispatch");
            return Ok(DispatchReport::default());
        }

        let sessions = timeout_at(deadline, self.registry.list_active())
            .await
            .map_err(|_| TelemetryError::store("session snapshot timed out"))??;

        let mut report = DispatchReport {
            sessions: sessions.len(),
            events: payloads.len(),
            jobs: sessions.len() * payloads.len(),
            ..Default::default()
        };
        if sessions.is_empty() {
            debug!(events = payloads.len(), "no live sessions, nothing to push");
            return Ok(report);
        }

        let counters = Arc::new(Counters::default());
        let mut tasks = JoinSet::new();

        let run = async {
            for connection_id in &sessions {
                let connection_id: Arc<str> = Arc::from(connection_id.as_str());
                for payload in &payloads {
                    let Ok(permit) = self.in_flight.clone().acquire_owned().await else {
                        error!("push semaphore closed");
                        return;
                    };
                    let channel = self.channel.clone();
                    let counters = counters.clone();
                    let connection_id = connection_id.clone();
                    let payload = payload.clone();

                    tasks.spawn(async move {
                        let _permit = permit;
                        counters.attempted.fetch_add(1, Ordering::Relaxed);
                        match channel.post_to_connection(&connection_id, &payload).await {
                            Ok(()) => {
                                counters.delivered.fetch_add(1, Ordering::Relaxed);
                            }
                            Err(e) => {
                                warn!(connection_id = %connection_id, error = %e, "push failed");
                                counters.failed.fetch_add(1, Ordering::Relaxed);
                            }
                        }
                    });
                }
            }

            while let Some(result) = tasks.join_next().await {
                if let Err(e) = result {
                    error!(error = %e, "push task panicked");
                }
            }
        };

        if timeout_at(deadline, run).await.is_err() {
            report.timed_out = true;
            tasks.abort_all();
            // Wait for aborted tasks to unwind so the counters are final
            while tasks.join_next().await.is_some() {}
        }

        report.attempted = counters.attempted.load(Ordering::Relaxed);
        report.delivered = counters.delivered.load(Ordering::Relaxed);
        report.failed = counters.failed.load(Ordering::Relaxed);
        report.abandoned = report.jobs - report.delivered - report.failed;

        if report.timed_out {
            warn!(
                jobs = report.jobs,
                delivered = report.delivered,
                failed = report.failed,
                abandoned = report.abandoned,
                "dispatch hit its time budget"
            );
        } else {
            info!(
                sessions = report.sessions,
                events = report.events,
                delivered = report.delivered,
                failed = report.failed,
                "dispatch finished"
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    use parking_lot::Mutex;

    use crate::store::{MemoryBackend, TimeSeriesStore};
    use crate::types::EventType;

    /// Records pushes; fails for listed ids; sleeps for slow ids
    #[derive(Default)]
    struct MockChannel {
        pushes: Mutex<Vec<(String, Vec<u8>)>>,
        failing: HashSet<String>,
        slow: HashSet<String>,
    }

    #[async_trait]
    impl PushChannel for MockChannel {
        async fn post_to_connection(&self, connection_id: &str, payload: &[u8]) -> TelemetryResult<()> {
            if self.slow.contains(connection_id) {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
            if self.failing.contains(connection_id) {
                return Err(TelemetryError::push(connection_id, "gone"));
            }
            self.pushes
                .lock()
                .push((connection_id.to_string(), payload.to_vec()));
            Ok(())
        }
    }

    async fn setup(
        sessions: &[&str],
        channel: MockChannel,
    ) -> (Arc<MockChannel>, SessionRegistry, FanoutDispatcher) {
        let registry = SessionRegistry::new(TimeSeriesStore::new(Arc::new(MemoryBackend::new())));
        for id in sessions {
            registry.register(id).await.unwrap();
        }
        let channel = Arc::new(channel);
        let dispatcher = FanoutDispatcher::new(registry.clone(), channel.clone());
        (channel, registry, dispatcher)
    }

    fn event(secs: i64) -> WeatherEvent {
        WeatherEvent::at_unix(7, secs, EventType::Temperature, 21.0).unwrap()
    }

    #[tokio::test]
    async fn test_zero_sessions_zero_pushes() {
        let (channel, _, dispatcher) = setup(&[], MockChannel::default()).await;
        let report = dispatcher
            .dispatch(&[event(1), event(2)], Duration::from_secs(10))
            .await
            .unwrap();

        assert_eq!(report.sessions, 0);
        assert_eq!(report.jobs, 0);
        assert_eq!(report.attempted, 0);
        assert!(channel.pushes.lock().is_empty());
    }

    #[tokio::test]
    async fn test_each_session_gets_each_event() {
        let (channel, _, dispatcher) = setup(&["a", "b"], MockChannel::default()).await;
        let e = event(100);
        let report = dispatcher.dispatch(&[e.clone()], Duration::from_secs(10)).await.unwrap();

        assert_eq!(report.jobs, 2);
        assert_eq!(report.attempted, 2);
        assert_eq!(report.delivered, 2);
        assert!(!report.timed_out);

        let pushes = channel.pushes.lock();
        let mut ids: Vec<&str> = pushes.iter().map(|(id, _)| id.as_str()).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec!["a", "b"]);

        let decoded: WeatherEvent = serde_json::from_slice(&pushes[0].1).unwrap();
        assert_eq!(decoded, e);
    }

    #[tokio::test]
    async fn test_failed_push_is_isolated_and_session_kept() {
        let channel = MockChannel {
            failing: HashSet::from(["b".to_string()]),
            ..Default::default()
        };
        let (channel, registry, dispatcher) = setup(&["a", "b"], channel).await;

        let report = dispatcher
            .dispatch(&[event(1), event(2)], Duration::from_secs(10))
            .await
            .unwrap();
        assert_eq!(report.jobs, 4);
        assert_eq!(report.delivered, 2);
        assert_eq!(report.failed, 2);
        assert_eq!(report.abandoned, 0);
        assert!(channel.pushes.lock().iter().all(|(id, _)| id == "a"));

        // A failed push does not unregister the session
        assert_eq!(registry.list_active().await.unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_push_is_abandoned_at_deadline() {
        let channel = MockChannel {
            slow: HashSet::from(["slow".to_string()]),
            ..Default::default()
        };
        let (channel, _, dispatcher) = setup(&["fast", "slow"], channel).await;

        let report = dispatcher.dispatch(&[event(1)], Duration::from_secs(1)).await.unwrap();
        assert!(report.timed_out);
        assert_eq!(report.jobs, 2);
        assert_eq!(report.delivered, 1);
        assert_eq!(report.abandoned, 1);
        assert_eq!(channel.pushes.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_in_flight_is_bounded() {
        struct CountingChannel {
            current: AtomicUsize,
            peak: AtomicUsize,
        }

        #[async_trait]
        impl PushChannel for CountingChannel {
            async fn post_to_connection(&self, _: &str, _: &[u8]) -> TelemetryResult<()> {
                let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
                self.peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                self.current.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            }
        }

        let registry = SessionRegistry::new(TimeSeriesStore::new(Arc::new(MemoryBackend::new())));
        for i in 0..10 {
            registry.register(&format!("conn-{}", i)).await.unwrap();
        }
        let channel = Arc::new(CountingChannel {
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let config = DispatchConfig {
            max_in_flight: 3,
            ..Default::default()
        };
        let dispatcher = FanoutDispatcher::with_config(registry, channel.clone(), config);

        let events: Vec<WeatherEvent> = (0..4).map(event).collect();
        let report = dispatcher.dispatch_default(&events).await.unwrap();
        assert_eq!(report.delivered, 40);
        assert!(channel.peak.load(Ordering::SeqCst) <= 3);
    }
}
