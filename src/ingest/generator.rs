//! Random weather data generator
//!
//! Produces one reading of every event type per device and periodically feeds
//! a fleet's worth of them through the ingestion batcher.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::batcher::IngestionBatcher;
use crate::types::{EventType, WeatherEvent};

/// Generator schedule and fleet
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorConfig {
    pub interval: Duration,
    pub first_device: i64,
    pub device_count: usize,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            first_device: 1000,
            device_count: 10,
        }
    }
}

/// A plausible reading for the given event type
fn random_value<R: Rng + ?Sized>(rng: &mut R, event_type: EventType) -> f64 {
    match event_type {
        EventType::Pressure => rng.gen_range(950..1050) as f64,
        EventType::Temperature => rng.gen_range(-10.0..30.0),
        EventType::Humidity => rng.gen_range(0.0..100.0),
        EventType::WindSpeed => rng.gen_range(0..50) as f64,
        EventType::WindDirection => rng.gen_range(0.0..360.0),
    }
}

/// One reading of every event type for a device, all stamped `now`
pub fn random_events(device_id: i64, now: DateTime<Utc>) -> Vec<WeatherEvent> {
    let mut rng = rand::thread_rng();
    EventType::ALL
        .iter()
        .map(|&event_type| {
            WeatherEvent::new(device_id, now, event_type, random_value(&mut rng, event_type))
        })
        .collect()
}

/// Readings for `device_count` consecutive devices starting at `first_device`
pub fn fleet_events(first_device: i64, device_count: usize, now: DateTime<Utc>) -> Vec<WeatherEvent> {
    (0..device_count as i64)
        .flat_map(|offset| random_events(first_device + offset, now))
        .collect()
}

/// Spawn a task that ingests one fleet reading per tick until `shutdown` flips
pub fn spawn_generator(
    batcher: IngestionBatcher,
    config: GeneratorConfig,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            interval_secs = config.interval.as_secs(),
            first_device = config.first_device,
            devices = config.device_count,
            "data generator started"
        );
        let mut ticker = tokio::time::interval(config.interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let events = fleet_events(config.first_device, config.device_count, Utc::now());
                    let report = batcher.ingest_all(&events).await;
                    if report.is_partial() {
                        warn!(
                            failed_chunks = report.failed_chunks.len(),
                            failed_events = report.failed_events(),
                            "generated readings partially ingested"
                        );
                    } else {
                        debug!(written = report.written, "generated readings ingested");
                    }
                }
                _ = shutdown.changed() => {
                    debug!("data generator: shutdown requested");
                    break;
                }
            }
        }

        info!("data generator stopped");
    })
}
