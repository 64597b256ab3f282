//! Weather Telemetry Pipeline
//!
//! Ingests weather readings from a fleet of devices into a partitioned,
//! time-ordered store, pushes every newly committed reading to live WebSocket
//! subscribers, and answers per-device time-range queries.
//!
//! # Features
//!
//! - **Bounded ingestion**: any number of events, written in concurrent chunks of 25
//! - **Change feed**: every committed write is published in commit order
//! - **Bounded fan-out**: semaphore-gated pushes under a per-batch time budget
//! - **Range queries**: ordered scans over `DeviceId#<id>` / `Time#<secs>#Type<type>` keys
//! - **Durability**: optional append-only JSONL write log, replayed on startup
//!
//! # Modules
//!
//! - `types`: Event model, storage items, change records
//! - `store`: Key-value backend, write log, typed time-series store
//! - `ingest`: Ingestion batcher and random data generator
//! - `sessions`: Live session registry
//! - `changes`: Change consumer
//! - `fanout`: Fan-out dispatcher and change pipeline
//! - `query`: Range query service
//! - `api`: Axum router, REST handlers, WebSocket hub
//! - `config`: Environment configuration
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use chrono::Utc;
//! use weather_telemetry::{fleet_events, MemoryBackend, TelemetryContext};
//!
//! # async fn run() -> weather_telemetry::TelemetryResult<()> {
//! let context = TelemetryContext::new(Arc::new(MemoryBackend::new()));
//! let report = context.ingest.ingest_all(&fleet_events(1000, 10, Utc::now())).await;
//! assert_eq!(report.chunks, 2);
//!
//! let now = Utc::now();
//! let events = context.ranges.query_range(1000, now - chrono::Duration::minutes(5), now).await?;
//! # let _ = events;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod changes;
pub mod config;
pub mod context;
pub mod error;
pub mod fanout;
pub mod ingest;
pub mod query;
pub mod sessions;
pub mod store;
pub mod types;
pub mod utils;

// Re-export commonly used items at crate root
pub use changes::ChangeConsumer;
pub use config::ServerConfig;
pub use context::TelemetryContext;
pub use error::{TelemetryError, TelemetryResult};
pub use fanout::{ChangePipeline, DispatchConfig, DispatchReport, FanoutDispatcher, PushChannel};
pub use ingest::{fleet_events, random_events, IngestReport, IngestionBatcher};
pub use query::{RangeQuery, RangeQueryService};
pub use sessions::SessionRegistry;
pub use store::{KeyValueBackend, MemoryBackend, MemoryBackendConfig, TimeSeriesStore, MAX_BATCH};
pub use types::{
    derive_key, ChangeRecord, EventType, StorageKey, WeatherEvent, MAX_EVENT_SECONDS,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
