//! Ingestion batcher: splits event lists into store-sized chunks
//!
//! Each chunk is written by its own task; a failed chunk is logged and
//! reported but never retried or rolled back.

use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, error, info};

use crate::error::TelemetryError;
use crate::store::{TimeSeriesStore, MAX_BATCH};
use crate::types::WeatherEvent;

/// A chunk that could not be written
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkFailure {
    /// Position of the chunk in submission order
    pub index: usize,
    /// Number of events in the chunk
    pub size: usize,
    pub error: String,
}

/// Outcome of one `ingest_all` call
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IngestReport {
    /// Batch writes issued
    pub chunks: usize,
    /// Events in chunks that were written
    pub written: usize,
    pub failed_chunks: Vec<ChunkFailure>,
}

impl IngestReport {
    /// True when every chunk was written
    pub fn is_complete(&self) -> bool {
        self.failed_chunks.is_empty()
    }

    /// True when at least one chunk failed
    pub fn is_partial(&self) -> bool {
        !self.failed_chunks.is_empty()
    }

    /// Events in chunks that failed
    pub fn failed_events(&self) -> usize {
        self.failed_chunks.iter().map(|f| f.size).sum()
    }
}

/// Splits events into consecutive chunks of at most `max_batch`, in order
///
/// Never yields an empty chunk.
pub fn chunk_events(events: &[WeatherEvent], max_batch: usize) -> impl Iterator<Item = &[WeatherEvent]> {
    events.chunks(max_batch.max(1))
}

/// Writes any number of events through bounded batch writes
#[derive(Clone)]
pub struct IngestionBatcher {
    store: TimeSeriesStore,
    max_batch: usize,
}

impl IngestionBatcher {
    /// Create a batcher using the store ceiling of [`MAX_BATCH`]
    pub fn new(store: TimeSeriesStore) -> Self {
        Self {
            store,
            max_batch: MAX_BATCH,
        }
    }

    /// Create a batcher with a smaller chunk size (clamped to 1..=MAX_BATCH)
    pub fn with_max_batch(store: TimeSeriesStore, max_batch: usize) -> Self {
        Self {
            store,
            max_batch: max_batch.clamp(1, MAX_BATCH),
        }
    }

    pub fn max_batch(&self) -> usize {
        self.max_batch
    }

    /// Write all events, one concurrent batch write per chunk
    ///
    /// Returns once every chunk task has finished. Zero events is a no-op.
    pub async fn ingest_all(&self, events: &[WeatherEvent]) -> IngestReport {
        if events.is_empty() {
            debug!("nothing to ingest");
            return IngestReport::default();
        }

        let chunks: Vec<Vec<WeatherEvent>> = chunk_events(events, self.max_batch)
            .map(|chunk| chunk.to_vec())
            .collect();
        let sizes: Vec<usize> = chunks.iter().map(Vec::len).collect();

        let handles = chunks.into_iter().map(|chunk| {
            let store = self.store.clone();
            tokio::spawn(async move { store.batch_put(&chunk).await })
        });
        let results = join_all(handles).await;

        let mut report = IngestReport {
            chunks: sizes.len(),
            ..Default::default()
        };

        for (index, (result, size)) in results.into_iter().zip(sizes).enumerate() {
            let outcome = match result {
                Ok(outcome) => outcome,
                Err(join_error) => Err(TelemetryError::store(format!(
                    "chunk task failed: {}",
                    join_error
                ))),
            };

            match outcome {
                Ok(()) => report.written += size,
                Err(e) => {
                    error!(chunk = index, size, error = %e, "failed to write chunk");
                    report.failed_chunks.push(ChunkFailure {
                        index,
                        size,
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            events = events.len(),
            chunks = report.chunks,
            written = report.written,
            failed_chunks = report.failed_chunks.len(),
            "ingestion finished"
        );
        report
    }
}
