//! Change consumer: turns committed-write notifications into events
//!
//! Removals and rows outside the device partitions (session rows) carry no
//! event and are skipped quietly. A record that fails to normalize is logged
//! on its own and never aborts the rest of the batch.

use tracing::{debug, warn};

use crate::error::{TelemetryError, TelemetryResult};
use crate::types::{ChangeKind, ChangeRecord, WeatherEvent, DEVICE_PARTITION_PREFIX};

/// Stateless extractor of events from change batches
#[derive(Debug, Clone, Copy, Default)]
pub struct ChangeConsumer;

impl ChangeConsumer {
    pub fn new() -> Self {
        Self
    }

    /// Decode every deliverable record, in input order
    pub fn consume(&self, records: &[ChangeRecord]) -> Vec<WeatherEvent> {
        let mut events = Vec::with_capacity(records.len());
        let mut skipped = 0usize;

        for record in records {
            match self.decode(record) {
                Ok(Some(event)) => events.push(event),
                Ok(None) => skipped += 1,
                Err(e) => {
                    warn!(
                        sequence_number = record.sequence_number,
                        error = %e,
                        "skipping malformed change record"
                    );
                    skipped += 1;
                }
            }
        }

        debug!(
            records = records.len(),
            events = events.len(),
            skipped,
            "consumed change batch"
        );
        events
    }

    /// `Ok(None)` for records that are not event writes
    fn decode(&self, record: &ChangeRecord) -> TelemetryResult<Option<WeatherEvent>> {
        if record.kind == ChangeKind::Remove {
            return Ok(None);
        }

        let partition_key = record
            .partition_key()
            .ok_or_else(|| TelemetryError::malformed("change record without PK/SK keys"))?;
        if !partition_key.starts_with(DEVICE_PARTITION_PREFIX) {
            return Ok(None);
        }

        let attributes = record
            .semantic_attributes()
            .ok_or_else(|| TelemetryError::malformed("change record without a new image"))?;
        WeatherEvent::normalize(&attributes).map(Some)
    }
}
