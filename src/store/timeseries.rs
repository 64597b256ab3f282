//! Typed time-series view over a key-value backend
//!
//! Events live in one partition per device; live sessions share the fixed
//! `WS_SESSIONS` partition.

use std::pin::Pin;
use std::sync::Arc;

use async_stream::try_stream;
use futures::{Stream, TryStreamExt};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::backend::{KeyValueBackend, QueryRequest, SortKeyCondition};
use crate::error::{TelemetryError, TelemetryResult};
use crate::types::{AttributeValue, ChangeBatch, Item, WeatherEvent, PARTITION_KEY, SORT_KEY};

/// Maximum number of events in one `batch_put`
pub const MAX_BATCH: usize = super::backend::MAX_BATCH_WRITE_ITEMS;

/// Partition holding live subscriber sessions
pub const SESSION_PARTITION: &str = "WS_SESSIONS";

/// Sort-key prefix of session rows
pub const SESSION_SORT_PREFIX: &str = "Id#";

/// Attribute holding the connection id of a session row
pub const ATTR_CONNECTION_ID: &str = "ConnectionId";

/// Lazy sequence of events read page by page
pub type EventStream = Pin<Box<dyn Stream<Item = TelemetryResult<WeatherEvent>> + Send>>;

/// Sort key of a session row: `Id#<connection_id>`
pub fn session_sort_key(connection_id: &str) -> String {
    format!("{}{}", SESSION_SORT_PREFIX, connection_id)
}

fn paged_events(
    backend: Arc<dyn KeyValueBackend>,
    mut request: QueryRequest,
) -> impl Stream<Item = TelemetryResult<WeatherEvent>> + Send {
    try_stream! {
        loop {
            let page = backend.query(&request).await?;
            for item in page.items {
                yield WeatherEvent::normalize(&item)?;
            }
            match page.last_evaluated_key {
                Some(cursor) => request.exclusive_start_key = Some(cursor),
                None => break,
            }
        }
    }
}

/// Time-series store: typed events and sessions on top of a backend
///
/// Cloning is cheap; clones share the same backend.
#[derive(Clone)]
pub struct TimeSeriesStore {
    backend: Arc<dyn KeyValueBackend>,
}

impl TimeSeriesStore {
    pub fn new(backend: Arc<dyn KeyValueBackend>) -> Self {
        Self { backend }
    }

    /// Store one event at its derived key, overwriting any previous value
    ///
    /// Times outside `0..=MAX_EVENT_SECONDS` are refused before anything is written.
    pub async fn put(&self, event: &WeatherEvent) -> TelemetryResult<()> {
        event.validate()?;
        self.backend.put_item(event.to_item()).await
    }

    /// Store between 1 and [`MAX_BATCH`] events in one bulk write
    ///
    /// Out-of-bounds input is refused; splitting is the ingestion batcher's job.
    /// One event with an unstorable time refuses the whole batch.
    pub async fn batch_put(&self, events: &[WeatherEvent]) -> TelemetryResult<()> {
        if events.is_empty() || events.len() > MAX_BATCH {
            return Err(TelemetryError::validation(format!(
                "batch_put takes 1 to {} events, got {}",
                MAX_BATCH,
                events.len()
            )));
        }

        for event in events {
            event.validate()?;
        }

        let items: Vec<Item> = events.iter().map(WeatherEvent::to_item).collect();
        self.backend.batch_write(items).await
    }

    /// Events of a partition whose sort key lies in `[lower, upper]`
    ///
    /// Pages are fetched only as the stream is polled. Call again to restart.
    pub fn query(&self, partition_key: &str, lower: &str, upper: &str) -> EventStream {
        let request = QueryRequest::new(partition_key, SortKeyCondition::between(lower, upper));
        Box::pin(paged_events(self.backend.clone(), request))
    }

    /// Collect a [`query`](Self::query) into a vector
    pub async fn query_all(
        &self,
        partition_key: &str,
        lower: &str,
        upper: &str,
    ) -> TelemetryResult<Vec<WeatherEvent>> {
        self.query(partition_key, lower, upper).try_collect().await
    }

    /// Record a live connection
    pub async fn put_session(&self, connection_id: &str) -> TelemetryResult<()> {
        let mut item = Item::new();
        item.insert(
            PARTITION_KEY.to_string(),
            AttributeValue::string(SESSION_PARTITION),
        );
        item.insert(
            SORT_KEY.to_string(),
            AttributeValue::string(session_sort_key(connection_id)),
        );
        item.insert(
            ATTR_CONNECTION_ID.to_string(),
            AttributeValue::string(connection_id),
        );
        self.backend.put_item(item).await
    }

    /// Forget a connection; absent ids are not an error
    pub async fn delete_session(&self, connection_id: &str) -> TelemetryResult<()> {
        self.backend
            .delete_item(SESSION_PARTITION, &session_sort_key(connection_id))
            .await
    }

    /// Connection ids of every stored session
    pub async fn list_sessions(&self) -> TelemetryResult<Vec<String>> {
        let mut request = QueryRequest::new(
            SESSION_PARTITION,
            SortKeyCondition::BeginsWith(SESSION_SORT_PREFIX.to_string()),
        );
        let mut connection_ids = Vec::new();

        loop {
            let page = self.backend.query(&request).await?;
            for item in &page.items {
                match item.get(ATTR_CONNECTION_ID).and_then(AttributeValue::as_s) {
                    Some(id) => connection_ids.push(id.to_string()),
                    None => warn!(?item, "session row without ConnectionId, skipping"),
                }
            }
            match page.last_evaluated_key {
                Some(cursor) => request.exclusive_start_key = Some(cursor),
                None => break,
            }
        }

        debug!(sessions = connection_ids.len(), "listed sessions");
        Ok(connection_ids)
    }

    /// Subscribe to committed writes
    pub fn subscribe_changes(&self) -> broadcast::Receiver<ChangeBatch> {
        self.backend.subscribe_changes()
    }
}
