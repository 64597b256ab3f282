//! Range query service: events of one device within a time window

use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use tracing::debug;

use crate::error::{TelemetryError, TelemetryResult};
use crate::store::TimeSeriesStore;
use crate::types::{check_event_seconds, device_partition_key, time_sort_prefix, WeatherEvent};
use crate::utils::parse_request_time;

/// A validated range request, bounds inclusive and truncated to the second
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeQuery {
    pub device_id: i64,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl RangeQuery {
    /// Build a query; `from > to` or a bound outside the storable time range
    /// is a validation error
    pub fn new(device_id: i64, from: DateTime<Utc>, to: DateTime<Utc>) -> TelemetryResult<Self> {
        let from = truncate_to_second(from);
        let to = truncate_to_second(to);
        check_event_seconds(from.timestamp())?;
        check_event_seconds(to.timestamp())?;
        if from > to {
            return Err(TelemetryError::validation(format!(
                "from ({}) is after to ({})",
                from.to_rfc3339(),
                to.to_rfc3339()
            )));
        }
        Ok(Self { device_id, from, to })
    }

    /// Parse raw request parameters
    pub fn from_params(
        device_id: Option<&str>,
        from: Option<&str>,
        to: Option<&str>,
    ) -> TelemetryResult<Self> {
        let device_id = device_id
            .ok_or_else(|| TelemetryError::validation("missing device_id"))?
            .trim()
            .parse::<i64>()
            .map_err(|_| TelemetryError::validation("device_id must be an integer"))?;
        let from = required_time("from", from)?;
        let to = required_time("to", to)?;
        Self::new(device_id, from, to)
    }

    /// Sort-key bounds of the store query, padded by one second each side
    pub fn sort_key_bounds(&self) -> (String, String) {
        (
            time_sort_prefix(self.from.timestamp() - 1),
            time_sort_prefix(self.to.timestamp() + 1),
        )
    }

    /// Whether an event of this device falls inside the window
    pub fn contains(&self, event: &WeatherEvent) -> bool {
        event.device_id == self.device_id && event.time >= self.from && event.time <= self.to
    }
}

fn required_time(name: &str, raw: Option<&str>) -> TelemetryResult<DateTime<Utc>> {
    let raw = raw.ok_or_else(|| TelemetryError::validation(format!("missing {}", name)))?;
    parse_request_time(raw).ok_or_else(|| {
        TelemetryError::validation(format!(
            "{} must look like 2024-02-17T20:13:25+0100, got {:?}",
            name, raw
        ))
    })
}

fn truncate_to_second(time: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp(time.timestamp(), 0).unwrap_or(time)
}

/// Answers per-device time-window queries against the store
#[derive(Clone)]
pub struct RangeQueryService {
    store: TimeSeriesStore,
}

impl RangeQueryService {
    pub fn new(store: TimeSeriesStore) -> Self {
        Self { store }
    }

    /// Events of `device_id` with `from <= time <= to`, oldest first
    pub async fn query_range(
        &self,
        device_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> TelemetryResult<Vec<WeatherEvent>> {
        let query = RangeQuery::new(device_id, from, to)?;
        self.run(&query).await
    }

    /// Execute a validated query
    pub async fn run(&self, query: &RangeQuery) -> TelemetryResult<Vec<WeatherEvent>> {
        let partition_key = device_partition_key(query.device_id);
        let (lower, upper) = query.sort_key_bounds();

        // The padded lower bound also matches rows at from - 1
        let events: Vec<WeatherEvent> = self
            .store
            .query(&partition_key, &lower, &upper)
            .try_filter(|event| futures::future::ready(query.contains(event)))
            .try_collect()
            .await?;

        debug!(
            device_id = query.device_id,
            from = %query.from,
            to = %query.to,
            count = events.len(),
            "range query"
        );
        Ok(events)
    }
}
