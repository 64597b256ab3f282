//! Weather events and their storage keys
//!
//! A weather event is one immutable reading of one device at one second.
//! Its storage key is derived from it deterministically:
//!
//! ```text
//! PK = DeviceId#<device_id>
//! SK = Time#<unix seconds, 10 digits>#Type<event_type>
//! ```
//!
//! The timestamp is zero-padded so that the textual order of sort keys is the
//! chronological order, which is what range scans rely on.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::item::{AttributeValue, Item, PARTITION_KEY, SORT_KEY};
use crate::error::{TelemetryError, TelemetryResult};

/// Prefix of every device partition key
pub const DEVICE_PARTITION_PREFIX: &str = "DeviceId#";

/// Prefix of every event sort key
pub const TIME_SORT_PREFIX: &str = "Time#";

/// Width of the zero-padded unix seconds inside a sort key
pub const TIME_DIGITS: usize = 10;

/// Latest storable second. Range queries pad the upper bound by one second,
/// which must still fit in `TIME_DIGITS`.
pub const MAX_EVENT_SECONDS: i64 = 9_999_999_998;

/// Reject unix seconds that cannot be laid out in a sort key
pub fn check_event_seconds(unix_seconds: i64) -> TelemetryResult<()> {
    if (0..=MAX_EVENT_SECONDS).contains(&unix_seconds) {
        Ok(())
    } else {
        Err(TelemetryError::validation(format!(
            "time {} is outside the storable range 0..={}",
            unix_seconds, MAX_EVENT_SECONDS
        )))
    }
}

pub const ATTR_DEVICE_ID: &str = "DeviceId";
pub const ATTR_TIME: &str = "Time";
pub const ATTR_EVENT_TYPE: &str = "EventType";
pub const ATTR_VALUE: &str = "Value";

/// Kind of measurement carried by an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventType {
    Pressure,
    Temperature,
    Humidity,
    WindSpeed,
    WindDirection,
}

impl EventType {
    /// Every event type, in a stable order
    pub const ALL: [EventType; 5] = [
        EventType::Pressure,
        EventType::Temperature,
        EventType::Humidity,
        EventType::WindSpeed,
        EventType::WindDirection,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Pressure => "Pressure",
            EventType::Temperature => "Temperature",
            EventType::Humidity => "Humidity",
            EventType::WindSpeed => "WindSpeed",
            EventType::WindDirection => "WindDirection",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| TelemetryError::malformed(format!("unknown event type '{}'", s)))
    }
}

/// Partition and sort key of a stored row
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageKey {
    pub partition_key: String,
    pub sort_key: String,
}

/// One weather reading
///
/// Time has second resolution: any sub-second part is dropped when the event
/// is written, and [`WeatherEvent::new`] drops it up front.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct WeatherEvent {
    pub device_id: i64,
    pub time: DateTime<Utc>,
    pub event_type: EventType,
    pub value: f64,
}

impl WeatherEvent {
    /// Create an event, truncating `time` to the second
    pub fn new(device_id: i64, time: DateTime<Utc>, event_type: EventType, value: f64) -> Self {
        let time = DateTime::from_timestamp(time.timestamp(), 0).unwrap_or(time);
        Self {
            device_id,
            time,
            event_type,
            value,
        }
    }

    /// Create an event at a unix timestamp (seconds)
    ///
    /// Returns `None` when the timestamp is outside chrono's range.
    pub fn at_unix(device_id: i64, unix_seconds: i64, event_type: EventType, value: f64) -> Option<Self> {
        let time = DateTime::from_timestamp(unix_seconds, 0)?;
        Some(Self {
            device_id,
            time,
            event_type,
            value,
        })
    }

    pub fn unix_seconds(&self) -> i64 {
        self.time.timestamp()
    }

    /// Check that the event time fits the sort-key layout
    pub fn validate(&self) -> TelemetryResult<()> {
        check_event_seconds(self.unix_seconds())
    }

    /// Storage key of this event
    pub fn key(&self) -> StorageKey {
        derive_key(self)
    }

    /// Encode as a storage row, key attributes included
    pub fn to_item(&self) -> Item {
        let key = self.key();
        let mut item = Item::new();
        item.insert(PARTITION_KEY.to_string(), AttributeValue::S(key.partition_key));
        item.insert(SORT_KEY.to_string(), AttributeValue::S(key.sort_key));
        item.insert(ATTR_DEVICE_ID.to_string(), AttributeValue::number(self.device_id));
        item.insert(ATTR_TIME.to_string(), AttributeValue::number(self.unix_seconds()));
        item.insert(
            ATTR_EVENT_TYPE.to_string(),
            AttributeValue::string(self.event_type.as_str()),
        );
        // Display for f64 is the shortest text that parses back to the same value
        item.insert(ATTR_VALUE.to_string(), AttributeValue::number(self.value));
        item
    }

    /// Parse a generic attribute map into a typed event
    ///
    /// Numeric fields accept number attributes or strings holding a number.
    /// Extra attributes (including storage keys) are ignored.
    pub fn normalize(attributes: &Item) -> TelemetryResult<Self> {
        let device_id = numeric_text(attributes, ATTR_DEVICE_ID)?
            .parse::<i64>()
            .map_err(|_| TelemetryError::malformed("DeviceId is not an integer"))?;

        let unix_seconds = numeric_text(attributes, ATTR_TIME)?
            .parse::<i64>()
            .map_err(|_| TelemetryError::malformed("Time is not an integer"))?;
        if check_event_seconds(unix_seconds).is_err() {
            return Err(TelemetryError::malformed("Time is outside the storable range"));
        }

        let event_type = attributes
            .get(ATTR_EVENT_TYPE)
            .ok_or_else(|| TelemetryError::malformed("missing EventType"))?
            .as_s()
            .ok_or_else(|| TelemetryError::malformed("EventType is not a string"))?
            .parse::<EventType>()?;

        let value = numeric_text(attributes, ATTR_VALUE)?
            .parse::<f64>()
            .map_err(|_| TelemetryError::malformed("Value is not a number"))?;
        if !value.is_finite() {
            return Err(TelemetryError::malformed("Value is not finite"));
        }

        WeatherEvent::at_unix(device_id, unix_seconds, event_type, value)
            .ok_or_else(|| TelemetryError::malformed("Time is out of range"))
    }
}

fn numeric_text<'a>(attributes: &'a Item, name: &str) -> TelemetryResult<&'a str> {
    match attributes.get(name) {
        Some(AttributeValue::N(n)) => Ok(n.trim()),
        Some(AttributeValue::S(s)) => Ok(s.trim()),
        None => Err(TelemetryError::malformed(format!("missing {}", name))),
    }
}

/// Partition key of a device: `DeviceId#<device_id>`
pub fn device_partition_key(device_id: i64) -> String {
    format!("{}{}", DEVICE_PARTITION_PREFIX, device_id)
}

/// Sort-key prefix for a timestamp: `Time#<10-digit seconds>`
pub fn time_sort_prefix(unix_seconds: i64) -> String {
    format!("{}{:0width$}", TIME_SORT_PREFIX, unix_seconds, width = TIME_DIGITS)
}

/// Derive the storage key of an event
pub fn derive_key(event: &WeatherEvent) -> StorageKey {
    StorageKey {
        partition_key: device_partition_key(event.device_id),
        sort_key: format!(
            "{}#Type{}",
            time_sort_prefix(event.unix_seconds()),
            event.event_type
        ),
    }
}
