//! Data types for the weather telemetry pipeline
//!
//! One canonical definition of events, storage items and change records,
//! shared by every component.

mod change;
mod event;
mod item;

pub use change::{ChangeBatch, ChangeKind, ChangeRecord};
pub use event::{
    check_event_seconds, derive_key, device_partition_key, time_sort_prefix, EventType,
    StorageKey, WeatherEvent, ATTR_DEVICE_ID, ATTR_EVENT_TYPE, ATTR_TIME, ATTR_VALUE,
    DEVICE_PARTITION_PREFIX, MAX_EVENT_SECONDS, TIME_DIGITS, TIME_SORT_PREFIX,
};
pub use item::{
    item_key, strip_key_attributes, AttributeValue, Item, PARTITION_KEY, SORT_KEY,
};
