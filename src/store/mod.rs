//! Time-Series Store
//!
//! Layered storage for events and sessions:
//!
//! ```text
//! ┌──────────────────┐   typed events, sessions, batch ceiling
//! │ TimeSeriesStore  │
//! └────────┬─────────┘
//!          │ Arc<dyn KeyValueBackend>
//! ┌────────▼─────────┐   ordered partitions, paging, change feed
//! │  MemoryBackend   │
//! └────────┬─────────┘
//!          │ optional
//! ┌────────▼─────────┐   append-only JSONL, replayed on open
//! │    WriteLog      │
//! └──────────────────┘
//! ```

mod backend;
mod log;
mod memory;
mod timeseries;

pub use backend::{
    KeyValueBackend, QueryPage, QueryRequest, SortKeyCondition, DEFAULT_PAGE_SIZE,
    MAX_BATCH_WRITE_ITEMS,
};
pub use log::{LogEntry, WriteLog};
pub use memory::{MemoryBackend, MemoryBackendConfig};
pub use timeseries::{
    session_sort_key, EventStream, TimeSeriesStore, ATTR_CONNECTION_ID, MAX_BATCH,
    SESSION_PARTITION, SESSION_SORT_PREFIX,
};
