//! Key-value backend seam
//!
//! The backend is a table of items grouped by partition key and ordered by
//! sort key inside each partition. It knows nothing about weather events.

use std::ops::Bound;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::TelemetryResult;
use crate::types::{ChangeBatch, Item};

/// Hard ceiling of a single bulk write
pub const MAX_BATCH_WRITE_ITEMS: usize = 25;

/// Default number of items per query page
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Condition on the sort key of a query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortKeyCondition {
    /// Every row of the partition
    All,
    /// Closed range `[lower, upper]`
    Between { lower: String, upper: String },
    /// Sort key starts with the prefix
    BeginsWith(String),
}

impl SortKeyCondition {
    pub fn between(lower: impl Into<String>, upper: impl Into<String>) -> Self {
        SortKeyCondition::Between {
            lower: lower.into(),
            upper: upper.into(),
        }
    }

    /// Smallest sort key that can match
    pub fn lower_bound(&self) -> Option<&str> {
        match self {
            SortKeyCondition::All => None,
            SortKeyCondition::Between { lower, .. } => Some(lower),
            SortKeyCondition::BeginsWith(prefix) => Some(prefix),
        }
    }

    pub fn matches(&self, sort_key: &str) -> bool {
        match self {
            SortKeyCondition::All => true,
            SortKeyCondition::Between { lower, upper } => {
                sort_key >= lower.as_str() && sort_key <= upper.as_str()
            }
            SortKeyCondition::BeginsWith(prefix) => sort_key.starts_with(prefix.as_str()),
        }
    }

    /// True once an ascending scan has moved beyond every possible match
    pub fn is_past(&self, sort_key: &str) -> bool {
        match self {
            SortKeyCondition::All => false,
            SortKeyCondition::Between { upper, .. } => sort_key > upper.as_str(),
            SortKeyCondition::BeginsWith(prefix) => {
                !sort_key.starts_with(prefix.as_str()) && sort_key > prefix.as_str()
            }
        }
    }

    /// Where an ascending scan starts, honoring a pagination cursor
    pub fn scan_start<'a>(&'a self, exclusive_start_key: Option<&'a str>) -> Bound<&'a str> {
        match (exclusive_start_key, self.lower_bound()) {
            (Some(cursor), Some(lower)) if cursor < lower => Bound::Included(lower),
            (Some(cursor), _) => Bound::Excluded(cursor),
            (None, Some(lower)) => Bound::Included(lower),
            (None, None) => Bound::Unbounded,
        }
    }
}

/// One page of a partition query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRequest {
    pub partition_key: String,
    pub condition: SortKeyCondition,
    /// Maximum items in the page; the backend default applies when `None`
    pub limit: Option<usize>,
    /// Resume strictly after this sort key
    pub exclusive_start_key: Option<String>,
}

impl QueryRequest {
    pub fn new(partition_key: impl Into<String>, condition: SortKeyCondition) -> Self {
        Self {
            partition_key: partition_key.into(),
            condition,
            limit: None,
            exclusive_start_key: None,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit.max(1));
        self
    }
}

/// Result page of a query, in ascending sort-key order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryPage {
    pub items: Vec<Item>,
    /// Sort key to resume from; `None` when the scan is complete
    pub last_evaluated_key: Option<String>,
}

/// Physical key-value store
///
/// Implementations emit one [`ChangeBatch`] per committed write call on the
/// change feed.
#[async_trait]
pub trait KeyValueBackend: Send + Sync {
    /// Write one item, replacing any item with the same key
    async fn put_item(&self, item: Item) -> TelemetryResult<()>;

    /// Write up to [`MAX_BATCH_WRITE_ITEMS`] items
    ///
    /// No all-or-nothing guarantee: a failure may leave part of the batch written.
    async fn batch_write(&self, items: Vec<Item>) -> TelemetryResult<()>;

    /// Delete one item; deleting an absent item succeeds
    async fn delete_item(&self, partition_key: &str, sort_key: &str) -> TelemetryResult<()>;

    /// Read one page of a partition
    async fn query(&self, request: &QueryRequest) -> TelemetryResult<QueryPage>;

    /// Subscribe to committed writes
    fn subscribe_changes(&self) -> broadcast::Receiver<ChangeBatch>;
}
