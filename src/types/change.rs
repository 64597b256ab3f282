//! Change records emitted by the store for committed writes

use serde::{Deserialize, Serialize};

use super::item::{item_key, strip_key_attributes, Item};

/// What happened to the row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeKind {
    /// A new row was written
    Insert,
    /// An existing row was overwritten
    Modify,
    /// A row was deleted
    Remove,
}

/// One committed write, as seen on the change feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    /// Monotonically increasing per store
    pub sequence_number: u64,

    pub kind: ChangeKind,

    /// PK and SK of the row
    pub keys: Item,

    /// Full row after the write; absent for removals
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_image: Option<Item>,

    /// Unix timestamp of the commit
    pub approximate_creation_time: i64,
}

impl ChangeRecord {
    /// Partition key of the changed row
    pub fn partition_key(&self) -> Option<&str> {
        item_key(&self.keys).map(|(pk, _)| pk)
    }

    /// New image without storage-key attributes
    pub fn semantic_attributes(&self) -> Option<Item> {
        self.new_image.as_ref().map(strip_key_attributes)
    }
}

/// Batch of change records delivered together
pub type ChangeBatch = Vec<ChangeRecord>;
