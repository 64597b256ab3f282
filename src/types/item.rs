//! Storage items: attribute maps as the key-value backend sees them

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Attribute name of the partition key
pub const PARTITION_KEY: &str = "PK";

/// Attribute name of the sort key
pub const SORT_KEY: &str = "SK";

/// A typed attribute value
///
/// Numbers travel as their decimal text so that the backend never rounds them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttributeValue {
    /// String attribute
    S(String),
    /// Number attribute, stored as decimal text
    N(String),
}

impl AttributeValue {
    pub fn string(value: impl Into<String>) -> Self {
        AttributeValue::S(value.into())
    }

    pub fn number(value: impl std::fmt::Display) -> Self {
        AttributeValue::N(value.to_string())
    }

    /// String content, if this is a string attribute
    pub fn as_s(&self) -> Option<&str> {
        match self {
            AttributeValue::S(s) => Some(s),
            AttributeValue::N(_) => None,
        }
    }

    /// Decimal text, if this is a number attribute
    pub fn as_n(&self) -> Option<&str> {
        match self {
            AttributeValue::N(n) => Some(n),
            AttributeValue::S(_) => None,
        }
    }
}

/// One stored row: attribute name to value
pub type Item = BTreeMap<String, AttributeValue>;

/// Read the partition and sort key of an item
pub fn item_key(item: &Item) -> Option<(&str, &str)> {
    let pk = item.get(PARTITION_KEY)?.as_s()?;
    let sk = item.get(SORT_KEY)?.as_s()?;
    Some((pk, sk))
}

/// Copy of an item without its storage-key attributes
pub fn strip_key_attributes(item: &Item) -> Item {
    item.iter()
        .filter(|(name, _)| name.as_str() != PARTITION_KEY && name.as_str() != SORT_KEY)
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}
