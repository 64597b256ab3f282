//! Range Query Service

mod range;

pub use range::{RangeQuery, RangeQueryService};
