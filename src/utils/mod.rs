//! Utility functions and helpers

pub mod time;

pub use time::{current_timestamp, parse_request_time, REQUEST_TIME_FORMAT};
