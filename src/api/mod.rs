//! API module for HTTP and WebSocket endpoints
//!
//! REST access to ingestion, range queries and sessions, plus live event
//! pushes over WebSocket.

pub mod http;
pub mod rest;
pub mod websocket;

pub use http::create_router;
pub use websocket::{AppState, ConnectionHub};
