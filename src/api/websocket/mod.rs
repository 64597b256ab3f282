//! WebSocket endpoint for live weather events
//!
//! Each socket at `/ws` is registered as a session and receives every newly
//! committed event as a JSON text frame.
//!
//! ## Protocol
//! - On connect: `{"type":"connected","connection_id":"..."}`
//! - Pushes: one event per frame, e.g. `{"DeviceId":1001,"Time":"...","EventType":"Temperature","Value":20.5}`
//! - `{"type":"ping"}` is answered with `{"type":"pong"}`

pub mod events;
pub mod handler;
pub mod hub;
pub mod state;

pub use hub::ConnectionHub;
pub use state::AppState;
