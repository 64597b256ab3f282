//! Shared application state for HTTP and WebSocket handlers

use std::sync::Arc;

use super::hub::ConnectionHub;
use crate::context::TelemetryContext;

/// Shared application state
pub struct AppState {
    /// Pipeline components
    pub context: TelemetryContext,

    /// Open sockets; also the push channel of the fan-out dispatcher
    pub hub: Arc<ConnectionHub>,
}

impl AppState {
    pub fn new(context: TelemetryContext, hub: Arc<ConnectionHub>) -> Self {
        Self { context, hub }
    }
}
