//! Error taxonomy shared by every pipeline component

/// Result type for telemetry operations
pub type TelemetryResult<T> = Result<T, TelemetryError>;

/// Errors that can occur in the telemetry pipeline
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TelemetryError {
    /// Caller-correctable input: bad query params, inverted range, batch size out of bounds
    #[error("validation error: {0}")]
    Validation(String),

    /// A single record could not be turned into a weather event
    #[error("malformed record: {0}")]
    MalformedRecord(String),

    /// Backend read or write failure
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// A push to one subscriber connection failed
    #[error("push to connection {connection_id} failed: {reason}")]
    PushFailure {
        connection_id: String,
        reason: String,
    },
}

impl TelemetryError {
    pub fn validation(message: impl Into<String>) -> Self {
        TelemetryError::Validation(message.into())
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        TelemetryError::MalformedRecord(message.into())
    }

    pub fn store(message: impl Into<String>) -> Self {
        TelemetryError::StoreUnavailable(message.into())
    }

    pub fn push(connection_id: impl Into<String>, reason: impl Into<String>) -> Self {
        TelemetryError::PushFailure {
            connection_id: connection_id.into(),
            reason: reason.into(),
        }
    }

    /// Whether the caller can fix this by changing its input (4xx class)
    pub fn is_client_error(&self) -> bool {
        matches!(self, TelemetryError::Validation(_))
    }
}

impl From<std::io::Error> for TelemetryError {
    fn from(e: std::io::Error) -> Self {
        TelemetryError::StoreUnavailable(format!("IO error: {}", e))
    }
}

impl From<serde_json::Error> for TelemetryError {
    fn from(e: serde_json::Error) -> Self {
        TelemetryError::StoreUnavailable(format!("JSON error: {}", e))
    }
}
