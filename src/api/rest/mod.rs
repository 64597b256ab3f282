//! REST API module for HTTP endpoints
//!
//! - `GET /api/events?device_id&from&to` - Events of one device in a time window
//! - `POST /api/events` - Ingest a JSON array of events
//! - `GET /api/sessions` - Live connection ids
//! - `DELETE /api/sessions/:connection_id` - Unregister a session

pub mod events;
pub mod sessions;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;

use crate::error::TelemetryError;

/// Standard API response wrapper for lists
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    /// Response data
    pub data: T,
    /// Total count
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<usize>,
}

impl<T> ApiResponse<T> {
    pub fn with_total(data: T, total: usize) -> Self {
        Self {
            data,
            total: Some(total),
        }
    }
}

/// API error response
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    pub code: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            code: "BAD_REQUEST".to_string(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            code: "INTERNAL_ERROR".to_string(),
        }
    }
}

/// Map a pipeline error to a response: 400 for validation, 500 otherwise
pub fn error_response(err: TelemetryError) -> Response {
    if err.is_client_error() {
        (StatusCode::BAD_REQUEST, Json(ApiError::bad_request(err.to_string()))).into_response()
    } else {
        error!(error = %err, "request failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiError::internal(err.to_string())),
        )
            .into_response()
    }
}
