//! Session endpoints

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use super::{error_response, ApiResponse};
use crate::api::websocket::state::AppState;

/// GET /api/sessions - Live connection ids
pub async fn list_sessions(State(state): State<Arc<AppState>>) -> Response {
    match state.context.sessions.list_active().await {
        Ok(sessions) => {
            let total = sessions.len();
            Json(ApiResponse::with_total(sessions, total)).into_response()
        }
        Err(e) => error_response(e),
    }
}

/// DELETE /api/sessions/:connection_id - Unregister a session
pub async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(connection_id): Path<String>,
) -> Response {
    match state.context.sessions.unregister(&connection_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(e),
    }
}
