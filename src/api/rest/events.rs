//! Event endpoints

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;

use super::error_response;
use crate::api::websocket::state::AppState;
use crate::query::RangeQuery;
use crate::types::WeatherEvent;

/// Query parameters of a range query, kept raw for validation
#[derive(Debug, Deserialize)]
pub struct RangeParams {
    pub device_id: Option<String>,
    /// e.g. `2024-02-17T20:13:25+0100`
    pub from: Option<String>,
    pub to: Option<String>,
}

/// GET /api/events - Events of one device between `from` and `to`, inclusive
pub async fn query_events(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RangeParams>,
) -> Response {
    let query = match RangeQuery::from_params(
        params.device_id.as_deref(),
        params.from.as_deref(),
        params.to.as_deref(),
    ) {
        Ok(query) => query,
        Err(e) => return error_response(e),
    };

    match state.context.ranges.run(&query).await {
        Ok(events) => Json(events).into_response(),
        Err(e) => error_response(e),
    }
}

/// POST /api/events - Ingest events; 207 when some chunks failed
///
/// An event with an unstorable time rejects the whole request with 400.
pub async fn ingest_events(
    State(state): State<Arc<AppState>>,
    Json(events): Json<Vec<WeatherEvent>>,
) -> Response {
    // Drop sub-second precision the same way the event constructor does
    let events: Vec<WeatherEvent> = events
        .into_iter()
        .map(|e| WeatherEvent::new(e.device_id, e.time, e.event_type, e.value))
        .collect();
    if let Some(err) = events.iter().find_map(|e| e.validate().err()) {
        return error_response(err);
    }

    let report = state.context.ingest.ingest_all(&events).await;
    let status = if report.is_partial() {
        StatusCode::MULTI_STATUS
    } else {
        StatusCode::OK
    };
    (status, Json(report)).into_response()
}
