//! Operational probes
//!
//! These live at the server root and match the audit exemption list, so
//! liveness checks never generate audit traffic.

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::{
    db,
    utils::{AppError, AppResult},
    AppState,
};

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Always 200 while the process runs; checks nothing downstream
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

/// 200 when the database answers, 503 with an error body when it does not
pub async fn readiness(State(state): State<AppState>) -> AppResult<StatusCode> {
    db::check_health(&state.db)
        .await
        .map_err(|e| AppError::ServiceUnavailable(e.to_string()))?;
    Ok(StatusCode::OK)
}

/// Plain-text liveness echo
pub async fn ping() -> &'static str {
    "pong"
}
