//! Incident API endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use tracing::info;
use validator::Validate;

use crate::{
    audit::TraceContext,
    db::IncidentRepository,
    middleware::AuthUser,
    models::{CreateIncidentRequest, Incident, IncidentQuery, UpdateIncidentRequest},
    utils::{AppError, AppResult},
    AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_incidents).post(create_incident))
        .route(
            "/{id}",
            get(get_incident).put(update_incident).delete(delete_incident),
        )
}

async fn list_incidents(
    State(state): State<AppState>,
    Query(query): Query<IncidentQuery>,
) -> AppResult<Json<Vec<Incident>>> {
    let repo = IncidentRepository::new(&state.db);
    let incidents = repo.list(&query).await?;
    Ok(Json(incidents))
}

async fn create_incident(
    State(state): State<AppState>,
    auth_user: AuthUser,
    trace: TraceContext,
    Json(payload): Json<CreateIncidentRequest>,
) -> AppResult<(StatusCode, Json<Incident>)> {
    payload.validate()?;

    let repo = IncidentRepository::new(&state.db);
    let incident = repo.create(&payload, Some(auth_user.id)).await?;

    info!(
        trace_id = %trace.trace_id,
        incident_id = incident.id,
        severity = %incident.severity,
        "Incident created"
    );

    Ok((StatusCode::CREATED, Json(incident)))
}

async fn get_incident(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<Incident>> {
    let repo = IncidentRepository::new(&state.db);
    let incident = repo
        .get_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Incident {} not found", id)))?;
    Ok(Json(incident))
}

async fn update_incident(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateIncidentRequest>,
) -> AppResult<Json<Incident>> {
    payload.validate()?;

    let repo = IncidentRepository::new(&state.db);
    let incident = repo
        .update(id, &payload)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Incident {} not found", id)))?;
    Ok(Json(incident))
}

async fn delete_incident(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    let repo = IncidentRepository::new(&state.db);
    if !repo.delete(id).await? {
        return Err(AppError::NotFound(format!("Incident {} not found", id)));
    }
    Ok(StatusCode::NO_CONTENT)
}
