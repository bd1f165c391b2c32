//! Audit trail API endpoints

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};

use crate::{
    db::AuditLogRepository,
    middleware::AuthUser,
    models::{AuditLogQuery, AuditLogRecord},
    utils::{AppError, AppResult},
    AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new().route("/", get(list_audit_logs))
}

async fn list_audit_logs(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Query(query): Query<AuditLogQuery>,
) -> AppResult<Json<Vec<AuditLogRecord>>> {
    if !auth_user.is_admin {
        return Err(AppError::Forbidden(
            "Not allowed to view audit logs".to_string(),
        ));
    }

    let repo = AuditLogRepository::new(&state.db);
    let logs = repo.list(&query).await.map_err(|e| {
        tracing::error!("Failed to list audit logs: {}", e);
        AppError::Internal("Failed to list audit logs".to_string())
    })?;

    Ok(Json(logs))
}
