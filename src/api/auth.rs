//! Login and current-user endpoints

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use validator::Validate;

use crate::{
    middleware::auth::{create_access_token, AuthUser},
    models::{AuthResponse, LoginRequest, UserPublic},
    services::AuthService,
    utils::{AppError, AppResult},
    AppState,
};

pub fn public_routes() -> Router<AppState> {
    Router::new().route("/login", post(login))
}

pub fn protected_routes() -> Router<AppState> {
    Router::new().route("/me", get(get_current_user))
}

/// POST /api/v1/auth/login
async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    payload.validate()?;

    let auth_service = AuthService::new(state.db.clone());
    let user = auth_service
        .authenticate(&payload.email, &payload.password)
        .await
        .map_err(|e| {
            tracing::error!("Authentication failed: {}", e);
            AppError::Internal("Authentication failed".to_string())
        })?
        .ok_or_else(|| AppError::Unauthorized("Invalid email or password".to_string()))?;

    let token = create_access_token(
        user.id,
        &user.email,
        user.is_admin,
        &state.config.auth.jwt_secret,
        state.config.auth.token_expiry_hours,
    )
    .map_err(|e| {
        tracing::error!("Failed to create access token: {}", e);
        AppError::Internal("Failed to create access token".to_string())
    })?;

    Ok(Json(AuthResponse {
        token,
        token_type: "Bearer".to_string(),
        expires_in: state.config.auth.token_expiry_hours * 3600,
        user: user.into(),
    }))
}

/// GET /api/v1/auth/me
async fn get_current_user(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> AppResult<Json<UserPublic>> {
    let auth_service = AuthService::new(state.db.clone());
    let user = auth_service
        .get_user_by_id(auth_user.id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    Ok(Json(user.into()))
}
