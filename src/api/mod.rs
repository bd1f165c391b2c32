//! HTTP route tables
//!
//! Handlers are grouped per resource; this module only assembles them into
//! the public/protected split that `app_router` wires together.

use axum::{routing::get, Router};

use crate::AppState;

mod audit_logs;
mod auth;
mod health;
mod incidents;

pub use health::*;

/// Root-level operational routes, exempt from auditing by default
pub fn root_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .route("/ping", get(health::ping))
}

/// Public API routes (no authentication required)
pub fn public_routes() -> Router<AppState> {
    Router::new().nest("/auth", auth::public_routes())
}

/// Protected API routes (authentication required)
pub fn protected_routes() -> Router<AppState> {
    Router::new()
        .nest("/auth", auth::protected_routes())
        .nest("/incidents", incidents::routes())
        .nest("/audit-logs", audit_logs::routes())
}
