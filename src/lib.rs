//! IncidentHub Library
//!
//! This crate provides the core functionality for the IncidentHub API server.

use std::sync::Arc;

use axum::Router;

pub mod api;
pub mod audit;
pub mod config;
pub mod db;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

pub use config::AppConfig;
pub use db::DbPool;
pub use middleware::{auth_middleware, AuthUser, Claims};

use audit::{AuditDispatcher, SensitiveDataFilter, TraceCorrelator};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,
    /// Database connection pool
    pub db: DbPool,
    /// Queue handle for finished audit entries
    pub audit: AuditDispatcher,
    /// Trace id assignment for inbound requests
    pub correlator: TraceCorrelator,
    /// Shared sensitive-field filter
    pub filter: Arc<SensitiveDataFilter>,
}

impl AppState {
    /// Assemble shared state from loaded configuration
    pub fn new(config: AppConfig, db: DbPool, audit: AuditDispatcher) -> Self {
        let filter = Arc::new(SensitiveDataFilter::from_config(&config.audit));
        Self {
            correlator: TraceCorrelator::new(),
            filter,
            config,
            db,
            audit,
        }
    }
}

/// Build the application router: operational routes at the root, the API
/// under `/api/v1` with authentication on protected routes, and the audit
/// interceptor wrapped around everything when enabled.
///
/// The interceptor sits outside authentication so rejected requests are
/// audited too.
pub fn app_router(state: AppState) -> Router {
    let mut router = Router::new()
        .merge(api::root_routes())
        .nest("/api/v1", api::public_routes())
        .nest(
            "/api/v1",
            api::protected_routes().layer(axum::middleware::from_fn_with_state(
                state.clone(),
                middleware::auth::auth_middleware,
            )),
        );

    if state.config.audit.enabled {
        router = router.layer(axum::middleware::from_fn_with_state(
            state.clone(),
            audit::audit_middleware,
        ));
    }

    router.with_state(state)
}
