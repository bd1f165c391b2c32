//! Request middleware
//!
//! Only authentication lives here; the audit interceptor has its own
//! module under `crate::audit`.

pub mod auth;

pub use auth::{auth_middleware, AuthUser, Claims};
