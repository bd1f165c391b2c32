//! Domain services shared by API handlers and the CLI entry points

pub mod auth;

pub use auth::AuthService;
