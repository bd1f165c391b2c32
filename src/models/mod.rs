//! Data models

mod audit;
mod incident;
mod user;

pub use audit::*;
pub use incident::*;
pub use user::*;
