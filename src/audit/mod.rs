//! API audit pipeline
//!
//! Interceptor, sensitive-data filter, trace correlation, and the
//! asynchronous dispatch workers that externalize finished entries.

pub mod entry;
pub mod filter;
pub mod middleware;
pub mod sink;
pub mod trace;
pub mod worker;

pub use entry::{AuditEntry, AuditMetadata};
pub use filter::{SensitiveDataFilter, REDACTED};
pub use middleware::audit_middleware;
pub use sink::{format_document, AuditLogChannel};
pub use trace::{TraceContext, TraceCorrelator, TRACE_ID_HEADER};
pub use worker::{spawn_retention_pruner, spawn_workers, AuditDispatcher, AuditDispatchWorker};
