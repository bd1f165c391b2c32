//! Audit log channel
//!
//! Finished audit entries are rendered into a search-friendly JSON document
//! and appended to a dedicated rotating log file, one document per line. The
//! channel wraps a non-blocking writer; the guard held inside keeps the
//! flush thread alive for the lifetime of the channel.

use std::io::Write;

use anyhow::{Context, Result};
use chrono::Utc;
use serde_json::{json, Value};
use tracing::warn;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};

use crate::config::AuditConfig;

use super::entry::AuditEntry;

/// Append-only JSON-lines sink for audit documents
pub struct AuditLogChannel {
    writer: Option<NonBlocking>,
    _guard: Option<WorkerGuard>,
}

impl AuditLogChannel {
    /// Build the channel from configuration
    ///
    /// Returns a disabled channel when the configured threshold filters out
    /// info-severity documents; the database trail is unaffected by this.
    pub fn from_config(config: &AuditConfig) -> Self {
        if !config.log_channel_enabled() {
            return Self::disabled();
        }

        if let Err(e) = std::fs::create_dir_all(&config.log_dir) {
            warn!(
                "Failed to create audit log directory {:?}: {}",
                config.log_dir, e
            );
        }

        let appender = tracing_appender::rolling::daily(&config.log_dir, &config.log_channel);
        let (writer, guard) = tracing_appender::non_blocking(appender);

        Self {
            writer: Some(writer),
            _guard: Some(guard),
        }
    }

    /// Build a channel over an arbitrary writer (used by tests)
    pub fn for_writer(writer: NonBlocking, guard: WorkerGuard) -> Self {
        Self {
            writer: Some(writer),
            _guard: Some(guard),
        }
    }

    /// A channel that silently discards documents
    pub fn disabled() -> Self {
        Self {
            writer: None,
            _guard: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.writer.is_some()
    }

    /// Append one document as a single JSON line
    pub fn write(&self, document: &Value) -> Result<()> {
        let Some(writer) = &self.writer else {
            return Ok(());
        };

        let mut line = serde_json::to_vec(document).context("Failed to serialize audit document")?;
        line.push(b'\n');

        let mut writer = writer.clone();
        writer
            .write_all(&line)
            .context("Failed to write audit document")?;
        Ok(())
    }
}

/// Render an entry into the log document layout
///
/// The flat DTO becomes a grouped document with an index-name hint and tags,
/// ready for ingestion by log shippers.
pub fn format_document(entry: &AuditEntry) -> Value {
    let environment = entry
        .metadata
        .as_ref()
        .map(|m| m.environment.as_str())
        .unwrap_or("unknown");

    json!({
        "timestamp": entry.requested_at.to_rfc3339(),
        "index": format!("audit-{}-{}", environment, Utc::now().format("%Y.%m.%d")),
        "summary": entry.summary(),
        "trace_id": entry.trace_id,
        "request_id": entry.request_id,
        "request": {
            "method": entry.method,
            "endpoint": entry.endpoint,
            "path": entry.path,
            "query_params": entry.query_params,
            "body": entry.request_body,
            "headers": entry.request_headers,
            "ip_address": entry.ip_address,
            "user_agent": entry.user_agent,
        },
        "user": {
            "id": entry.user_id,
            "email": entry.user_email,
        },
        "response": {
            "status": entry.response_status,
            "time_ms": entry.response_time_ms,
            "size_bytes": entry.response_size_bytes,
            "data": entry.response_data,
        },
        "error": {
            "message": entry.error_message,
        },
        "metadata": entry.metadata,
        "tags": ["api", "audit", environment],
    })
}
