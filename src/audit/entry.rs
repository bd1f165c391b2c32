//! Audit entry data transfer object
//!
//! One entry describes one audited HTTP exchange. The interceptor fills the
//! request-phase fields up front, completes the response-phase fields after
//! the handler ran, and hands the finished entry to the dispatch queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Snapshot of a single audited request/response exchange
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub trace_id: String,
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    pub method: String,
    /// Full request URL including scheme and host where known
    pub endpoint: String,
    /// Request path relative to the server root
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_params: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_body: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_headers: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_size_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<AuditMetadata>,
    pub requested_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub responded_at: Option<DateTime<Utc>>,
}

/// Deployment context attached to every entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditMetadata {
    pub environment: String,
    pub app_version: String,
    pub hostname: String,
}

impl AuditEntry {
    /// Start an entry from the request phase
    pub fn begin(
        trace_id: impl Into<String>,
        request_id: impl Into<String>,
        method: impl Into<String>,
        endpoint: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            trace_id: trace_id.into(),
            request_id: request_id.into(),
            user_id: None,
            user_email: None,
            ip_address: None,
            user_agent: None,
            method: method.into(),
            endpoint: endpoint.into(),
            path: path.into(),
            query_params: None,
            request_body: None,
            request_headers: None,
            response_status: None,
            response_time_ms: None,
            response_size_bytes: None,
            response_data: None,
            error_message: None,
            metadata: None,
            requested_at: Utc::now(),
            responded_at: None,
        }
    }

    /// One-line digest used in the log document
    pub fn summary(&self) -> String {
        format!(
            "{} {} - {}",
            self.method,
            self.path,
            self.response_status.unwrap_or(0)
        )
    }

    /// Whether the recorded response was an error
    pub fn is_error(&self) -> bool {
        matches!(self.response_status, Some(status) if status >= 400)
    }

    /// Marker substituted for payloads that exceed the capture ceiling
    pub fn truncation_marker(size: usize) -> Value {
        serde_json::json!({"_truncated": true, "_size": size})
    }
}
