//! Audit trail models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One persisted audit row, the flat database shape of an audit entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogRecord {
    pub id: String,
    pub trace_id: String,
    pub request_id: String,
    pub user_id: Option<i64>,
    pub user_email: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub method: String,
    pub endpoint: String,
    pub path: String,
    pub query_params: Option<serde_json::Value>,
    pub request_body: Option<serde_json::Value>,
    pub request_headers: Option<serde_json::Value>,
    pub response_status: Option<u16>,
    pub response_time_ms: Option<u64>,
    pub response_size_bytes: Option<u64>,
    pub response_data: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub environment: Option<String>,
    pub app_version: Option<String>,
    pub hostname: Option<String>,
    pub requested_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// List filter for the audit trail
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AuditLogQuery {
    pub trace_id: Option<String>,
    pub user_id: Option<i64>,
    pub method: Option<String>,
    pub path: Option<String>,
    pub status: Option<u16>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}
