//! Audit trail repository

use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::audit::AuditEntry;
use crate::models::{AuditLogQuery, AuditLogRecord};

use super::parse_db_timestamp;

const AUDIT_COLUMNS: &str = "id, trace_id, request_id, user_id, user_email, ip_address, \
     user_agent, method, endpoint, path, query_params, request_body, request_headers, \
     response_status, response_time_ms, response_size_bytes, response_data, error_message, \
     environment, app_version, hostname, requested_at, responded_at, created_at";

#[derive(Debug, sqlx::FromRow)]
struct AuditRow {
    id: String,
    trace_id: String,
    request_id: String,
    user_id: Option<i64>,
    user_email: Option<String>,
    ip_address: Option<String>,
    user_agent: Option<String>,
    method: String,
    endpoint: String,
    path: String,
    query_params: Option<String>,
    request_body: Option<String>,
    request_headers: Option<String>,
    response_status: Option<i64>,
    response_time_ms: Option<i64>,
    response_size_bytes: Option<i64>,
    response_data: Option<String>,
    error_message: Option<String>,
    environment: Option<String>,
    app_version: Option<String>,
    hostname: Option<String>,
    requested_at: String,
    responded_at: Option<String>,
    created_at: String,
}

pub struct AuditLogRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> AuditLogRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Persist one finished audit entry as a flat row
    pub async fn insert(&self, entry: &AuditEntry) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let created_at = Utc::now().to_rfc3339();
        let metadata = entry.metadata.as_ref();

        sqlx::query(
            r#"
            INSERT INTO api_audit_logs (id, trace_id, request_id, user_id, user_email,
                ip_address, user_agent, method, endpoint, path, query_params, request_body,
                request_headers, response_status, response_time_ms, response_size_bytes,
                response_data, error_message, environment, app_version, hostname,
                requested_at, responded_at, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&entry.trace_id)
        .bind(&entry.request_id)
        .bind(entry.user_id)
        .bind(entry.user_email.as_deref())
        .bind(entry.ip_address.as_deref())
        .bind(entry.user_agent.as_deref())
        .bind(&entry.method)
        .bind(&entry.endpoint)
        .bind(&entry.path)
        .bind(entry.query_params.as_ref().map(|v| v.to_string()))
        .bind(entry.request_body.as_ref().map(|v| v.to_string()))
        .bind(entry.request_headers.as_ref().map(|v| v.to_string()))
        .bind(entry.response_status.map(i64::from))
        .bind(entry.response_time_ms.map(|v| v as i64))
        .bind(entry.response_size_bytes.map(|v| v as i64))
        .bind(entry.response_data.as_ref().map(|v| v.to_string()))
        .bind(entry.error_message.as_deref())
        .bind(metadata.map(|m| m.environment.clone()))
        .bind(metadata.map(|m| m.app_version.clone()))
        .bind(metadata.map(|m| m.hostname.clone()))
        .bind(entry.requested_at.to_rfc3339())
        .bind(entry.responded_at.map(|t| t.to_rfc3339()))
        .bind(&created_at)
        .execute(self.pool)
        .await
        .context("Failed to insert audit log row")?;

        Ok(id)
    }

    /// List audit rows, newest first, honoring the optional filters
    pub async fn list(&self, query: &AuditLogQuery) -> Result<Vec<AuditLogRecord>> {
        let mut sql = format!("SELECT {} FROM api_audit_logs WHERE 1=1", AUDIT_COLUMNS);

        if query.trace_id.is_some() {
            sql.push_str(" AND trace_id = ?");
        }
        if query.user_id.is_some() {
            sql.push_str(" AND user_id = ?");
        }
        if query.method.is_some() {
            sql.push_str(" AND method = ?");
        }
        if query.path.is_some() {
            sql.push_str(" AND path = ?");
        }
        if query.status.is_some() {
            sql.push_str(" AND response_status = ?");
        }

        sql.push_str(" ORDER BY requested_at DESC");

        if query.limit.is_some() {
            sql.push_str(" LIMIT ?");
        } else {
            sql.push_str(" LIMIT 100");
        }
        if query.offset.is_some() {
            sql.push_str(" OFFSET ?");
        }

        let mut q = sqlx::query_as::<_, AuditRow>(&sql);
        if let Some(ref trace_id) = query.trace_id {
            q = q.bind(trace_id);
        }
        if let Some(user_id) = query.user_id {
            q = q.bind(user_id);
        }
        if let Some(ref method) = query.method {
            q = q.bind(method);
        }
        if let Some(ref path) = query.path {
            q = q.bind(path);
        }
        if let Some(status) = query.status {
            q = q.bind(i64::from(status));
        }
        if let Some(limit) = query.limit {
            q = q.bind(limit as i64);
        }
        if let Some(offset) = query.offset {
            q = q.bind(offset as i64);
        }

        let rows = q
            .fetch_all(self.pool)
            .await
            .context("Failed to list audit log rows")?;

        Ok(rows.into_iter().map(row_to_record).collect())
    }

    /// All rows sharing one trace id, newest first
    pub async fn find_by_trace_id(&self, trace_id: &str) -> Result<Vec<AuditLogRecord>> {
        let sql = format!(
            "SELECT {} FROM api_audit_logs WHERE trace_id = ? ORDER BY requested_at DESC",
            AUDIT_COLUMNS
        );
        let rows = sqlx::query_as::<_, AuditRow>(&sql)
            .bind(trace_id)
            .fetch_all(self.pool)
            .await
            .context("Failed to query audit log rows by trace id")?;

        Ok(rows.into_iter().map(row_to_record).collect())
    }

    /// Delete rows whose request happened before the retention window
    pub async fn prune_older_than(&self, retention_days: u32) -> Result<u64> {
        let cutoff = (Utc::now() - chrono::Duration::days(i64::from(retention_days))).to_rfc3339();
        let result = sqlx::query("DELETE FROM api_audit_logs WHERE requested_at < ?")
            .bind(&cutoff)
            .execute(self.pool)
            .await
            .context("Failed to prune audit log rows")?;

        Ok(result.rows_affected())
    }
}

fn row_to_record(row: AuditRow) -> AuditLogRecord {
    AuditLogRecord {
        id: row.id,
        trace_id: row.trace_id,
        request_id: row.request_id,
        user_id: row.user_id,
        user_email: row.user_email,
        ip_address: row.ip_address,
        user_agent: row.user_agent,
        method: row.method,
        endpoint: row.endpoint,
        path: row.path,
        query_params: parse_json_column(row.query_params),
        request_body: parse_json_column(row.request_body),
        request_headers: parse_json_column(row.request_headers),
        response_status: row.response_status.map(|v| v as u16),
        response_time_ms: row.response_time_ms.map(|v| v as u64),
        response_size_bytes: row.response_size_bytes.map(|v| v as u64),
        response_data: parse_json_column(row.response_data),
        error_message: row.error_message,
        environment: row.environment,
        app_version: row.app_version,
        hostname: row.hostname,
        requested_at: parse_db_timestamp(&row.requested_at),
        responded_at: row.responded_at.as_deref().map(parse_db_timestamp),
        created_at: parse_db_timestamp(&row.created_at),
    }
}

fn parse_json_column(text: Option<String>) -> Option<serde_json::Value> {
    text.and_then(|t| serde_json::from_str(&t).ok())
}
