//! Incident repository

use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::SqlitePool;

use crate::models::{
    CreateIncidentRequest, Incident, IncidentQuery, IncidentStatus, Severity,
    UpdateIncidentRequest,
};

use super::parse_db_timestamp;

#[derive(Debug, sqlx::FromRow)]
struct IncidentRow {
    id: i64,
    title: String,
    description: Option<String>,
    severity: String,
    status: String,
    created_by: Option<i64>,
    created_at: String,
    updated_at: String,
}

pub struct IncidentRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> IncidentRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        request: &CreateIncidentRequest,
        created_by: Option<i64>,
    ) -> Result<Incident> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO incidents (title, description, severity, status, created_by, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&request.title)
        .bind(request.description.as_deref())
        .bind(request.severity.to_string())
        .bind(IncidentStatus::Open.to_string())
        .bind(created_by)
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(self.pool)
        .await
        .context("Failed to create incident")?;

        Ok(Incident {
            id: result.last_insert_rowid(),
            title: request.title.clone(),
            description: request.description.clone(),
            severity: request.severity,
            status: IncidentStatus::Open,
            created_by,
            created_at: now,
            updated_at: now,
        })
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<Incident>> {
        let row = sqlx::query_as::<_, IncidentRow>(
            "SELECT id, title, description, severity, status, created_by, created_at, updated_at FROM incidents WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await
        .context("Failed to fetch incident")?;

        Ok(row.map(row_to_incident))
    }

    pub async fn list(&self, query: &IncidentQuery) -> Result<Vec<Incident>> {
        let mut sql = String::from(
            "SELECT id, title, description, severity, status, created_by, created_at, updated_at FROM incidents WHERE 1=1",
        );

        if query.status.is_some() {
            sql.push_str(" AND status = ?");
        }
        if query.severity.is_some() {
            sql.push_str(" AND severity = ?");
        }

        sql.push_str(" ORDER BY created_at DESC");

        if query.limit.is_some() {
            sql.push_str(" LIMIT ?");
        } else {
            sql.push_str(" LIMIT 100");
        }
        if query.offset.is_some() {
            sql.push_str(" OFFSET ?");
        }

        let mut q = sqlx::query_as::<_, IncidentRow>(&sql);
        if let Some(status) = query.status {
            q = q.bind(status.to_string());
        }
        if let Some(severity) = query.severity {
            q = q.bind(severity.to_string());
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
            .context("Failed to list incidents")?;

        Ok(rows.into_iter().map(row_to_incident).collect())
    }

    /// Apply the provided fields; untouched fields keep their current value
    pub async fn update(&self, id: i64, request: &UpdateIncidentRequest) -> Result<Option<Incident>> {
        let existing = match self.get_by_id(id).await? {
            Some(incident) => incident,
            None => return Ok(None),
        };

        let title = request.title.as_deref().unwrap_or(&existing.title);
        let description = request
            .description
            .as_deref()
            .or(existing.description.as_deref());
        let severity = request.severity.unwrap_or(existing.severity);
        let status = request.status.unwrap_or(existing.status);
        let updated_at = Utc::now();

        sqlx::query(
            "UPDATE incidents SET title = ?, description = ?, severity = ?, status = ?, updated_at = ? WHERE id = ?",
        )
        .bind(title)
        .bind(description)
        .bind(severity.to_string())
        .bind(status.to_string())
        .bind(updated_at.to_rfc3339())
        .bind(id)
        .execute(self.pool)
        .await
        .context("Failed to update incident")?;

        Ok(Some(Incident {
            id,
            title: title.to_string(),
            description: description.map(String::from),
            severity,
            status,
            created_by: existing.created_by,
            created_at: existing.created_at,
            updated_at,
        }))
    }

    pub async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM incidents WHERE id = ?")
            .bind(id)
            .execute(self.pool)
            .await
            .context("Failed to delete incident")?;

        Ok(result.rows_affected() > 0)
    }
}

fn row_to_incident(row: IncidentRow) -> Incident {
    Incident {
        id: row.id,
        title: row.title,
        description: row.description,
        severity: Severity::from_str(&row.severity).unwrap_or_default(),
        status: IncidentStatus::from_str(&row.status).unwrap_or_default(),
        created_by: row.created_by,
        created_at: parse_db_timestamp(&row.created_at),
        updated_at: parse_db_timestamp(&row.updated_at),
    }
}
