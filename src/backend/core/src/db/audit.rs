//! Append-only audit trail in `audit_logs`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{types::Json, FromRow, PgPool};
use uuid::Uuid;

use crate::rbac::models::{AuditMetadata, AuditRecord, OrganizationId, UserId};
use crate::rbac::stores::{AuditReader, AuditSink, StoreResult};

/// Postgres-backed [`AuditSink`] and [`AuditReader`].
#[derive(Clone)]
pub struct PgAuditLog {
    pool: PgPool,
}

impl PgAuditLog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct AuditRow {
    id: Uuid,
    user_id: String,
    org_id: String,
    action: String,
    resource: Option<String>,
    ip: Option<String>,
    user_agent: Option<String>,
    metadata: Json<AuditMetadata>,
    created_at: DateTime<Utc>,
}

impl From<AuditRow> for AuditRecord {
    fn from(row: AuditRow) -> Self {
        AuditRecord {
            id: row.id,
            user_id: UserId::new(row.user_id),
            org_id: OrganizationId::new(row.org_id),
            action: row.action,
            resource: row.resource,
            ip: row.ip,
            user_agent: row.user_agent,
            timestamp: row.created_at,
            metadata: row.metadata.0,
        }
    }
}

#[async_trait]
impl AuditSink for PgAuditLog {
    async fn append(&self, record: &AuditRecord) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_logs (id, user_id, org_id, action, resource, ip, user_agent, metadata, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(record.id)
        .bind(record.user_id.as_str())
        .bind(record.org_id.as_str())
        .bind(&record.action)
        .bind(record.resource.as_deref())
        .bind(record.ip.as_deref())
        .bind(record.user_agent.as_deref())
        .bind(Json(&record.metadata))
        .bind(record.timestamp)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl AuditReader for PgAuditLog {
    async fn recent(&self, org_id: &OrganizationId, limit: usize) -> StoreResult<Vec<AuditRecord>> {
        let rows = sqlx::query_as::<_, AuditRow>(
            r#"
            SELECT id, user_id, org_id, action, resource, ip, user_agent, metadata, created_at
            FROM audit_logs
            WHERE org_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(org_id.as_str())
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(AuditRecord::from).collect())
    }
}
