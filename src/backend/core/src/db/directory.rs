//! Membership and matter lookups.

use async_trait::async_trait;
use sqlx::{FromRow, PgPool};

use crate::rbac::models::{
    MatterId, MatterMember, MatterRecord, Membership, MembershipStatus, OrganizationId, Role,
    UserId,
};
use crate::rbac::stores::{MatterStore, MembershipStore, StoreResult};

/// Postgres-backed [`MembershipStore`] and [`MatterStore`].
#[derive(Clone)]
pub struct PgDirectory {
    pool: PgPool,
}

impl PgDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct MembershipRow {
    user_id: String,
    org_id: String,
    status: String,
    role_name: String,
    permissions: Vec<String>,
}

impl From<MembershipRow> for Membership {
    fn from(row: MembershipRow) -> Self {
        Membership {
            user_id: UserId::new(row.user_id),
            org_id: OrganizationId::new(row.org_id),
            status: MembershipStatus::parse(&row.status),
            role: Role::new(row.role_name, row.permissions),
        }
    }
}

/// One matter joined with one of its member rows.
#[derive(Debug, FromRow)]
struct MatterMemberRow {
    matter_id: String,
    org_id: String,
    member_user_id: Option<String>,
    member_status: Option<String>,
}

#[async_trait]
impl MembershipStore for PgDirectory {
    async fn find_active_membership(
        &self,
        user_id: &UserId,
        org_id: &OrganizationId,
    ) -> StoreResult<Option<Membership>> {
        let row = sqlx::query_as::<_, MembershipRow>(
            r#"
            SELECT m.user_id, m.org_id, m.status, r.name AS role_name,
                   COALESCE(
                       array_agg(p.name ORDER BY p.name) FILTER (WHERE p.name IS NOT NULL),
                       '{}'::text[]
                   ) AS permissions
            FROM memberships m
            JOIN roles r ON r.id = m.role_id
            LEFT JOIN role_permissions rp ON rp.role_id = r.id
            LEFT JOIN permissions p ON p.id = rp.permission_id
            WHERE m.user_id = $1 AND m.org_id = $2 AND m.status = 'active'
            GROUP BY m.id, r.name
            ORDER BY m.created_at
            LIMIT 1
            "#,
        )
        .bind(user_id.as_str())
        .bind(org_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Membership::from))
    }
}

#[async_trait]
impl MatterStore for PgDirectory {
    async fn find_matter(
        &self,
        matter_id: &MatterId,
        org_id: &OrganizationId,
    ) -> StoreResult<Option<MatterRecord>> {
        let rows = sqlx::query_as::<_, MatterMemberRow>(
            r#"
            SELECT mt.id AS matter_id, mt.org_id,
                   mm.user_id AS member_user_id, mm.status AS member_status
            FROM matters mt
            LEFT JOIN matter_members mm ON mm.matter_id = mt.id
            WHERE mt.id = $1 AND mt.org_id = $2
            ORDER BY mm.created_at
            "#,
        )
        .bind(matter_id.as_str())
        .bind(org_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(fold_matter(rows))
    }
}

fn fold_matter(rows: Vec<MatterMemberRow>) -> Option<MatterRecord> {
    let first = rows.first()?;
    let mut record = MatterRecord::new(first.matter_id.as_str(), first.org_id.as_str());

    record.members = rows
        .into_iter()
        .filter_map(|row| {
            let user_id = row.member_user_id?;
            Some(MatterMember::new(
                user_id,
                MembershipStatus::parse(row.member_status.as_deref().unwrap_or_default()),
            ))
        })
        .collect();

    Some(record)
}
