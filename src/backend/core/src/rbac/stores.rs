//! Collaborator contracts consumed by the access guard.
//!
//! Each store is a single-round-trip interface. Postgres and Redis backends
//! live in [`crate::db`] and [`crate::cache`]; in-memory backends live in
//! [`super::memory`].

use async_trait::async_trait;
use std::sync::Arc;

use super::models::{AuditRecord, MatterId, MatterRecord, Membership, OrganizationId, UserId};
use crate::error::StoreError;

/// Result type for collaborator calls.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Looks up a user's membership in an organization.
#[async_trait]
pub trait MembershipStore: Send + Sync {
    /// First active membership of `user_id` in `org_id`, with its role and
    /// the role's permissions.
    async fn find_active_membership(
        &self,
        user_id: &UserId,
        org_id: &OrganizationId,
    ) -> StoreResult<Option<Membership>>;
}

/// Looks up a matter inside an organization.
#[async_trait]
pub trait MatterStore: Send + Sync {
    /// The matter `matter_id` if it belongs to `org_id`, with all member rows.
    async fn find_matter(
        &self,
        matter_id: &MatterId,
        org_id: &OrganizationId,
    ) -> StoreResult<Option<MatterRecord>>;
}

/// Expiring integer counters.
#[async_trait]
pub trait CounterStore: Send + Sync {
    async fn get(&self, key: &str) -> StoreResult<Option<u64>>;

    /// Increment `key`, creating it at 1; returns the new value.
    async fn increment(&self, key: &str) -> StoreResult<u64>;

    /// Set the time-to-live of `key`.
    async fn expire(&self, key: &str, seconds: u64) -> StoreResult<()>;

    /// Increment and refresh the expiry. Backends that can do both in one
    /// atomic round-trip override this.
    async fn increment_with_expiry(&self, key: &str, seconds: u64) -> StoreResult<u64> {
        let count = self.increment(key).await?;
        self.expire(key, seconds).await?;
        Ok(count)
    }
}

/// Durable append-only audit destination.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Persist `record`. Must be durable when it returns `Ok`.
    async fn append(&self, record: &AuditRecord) -> StoreResult<()>;
}

/// Read side of the audit trail.
#[async_trait]
pub trait AuditReader: Send + Sync {
    /// Most recent records for `org_id`, newest first.
    async fn recent(&self, org_id: &OrganizationId, limit: usize) -> StoreResult<Vec<AuditRecord>>;
}

/// The set of collaborators the guard is constructed with.
#[derive(Clone)]
pub struct GuardStores {
    pub memberships: Arc<dyn MembershipStore>,
    pub matters: Arc<dyn MatterStore>,
    pub counters: Arc<dyn CounterStore>,
    pub audit: Arc<dyn AuditSink>,
}

impl GuardStores {
    pub fn new(
        memberships: Arc<dyn MembershipStore>,
        matters: Arc<dyn MatterStore>,
        counters: Arc<dyn CounterStore>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            memberships,
            matters,
            counters,
            audit,
        }
    }
}
