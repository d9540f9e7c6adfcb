//! In-memory store backends.
//!
//! Thread-safe via `DashMap` / `parking_lot`. Every backend counts its calls
//! and can be switched into a failing mode, which is what the guard tests
//! and benches build on.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use super::models::{AuditRecord, MatterId, MatterRecord, Membership, OrganizationId, UserId};
use super::stores::{AuditReader, AuditSink, CounterStore, MatterStore, MembershipStore, StoreResult};
use crate::error::StoreError;

/// Shared failure/latency switches.
#[derive(Debug, Default)]
struct FaultState {
    unavailable: AtomicBool,
    latency: RwLock<Option<Duration>>,
}

impl FaultState {
    async fn apply(&self, name: &str) -> StoreResult<()> {
        let latency = *self.latency.read();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(format!("{name} is unavailable")));
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Directory (memberships + matters)
// ═══════════════════════════════════════════════════════════════════════════════

/// Memberships and matters held in memory.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    /// Membership rows per (user, org) in insertion order.
    memberships: DashMap<(UserId, OrganizationId), Vec<Membership>>,
    matters: DashMap<MatterId, MatterRecord>,
    membership_lookups: AtomicUsize,
    matter_lookups: AtomicUsize,
    faults: FaultState,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_membership(&self, membership: Membership) {
        let key = (membership.user_id.clone(), membership.org_id.clone());
        self.memberships.entry(key).or_default().push(membership);
    }

    pub fn add_matter(&self, matter: MatterRecord) {
        self.matters.insert(matter.id.clone(), matter);
    }

    pub fn membership_lookups(&self) -> usize {
        self.membership_lookups.load(Ordering::SeqCst)
    }

    pub fn matter_lookups(&self) -> usize {
        self.matter_lookups.load(Ordering::SeqCst)
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.faults.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.faults.latency.write() = latency;
    }
}

#[async_trait]
impl MembershipStore for InMemoryDirectory {
    async fn find_active_membership(
        &self,
        user_id: &UserId,
        org_id: &OrganizationId,
    ) -> StoreResult<Option<Membership>> {
        self.membership_lookups.fetch_add(1, Ordering::SeqCst);
        self.faults.apply("membership store").await?;

        let key = (user_id.clone(), org_id.clone());
        Ok(self
            .memberships
            .get(&key)
            .and_then(|rows| rows.iter().find(|m| m.is_active()).cloned()))
    }
}

#[async_trait]
impl MatterStore for InMemoryDirectory {
    async fn find_matter(
        &self,
        matter_id: &MatterId,
        org_id: &OrganizationId,
    ) -> StoreResult<Option<MatterRecord>> {
        self.matter_lookups.fetch_add(1, Ordering::SeqCst);
        self.faults.apply("matter store").await?;

        Ok(self
            .matters
            .get(matter_id)
            .filter(|m| &m.org_id == org_id)
            .map(|m| m.clone()))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Counters
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
struct CounterEntry {
    value: u64,
    expires_at: Option<Instant>,
}

impl CounterEntry {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

/// Expiring counters held in memory.
#[derive(Debug, Default)]
pub struct InMemoryCounterStore {
    entries: DashMap<String, CounterEntry>,
    get_calls: AtomicUsize,
    increment_calls: AtomicUsize,
    expire_calls: AtomicUsize,
    faults: FaultState,
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a counter without touching the call counts.
    pub fn set(&self, key: impl Into<String>, value: u64) {
        self.entries.insert(
            key.into(),
            CounterEntry {
                value,
                expires_at: None,
            },
        );
    }

    /// Current value, ignoring expired entries. Does not count as a call.
    pub fn peek(&self, key: &str) -> Option<u64> {
        self.entries
            .get(key)
            .filter(|e| !e.is_expired())
            .map(|e| e.value)
    }

    /// Remaining time-to-live of `key`.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        self.entries
            .get(key)
            .and_then(|e| e.expires_at)
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub fn increment_calls(&self) -> usize {
        self.increment_calls.load(Ordering::SeqCst)
    }

    pub fn expire_calls(&self) -> usize {
        self.expire_calls.load(Ordering::SeqCst)
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.faults.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.faults.latency.write() = latency;
    }

    /// Drop expired entries.
    pub fn cleanup_expired(&self) {
        self.entries.retain(|_, e| !e.is_expired());
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn get(&self, key: &str) -> StoreResult<Option<u64>> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        self.faults.apply("counter store").await?;
        Ok(self.peek(key))
    }

    async fn increment(&self, key: &str) -> StoreResult<u64> {
        self.increment_calls.fetch_add(1, Ordering::SeqCst);
        self.faults.apply("counter store").await?;

        let mut entry = self.entries.entry(key.to_string()).or_insert(CounterEntry {
            value: 0,
            expires_at: None,
        });
        if entry.is_expired() {
            *entry = CounterEntry {
                value: 0,
                expires_at: None,
            };
        }
        entry.value += 1;
        Ok(entry.value)
    }

    async fn expire(&self, key: &str, seconds: u64) -> StoreResult<()> {
        self.expire_calls.fetch_add(1, Ordering::SeqCst);
        self.faults.apply("counter store").await?;

        if let Some(mut entry) = self.entries.get_mut(key) {
            entry.expires_at = Some(Instant::now() + Duration::from_secs(seconds));
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Audit
// ═══════════════════════════════════════════════════════════════════════════════

/// Audit trail held in memory.
#[derive(Debug, Default)]
pub struct InMemoryAuditSink {
    records: RwLock<Vec<AuditRecord>>,
    faults: FaultState,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.read().clone()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.faults.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

#[async_trait]
impl AuditSink for InMemoryAuditSink {
    async fn append(&self, record: &AuditRecord) -> StoreResult<()> {
        self.faults.apply("audit sink").await?;
        self.records.write().push(record.clone());
        Ok(())
    }
}

#[async_trait]
impl AuditReader for InMemoryAuditSink {
    async fn recent(&self, org_id: &OrganizationId, limit: usize) -> StoreResult<Vec<AuditRecord>> {
        self.faults.apply("audit sink").await?;
        Ok(self
            .records
            .read()
            .iter()
            .rev()
            .filter(|r| &r.org_id == org_id)
            .take(limit)
            .cloned()
            .collect())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rbac::models::{MembershipStatus, Role};

    #[tokio::test]
    async fn test_first_active_membership_wins() {
        let dir = InMemoryDirectory::new();
        dir.add_membership(
            Membership::active("u1", "o1", Role::new("ADMIN", Vec::<String>::new()))
                .with_status(MembershipStatus::Inactive),
        );
        dir.add_membership(Membership::active("u1", "o1", Role::new("VIEWER", ["matter:read"])));
        dir.add_membership(Membership::active("u1", "o1", Role::new("MANAGER", ["matter:write"])));

        let found = dir
            .find_active_membership(&UserId::new("u1"), &OrganizationId::new("o1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.role.name, "VIEWER");
        assert_eq!(dir.membership_lookups(), 1);
    }

    #[tokio::test]
    async fn test_matter_scoped_to_org() {
        let dir = InMemoryDirectory::new();
        dir.add_matter(MatterRecord::new("m1", "o1"));

        let hit = dir
            .find_matter(&MatterId::new("m1"), &OrganizationId::new("o1"))
            .await
            .unwrap();
        let miss = dir
            .find_matter(&MatterId::new("m1"), &OrganizationId::new("o2"))
            .await
            .unwrap();

        assert!(hit.is_some());
        assert!(miss.is_none());
        assert_eq!(dir.matter_lookups(), 2);
    }

    #[tokio::test]
    async fn test_counter_increment_and_expire() {
        let counters = InMemoryCounterStore::new();
        assert_eq!(counters.get("k").await.unwrap(), None);
        assert_eq!(counters.increment("k").await.unwrap(), 1);
        assert_eq!(counters.increment_with_expiry("k", 60).await.unwrap(), 2);

        let ttl = counters.ttl("k").unwrap();
        assert!(ttl <= Duration::from_secs(60) && ttl > Duration::from_secs(55));
        assert_eq!(counters.increment_calls(), 2);
        assert_eq!(counters.expire_calls(), 1);
    }

    #[tokio::test]
    async fn test_counter_expiry_resets() {
        let counters = InMemoryCounterStore::new();
        counters.increment("k").await.unwrap();
        counters.expire("k", 0).await.unwrap();

        assert_eq!(counters.get("k").await.unwrap(), None);
        assert_eq!(counters.increment("k").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unavailable_store_errors() {
        let sink = InMemoryAuditSink::new();
        sink.set_unavailable(true);
        let err = sink
            .recent(&OrganizationId::new("o1"), 10)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
    }
}
