//! Role-based access control for organization- and matter-scoped operations.
//!
//! This module provides:
//! - **Models**: principals, memberships, roles, matters and audit records
//! - **Policy registry**: per-operation access declarations
//! - **Builtin roles**: ADMIN, MANAGER, MEMBER, VIEWER with default permission sets
//! - **Guard**: the ordered authorization pipeline with rate limiting and audit
//! - **Middleware**: Axum layer that runs the guard in front of routes
//!
//! # Usage
//!
//! ```rust,ignore
//! use covenant_core::rbac::{
//!     AccessControlGuard, AccessControlLayer, EndpointPolicy, GuardSettings,
//!     GuardStores, PolicyRegistry,
//! };
//!
//! let guard = AccessControlGuard::new(stores, GuardSettings::default());
//!
//! let registry = PolicyRegistry::new().protected(
//!     Method::GET,
//!     "/api/v1/orgs/:orgId/audit-logs",
//!     EndpointPolicy::builder().roles(["ADMIN"]).org_required().audit().build(),
//! );
//!
//! let app = Router::new()
//!     .route("/api/v1/orgs/:orgId/audit-logs", get(list_audit_logs))
//!     .route_layer(AccessControlLayer::new(guard, Arc::new(registry)));
//! ```

pub mod guard;
pub mod memory;
pub mod middleware;
pub mod models;
pub mod policy;
pub mod rate_limit;
pub mod roles;
pub mod scope;
pub mod stores;

pub use guard::{AccessControlGuard, AccessGrant, Decision, GuardSettings};
pub use memory::{InMemoryAuditSink, InMemoryCounterStore, InMemoryDirectory};
pub use middleware::{AccessControlLayer, AccessControlService};
pub use models::{
    AuditMetadata, AuditRecord, MatterId, MatterMember, MatterRecord, Membership,
    MembershipStatus, OrganizationId, Principal, Role, UserId,
};
pub use policy::{
    AuditFailureMode, EndpointAccess, EndpointPolicy, EndpointPolicyBuilder, OperationKey,
    PolicyRegistry, UndeclaredPolicy,
};
pub use rate_limit::{RateDecision, RateLimitSettings, RequestRateLimiter};
pub use roles::BuiltinRole;
pub use scope::{GuardRequest, ScopeField};
pub use stores::{
    AuditReader, AuditSink, CounterStore, GuardStores, MatterStore, MembershipStore, StoreResult,
};
