#![allow(clippy::result_large_err)]
//! # Covenant Core
//!
//! Access-control gateway for organization- and matter-scoped operations.
//!
//! ## Architecture
//!
//! - **RBAC**: Ordered authorization pipeline (identity, rate limit, roles,
//!   permissions, org scope, matter scope, audit) behind a per-route policy registry
//! - **Middleware**: Bearer-token authentication feeding the guard its principal
//! - **Database**: Postgres membership, matter and audit stores
//! - **Cache**: Redis counters for per-user, per-path rate limiting
//! - **Observability**: Structured logging, OTLP tracing and Prometheus metrics

pub mod api;
pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod observability;
pub mod rbac;

pub use error::{ErrorCode, ErrorResponse, ForbiddenReason, GuardError, StoreError};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::error::{
        Collaborator, ErrorCode, ErrorResponse, ForbiddenReason, GuardError, MatterDenial,
        StoreError,
    };
    pub use crate::middleware::{AuthError, AuthLayer, AuthSettings, Authenticator, Claims};
    pub use crate::rbac::{
        AccessControlGuard, AccessControlLayer, AccessGrant, AuditFailureMode, AuditReader,
        AuditRecord, AuditSink, BuiltinRole, CounterStore, Decision, EndpointAccess,
        EndpointPolicy, GuardRequest, GuardSettings, GuardStores, MatterId, MatterRecord,
        MatterStore, Membership, MembershipStatus, MembershipStore, OrganizationId,
        PolicyRegistry, Principal, RateLimitSettings, Role, UndeclaredPolicy, UserId,
    };
}
