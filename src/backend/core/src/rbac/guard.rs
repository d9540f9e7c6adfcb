//! The access-control guard: the single authorization chokepoint evaluated
//! before every protected operation.
//!
//! Steps run strictly in this order, each one a single round-trip to at most
//! one collaborator:
//!
//! 1. identity: a principal must be attached
//! 2. rate limit on `(user, path)`
//! 3. role/permission resolution from the active membership
//! 4. role check (any-of)
//! 5. permission check (any-of)
//! 6. organization scope
//! 7. matter scope
//! 8. audit record for granted, audited operations
//!
//! Any failure is terminal. Every denial is logged with the request context
//! before it is returned.

use metrics::counter;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::models::{
    AuditMetadata, AuditRecord, MatterId, Membership, OrganizationId, Principal,
};
use super::policy::{AuditFailureMode, EndpointAccess, EndpointPolicy, UndeclaredPolicy};
use super::rate_limit::{RateDecision, RateLimitSettings, RequestRateLimiter};
use super::scope::GuardRequest;
use super::stores::{GuardStores, StoreResult};
use crate::error::{Collaborator, ForbiddenReason, GuardError, MatterDenial, StoreError};

// ═══════════════════════════════════════════════════════════════════════════════
// Settings
// ═══════════════════════════════════════════════════════════════════════════════

/// Guard configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardSettings {
    /// Rate limiting on `(user, path)`
    #[serde(default)]
    pub rate_limit: RateLimitSettings,

    /// Behaviour for operations without a declaration
    #[serde(default)]
    pub undeclared: UndeclaredPolicy,

    /// Behaviour when the audit sink rejects a write
    #[serde(default)]
    pub audit_failure: AuditFailureMode,

    /// Upper bound for each collaborator call
    #[serde(default = "default_store_timeout", with = "humantime_serde")]
    pub store_timeout: Duration,

    /// Largest request body buffered for scope extraction
    #[serde(default = "default_body_limit_bytes")]
    pub body_limit_bytes: usize,
}

impl Default for GuardSettings {
    fn default() -> Self {
        Self {
            rate_limit: RateLimitSettings::default(),
            undeclared: UndeclaredPolicy::default(),
            audit_failure: AuditFailureMode::default(),
            store_timeout: default_store_timeout(),
            body_limit_bytes: default_body_limit_bytes(),
        }
    }
}

fn default_store_timeout() -> Duration { Duration::from_secs(5) }
fn default_body_limit_bytes() -> usize { 1024 * 1024 }

// ═══════════════════════════════════════════════════════════════════════════════
// Decision
// ═══════════════════════════════════════════════════════════════════════════════

/// What a granted request is allowed to act as.
///
/// Inserted into request extensions so handlers can read the resolved role
/// and permissions without re-evaluating anything.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccessGrant {
    pub principal: Principal,
    /// Organization the role was resolved in.
    pub org_id: OrganizationId,
    pub role: Option<String>,
    pub permissions: Vec<String>,
    /// Matter the request was scoped to, when the policy required one.
    pub matter_id: Option<MatterId>,
    /// Audit record written for this request.
    pub audit_id: Option<Uuid>,
}

/// Successful outcome of [`AccessControlGuard::evaluate`].
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Every check of a protected operation passed.
    Granted(AccessGrant),
    /// Public operation, or undeclared operation under `UndeclaredPolicy::Allow`.
    Bypassed,
}

impl Decision {
    pub fn grant(&self) -> Option<&AccessGrant> {
        match self {
            Self::Granted(grant) => Some(grant),
            Self::Bypassed => None,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Guard
// ═══════════════════════════════════════════════════════════════════════════════

macro_rules! denial_event {
    ($level:ident, $err:expr, $req:expr) => {
        $level!(
            error = %$err,
            reason = $err.label(),
            user_id = $req.principal.as_ref().map(|p| p.user_id.as_str()),
            path = %$req.path,
            method = %$req.method,
            ip = $req.ip.as_deref(),
            user_agent = $req.user_agent.as_deref(),
            "RBAC check failed"
        )
    };
}

/// Request-scoped authorization pipeline.
///
/// Holds no per-request state; one instance is shared by every request and
/// all collaborators are injected at construction.
#[derive(Clone)]
pub struct AccessControlGuard {
    stores: GuardStores,
    limiter: RequestRateLimiter,
    settings: Arc<GuardSettings>,
}

impl AccessControlGuard {
    pub fn new(stores: GuardStores, settings: GuardSettings) -> Self {
        let limiter = RequestRateLimiter::new(stores.counters.clone(), settings.rate_limit.clone());
        Self {
            stores,
            limiter,
            settings: Arc::new(settings),
        }
    }

    pub fn settings(&self) -> &GuardSettings {
        &self.settings
    }

    pub fn rate_limiter(&self) -> &RequestRateLimiter {
        &self.limiter
    }

    /// Evaluate `request` against the declaration of its operation.
    ///
    /// `access` is `None` when the operation declared nothing; the configured
    /// [`UndeclaredPolicy`] decides that case.
    pub async fn evaluate(
        &self,
        request: &GuardRequest,
        access: Option<&EndpointAccess>,
    ) -> Result<Decision, GuardError> {
        let policy = match access {
            Some(EndpointAccess::Protected(policy)) => policy,
            Some(EndpointAccess::Public) => return Ok(Decision::Bypassed),
            None => match self.settings.undeclared {
                UndeclaredPolicy::Allow => {
                    debug!(method = %request.method, path = %request.path, "No access policy declared; allowing");
                    return Ok(Decision::Bypassed);
                }
                UndeclaredPolicy::Deny => {
                    let err = GuardError::from(ForbiddenReason::Undeclared {
                        operation: request.action(),
                    });
                    return Err(self.deny(request, err));
                }
            },
        };

        match self.check(request, policy).await {
            Ok(grant) => {
                counter!("access_guard_decisions_total", "outcome" => "granted", "code" => "OK")
                    .increment(1);
                Ok(Decision::Granted(grant))
            }
            Err(err) => Err(self.deny(request, err)),
        }
    }

    async fn check(
        &self,
        request: &GuardRequest,
        policy: &EndpointPolicy,
    ) -> Result<AccessGrant, GuardError> {
        let principal = request
            .principal
            .as_ref()
            .ok_or(GuardError::Unauthenticated)?;

        let rate = self
            .call(
                Collaborator::CounterStore,
                self.limiter.check(&principal.user_id, &request.path),
            )
            .await?;
        if let RateDecision::Limited { .. } = rate {
            let settings = self.limiter.settings();
            return Err(GuardError::RateLimited {
                limit: settings.requests_per_window,
                window_secs: settings.window_secs,
            });
        }

        let requested_org = request.requested_org();
        let resolved_org = requested_org
            .clone()
            .unwrap_or_else(|| principal.org_id.clone());
        let membership = self
            .call(
                Collaborator::MembershipStore,
                self.stores
                    .memberships
                    .find_active_membership(&principal.user_id, &resolved_org),
            )
            .await?
            .filter(Membership::is_active);

        let role = membership.as_ref().map(|m| m.role.name.clone());
        let permissions = membership
            .as_ref()
            .map(|m| m.role.permissions.clone())
            .unwrap_or_default();

        if !policy.roles.is_empty()
            && !role.as_ref().is_some_and(|r| policy.roles.contains(r))
        {
            return Err(ForbiddenReason::RoleMismatch {
                required: policy.roles.clone(),
            }
            .into());
        }

        if !policy.permissions.is_empty()
            && !permissions.iter().any(|p| policy.permissions.contains(p))
        {
            return Err(ForbiddenReason::PermissionMismatch {
                required: policy.permissions.clone(),
            }
            .into());
        }

        if policy.org_required {
            let org_id = requested_org.ok_or(ForbiddenReason::OrgIdRequired)?;
            // Resolution above already looked up the membership in this org.
            if membership.is_none() {
                return Err(ForbiddenReason::OrgAccessDenied {
                    org_id: org_id.to_string(),
                }
                .into());
            }
        }

        let matter_id = if policy.matter_required {
            Some(self.check_matter(request, principal).await?)
        } else {
            None
        };

        let audit_id = if policy.audit {
            self.audit(request, principal, policy).await?
        } else {
            None
        };

        Ok(AccessGrant {
            principal: principal.clone(),
            org_id: resolved_org,
            role,
            permissions,
            matter_id,
            audit_id,
        })
    }

    /// The matter must exist in the principal's own org and list the
    /// principal as an active member.
    async fn check_matter(
        &self,
        request: &GuardRequest,
        principal: &Principal,
    ) -> Result<MatterId, GuardError> {
        let denied = |detail| ForbiddenReason::MatterAccessDenied { detail };

        let matter_id = request
            .requested_matter()
            .ok_or_else(|| denied(MatterDenial::MissingId))?;

        let matter = self
            .call(
                Collaborator::MatterStore,
                self.stores.matters.find_matter(&matter_id, &principal.org_id),
            )
            .await?;

        match matter {
            Some(m) if m.org_id == principal.org_id => {
                if m.has_active_member(&principal.user_id) {
                    Ok(matter_id)
                } else {
                    Err(denied(MatterDenial::NotActiveMember).into())
                }
            }
            _ => Err(denied(MatterDenial::NotFound).into()),
        }
    }

    /// Persist the audit record. Returns its id, or `None` when the write
    /// failed under `AuditFailureMode::LogAndContinue`.
    async fn audit(
        &self,
        request: &GuardRequest,
        principal: &Principal,
        policy: &EndpointPolicy,
    ) -> Result<Option<Uuid>, GuardError> {
        let record = AuditRecord {
            id: Uuid::new_v4(),
            user_id: principal.user_id.clone(),
            org_id: principal.org_id.clone(),
            action: request.action(),
            resource: request.resource_id(),
            ip: request.ip.clone(),
            user_agent: request.user_agent.clone(),
            timestamp: chrono::Utc::now(),
            metadata: AuditMetadata {
                roles: policy.roles.clone(),
                permissions: policy.permissions.clone(),
                success: true,
            },
        };

        match self
            .call(Collaborator::AuditSink, self.stores.audit.append(&record))
            .await
        {
            Ok(()) => {
                info!(
                    audit_id = %record.id,
                    user_id = %record.user_id,
                    org_id = %record.org_id,
                    action = %record.action,
                    resource = record.resource.as_deref(),
                    ip = record.ip.as_deref(),
                    user_agent = record.user_agent.as_deref(),
                    "Access granted"
                );
                Ok(Some(record.id))
            }
            Err(err) => match policy.audit_failure.unwrap_or(self.settings.audit_failure) {
                AuditFailureMode::FailClosed => Err(err),
                AuditFailureMode::LogAndContinue => {
                    error!(
                        error = %err,
                        user_id = %record.user_id,
                        action = %record.action,
                        "Audit write failed; continuing without audit record"
                    );
                    counter!("audit_write_failures_total").increment(1);
                    Ok(None)
                }
            },
        }
    }

    /// Run one collaborator call under the configured timeout.
    async fn call<T, F>(&self, collaborator: Collaborator, fut: F) -> Result<T, GuardError>
    where
        F: Future<Output = StoreResult<T>>,
    {
        let limit = self.settings.store_timeout;
        match tokio::time::timeout(limit, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(source)) => Err(GuardError::collaborator(collaborator, source)),
            Err(_) => Err(GuardError::collaborator(collaborator, StoreError::Timeout(limit))),
        }
    }

    /// Log and count a denial, then hand the error back.
    fn deny(&self, request: &GuardRequest, err: GuardError) -> GuardError {
        match &err {
            GuardError::CollaboratorUnavailable { .. } => denial_event!(error, err, request),
            _ => denial_event!(warn, err, request),
        }
        counter!(
            "access_guard_decisions_total",
            "outcome" => "denied",
            "code" => err.code().as_str()
        )
        .increment(1);
        err
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
