//! Endpoint access declarations.
//!
//! Each protected operation declares an [`EndpointPolicy`] once, when its
//! route is registered. The [`PolicyRegistry`] is the plain association from
//! operation to declaration that the guard reads at dispatch time.

use axum::http::Method;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, warn};

// ═══════════════════════════════════════════════════════════════════════════════
// Modes
// ═══════════════════════════════════════════════════════════════════════════════

/// What the guard does for an operation that has no declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UndeclaredPolicy {
    /// Refuse the request with `POLICY_UNDECLARED`.
    #[default]
    Deny,
    /// Let the request through unchecked.
    Allow,
}

/// How an audit-write failure affects an otherwise granted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditFailureMode {
    /// The request fails with `AUDIT_WRITE_FAILED`.
    #[default]
    FailClosed,
    /// The failure is logged and the request proceeds.
    LogAndContinue,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Endpoint Policy
// ═══════════════════════════════════════════════════════════════════════════════

/// Access requirements of one protected operation.
///
/// `roles` and `permissions` are any-of sets; an empty set imposes nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointPolicy {
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
    pub org_required: bool,
    pub matter_required: bool,
    pub audit: bool,
    /// Overrides the guard-wide audit failure mode for this operation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit_failure: Option<AuditFailureMode>,
}

impl EndpointPolicy {
    pub fn builder() -> EndpointPolicyBuilder {
        EndpointPolicyBuilder::default()
    }
}

/// Builder for [`EndpointPolicy`].
#[derive(Debug, Default)]
pub struct EndpointPolicyBuilder {
    policy: EndpointPolicy,
}

impl EndpointPolicyBuilder {
    pub fn roles<I, R>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<String>,
    {
        self.policy.roles.extend(roles.into_iter().map(Into::into));
        self
    }

    pub fn permissions<I, P>(mut self, permissions: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        self.policy
            .permissions
            .extend(permissions.into_iter().map(Into::into));
        self
    }

    pub fn org_required(mut self) -> Self {
        self.policy.org_required = true;
        self
    }

    pub fn matter_required(mut self) -> Self {
        self.policy.matter_required = true;
        self
    }

    pub fn audit(mut self) -> Self {
        self.policy.audit = true;
        self
    }

    pub fn audit_failure(mut self, mode: AuditFailureMode) -> Self {
        self.policy.audit_failure = Some(mode);
        self
    }

    pub fn build(self) -> EndpointPolicy {
        self.policy
    }
}

/// Declaration attached to a registered operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "access", rename_all = "snake_case")]
pub enum EndpointAccess {
    /// Intentionally open; the guard performs no checks.
    Public,
    Protected(EndpointPolicy),
}

impl EndpointAccess {
    pub fn policy(&self) -> Option<&EndpointPolicy> {
        match self {
            Self::Public => None,
            Self::Protected(policy) => Some(policy),
        }
    }
}

impl From<EndpointPolicy> for EndpointAccess {
    fn from(policy: EndpointPolicy) -> Self {
        Self::Protected(policy)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Registry
// ═══════════════════════════════════════════════════════════════════════════════

/// Identifies an operation: HTTP method plus route template
/// (e.g. `GET /api/v1/orgs/:orgId/audit-logs`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OperationKey {
    pub method: Method,
    pub path: String,
}

impl OperationKey {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
        }
    }
}

impl fmt::Display for OperationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

/// Static mapping from operation to its access declaration.
///
/// Filled while routes are registered and treated as read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct PolicyRegistry {
    entries: HashMap<OperationKey, EndpointAccess>,
}

impl PolicyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare access for an operation, returning any declaration it replaces.
    pub fn declare(
        &mut self,
        method: Method,
        path: impl Into<String>,
        access: impl Into<EndpointAccess>,
    ) -> Option<EndpointAccess> {
        let key = OperationKey::new(method, path);
        let access = access.into();
        debug!(operation = %key, ?access, "Declaring endpoint access");

        let previous = self.entries.insert(key.clone(), access);
        if previous.is_some() {
            warn!(operation = %key, "Endpoint access declared twice; keeping the latest");
        }
        previous
    }

    /// Builder-style [`declare`](Self::declare) for an intentionally open operation.
    pub fn public(mut self, method: Method, path: impl Into<String>) -> Self {
        self.declare(method, path, EndpointAccess::Public);
        self
    }

    /// Builder-style [`declare`](Self::declare) for a protected operation.
    pub fn protected(
        mut self,
        method: Method,
        path: impl Into<String>,
        policy: EndpointPolicy,
    ) -> Self {
        self.declare(method, path, EndpointAccess::Protected(policy));
        self
    }

    /// Find the declaration for a method and route template.
    ///
    /// `HEAD` falls back to the `GET` declaration, mirroring how the router
    /// dispatches it.
    pub fn lookup(&self, method: &Method, path: &str) -> Option<&EndpointAccess> {
        let key = OperationKey::new(method.clone(), path);
        self.entries.get(&key).or_else(|| {
            if *method == Method::HEAD {
                self.entries.get(&OperationKey::new(Method::GET, path))
            } else {
                None
            }
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&OperationKey, &EndpointAccess)> {
        self.entries.iter()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_builder() {
        let policy = EndpointPolicy::builder()
            .roles(["ADMIN", "MANAGER"])
            .permissions(["matter:write"])
            .org_required()
            .audit()
            .build();

        assert_eq!(policy.roles, vec!["ADMIN", "MANAGER"]);
        assert_eq!(policy.permissions, vec!["matter:write"]);
        assert!(policy.org_required);
        assert!(!policy.matter_required);
        assert!(policy.audit);
        assert_eq!(policy.audit_failure, None);
    }

    #[test]
    fn test_registry_lookup() {
        let registry = PolicyRegistry::new()
            .public(Method::GET, "/health")
            .protected(
                Method::POST,
                "/api/v1/matters",
                EndpointPolicy::builder().org_required().build(),
            );

        assert_eq!(registry.len(), 2);
        assert_eq!(
            registry.lookup(&Method::GET, "/health"),
            Some(&EndpointAccess::Public)
        );
        assert!(registry
            .lookup(&Method::POST, "/api/v1/matters")
            .and_then(EndpointAccess::policy)
            .is_some_and(|p| p.org_required));
        assert!(registry.lookup(&Method::DELETE, "/api/v1/matters").is_none());
    }

    #[test]
    fn test_head_falls_back_to_get() {
        let registry = PolicyRegistry::new().public(Method::GET, "/health");
        assert_eq!(
            registry.lookup(&Method::HEAD, "/health"),
            Some(&EndpointAccess::Public)
        );
        assert!(registry.lookup(&Method::POST, "/health").is_none());
    }

    #[test]
    fn test_redeclare_replaces() {
        let mut registry = PolicyRegistry::new();
        assert!(registry
            .declare(Method::GET, "/x", EndpointAccess::Public)
            .is_none());
        let previous = registry.declare(
            Method::GET,
            "/x",
            EndpointPolicy::builder().roles(["ADMIN"]).build(),
        );
        assert_eq!(previous, Some(EndpointAccess::Public));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_modes_deserialize() {
        let mode: UndeclaredPolicy = serde_json::from_str("\"allow\"").unwrap();
        assert_eq!(mode, UndeclaredPolicy::Allow);
        let mode: AuditFailureMode = serde_json::from_str("\"log_and_continue\"").unwrap();
        assert_eq!(mode, AuditFailureMode::LogAndContinue);
        assert_eq!(UndeclaredPolicy::default(), UndeclaredPolicy::Deny);
        assert_eq!(AuditFailureMode::default(), AuditFailureMode::FailClosed);
    }
}
