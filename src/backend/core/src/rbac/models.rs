//! RBAC data models: identities, memberships, roles, matters and audit records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ═══════════════════════════════════════════════════════════════════════════════
// Identifiers
// ═══════════════════════════════════════════════════════════════════════════════

/// Strongly-typed user identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Strongly-typed organization identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrganizationId(pub String);

impl OrganizationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrganizationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for OrganizationId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for OrganizationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Strongly-typed matter identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MatterId(pub String);

impl MatterId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MatterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for MatterId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for MatterId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Principal
// ═══════════════════════════════════════════════════════════════════════════════

/// The authenticated caller of one request.
///
/// Attached to the request by the authentication layer; lives only as long
/// as the request and is never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: UserId,
    /// The caller's home organization.
    pub org_id: OrganizationId,
}

impl Principal {
    pub fn new(user_id: impl Into<UserId>, org_id: impl Into<OrganizationId>) -> Self {
        Self {
            user_id: user_id.into(),
            org_id: org_id.into(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Membership & Role
// ═══════════════════════════════════════════════════════════════════════════════

/// Status of a membership or matter-member row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MembershipStatus {
    Active,
    Inactive,
}

impl MembershipStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
        }
    }

    /// Parse the stored form. Anything other than `"active"` is inactive.
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("active") {
            Self::Active
        } else {
            Self::Inactive
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }
}

impl fmt::Display for MembershipStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named bundle of permissions. Read-only from the guard's perspective.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub name: String,
    pub permissions: Vec<String>,
}

impl Role {
    pub fn new<I, P>(name: impl Into<String>, permissions: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        Self {
            name: name.into(),
            permissions: permissions.into_iter().map(Into::into).collect(),
        }
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p == permission)
    }
}

/// A user's relationship with one organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    pub user_id: UserId,
    pub org_id: OrganizationId,
    pub status: MembershipStatus,
    pub role: Role,
}

impl Membership {
    pub fn active(
        user_id: impl Into<UserId>,
        org_id: impl Into<OrganizationId>,
        role: Role,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            org_id: org_id.into(),
            status: MembershipStatus::Active,
            role,
        }
    }

    pub fn with_status(mut self, status: MembershipStatus) -> Self {
        self.status = status;
        self
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Matter
// ═══════════════════════════════════════════════════════════════════════════════

/// One member row of a matter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatterMember {
    pub user_id: UserId,
    pub status: MembershipStatus,
}

impl MatterMember {
    pub fn new(user_id: impl Into<UserId>, status: MembershipStatus) -> Self {
        Self {
            user_id: user_id.into(),
            status,
        }
    }
}

/// A matter as seen by the guard: its owning organization and member rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatterRecord {
    pub id: MatterId,
    pub org_id: OrganizationId,
    pub members: Vec<MatterMember>,
}

impl MatterRecord {
    pub fn new(id: impl Into<MatterId>, org_id: impl Into<OrganizationId>) -> Self {
        Self {
            id: id.into(),
            org_id: org_id.into(),
            members: Vec::new(),
        }
    }

    pub fn with_member(mut self, user_id: impl Into<UserId>, status: MembershipStatus) -> Self {
        self.members.push(MatterMember::new(user_id, status));
        self
    }

    /// Whether `user_id` has at least one active member row.
    pub fn has_active_member(&self, user_id: &UserId) -> bool {
        self.members
            .iter()
            .any(|m| &m.user_id == user_id && m.status.is_active())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Audit
// ═══════════════════════════════════════════════════════════════════════════════

/// Policy context captured alongside an audit entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditMetadata {
    /// Roles the endpoint policy required.
    pub roles: Vec<String>,
    /// Permissions the endpoint policy required.
    pub permissions: Vec<String>,
    pub success: bool,
}

/// Append-only record of one granted, audited request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: Uuid,
    pub user_id: UserId,
    pub org_id: OrganizationId,
    /// `"<METHOD> <path>"`.
    pub action: String,
    pub resource: Option<String>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub metadata: AuditMetadata,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
