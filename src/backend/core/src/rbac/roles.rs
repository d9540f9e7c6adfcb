//! Built-in roles with default permission sets.
//!
//! Covenant ships with four organization roles:
//!
//! | Role     | Description                                                     |
//! |----------|-----------------------------------------------------------------|
//! | ADMIN    | Full access, including membership and audit log management      |
//! | MANAGER  | Create and manage matters, approve and sign agreements          |
//! | MEMBER   | Work on matters they are assigned to                            |
//! | VIEWER   | Read-only access to matters they are assigned to                |
//!
//! The seed migration writes exactly these rows. Route declarations name them
//! through [`BuiltinRole::name`]; the guard itself only ever reads roles from
//! the membership store.

use super::models::Role;

/// Well-known permission names.
pub mod permissions {
    pub const MATTER_READ: &str = "matter:read";
    pub const MATTER_WRITE: &str = "matter:write";
    pub const MATTER_DELETE: &str = "matter:delete";
    pub const COMMENT_WRITE: &str = "comment:write";
    pub const APPROVAL_DECIDE: &str = "approval:decide";
    pub const SIGNATURE_SEND: &str = "signature:send";
    pub const MEMBER_MANAGE: &str = "member:manage";
    pub const AUDIT_READ: &str = "audit:read";
}

use permissions::*;

/// Built-in role templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinRole {
    Admin,
    Manager,
    Member,
    Viewer,
}

impl BuiltinRole {
    /// Stored role name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Admin => "ADMIN",
            Self::Manager => "MANAGER",
            Self::Member => "MEMBER",
            Self::Viewer => "VIEWER",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Admin => "Full access to the organization, its members and audit trail",
            Self::Manager => "Create and manage matters; approve and send agreements for signature",
            Self::Member => "Work on assigned matters",
            Self::Viewer => "Read-only access to assigned matters",
        }
    }

    /// Default permissions granted by this role.
    pub fn permissions(&self) -> &'static [&'static str] {
        match self {
            Self::Admin => &[
                MATTER_READ,
                MATTER_WRITE,
                MATTER_DELETE,
                COMMENT_WRITE,
                APPROVAL_DECIDE,
                SIGNATURE_SEND,
                MEMBER_MANAGE,
                AUDIT_READ,
            ],
            Self::Manager => &[
                MATTER_READ,
                MATTER_WRITE,
                COMMENT_WRITE,
                APPROVAL_DECIDE,
                SIGNATURE_SEND,
            ],
            Self::Member => &[MATTER_READ, MATTER_WRITE, COMMENT_WRITE],
            Self::Viewer => &[MATTER_READ],
        }
    }

    /// Build a `Role` from this template.
    pub fn to_role(&self) -> Role {
        Role::new(self.name(), self.permissions().iter().copied())
    }

    /// Parse a stored role name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::all().into_iter().find(|r| r.name() == name)
    }

    pub fn all() -> Vec<BuiltinRole> {
        vec![Self::Admin, Self::Manager, Self::Member, Self::Viewer]
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_permissions() {
        let role = BuiltinRole::Admin.to_role();
        assert_eq!(role.name, "ADMIN");
        assert!(role.has_permission(AUDIT_READ));
        assert!(role.has_permission(MEMBER_MANAGE));
    }

    #[test]
    fn test_manager_cannot_read_audit() {
        let role = BuiltinRole::Manager.to_role();
        assert!(role.has_permission(APPROVAL_DECIDE));
        assert!(!role.has_permission(AUDIT_READ));
        assert!(!role.has_permission(MATTER_DELETE));
    }

    #[test]
    fn test_viewer_read_only() {
        let role = BuiltinRole::Viewer.to_role();
        assert!(role.has_permission(MATTER_READ));
        assert!(!role.has_permission(MATTER_WRITE));
        assert!(!role.has_permission(COMMENT_WRITE));
    }

    #[test]
    fn test_from_name() {
        assert_eq!(BuiltinRole::from_name("MANAGER"), Some(BuiltinRole::Manager));
        assert_eq!(BuiltinRole::from_name("manager"), None);
        assert_eq!(BuiltinRole::all().len(), 4);
    }
}
