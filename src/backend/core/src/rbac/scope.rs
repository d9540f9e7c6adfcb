//! Transport-neutral request view and scope identifier extraction.

use axum::http::Method;
use serde_json::Value;
use std::collections::HashMap;

use super::models::{MatterId, OrganizationId, Principal};

/// Request fields the guard reads scope identifiers from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeField {
    /// Target organization.
    OrgId,
    /// Target matter.
    MatterId,
    /// Resource recorded in audit entries.
    ResourceId,
}

impl ScopeField {
    /// Field name as it appears in path parameters, bodies and query strings.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::OrgId => "orgId",
            Self::MatterId => "matterId",
            Self::ResourceId => "id",
        }
    }
}

/// Everything the guard needs to know about one incoming request.
#[derive(Debug, Clone)]
pub struct GuardRequest {
    pub principal: Option<Principal>,
    pub method: Method,
    /// Concrete request path (not the route template).
    pub path: String,
    pub path_params: HashMap<String, String>,
    /// Parsed JSON body, if the request carried one.
    pub body: Option<Value>,
    pub query: HashMap<String, String>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

impl GuardRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            principal: None,
            method,
            path: path.into(),
            path_params: HashMap::new(),
            body: None,
            query: HashMap::new(),
            ip: None,
            user_agent: None,
        }
    }

    pub fn with_principal(mut self, principal: Principal) -> Self {
        self.principal = Some(principal);
        self
    }

    pub fn with_path_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.path_params.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_query_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(name.into(), value.into());
        self
    }

    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = Some(ip.into());
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// First non-empty value of `field`, looking at path parameters, then the
    /// JSON body, then the query string.
    pub fn scope_value(&self, field: ScopeField) -> Option<String> {
        let field = field.as_str();
        self.path_param(field)
            .or_else(|| self.body_field(field))
            .or_else(|| self.query_param(field))
    }

    /// `path_params` then body; the query string is not consulted.
    pub fn resource_id(&self) -> Option<String> {
        let field = ScopeField::ResourceId.as_str();
        self.path_param(field).or_else(|| self.body_field(field))
    }

    pub fn requested_org(&self) -> Option<OrganizationId> {
        self.scope_value(ScopeField::OrgId).map(OrganizationId::new)
    }

    pub fn requested_matter(&self) -> Option<MatterId> {
        self.scope_value(ScopeField::MatterId).map(MatterId::new)
    }

    /// `"<METHOD> <path>"` as recorded in audit entries.
    pub fn action(&self) -> String {
        format!("{} {}", self.method, self.path)
    }

    fn path_param(&self, field: &str) -> Option<String> {
        non_empty(self.path_params.get(field).cloned())
    }

    fn query_param(&self, field: &str) -> Option<String> {
        non_empty(self.query.get(field).cloned())
    }

    fn body_field(&self, field: &str) -> Option<String> {
        let value = self.body.as_ref()?.get(field)?;
        let text = match value {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };
        non_empty(Some(text))
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request() -> GuardRequest {
        GuardRequest::new(Method::POST, "/api/v1/matters")
    }

    #[test]
    fn test_path_param_wins() {
        let req = request()
            .with_path_param("orgId", "from-path")
            .with_body(json!({ "orgId": "from-body" }))
            .with_query_param("orgId", "from-query");

        assert_eq!(req.scope_value(ScopeField::OrgId).as_deref(), Some("from-path"));
    }

    #[test]
    fn test_body_beats_query() {
        let req = request()
            .with_body(json!({ "matterId": "from-body" }))
            .with_query_param("matterId", "from-query");

        assert_eq!(
            req.requested_matter(),
            Some(MatterId::new("from-body"))
        );
    }

    #[test]
    fn test_query_used_last() {
        let req = request().with_query_param("orgId", "o9");
        assert_eq!(req.requested_org(), Some(OrganizationId::new("o9")));
    }

    #[test]
    fn test_empty_values_fall_through() {
        let req = request()
            .with_path_param("orgId", "")
            .with_body(json!({ "orgId": "" }))
            .with_query_param("orgId", "o2");

        assert_eq!(req.requested_org(), Some(OrganizationId::new("o2")));
    }

    #[test]
    fn test_numeric_body_value() {
        let req = request().with_body(json!({ "matterId": 42 }));
        assert_eq!(req.requested_matter(), Some(MatterId::new("42")));

        let req = request().with_body(json!({ "matterId": { "nested": true } }));
        assert_eq!(req.requested_matter(), None);
    }

    #[test]
    fn test_resource_id_ignores_query() {
        let req = request().with_query_param("id", "q1");
        assert_eq!(req.resource_id(), None);

        let req = request()
            .with_body(json!({ "id": "b1" }))
            .with_query_param("id", "q1");
        assert_eq!(req.resource_id().as_deref(), Some("b1"));
    }

    #[test]
    fn test_action() {
        assert_eq!(request().action(), "POST /api/v1/matters");
    }
}
