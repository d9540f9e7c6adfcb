//! HTTP surface of the Covenant gateway.
//!
//! Every route is registered together with its access declaration in
//! [`access_policies`]; the access guard denies anything the registry does
//! not know about.

mod handlers;

use async_trait::async_trait;
use axum::{
    http::{HeaderValue, Method},
    routing::get,
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::warn;

use crate::cache::RedisCounterStore;
use crate::db::Database;
use crate::middleware::auth::{AuthLayer, Authenticator};
use crate::rbac::roles::BuiltinRole;
use crate::rbac::stores::{AuditReader, StoreResult};
use crate::rbac::{AccessControlGuard, AccessControlLayer, EndpointPolicy, PolicyRegistry};

pub const HEALTH_PATH: &str = "/health";
pub const READY_PATH: &str = "/health/ready";
pub const METRICS_PATH: &str = "/metrics";
pub const AUDIT_LOGS_PATH: &str = "/api/v1/orgs/:orgId/audit-logs";
pub const MATTER_ACCESS_PATH: &str = "/api/v1/matters/:matterId/access";

/// A dependency checked by the readiness endpoint.
#[async_trait]
pub trait DependencyProbe: Send + Sync {
    fn name(&self) -> &'static str;

    /// Round-trip the dependency, returning its latency.
    async fn probe(&self) -> StoreResult<Duration>;
}

#[async_trait]
impl DependencyProbe for Database {
    fn name(&self) -> &'static str {
        "database"
    }

    async fn probe(&self) -> StoreResult<Duration> {
        self.ping().await
    }
}

#[async_trait]
impl DependencyProbe for RedisCounterStore {
    fn name(&self) -> &'static str {
        "counter_store"
    }

    async fn probe(&self) -> StoreResult<Duration> {
        self.ping().await
    }
}

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub guard: AccessControlGuard,
    pub authenticator: Arc<Authenticator>,
    pub audit_reader: Arc<dyn AuditReader>,
    pub probes: Vec<Arc<dyn DependencyProbe>>,
    pub metrics: Option<PrometheusHandle>,
    pub cors_origins: Vec<String>,
}

/// Access declarations for every route in [`build_router`].
pub fn access_policies() -> PolicyRegistry {
    PolicyRegistry::new()
        .public(Method::GET, HEALTH_PATH)
        .public(Method::GET, READY_PATH)
        .public(Method::GET, METRICS_PATH)
        .protected(
            Method::GET,
            AUDIT_LOGS_PATH,
            EndpointPolicy::builder()
                .roles([BuiltinRole::Admin.name()])
                .org_required()
                .audit()
                .build(),
        )
        .protected(
            Method::GET,
            MATTER_ACCESS_PATH,
            EndpointPolicy::builder().matter_required().build(),
        )
}

/// Build the API router.
///
/// Layer order, outermost first: CORS, request tracing, authentication,
/// then the access guard around each route.
pub fn build_router(state: AppState) -> Router {
    let registry = Arc::new(access_policies());

    Router::new()
        .route(HEALTH_PATH, get(handlers::health_check))
        .route(READY_PATH, get(handlers::readiness))
        .route(METRICS_PATH, get(handlers::prometheus_metrics))
        .route(AUDIT_LOGS_PATH, get(handlers::list_audit_logs))
        .route(MATTER_ACCESS_PATH, get(handlers::matter_access))
        .route_layer(AccessControlLayer::new(state.guard.clone(), registry))
        .layer(AuthLayer::new(state.authenticator.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&state.cors_origins))
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.is_empty() {
        AllowOrigin::from(Any)
    } else {
        let parsed: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|o| match o.parse() {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!(origin = %o, "Ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(parsed)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Standard API response wrapper.
#[derive(Debug, serde::Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T: serde::Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rbac::EndpointAccess;

    #[test]
    fn test_api_response_success() {
        let response = ApiResponse::success("test data");
        assert!(response.success);
        assert_eq!(response.data, "test data");
    }

    #[test]
    fn test_every_route_is_declared() {
        let registry = access_policies();
        for path in [HEALTH_PATH, READY_PATH, METRICS_PATH, AUDIT_LOGS_PATH, MATTER_ACCESS_PATH] {
            assert!(registry.lookup(&Method::GET, path).is_some(), "{path} undeclared");
        }
        assert_eq!(registry.len(), 5);
    }

    #[test]
    fn test_audit_logs_policy() {
        let registry = access_policies();
        let policy = registry
            .lookup(&Method::GET, AUDIT_LOGS_PATH)
            .and_then(EndpointAccess::policy)
            .unwrap();

        assert_eq!(policy.roles, vec!["ADMIN".to_string()]);
        assert!(policy.org_required);
        assert!(policy.audit);
    }
}
