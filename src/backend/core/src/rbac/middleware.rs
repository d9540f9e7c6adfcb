//! Axum middleware that runs the access guard in front of every route.
//!
//! Apply with `Router::route_layer` so the matched route template and raw
//! path parameters are available. The principal is read from request
//! extensions, where [`crate::middleware::auth::AuthLayer`] puts it.

use axum::{
    body::Body,
    extract::{ConnectInfo, FromRequestParts, MatchedPath, Query, RawPathParams, Request},
    http::{request::Parts, HeaderMap},
    response::{IntoResponse, Response},
};
use futures::future::BoxFuture;
use http_body_util::LengthLimitError;
use serde_json::Value;
use std::collections::HashMap;
use std::error::Error as StdError;
use std::net::SocketAddr;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};
use tracing::warn;

use super::guard::{AccessControlGuard, AccessGrant, Decision};
use super::models::Principal;
use super::policy::{EndpointAccess, PolicyRegistry};
use super::scope::GuardRequest;
use crate::error::{ErrorCode, ErrorResponse};

// ═══════════════════════════════════════════════════════════════════════════════
// Access Grant (extracted in handlers)
// ═══════════════════════════════════════════════════════════════════════════════

/// Axum extractor for the [`AccessGrant`] of a guarded request.
#[axum::async_trait]
impl<S> FromRequestParts<S> for AccessGrant
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<AccessGrant>().cloned().ok_or_else(|| {
            ErrorResponse::new(
                ErrorCode::InternalError,
                "Authorization context not available. Ensure access control middleware is applied.",
            )
            .into_response()
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tower Layer
// ═══════════════════════════════════════════════════════════════════════════════

/// Layer that evaluates each request against its declared access.
///
/// # Example
///
/// ```rust,ignore
/// let registry = PolicyRegistry::new().protected(
///     Method::GET,
///     "/api/v1/matters/:matterId",
///     EndpointPolicy::builder().matter_required().build(),
/// );
///
/// let app = Router::new()
///     .route("/api/v1/matters/:matterId", get(get_matter))
///     .route_layer(AccessControlLayer::new(guard, Arc::new(registry)));
/// ```
#[derive(Clone)]
pub struct AccessControlLayer {
    guard: AccessControlGuard,
    registry: Arc<PolicyRegistry>,
}

impl AccessControlLayer {
    pub fn new(guard: AccessControlGuard, registry: Arc<PolicyRegistry>) -> Self {
        Self { guard, registry }
    }
}

impl<S> Layer<S> for AccessControlLayer {
    type Service = AccessControlService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AccessControlService {
            inner,
            guard: self.guard.clone(),
            registry: self.registry.clone(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tower Service
// ═══════════════════════════════════════════════════════════════════════════════

/// Service that runs the guard and forwards granted requests.
#[derive(Clone)]
pub struct AccessControlService<S> {
    inner: S,
    guard: AccessControlGuard,
    registry: Arc<PolicyRegistry>,
}

impl<S> Service<Request<Body>> for AccessControlService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        let guard = self.guard.clone();
        let registry = self.registry.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let (mut parts, body) = request.into_parts();

            let template = parts
                .extensions
                .get::<MatchedPath>()
                .map(|p| p.as_str().to_string())
                .unwrap_or_else(|| parts.uri.path().to_string());
            let access = registry.lookup(&parts.method, &template).cloned();

            if matches!(access, Some(EndpointAccess::Public)) {
                return inner.call(Request::from_parts(parts, body)).await;
            }

            // Identity is checked before the body is read.
            if parts.extensions.get::<Principal>().is_none() {
                let guard_request = describe(&mut parts, &[]).await;
                return match guard.evaluate(&guard_request, access.as_ref()).await {
                    Ok(_) => inner.call(Request::from_parts(parts, body)).await,
                    Err(err) => Ok(err.into_response()),
                };
            }

            // Body fields take part in scope resolution, so the body is
            // buffered and handed back to the handler unchanged.
            let limit = guard.settings().body_limit_bytes;
            let bytes = match axum::body::to_bytes(body, limit).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    let rejection = BodyRejection::classify(&e, limit);
                    let guard_request = describe(&mut parts, &[]).await;
                    rejection.log(&guard_request, &e);
                    return Ok(rejection.into_response());
                }
            };

            let guard_request = describe(&mut parts, &bytes).await;
            let decision = guard.evaluate(&guard_request, access.as_ref()).await;

            match decision {
                Ok(Decision::Granted(grant)) => {
                    parts.extensions.insert(grant);
                }
                Ok(Decision::Bypassed) => {}
                Err(err) => return Ok(err.into_response()),
            }

            inner.call(Request::from_parts(parts, Body::from(bytes))).await
        })
    }
}

/// A request body that could not be buffered for scope extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyRejection {
    TooLarge { limit: usize },
    Unreadable,
}

impl BodyRejection {
    fn classify(error: &axum::Error, limit: usize) -> Self {
        let mut source: Option<&(dyn StdError + 'static)> = Some(error);
        while let Some(e) = source {
            if e.is::<LengthLimitError>() {
                return Self::TooLarge { limit };
            }
            source = e.source();
        }
        Self::Unreadable
    }

    fn code(&self) -> ErrorCode {
        match self {
            Self::TooLarge { .. } => ErrorCode::PayloadTooLarge,
            Self::Unreadable => ErrorCode::InvalidRequest,
        }
    }

    fn message(&self) -> String {
        match self {
            Self::TooLarge { limit } => format!("Request body exceeds {limit} bytes"),
            Self::Unreadable => "Request body could not be read".to_string(),
        }
    }

    /// Same event the guard emits for its own denials.
    fn log(&self, request: &GuardRequest, error: &axum::Error) {
        warn!(
            error = %self.message(),
            reason = self.code().as_str(),
            source = %error,
            user_id = request.principal.as_ref().map(|p| p.user_id.as_str()),
            path = %request.path,
            method = %request.method,
            ip = request.ip.as_deref(),
            user_agent = request.user_agent.as_deref(),
            "RBAC check failed"
        );
    }

    fn into_response(self) -> Response {
        ErrorResponse::new(self.code(), self.message()).into_response()
    }
}

/// Build the guard's view of a request.
async fn describe(parts: &mut Parts, body: &[u8]) -> GuardRequest {
    let path_params: HashMap<String, String> =
        match RawPathParams::from_request_parts(parts, &()).await {
            Ok(params) => params
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            Err(_) => HashMap::new(),
        };

    let query = Query::<HashMap<String, String>>::try_from_uri(&parts.uri)
        .map(|Query(q)| q)
        .unwrap_or_default();

    let body = if body.is_empty() {
        None
    } else {
        serde_json::from_slice::<Value>(body).ok()
    };

    GuardRequest {
        principal: parts.extensions.get::<Principal>().cloned(),
        method: parts.method.clone(),
        path: parts.uri.path().to_string(),
        path_params,
        body,
        query,
        ip: client_ip(&parts.headers, parts.extensions.get::<ConnectInfo<SocketAddr>>()),
        user_agent: header_str(&parts.headers, "user-agent"),
    }
}

fn client_ip(headers: &HeaderMap, connect_info: Option<&ConnectInfo<SocketAddr>>) -> Option<String> {
    header_str(headers, "x-forwarded-for")
        .and_then(|v| v.split(',').next().map(|ip| ip.trim().to_string()))
        .filter(|ip| !ip.is_empty())
        .or_else(|| header_str(headers, "x-real-ip"))
        .or_else(|| connect_info.map(|ConnectInfo(addr)| addr.ip().to_string()))
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_client_ip_prefers_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("10.0.0.1, 10.0.0.2"));
        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.3"));

        assert_eq!(client_ip(&headers, None).as_deref(), Some("10.0.0.1"));
    }

    #[test]
    fn test_client_ip_falls_back_to_socket() {
        let addr: SocketAddr = "192.168.1.5:4000".parse().unwrap();
        let info = ConnectInfo(addr);

        assert_eq!(
            client_ip(&HeaderMap::new(), Some(&info)).as_deref(),
            Some("192.168.1.5")
        );
    }

    #[tokio::test]
    async fn test_describe_reads_query_and_json_body() {
        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/matters?orgId=o1")
            .header("user-agent", "curl/8.0")
            .body(())
            .unwrap();
        let (mut parts, _) = request.into_parts();

        let described = describe(&mut parts, br#"{"matterId":"m1"}"#).await;

        assert_eq!(described.path, "/api/v1/matters");
        assert_eq!(described.query.get("orgId").map(String::as_str), Some("o1"));
        assert_eq!(described.requested_matter().map(|m| m.to_string()).as_deref(), Some("m1"));
        assert_eq!(described.user_agent.as_deref(), Some("curl/8.0"));
        assert!(described.principal.is_none());
    }
}
