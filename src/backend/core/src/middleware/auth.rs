//! Bearer-token authentication.
//!
//! Validates an HS256 JWT from the `Authorization` header and attaches the
//! resulting [`Principal`] to request extensions. A request without a token
//! passes through with no principal; the access guard decides whether that
//! is acceptable for the operation. A token that is present but invalid is
//! rejected here with 401.
//!
//! # Example
//!
//! ```rust,ignore
//! use covenant_core::middleware::auth::{AuthLayer, AuthSettings};
//!
//! let settings = AuthSettings::new("your-secret-key");
//!
//! let app = Router::new()
//!     .route("/api/v1/matters/:matterId", get(get_matter))
//!     .layer(AuthLayer::from_settings(&settings)?);
//! ```

use axum::{
    body::Body,
    extract::Request,
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Duration, Utc};
use futures::future::BoxFuture;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::{
    sync::Arc,
    task::{Context, Poll},
};
use thiserror::Error;
use tower::{Layer, Service};
use tracing::debug;
use uuid::Uuid;

use crate::error::{ErrorCode, ErrorResponse};
use crate::rbac::Principal;

// ═══════════════════════════════════════════════════════════════════════════════
// Error Types
// ═══════════════════════════════════════════════════════════════════════════════

/// Authentication errors.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid authentication token")]
    InvalidToken,

    #[error("Token has expired")]
    TokenExpired,

    #[error("Token validation error: {0}")]
    ValidationError(String),

    #[error("Internal authentication error: {0}")]
    Internal(String),
}

impl AuthError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidToken | Self::ValidationError(_) => ErrorCode::InvalidToken,
            Self::TokenExpired => ErrorCode::TokenExpired,
            Self::Internal(_) => ErrorCode::InternalError,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let code = self.code();
        let message = match &self {
            Self::InvalidToken | Self::ValidationError(_) => "The provided token is invalid",
            Self::TokenExpired => "The authentication token has expired",
            Self::Internal(_) => "An authentication error occurred",
        };

        counter!("auth_errors_total", "error_type" => code.as_str()).increment(1);

        ErrorResponse::new(code, message).into_response()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// JWT Claims
// ═══════════════════════════════════════════════════════════════════════════════

/// JWT token claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,

    /// The user's home organization
    pub org_id: String,

    /// Token ID
    #[serde(default = "generate_jti")]
    pub jti: String,

    /// Issued at timestamp
    pub iat: i64,

    /// Expiration timestamp
    pub exp: i64,

    /// Issuer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
}

fn generate_jti() -> String {
    Uuid::new_v4().to_string()
}

impl Claims {
    /// Claims for `user_id` in `org_id`, valid for one hour.
    pub fn new(user_id: impl Into<String>, org_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            sub: user_id.into(),
            org_id: org_id.into(),
            jti: generate_jti(),
            iat: now.timestamp(),
            exp: (now + Duration::hours(1)).timestamp(),
            iss: None,
        }
    }

    pub fn expires_in(mut self, duration: Duration) -> Self {
        self.exp = (Utc::now() + duration).timestamp();
        self
    }

    pub fn issuer(mut self, issuer: impl Into<String>) -> Self {
        self.iss = Some(issuer.into());
        self
    }

    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp() > self.exp
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.exp, 0).unwrap_or_else(Utc::now)
    }

    pub fn principal(&self) -> Principal {
        Principal::new(self.sub.as_str(), self.org_id.as_str())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Configuration
// ═══════════════════════════════════════════════════════════════════════════════

/// Authentication configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSettings {
    /// HS256 signing secret
    #[serde(default)]
    pub jwt_secret: String,

    /// Required `iss` claim, if any
    #[serde(default)]
    pub issuer: Option<String>,

    /// Leeway for expiration checks (in seconds)
    #[serde(default = "default_leeway_secs")]
    pub leeway_secs: u64,
}

fn default_leeway_secs() -> u64 { 60 }

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            issuer: None,
            leeway_secs: default_leeway_secs(),
        }
    }
}

impl AuthSettings {
    pub fn new(jwt_secret: impl Into<String>) -> Self {
        Self {
            jwt_secret: jwt_secret.into(),
            ..Default::default()
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Authenticator
// ═══════════════════════════════════════════════════════════════════════════════

/// Validates and issues HS256 tokens.
pub struct Authenticator {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl Authenticator {
    pub fn new(settings: &AuthSettings) -> Result<Self, AuthError> {
        if settings.jwt_secret.is_empty() {
            return Err(AuthError::Internal("JWT secret must not be empty".into()));
        }
        let secret = settings.jwt_secret.as_bytes();

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = settings.leeway_secs;
        if let Some(ref issuer) = settings.issuer {
            validation.set_issuer(&[issuer]);
            // A configured issuer must also be present on the token.
            validation.set_required_spec_claims(&["exp", "iss"]);
        }

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
        })
    }

    /// The principal carried by the request's bearer token, if there is one.
    pub fn authenticate(&self, headers: &HeaderMap) -> Result<Option<Principal>, AuthError> {
        match extract_bearer(headers) {
            Some(token) => self.validate(token).map(|claims| Some(claims.principal())),
            None => Ok(None),
        }
    }

    /// Decode and verify a token.
    pub fn validate(&self, token: &str) -> Result<Claims, AuthError> {
        let token_data = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| {
                debug!("JWT validation failed: {}", e);
                match e.kind() {
                    jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                    jsonwebtoken::errors::ErrorKind::InvalidToken
                    | jsonwebtoken::errors::ErrorKind::InvalidSignature => AuthError::InvalidToken,
                    _ => AuthError::ValidationError(e.to_string()),
                }
            })?;

        counter!("auth_success_total", "method" => "jwt").increment(1);
        Ok(token_data.claims)
    }

    pub fn generate_token(&self, claims: &Claims) -> Result<String, AuthError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| AuthError::Internal(format!("Failed to generate token: {}", e)))
    }
}

fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer ").or_else(|| s.strip_prefix("bearer ")))
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tower Layer and Service
// ═══════════════════════════════════════════════════════════════════════════════

/// Authentication layer for Tower.
#[derive(Clone)]
pub struct AuthLayer {
    authenticator: Arc<Authenticator>,
}

impl AuthLayer {
    pub fn new(authenticator: Arc<Authenticator>) -> Self {
        Self { authenticator }
    }

    pub fn from_settings(settings: &AuthSettings) -> Result<Self, AuthError> {
        Ok(Self::new(Arc::new(Authenticator::new(settings)?)))
    }
}

impl<S> Layer<S> for AuthLayer {
    type Service = AuthService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthService {
            inner,
            authenticator: self.authenticator.clone(),
        }
    }
}

/// Authentication service.
#[derive(Clone)]
pub struct AuthService<S> {
    inner: S,
    authenticator: Arc<Authenticator>,
}

impl<S> Service<Request<Body>> for AuthService<S>
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

    fn call(&mut self, mut request: Request<Body>) -> Self::Future {
        let authenticator = self.authenticator.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            match authenticator.authenticate(request.headers()) {
                Ok(Some(principal)) => {
                    request.extensions_mut().insert(principal);
                    inner.call(request).await
                }
                Ok(None) => inner.call(request).await,
                Err(e) => Ok(e.into_response()),
            }
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn authenticator() -> Authenticator {
        Authenticator::new(&AuthSettings::new("super-secret-key-for-testing-only")).unwrap()
    }

    fn bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
        );
        headers
    }

    #[test]
    fn test_empty_secret_rejected() {
        assert!(Authenticator::new(&AuthSettings::default()).is_err());
    }

    #[test]
    fn test_token_round_trip_yields_principal() {
        let auth = authenticator();
        let token = auth.generate_token(&Claims::new("user123", "org456")).unwrap();

        let principal = auth.authenticate(&bearer(&token)).unwrap().unwrap();
        assert_eq!(principal, Principal::new("user123", "org456"));
    }

    #[test]
    fn test_missing_token_is_anonymous() {
        assert_eq!(authenticator().authenticate(&HeaderMap::new()).unwrap(), None);
    }

    #[test]
    fn test_wrong_secret_is_invalid() {
        let other = Authenticator::new(&AuthSettings::new("another-secret")).unwrap();
        let token = other.generate_token(&Claims::new("u1", "o1")).unwrap();

        let err = authenticator().authenticate(&bearer(&token)).unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken));
    }

    #[test]
    fn test_expired_token() {
        let auth = authenticator();
        let claims = Claims::new("u1", "o1").expires_in(Duration::hours(-2));
        assert!(claims.is_expired());

        let token = auth.generate_token(&claims).unwrap();
        let err = auth.validate(&token).unwrap_err();
        assert!(matches!(err, AuthError::TokenExpired));
        assert_eq!(err.code(), ErrorCode::TokenExpired);
    }

    #[test]
    fn test_issuer_enforced() {
        let settings = AuthSettings {
            issuer: Some("covenant".to_string()),
            ..AuthSettings::new("super-secret-key-for-testing-only")
        };
        let auth = Authenticator::new(&settings).unwrap();

        let good = auth.generate_token(&Claims::new("u1", "o1").issuer("covenant")).unwrap();
        let bad = auth.generate_token(&Claims::new("u1", "o1")).unwrap();

        assert!(auth.validate(&good).is_ok());
        assert!(auth.validate(&bad).is_err());
    }

    #[test]
    fn test_wrong_issuer_rejected() {
        let settings = AuthSettings {
            issuer: Some("covenant".to_string()),
            ..AuthSettings::new("super-secret-key-for-testing-only")
        };
        let auth = Authenticator::new(&settings).unwrap();

        let token = auth
            .generate_token(&Claims::new("u1", "o1").issuer("someone-else"))
            .unwrap();
        let err = auth.authenticate(&bearer(&token)).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidToken);
    }

    #[test]
    fn test_issuer_optional_when_unconfigured() {
        let auth = authenticator();
        let token = auth.generate_token(&Claims::new("u1", "o1")).unwrap();
        assert!(auth.validate(&token).is_ok());
    }
}
