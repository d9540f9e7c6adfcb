//! Error handling for the Covenant gateway.
//!
//! This module provides:
//! - Stable machine-readable error codes with an HTTP status mapping
//! - `GuardError`, the failure taxonomy of the access-control pipeline
//! - `StoreError`, the failure type every collaborator store returns
//! - JSON error responses shared by the guard and auth middleware
//!
//! The guard never recovers from a failure: every variant here is terminal
//! for the request it was raised on.

use axum::{
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

// ═══════════════════════════════════════════════════════════════════════════════
// Error Codes
// ═══════════════════════════════════════════════════════════════════════════════

/// Machine-readable error codes for API responses.
///
/// These codes are stable and can be used by clients for programmatic error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Authentication/Authorization (4000-4099)
    Unauthorized,
    InvalidToken,
    TokenExpired,
    Forbidden,
    RateLimitExceeded,
    PolicyUndeclared,

    // Request Errors (4100-4199)
    PayloadTooLarge,
    InvalidRequest,

    // Collaborator Errors (2000-2199)
    DatabaseError,
    CacheError,
    StoreTimeout,
    AuditWriteFailed,

    // Configuration Errors (5000-5099)
    ConfigurationError,

    // Internal Errors (9000-9099)
    InternalError,
}

impl ErrorCode {
    /// Get the numeric code for this error.
    pub const fn numeric_code(&self) -> u32 {
        match self {
            Self::Unauthorized => 4000,
            Self::InvalidToken => 4001,
            Self::TokenExpired => 4002,
            Self::Forbidden => 4003,
            Self::RateLimitExceeded => 4004,
            Self::PolicyUndeclared => 4005,

            Self::PayloadTooLarge => 4100,
            Self::InvalidRequest => 4101,

            Self::DatabaseError => 2000,
            Self::CacheError => 2100,
            Self::StoreTimeout => 2101,
            Self::AuditWriteFailed => 2102,

            Self::ConfigurationError => 5000,

            Self::InternalError => 9000,
        }
    }

    /// Get the HTTP status code for this error.
    pub const fn http_status(&self) -> StatusCode {
        match self {
            Self::Unauthorized | Self::InvalidToken | Self::TokenExpired => {
                StatusCode::UNAUTHORIZED
            }
            Self::Forbidden | Self::PolicyUndeclared => StatusCode::FORBIDDEN,
            Self::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::InvalidRequest => StatusCode::BAD_REQUEST,
            Self::DatabaseError | Self::CacheError | Self::StoreTimeout => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Self::AuditWriteFailed | Self::ConfigurationError | Self::InternalError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Get the error category for grouping.
    pub const fn category(&self) -> &'static str {
        match self.numeric_code() {
            2000..=2199 => "collaborator",
            4000..=4099 => "authorization",
            4100..=4199 => "request",
            5000..=5099 => "configuration",
            _ => "internal",
        }
    }

    /// Wire form used in response bodies and metric labels.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthorized => "UNAUTHORIZED",
            Self::InvalidToken => "INVALID_TOKEN",
            Self::TokenExpired => "TOKEN_EXPIRED",
            Self::Forbidden => "FORBIDDEN",
            Self::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            Self::PolicyUndeclared => "POLICY_UNDECLARED",
            Self::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
            Self::InvalidRequest => "INVALID_REQUEST",
            Self::DatabaseError => "DATABASE_ERROR",
            Self::CacheError => "CACHE_ERROR",
            Self::StoreTimeout => "STORE_TIMEOUT",
            Self::AuditWriteFailed => "AUDIT_WRITE_FAILED",
            Self::ConfigurationError => "CONFIGURATION_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Response
// ═══════════════════════════════════════════════════════════════════════════════

/// JSON body returned for every rejected request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorResponse {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: ErrorBody {
                code,
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.error.details = Some(details);
        self
    }

    pub fn into_response_with(self, headers: HeaderMap) -> Response {
        let status = self.error.code.http_status();
        (status, headers, Json(self)).into_response()
    }
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        self.into_response_with(HeaderMap::new())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Store Errors
// ═══════════════════════════════════════════════════════════════════════════════

/// Failure reported by a collaborator store (membership, matter, counter, audit).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("{0}")]
    Unavailable(String),
}

/// The collaborator a `StoreError` came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Collaborator {
    MembershipStore,
    MatterStore,
    CounterStore,
    AuditSink,
}

impl fmt::Display for Collaborator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::MembershipStore => "membership store",
            Self::MatterStore => "matter store",
            Self::CounterStore => "counter store",
            Self::AuditSink => "audit sink",
        };
        f.write_str(name)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Guard Errors
// ═══════════════════════════════════════════════════════════════════════════════

/// Why a matter-scoped request was refused. Not exposed to callers; every
/// variant renders as the same "Access denied to matter" message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatterDenial {
    MissingId,
    NotFound,
    NotActiveMember,
}

/// The unmet requirement behind a `Forbidden` denial.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ForbiddenReason {
    #[error("Required roles: {}", .required.join(", "))]
    RoleMismatch { required: Vec<String> },

    #[error("Required permissions: {}", .required.join(", "))]
    PermissionMismatch { required: Vec<String> },

    #[error("Organization ID required")]
    OrgIdRequired,

    #[error("Access denied to organization")]
    OrgAccessDenied { org_id: String },

    #[error("Access denied to matter")]
    MatterAccessDenied { detail: MatterDenial },

    #[error("No access policy declared for {operation}")]
    Undeclared { operation: String },
}

impl ForbiddenReason {
    /// Short label for logs and metrics.
    pub const fn label(&self) -> &'static str {
        match self {
            Self::RoleMismatch { .. } => "role_mismatch",
            Self::PermissionMismatch { .. } => "permission_mismatch",
            Self::OrgIdRequired | Self::OrgAccessDenied { .. } => "org_scope",
            Self::MatterAccessDenied { .. } => "matter_scope",
            Self::Undeclared { .. } => "undeclared",
        }
    }
}

/// Failure of one `AccessControlGuard::evaluate` call.
#[derive(Debug, Error)]
pub enum GuardError {
    #[error("User not authenticated")]
    Unauthenticated,

    #[error("Rate limit exceeded")]
    RateLimited { limit: u64, window_secs: u64 },

    #[error(transparent)]
    Forbidden(#[from] ForbiddenReason),

    #[error("{collaborator} unavailable: {source}")]
    CollaboratorUnavailable {
        collaborator: Collaborator,
        source: StoreError,
    },
}

impl GuardError {
    pub fn collaborator(collaborator: Collaborator, source: StoreError) -> Self {
        Self::CollaboratorUnavailable {
            collaborator,
            source,
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Unauthenticated => ErrorCode::Unauthorized,
            Self::RateLimited { .. } => ErrorCode::RateLimitExceeded,
            Self::Forbidden(ForbiddenReason::Undeclared { .. }) => ErrorCode::PolicyUndeclared,
            Self::Forbidden(_) => ErrorCode::Forbidden,
            Self::CollaboratorUnavailable { source, .. }
                if matches!(source, StoreError::Timeout(_)) =>
            {
                ErrorCode::StoreTimeout
            }
            Self::CollaboratorUnavailable { collaborator, .. } => match collaborator {
                Collaborator::MembershipStore | Collaborator::MatterStore => {
                    ErrorCode::DatabaseError
                }
                Collaborator::CounterStore => ErrorCode::CacheError,
                Collaborator::AuditSink => ErrorCode::AuditWriteFailed,
            },
        }
    }

    pub fn http_status(&self) -> StatusCode {
        self.code().http_status()
    }

    /// Short label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "unauthenticated",
            Self::RateLimited { .. } => "rate_limited",
            Self::Forbidden(reason) => reason.label(),
            Self::CollaboratorUnavailable { .. } => "collaborator_unavailable",
        }
    }

    /// Message that is safe to return to the caller.
    pub fn user_message(&self) -> String {
        match self {
            Self::CollaboratorUnavailable { .. } => {
                "Access control is temporarily unavailable".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl IntoResponse for GuardError {
    fn into_response(self) -> Response {
        let mut headers = HeaderMap::new();
        let mut body = ErrorResponse::new(self.code(), self.user_message());

        match &self {
            Self::RateLimited { limit, window_secs } => {
                if let Ok(value) = HeaderValue::from_str(&window_secs.to_string()) {
                    headers.insert("Retry-After", value);
                }
                if let Ok(value) = HeaderValue::from_str(&limit.to_string()) {
                    headers.insert("X-RateLimit-Limit", value);
                }
                body = body.with_details(serde_json::json!({
                    "limit": limit,
                    "retry_after_secs": window_secs,
                }));
            }
            Self::Forbidden(ForbiddenReason::RoleMismatch { required }) => {
                body = body.with_details(serde_json::json!({ "required_roles": required }));
            }
            Self::Forbidden(ForbiddenReason::PermissionMismatch { required }) => {
                body = body.with_details(serde_json::json!({ "required_permissions": required }));
            }
            _ => {}
        }

        body.into_response_with(headers)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_http_status() {
        assert_eq!(ErrorCode::Unauthorized.http_status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ErrorCode::Forbidden.http_status(), StatusCode::FORBIDDEN);
        assert_eq!(
            ErrorCode::RateLimitExceeded.http_status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            ErrorCode::StoreTimeout.http_status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ErrorCode::AuditWriteFailed.http_status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_error_code_category() {
        assert_eq!(ErrorCode::Forbidden.category(), "authorization");
        assert_eq!(ErrorCode::CacheError.category(), "collaborator");
        assert_eq!(ErrorCode::InternalError.category(), "internal");
    }

    #[test]
    fn test_forbidden_messages_name_requirements() {
        let err = GuardError::from(ForbiddenReason::RoleMismatch {
            required: vec!["ADMIN".into(), "MANAGER".into()],
        });
        assert_eq!(err.to_string(), "Required roles: ADMIN, MANAGER");

        let err = GuardError::from(ForbiddenReason::PermissionMismatch {
            required: vec!["p1".into(), "p2".into()],
        });
        assert_eq!(err.to_string(), "Required permissions: p1, p2");
    }

    #[test]
    fn test_matter_denial_hides_detail() {
        for detail in [
            MatterDenial::MissingId,
            MatterDenial::NotFound,
            MatterDenial::NotActiveMember,
        ] {
            let reason = ForbiddenReason::MatterAccessDenied { detail };
            assert_eq!(reason.to_string(), "Access denied to matter");
        }
    }

    #[test]
    fn test_collaborator_error_codes() {
        let err = GuardError::collaborator(
            Collaborator::CounterStore,
            StoreError::Unavailable("down".into()),
        );
        assert_eq!(err.code(), ErrorCode::CacheError);
        assert_eq!(err.user_message(), "Access control is temporarily unavailable");

        let err = GuardError::collaborator(
            Collaborator::AuditSink,
            StoreError::Unavailable("disk full".into()),
        );
        assert_eq!(err.code(), ErrorCode::AuditWriteFailed);

        let err = GuardError::collaborator(
            Collaborator::MatterStore,
            StoreError::Timeout(Duration::from_secs(5)),
        );
        assert_eq!(err.code(), ErrorCode::StoreTimeout);
        assert!(err.to_string().starts_with("matter store unavailable"));
    }

    #[test]
    fn test_rate_limited_response() {
        let response = GuardError::RateLimited {
            limit: 100,
            window_secs: 60,
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get("Retry-After").unwrap(), "60");
    }

    #[test]
    fn test_error_response_serialization() {
        let body = ErrorResponse::new(ErrorCode::Forbidden, "Access denied to matter");
        let json = serde_json::to_value(&body).unwrap();

        assert_eq!(json["success"], false);
        assert_eq!(json["error"]["code"], "FORBIDDEN");
        assert_eq!(json["error"]["message"], "Access denied to matter");
        assert!(json["error"].get("details").is_none());
    }
}
