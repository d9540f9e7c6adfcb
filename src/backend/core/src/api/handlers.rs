//! API request handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use tracing::{error, warn};

use super::{ApiResponse, AppState};
use crate::error::{ErrorCode, ErrorResponse};
use crate::rbac::{AccessGrant, OrganizationId};

const DEFAULT_AUDIT_LIMIT: usize = 50;
const MAX_AUDIT_LIMIT: usize = 500;

// ═══════════════════════════════════════════════════════════════════════════════
// Health Check
// ═══════════════════════════════════════════════════════════════════════════════

pub async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// Probe every dependency; 503 if any of them fails.
pub async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    let mut checks = serde_json::Map::new();
    let mut ready = true;

    for probe in &state.probes {
        let entry = match probe.probe().await {
            Ok(latency) => serde_json::json!({
                "status": "up",
                "latency_ms": u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
            }),
            Err(e) => {
                ready = false;
                warn!(dependency = probe.name(), error = %e, "Readiness probe failed");
                serde_json::json!({ "status": "down", "error": e.to_string() })
            }
        };
        checks.insert(probe.name().to_string(), entry);
    }

    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(serde_json::json!({
            "status": if ready { "ready" } else { "not_ready" },
            "checks": checks,
            "timestamp": chrono::Utc::now().to_rfc3339()
        })),
    )
}

pub async fn prometheus_metrics(State(state): State<AppState>) -> impl IntoResponse {
    let body = state
        .metrics
        .as_ref()
        .map(|handle| handle.render())
        .unwrap_or_default();

    (
        [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

// ═══════════════════════════════════════════════════════════════════════════════
// Audit Logs
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
pub struct AuditLogQuery {
    pub limit: Option<usize>,
}

pub async fn list_audit_logs(
    State(state): State<AppState>,
    Path(org_id): Path<String>,
    Query(query): Query<AuditLogQuery>,
) -> Result<impl IntoResponse, ErrorResponse> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_AUDIT_LIMIT)
        .clamp(1, MAX_AUDIT_LIMIT);

    let records = state
        .audit_reader
        .recent(&OrganizationId::new(org_id), limit)
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to read audit logs");
            ErrorResponse::new(ErrorCode::DatabaseError, "Failed to read audit logs")
        })?;

    Ok(Json(ApiResponse::success(records)))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Matter Access
// ═══════════════════════════════════════════════════════════════════════════════

/// The grant the guard resolved for this matter.
pub async fn matter_access(grant: AccessGrant) -> impl IntoResponse {
    Json(ApiResponse::success(grant))
}
