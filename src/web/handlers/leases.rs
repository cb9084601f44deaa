//! # Lease Administration Handlers
//!
//! Seeding and manual overrides for account and proxy leases.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{LeaseAuditEntry, ResourceKind, ResourceLease};
use crate::resources::PoolStats;
use crate::web::errors::{ApiError, ApiResult};
use crate::web::state::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterLeaseRequest {
    pub kind: ResourceKind,
    pub platform: String,
    /// Account identifier or proxy endpoint
    pub identity_ref: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub priority: i32,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct DisableLeaseRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

/// Seed a lease: POST /v1/leases
pub async fn register_lease(
    State(state): State<AppState>,
    Json(request): Json<RegisterLeaseRequest>,
) -> ApiResult<(StatusCode, Json<ResourceLease>)> {
    if request.platform.is_empty() {
        return Err(ApiError::bad_request("platform cannot be empty"));
    }
    if request.identity_ref.is_empty() {
        return Err(ApiError::bad_request("identity_ref cannot be empty"));
    }

    let lease = ResourceLease::new(
        request.kind,
        request.platform,
        request.identity_ref,
        request.expires_at,
    )
    .with_priority(request.priority)
    .with_metadata(request.metadata);

    let lease = state.pool.register(lease).await?;
    Ok((StatusCode::CREATED, Json(lease)))
}

/// Return a lease to service: POST /v1/leases/:lease_id/enable
pub async fn enable_lease(
    State(state): State<AppState>,
    Path(lease_id): Path<Uuid>,
) -> ApiResult<Json<ResourceLease>> {
    Ok(Json(state.pool.enable(lease_id).await?))
}

/// Exclude a lease from allocation: POST /v1/leases/:lease_id/disable
pub async fn disable_lease(
    State(state): State<AppState>,
    Path(lease_id): Path<Uuid>,
    body: Option<Json<DisableLeaseRequest>>,
) -> ApiResult<Json<ResourceLease>> {
    let reason = body.and_then(|Json(b)| b.reason);
    Ok(Json(state.pool.disable(lease_id, reason.as_deref()).await?))
}

/// GET /v1/leases/:lease_id/audit
pub async fn lease_audit(
    State(state): State<AppState>,
    Path(lease_id): Path<Uuid>,
) -> ApiResult<Json<Vec<LeaseAuditEntry>>> {
    if state.pool.get(lease_id).await?.is_none() {
        return Err(ApiError::not_found(format!("lease {lease_id}")));
    }
    Ok(Json(state.pool.audit_log(lease_id).await?))
}

/// GET /v1/pools/stats
pub async fn pool_stats(State(state): State<AppState>) -> ApiResult<Json<Vec<PoolStats>>> {
    Ok(Json(state.pool.stats().await?))
}
