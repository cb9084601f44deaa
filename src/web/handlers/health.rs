//! # Health and Info Handlers

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::error;

use crate::models::{AccountStrategy, ExecutionMode};
use crate::web::errors::{ApiError, ApiResult};
use crate::web::state::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    /// Task count per status
    pub tasks: BTreeMap<String, u64>,
    pub running: usize,
    pub leases_checked_out: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InfoResponse {
    pub supported_platforms: Vec<String>,
    pub registered_adapters: Vec<String>,
    pub account_strategies: Vec<AccountStrategy>,
    pub execution_modes: Vec<ExecutionMode>,
    pub default_account_strategy: AccountStrategy,
}

/// Liveness plus task counts: GET /health
///
/// Unavailable when the task store cannot be read.
pub async fn health(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    let tasks = state
        .coordinator
        .registry()
        .counts_by_status()
        .await
        .map_err(|e| {
            error!(error = %e, "❌ HEALTH: Task store unreachable");
            ApiError::ServiceUnavailable
        })?;

    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        tasks,
        running: state.coordinator.running_count(),
        leases_checked_out: state.pool.checked_out_count(),
    }))
}

/// Supported platforms and selectable options: GET /v1/info
pub async fn info(State(state): State<AppState>) -> Json<InfoResponse> {
    let coordinator = state.coordinator.config();
    Json(InfoResponse {
        supported_platforms: coordinator.supported_platforms.clone(),
        registered_adapters: state.coordinator.adapters().platforms(),
        account_strategies: AccountStrategy::SELECTABLE.to_vec(),
        execution_modes: ExecutionMode::ALL.to_vec(),
        default_account_strategy: coordinator.default_account_strategy,
    })
}
