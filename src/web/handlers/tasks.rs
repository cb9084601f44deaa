//! # Task Handlers
//!
//! Submission, status polling, listing and deletion of crawl tasks.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::models::{Task, TaskFilter};
use crate::orchestration::{CrawlOperation, StaticOperation, TaskRequest};
use crate::state_machine::TaskState;
use crate::web::errors::{ApiError, ApiResult};
use crate::web::state::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct TaskCreationResponse {
    pub task_id: Uuid,
    pub status: TaskState,
}

#[derive(Debug, Default, Deserialize)]
pub struct TaskListQuery {
    pub status: Option<String>,
    pub platform: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl TaskListQuery {
    fn into_filter(self) -> ApiResult<TaskFilter> {
        let status = self
            .status
            .as_deref()
            .map(str::parse::<TaskState>)
            .transpose()
            .map_err(ApiError::bad_request)?;
        Ok(TaskFilter {
            status,
            platform: self.platform,
            limit: self.limit,
            offset: self.offset,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TaskListResponse {
    pub tasks: Vec<Task>,
    pub count: usize,
}

/// Submit a task: POST /v1/tasks
///
/// Returns as soon as the pending record is persisted; dispatch continues in
/// the background.
pub async fn create_task(
    State(state): State<AppState>,
    Json(request): Json<TaskRequest>,
) -> ApiResult<(StatusCode, Json<TaskCreationResponse>)> {
    info!(
        platforms = ?request.platforms,
        mode = %request.execution_mode,
        "Creating crawl task via web API"
    );

    let operation = CrawlOperation::from_params(&request.params);
    let task_id = state
        .coordinator
        .submit(request, Arc::new(StaticOperation(operation)))
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(TaskCreationResponse {
            task_id,
            status: TaskState::Pending,
        }),
    ))
}

/// Task snapshot: GET /v1/tasks/:task_id
pub async fn get_task(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> ApiResult<Json<Task>> {
    Ok(Json(state.coordinator.get_status(task_id).await?))
}

/// List tasks newest first: GET /v1/tasks
pub async fn list_tasks(
    State(state): State<AppState>,
    Query(query): Query<TaskListQuery>,
) -> ApiResult<Json<TaskListResponse>> {
    let filter = query.into_filter()?;
    let tasks = state.coordinator.list(&filter).await?;
    Ok(Json(TaskListResponse {
        count: tasks.len(),
        tasks,
    }))
}

/// Cancel if running, then delete: DELETE /v1/tasks/:task_id
pub async fn delete_task(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state.coordinator.delete(task_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
