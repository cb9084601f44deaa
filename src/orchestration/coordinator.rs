//! # Multi-Platform Coordinator
//!
//! Fans one crawl request out into a branch per platform and folds the
//! branch outcomes into a single task status.
//!
//! ## Lifecycle
//!
//! ```text
//! submit ──▶ pending ──▶ running ──▶ branches (parallel | sequential)
//!                           │                  │
//!                           │ watchdog         ▼ all settled
//!                           ▼           completed / completed_with_errors / failed
//!                        timeout
//! ```
//!
//! `submit` persists the task and returns its id before any branch work
//! starts. Dispatch happens on a spawned tokio task that owns a cancellation
//! token; the watchdog, `cancel` and `delete` all fire that token, and every
//! branch drains (releasing its leases) before the final status is written.

use dashmap::DashMap;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::adapter::{AdapterRegistry, OperationFactory, PlatformAdapter};
use super::retry_orchestrator::{BranchSpec, RetryOrchestrator};
use crate::config::CoordinatorConfig;
use crate::constants::{events, MAX_PROGRESS};
use crate::error::{CrawlError, Result};
use crate::logging::{log_error, log_task_operation};
use crate::models::{
    AccountStrategy, BranchResult, ErrorKind, ErrorRecord, ExecutionMode, Task, TaskFilter,
};
use crate::registry::TaskRegistry;
use crate::state_machine::{TaskEvent, TaskState, TerminationReason};

/// A crawl request spanning one or more platforms
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRequest {
    pub platforms: Vec<String>,
    #[serde(default)]
    pub execution_mode: ExecutionMode,
    /// Falls back to the coordinator's configured default
    #[serde(default)]
    pub account_strategy: Option<AccountStrategy>,
    #[serde(default)]
    pub params: serde_json::Value,
}

impl TaskRequest {
    pub fn new(platforms: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            platforms: platforms.into_iter().map(Into::into).collect(),
            execution_mode: ExecutionMode::default(),
            account_strategy: None,
            params: serde_json::Value::Null,
        }
    }

    pub fn sequential(mut self) -> Self {
        self.execution_mode = ExecutionMode::Sequential;
        self
    }

    pub fn with_strategy(mut self, strategy: AccountStrategy) -> Self {
        self.account_strategy = Some(strategy);
        self
    }

    pub fn with_params(mut self, params: serde_json::Value) -> Self {
        self.params = params;
        self
    }
}

/// Final task event for a set of settled branches
pub fn aggregate(results: &[BranchResult]) -> TaskEvent {
    let succeeded = results.iter().filter(|r| r.is_ok()).count();

    if results.is_empty() {
        return TaskEvent::Fail("no branches settled".to_string());
    }
    if succeeded == results.len() {
        return TaskEvent::Complete;
    }
    if succeeded > 0 {
        return TaskEvent::CompleteWithErrors;
    }

    let reasons: Vec<String> = results
        .iter()
        .map(|r| {
            format!(
                "{}: {}",
                r.platform,
                r.error_message().unwrap_or_else(|| "unknown".to_string())
            )
        })
        .collect();
    TaskEvent::Fail(reasons.join("; "))
}

fn progress_for(settled: usize, total: usize) -> u8 {
    if total == 0 {
        return MAX_PROGRESS;
    }
    ((settled.min(total) * MAX_PROGRESS as usize) / total) as u8
}

pub struct MultiPlatformCoordinator {
    registry: Arc<TaskRegistry>,
    orchestrator: Arc<RetryOrchestrator>,
    adapters: Arc<AdapterRegistry>,
    config: CoordinatorConfig,
    running: DashMap<Uuid, CancellationToken>,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for MultiPlatformCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiPlatformCoordinator")
            .field("adapters", &self.adapters)
            .field("running", &self.running.len())
            .field("config", &self.config)
            .finish()
    }
}

impl MultiPlatformCoordinator {
    pub fn new(
        registry: Arc<TaskRegistry>,
        orchestrator: Arc<RetryOrchestrator>,
        adapters: Arc<AdapterRegistry>,
        config: CoordinatorConfig,
    ) -> Self {
        info!(
            platforms = ?config.supported_platforms,
            max_parallel_branches = config.max_parallel_branches,
            watchdog_seconds = config.watchdog_timeout_seconds,
            "🚀 COORDINATOR: Multi-platform coordinator initialized"
        );
        Self {
            registry,
            orchestrator,
            adapters,
            config,
            running: DashMap::new(),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.registry
    }

    pub fn adapters(&self) -> &Arc<AdapterRegistry> {
        &self.adapters
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn running_count(&self) -> usize {
        self.running.len()
    }

    pub fn is_running(&self, task_id: Uuid) -> bool {
        self.running.contains_key(&task_id)
    }

    fn validate(&self, request: &TaskRequest) -> Result<()> {
        if request.platforms.is_empty() {
            return Err(CrawlError::validation("at least one platform is required"));
        }

        let mut seen = HashSet::new();
        for platform in &request.platforms {
            if !seen.insert(platform.as_str()) {
                return Err(CrawlError::validation(format!(
                    "platform '{platform}' requested more than once"
                )));
            }
            if !self.config.supports(platform) {
                return Err(CrawlError::validation(format!(
                    "unsupported platform '{platform}', expected one of {}",
                    self.config.supported_platforms.join(", ")
                )));
            }
            if !self.adapters.contains(platform) {
                return Err(CrawlError::AdapterNotRegistered(platform.clone()));
            }
        }
        Ok(())
    }

    /// Persist a pending task and start dispatching it in the background
    pub async fn submit(
        self: &Arc<Self>,
        request: TaskRequest,
        factory: Arc<dyn OperationFactory>,
    ) -> Result<Uuid> {
        self.validate(&request)?;

        let strategy = request
            .account_strategy
            .unwrap_or(self.config.default_account_strategy);
        let task = Task::new(
            request.platforms,
            request.execution_mode,
            strategy,
            request.params,
        );
        let task = self.registry.create(task).await?;
        let task_id = task.task_id;

        log_task_operation(
            events::TASK_SUBMITTED,
            task_id,
            &task.status.to_string(),
            Some(task.progress),
            Some(&format!(
                "platforms={} mode={} strategy={}",
                task.platforms.join(","),
                task.execution_mode,
                task.account_strategy
            )),
        );

        let token = self.shutdown.child_token();
        self.running.insert(task_id, token.clone());

        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            Arc::clone(&coordinator).run_task(task, factory, token).await;
            coordinator.running.remove(&task_id);
        });

        Ok(task_id)
    }

    pub async fn get_status(&self, task_id: Uuid) -> Result<Task> {
        self.registry.get(task_id).await
    }

    pub async fn list(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
        self.registry.list(filter).await
    }

    /// Cancel outstanding branches; returns false if the task is not running
    pub fn cancel(&self, task_id: Uuid) -> bool {
        match self.running.get(&task_id) {
            Some(token) => {
                token.cancel();
                info!(task_id = %task_id, "🛑 COORDINATOR: Task cancellation requested");
                true
            }
            None => false,
        }
    }

    /// Cancel the task if it is running, then remove its record
    pub async fn delete(&self, task_id: Uuid) -> Result<()> {
        self.cancel(task_id);
        self.registry.delete(task_id).await?;
        log_task_operation(events::TASK_DELETED, task_id, "deleted", None, None);
        Ok(())
    }

    /// Cancel every running task
    pub fn shutdown(&self) {
        info!(running = self.running.len(), "🛑 COORDINATOR: Shutting down");
        self.shutdown.cancel();
    }

    async fn run_task(
        self: Arc<Self>,
        task: Task,
        factory: Arc<dyn OperationFactory>,
        token: CancellationToken,
    ) {
        let task_id = task.task_id;

        match self
            .registry
            .update_progress(task_id, 0, Some(TaskState::Running))
            .await
        {
            Ok(running) => log_task_operation(
                events::TASK_STARTED,
                task_id,
                &running.status.to_string(),
                Some(running.progress),
                None,
            ),
            Err(e) => {
                log_error(
                    "coordinator",
                    "start_task",
                    &e.to_string(),
                    Some(&task_id.to_string()),
                );
                return;
            }
        }

        let watchdog = self.config.watchdog_timeout();
        let mut dispatch = std::pin::pin!(self.dispatch(&task, factory.as_ref(), &token));

        let (results, timed_out) = match tokio::time::timeout(watchdog, dispatch.as_mut()).await {
            Ok(results) => (results, false),
            Err(_) => {
                warn!(
                    task_id = %task_id,
                    watchdog_seconds = watchdog.as_secs(),
                    "⏰ COORDINATOR: Watchdog expired, cancelling branches"
                );
                token.cancel();
                (dispatch.await, true)
            }
        };

        let event = if timed_out {
            log_task_operation(
                events::TASK_TIMED_OUT,
                task_id,
                &TaskState::Timeout.to_string(),
                None,
                Some(&format!("{} branches drained", results.len())),
            );
            TaskEvent::Timeout
        } else {
            aggregate(&results)
        };

        match self.registry.finalize(task_id, event).await {
            Ok(finished) => log_task_operation(
                events::TASK_FINALIZED,
                task_id,
                &finished.status.to_string(),
                Some(finished.progress),
                finished.message.as_deref(),
            ),
            Err(CrawlError::TaskNotFound(_)) => {
                debug!(task_id = %task_id, "Task deleted before finalization");
            }
            Err(e) => log_error(
                "coordinator",
                "finalize_task",
                &e.to_string(),
                Some(&task_id.to_string()),
            ),
        }
    }

    async fn dispatch(
        &self,
        task: &Task,
        factory: &dyn OperationFactory,
        token: &CancellationToken,
    ) -> Vec<BranchResult> {
        match task.execution_mode {
            ExecutionMode::Parallel => self.run_parallel(task, factory, token).await,
            ExecutionMode::Sequential => self.run_sequential(task, factory, token).await,
        }
    }

    fn branch_spec(&self, task: &Task, platform: &str, factory: &dyn OperationFactory) -> BranchSpec {
        BranchSpec {
            task_id: task.task_id,
            platform: platform.to_string(),
            operation: factory.build(platform),
            strategy: task.account_strategy,
        }
    }

    async fn run_parallel(
        &self,
        task: &Task,
        factory: &dyn OperationFactory,
        token: &CancellationToken,
    ) -> Vec<BranchResult> {
        let total = task.platforms.len();
        let semaphore = Arc::new(Semaphore::new(self.config.max_parallel_branches.max(1)));
        let mut branches = JoinSet::new();
        let mut results = Vec::with_capacity(total);
        let mut spawned = Vec::with_capacity(total);

        for platform in &task.platforms {
            let Some(adapter) = self.adapters.get(platform) else {
                let result = missing_adapter(platform);
                self.settle(task.task_id, &result, results.len() + 1, total).await;
                results.push(result);
                continue;
            };

            let spec = self.branch_spec(task, platform, factory);
            let orchestrator = Arc::clone(&self.orchestrator);
            let semaphore = Arc::clone(&semaphore);
            let branch_token = token.child_token();
            spawned.push(platform.clone());

            branches.spawn(async move {
                let platform = spec.platform.clone();
                let permit = tokio::select! {
                    biased;
                    _ = branch_token.cancelled() => None,
                    permit = semaphore.acquire_owned() => permit.ok(),
                };
                let Some(_permit) = permit else {
                    return BranchResult::failure(platform, TerminationReason::Cancelled, None, 0, 0);
                };
                run_guarded(orchestrator, adapter, spec, branch_token).await
            });
        }

        while let Some(joined) = branches.join_next().await {
            match joined {
                Ok(result) => {
                    self.settle(task.task_id, &result, results.len() + 1, total).await;
                    results.push(result);
                }
                Err(e) => error!(
                    task_id = %task.task_id,
                    error = %e,
                    "❌ COORDINATOR: Branch task did not complete"
                ),
            }
        }

        // A join error carries no platform; every spawned branch still needs a result
        for result in unsettled_branches(&spawned, &results) {
            self.settle(task.task_id, &result, results.len() + 1, total).await;
            results.push(result);
        }

        results
    }

    async fn run_sequential(
        &self,
        task: &Task,
        factory: &dyn OperationFactory,
        token: &CancellationToken,
    ) -> Vec<BranchResult> {
        let total = task.platforms.len();
        let delay = self.config.inter_branch_delay();
        let mut results = Vec::with_capacity(total);

        for (index, platform) in task.platforms.iter().enumerate() {
            let mut cancelled = token.is_cancelled();

            if !cancelled && index > 0 && !delay.is_zero() {
                cancelled = tokio::select! {
                    biased;
                    _ = token.cancelled() => true,
                    _ = tokio::time::sleep(delay) => false,
                };
            }

            let result = if cancelled {
                BranchResult::failure(platform, TerminationReason::Cancelled, None, 0, 0)
            } else {
                self.write_progress(task.task_id, progress_for(index, total)).await;
                match self.adapters.get(platform) {
                    Some(adapter) => {
                        let spec = self.branch_spec(task, platform, factory);
                        run_guarded(
                            Arc::clone(&self.orchestrator),
                            adapter,
                            spec,
                            token.child_token(),
                        )
                        .await
                    }
                    None => missing_adapter(platform),
                }
            };

            self.settle(task.task_id, &result, index + 1, total).await;
            results.push(result);
        }

        results
    }

    /// Record one settled branch and bump progress
    async fn settle(&self, task_id: Uuid, result: &BranchResult, settled: usize, total: usize) {
        if let Err(e) = self.registry.record_branch_result(task_id, result).await {
            if !matches!(e, CrawlError::TaskNotFound(_)) {
                log_error(
                    "coordinator",
                    "record_branch_result",
                    &e.to_string(),
                    Some(&format!("task_id={task_id} platform={}", result.platform)),
                );
            }
            return;
        }
        self.write_progress(task_id, progress_for(settled, total)).await;
    }

    async fn write_progress(&self, task_id: Uuid, progress: u8) {
        if let Err(e) = self.registry.update_progress(task_id, progress, None).await {
            debug!(task_id = %task_id, error = %e, "Progress update skipped");
        }
    }
}

/// Run a branch, converting a panic inside it into a failed result
async fn run_guarded(
    orchestrator: Arc<RetryOrchestrator>,
    adapter: Arc<dyn PlatformAdapter>,
    spec: BranchSpec,
    cancel: CancellationToken,
) -> BranchResult {
    let platform = spec.platform.clone();
    let task_id = spec.task_id;

    match AssertUnwindSafe(orchestrator.run_branch(adapter, spec, cancel))
        .catch_unwind()
        .await
    {
        Ok(outcome) => outcome.result,
        Err(_) => {
            error!(task_id = %task_id, platform = %platform, "❌ COORDINATOR: Branch panicked");
            BranchResult::failure(
                &platform,
                TerminationReason::Unrecoverable,
                Some(ErrorRecord::new(
                    ErrorKind::Unknown,
                    "branch panicked",
                    &platform,
                    None,
                    0,
                )),
                0,
                0,
            )
        }
    }
}

/// Failures for spawned branches that never produced a result
fn unsettled_branches(spawned: &[String], results: &[BranchResult]) -> Vec<BranchResult> {
    spawned
        .iter()
        .filter(|platform| !results.iter().any(|r| &r.platform == *platform))
        .map(|platform| {
            BranchResult::failure(
                platform,
                TerminationReason::Unrecoverable,
                Some(ErrorRecord::new(
                    ErrorKind::Unknown,
                    "branch task did not complete",
                    platform,
                    None,
                    0,
                )),
                0,
                0,
            )
        })
        .collect()
}

fn missing_adapter(platform: &str) -> BranchResult {
    BranchResult::failure(
        platform,
        TerminationReason::Unrecoverable,
        Some(ErrorRecord::new(
            ErrorKind::Unknown,
            format!("no adapter registered for platform '{platform}'"),
            platform,
            None,
            0,
        )),
        0,
        0,
    )
}
