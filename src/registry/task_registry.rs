//! # Task Registry
//!
//! Sole mutator of task state.
//!
//! ## Overview
//!
//! The coordinator and its branches submit deltas here (a status/progress
//! change, one platform's branch result, the final aggregate). The registry
//! validates each delta against the task state machine and writes it through
//! the `TaskStore`:
//!
//! - Progress never decreases
//! - Status only moves forward; terminal tasks reject every write
//! - Writes for one task are serialized by a per-task async mutex, so
//!   concurrent branches cannot interleave a read-validate-write
//!
//! Reads are served from a short-lived `StatusCache` when enabled, which every
//! write refreshes.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use uuid::Uuid;

use super::cache::StatusCache;
use super::store::{InMemoryTaskStore, StatusUpdate, TaskStore};
use crate::config::{CacheConfig, RetentionConfig};
use crate::constants::MAX_PROGRESS;
use crate::error::{CrawlError, Result};
use crate::models::{BranchResult, Task, TaskFilter};
use crate::state_machine::{StateMachineError, TaskEvent, TaskState, TaskStateMachine};

pub struct TaskRegistry {
    store: Arc<dyn TaskStore>,
    cache: Option<StatusCache>,
    locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl std::fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRegistry")
            .field("cache", &self.cache.as_ref().map(|c| c.ttl()))
            .field("locked_tasks", &self.locks.len())
            .finish()
    }
}

impl TaskRegistry {
    pub fn new(store: Arc<dyn TaskStore>, cache: &CacheConfig) -> Self {
        let cache = cache
            .enabled
            .then(|| StatusCache::new(cache.status_ttl()));
        Self {
            store,
            cache,
            locks: DashMap::new(),
        }
    }

    /// Uncached registry over a fresh in-memory store
    pub fn in_memory() -> Self {
        Self {
            store: Arc::new(InMemoryTaskStore::new()),
            cache: None,
            locks: DashMap::new(),
        }
    }

    fn lock_for(&self, task_id: Uuid) -> Arc<Mutex<()>> {
        self.locks
            .entry(task_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn remember(&self, task: &Task) {
        if let Some(cache) = &self.cache {
            cache.put(task);
        }
    }

    fn forget(&self, task_id: Uuid) {
        if let Some(cache) = &self.cache {
            cache.invalidate(task_id);
        }
        self.locks.remove(&task_id);
    }

    async fn load(&self, task_id: Uuid) -> Result<Task> {
        self.store
            .get(task_id)
            .await?
            .ok_or(CrawlError::TaskNotFound(task_id))
    }

    pub async fn create(&self, task: Task) -> Result<Task> {
        if task.status != TaskState::Pending || task.progress != 0 {
            return Err(CrawlError::validation("new tasks must be pending with zero progress"));
        }
        self.store.insert(&task).await?;
        self.remember(&task);
        debug!(task_id = %task.task_id, platforms = ?task.platforms, "Task created");
        Ok(task)
    }

    pub async fn get(&self, task_id: Uuid) -> Result<Task> {
        if let Some(task) = self.cache.as_ref().and_then(|c| c.get(task_id)) {
            return Ok(task);
        }
        let task = self.load(task_id).await?;
        self.remember(&task);
        Ok(task)
    }

    pub async fn list(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
        Ok(self.store.list(filter).await?)
    }

    pub async fn delete(&self, task_id: Uuid) -> Result<()> {
        let lock = self.lock_for(task_id);
        let _guard = lock.lock().await;

        let existed = self.store.delete(task_id).await?;
        self.forget(task_id);
        if !existed {
            return Err(CrawlError::TaskNotFound(task_id));
        }
        Ok(())
    }

    /// Raise progress and optionally move status forward
    pub async fn update_progress(
        &self,
        task_id: Uuid,
        progress: u8,
        status: Option<TaskState>,
    ) -> Result<Task> {
        let lock = self.lock_for(task_id);
        let _guard = lock.lock().await;

        let mut task = self.load(task_id).await?;
        if task.is_terminal() {
            return Err(StateMachineError::TerminalState(task.status.to_string()).into());
        }

        let target = status.unwrap_or(task.status);
        if target != task.status && !TaskStateMachine::can_transition(task.status, target) {
            return Err(StateMachineError::InvalidTransition {
                from: task.status.to_string(),
                event: format!("set_status:{target}"),
            }
            .into());
        }

        let now = Utc::now();
        let update = StatusUpdate {
            status: target,
            progress: task.progress.max(progress.min(MAX_PROGRESS)),
            started_at: match target {
                TaskState::Running => task.started_at.or(Some(now)),
                _ => task.started_at,
            },
            completed_at: target.is_terminal().then_some(now).or(task.completed_at),
            message: task.message.clone(),
            updated_at: now,
        };

        self.store.update_status(task_id, &update).await?;
        update.apply_to(&mut task);
        self.remember(&task);
        Ok(task)
    }

    /// Record one platform's settled outcome
    pub async fn record_branch_result(&self, task_id: Uuid, result: &BranchResult) -> Result<()> {
        let lock = self.lock_for(task_id);
        let _guard = lock.lock().await;

        let mut task = self.load(task_id).await?;
        if task.is_terminal() {
            return Err(StateMachineError::TerminalState(task.status.to_string()).into());
        }

        self.store.record_branch_result(task_id, result).await?;
        task.apply_branch_result(result.clone());
        self.remember(&task);
        Ok(())
    }

    /// Write the final aggregate status exactly once
    pub async fn finalize(&self, task_id: Uuid, event: TaskEvent) -> Result<Task> {
        let lock = self.lock_for(task_id);
        let _guard = lock.lock().await;

        let mut task = self.load(task_id).await?;
        let mut machine = TaskStateMachine::new(task_id, task.status);
        let target = machine.transition(&event)?;

        let now = Utc::now();
        let message = match &event {
            TaskEvent::Timeout => Some("watchdog timeout".to_string()),
            other => other.error_message().map(String::from),
        };
        let update = StatusUpdate {
            status: target,
            progress: if target == TaskState::Timeout {
                task.progress
            } else {
                MAX_PROGRESS
            },
            started_at: task.started_at,
            completed_at: Some(now),
            message,
            updated_at: now,
        };

        self.store.update_status(task_id, &update).await?;
        update.apply_to(&mut task);
        self.remember(&task);
        Ok(task)
    }

    /// Task counts keyed by status name, including zero counts
    pub async fn counts_by_status(&self) -> Result<BTreeMap<String, u64>> {
        let counts = self.store.counts_by_status().await?;
        Ok(TaskState::ALL
            .iter()
            .map(|state| (state.to_string(), counts.get(state).copied().unwrap_or(0)))
            .collect())
    }

    /// Delete terminal tasks that finished before `cutoff`
    pub async fn purge_terminal_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let purged = self.store.delete_terminal_before(cutoff).await?;
        for task_id in &purged {
            self.forget(*task_id);
        }
        if !purged.is_empty() {
            info!(purged = purged.len(), cutoff = %cutoff, "🧹 REGISTRY: Purged expired tasks");
        }
        Ok(purged.len())
    }

    /// Periodically purge terminal tasks older than the retention window
    pub fn spawn_retention_sweeper(
        self: &Arc<Self>,
        retention: &RetentionConfig,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        let max_age = retention.max_age();
        let interval = retention.sweep_interval();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let cutoff = Utc::now() - max_age;
                        if let Err(e) = registry.purge_terminal_before(cutoff).await {
                            error!(error = %e, "❌ REGISTRY: Retention sweep failed");
                        }
                    }
                }
            }
            debug!("Retention sweeper stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AccountStrategy, ExecutionMode};
    use crate::state_machine::TerminationReason;

    fn task(platforms: &[&str]) -> Task {
        Task::new(
            platforms.iter().map(|p| p.to_string()).collect(),
            ExecutionMode::Parallel,
            AccountStrategy::Smart,
            serde_json::Value::Null,
        )
    }

    #[tokio::test]
    async fn test_create_then_get_is_pending() {
        let registry = TaskRegistry::in_memory();
        let created = registry.create(task(&["xhs"])).await.unwrap();
        let fetched = registry.get(created.task_id).await.unwrap();
        assert_eq!(fetched.status, TaskState::Pending);
        assert_eq!(fetched.progress, 0);
    }

    #[tokio::test]
    async fn test_progress_is_monotonic() {
        let registry = TaskRegistry::in_memory();
        let t = registry.create(task(&["xhs"])).await.unwrap();

        let running = registry
            .update_progress(t.task_id, 10, Some(TaskState::Running))
            .await
            .unwrap();
        assert_eq!(running.status, TaskState::Running);
        assert!(running.started_at.is_some());

        registry.update_progress(t.task_id, 60, None).await.unwrap();
        let lowered = registry.update_progress(t.task_id, 20, None).await.unwrap();
        assert_eq!(lowered.progress, 60);

        let clamped = registry.update_progress(t.task_id, 250, None).await.unwrap();
        assert_eq!(clamped.progress, 100);
    }

    #[tokio::test]
    async fn test_status_cannot_skip_running_or_go_back() {
        let registry = TaskRegistry::in_memory();
        let t = registry.create(task(&["xhs"])).await.unwrap();

        let skipped = registry
            .update_progress(t.task_id, 0, Some(TaskState::Completed))
            .await;
        assert!(matches!(skipped, Err(CrawlError::StateTransition(_))));

        registry
            .update_progress(t.task_id, 0, Some(TaskState::Running))
            .await
            .unwrap();
        let back = registry
            .update_progress(t.task_id, 0, Some(TaskState::Pending))
            .await;
        assert!(matches!(back, Err(CrawlError::StateTransition(_))));
    }

    #[tokio::test]
    async fn test_terminal_task_is_immutable() {
        let registry = TaskRegistry::in_memory();
        let t = registry.create(task(&["xhs"])).await.unwrap();
        registry
            .update_progress(t.task_id, 0, Some(TaskState::Running))
            .await
            .unwrap();
        registry
            .record_branch_result(t.task_id, &BranchResult::success("xhs", 5, 1, 0))
            .await
            .unwrap();

        let done = registry
            .finalize(t.task_id, TaskEvent::Complete)
            .await
            .unwrap();
        assert_eq!(done.status, TaskState::Completed);
        assert_eq!(done.progress, 100);
        assert!(done.completed_at.is_some());

        assert!(registry.update_progress(t.task_id, 100, None).await.is_err());
        assert!(registry
            .record_branch_result(
                t.task_id,
                &BranchResult::failure("xhs", TerminationReason::Cancelled, None, 0, 0)
            )
            .await
            .is_err());
        assert!(registry
            .finalize(t.task_id, TaskEvent::Timeout)
            .await
            .is_err());

        let fetched = registry.get(t.task_id).await.unwrap();
        assert_eq!(fetched.status, TaskState::Completed);
        assert_eq!(fetched.platform_results.get("xhs"), Some(&5));
    }

    #[tokio::test]
    async fn test_failed_task_keeps_reason() {
        let registry = TaskRegistry::in_memory();
        let t = registry.create(task(&["xhs"])).await.unwrap();
        registry
            .update_progress(t.task_id, 0, Some(TaskState::Running))
            .await
            .unwrap();
        let failed = registry
            .finalize(t.task_id, TaskEvent::Fail("xhs: no_resource".into()))
            .await
            .unwrap();
        assert_eq!(failed.status, TaskState::Failed);
        assert_eq!(failed.message.as_deref(), Some("xhs: no_resource"));
    }

    #[tokio::test]
    async fn test_delete_and_counts() {
        let registry = TaskRegistry::in_memory();
        let a = registry.create(task(&["xhs"])).await.unwrap();
        let b = registry.create(task(&["dy"])).await.unwrap();
        registry
            .update_progress(b.task_id, 0, Some(TaskState::Running))
            .await
            .unwrap();

        let counts = registry.counts_by_status().await.unwrap();
        assert_eq!(counts["pending"], 1);
        assert_eq!(counts["running"], 1);
        assert_eq!(counts["timeout"], 0);

        registry.delete(a.task_id).await.unwrap();
        assert!(matches!(
            registry.get(a.task_id).await,
            Err(CrawlError::TaskNotFound(_))
        ));
        assert!(matches!(
            registry.delete(a.task_id).await,
            Err(CrawlError::TaskNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_cached_reads_reflect_writes() {
        let registry = TaskRegistry::new(
            Arc::new(InMemoryTaskStore::new()),
            &CacheConfig {
                enabled: true,
                status_ttl_seconds: 30,
            },
        );
        let t = registry.create(task(&["xhs"])).await.unwrap();
        registry.get(t.task_id).await.unwrap();
        registry
            .update_progress(t.task_id, 50, Some(TaskState::Running))
            .await
            .unwrap();
        assert_eq!(registry.get(t.task_id).await.unwrap().progress, 50);
    }

    #[tokio::test]
    async fn test_purge_terminal_before() {
        let registry = TaskRegistry::in_memory();
        let t = registry.create(task(&["xhs"])).await.unwrap();
        registry
            .update_progress(t.task_id, 0, Some(TaskState::Running))
            .await
            .unwrap();
        registry
            .finalize(t.task_id, TaskEvent::Fail("boom".into()))
            .await
            .unwrap();

        assert_eq!(
            registry
                .purge_terminal_before(Utc::now() - chrono::Duration::hours(1))
                .await
                .unwrap(),
            0
        );
        assert_eq!(
            registry
                .purge_terminal_before(Utc::now() + chrono::Duration::seconds(1))
                .await
                .unwrap(),
            1
        );
    }
}
