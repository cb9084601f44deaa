//! # Task Store
//!
//! Persistence contract for task records. Writers submit deltas (a status
//! update or one platform's branch result) instead of whole-record
//! overwrites, so concurrent branches never lose each other's updates.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{BranchResult, Task, TaskFilter};
use crate::state_machine::TaskState;

/// Aggregate-field delta for one task
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub status: TaskState,
    pub progress: u8,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub message: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl StatusUpdate {
    pub fn apply_to(&self, task: &mut Task) {
        task.status = self.status;
        task.progress = self.progress;
        task.started_at = self.started_at;
        task.completed_at = self.completed_at;
        task.message = self.message.clone();
        task.updated_at = self.updated_at;
    }
}

#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn insert(&self, task: &Task) -> Result<(), StoreError>;

    async fn get(&self, task_id: Uuid) -> Result<Option<Task>, StoreError>;

    /// Newest first, honoring the filter's limit and offset
    async fn list(&self, filter: &TaskFilter) -> Result<Vec<Task>, StoreError>;

    /// Returns false when no such task existed
    async fn delete(&self, task_id: Uuid) -> Result<bool, StoreError>;

    async fn update_status(&self, task_id: Uuid, update: &StatusUpdate) -> Result<(), StoreError>;

    /// Upsert one platform's settled result
    async fn record_branch_result(
        &self,
        task_id: Uuid,
        result: &BranchResult,
    ) -> Result<(), StoreError>;

    async fn counts_by_status(&self) -> Result<BTreeMap<TaskState, u64>, StoreError>;

    /// Delete terminal tasks that finished before `cutoff`; returns their ids
    async fn delete_terminal_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<Uuid>, StoreError>;
}

/// Process-local task store
#[derive(Debug, Default)]
pub struct InMemoryTaskStore {
    tasks: DashMap<Uuid, Task>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn insert(&self, task: &Task) -> Result<(), StoreError> {
        self.tasks.insert(task.task_id, task.clone());
        Ok(())
    }

    async fn get(&self, task_id: Uuid) -> Result<Option<Task>, StoreError> {
        Ok(self.tasks.get(&task_id).map(|entry| entry.clone()))
    }

    async fn list(&self, filter: &TaskFilter) -> Result<Vec<Task>, StoreError> {
        let mut tasks: Vec<Task> = self
            .tasks
            .iter()
            .filter(|entry| filter.matches(entry.value()))
            .map(|entry| entry.clone())
            .collect();
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(tasks
            .into_iter()
            .skip(filter.effective_offset())
            .take(filter.effective_limit())
            .collect())
    }

    async fn delete(&self, task_id: Uuid) -> Result<bool, StoreError> {
        Ok(self.tasks.remove(&task_id).is_some())
    }

    async fn update_status(&self, task_id: Uuid, update: &StatusUpdate) -> Result<(), StoreError> {
        let mut task = self
            .tasks
            .get_mut(&task_id)
            .ok_or_else(|| StoreError::not_found("task", task_id))?;
        update.apply_to(&mut task);
        Ok(())
    }

    async fn record_branch_result(
        &self,
        task_id: Uuid,
        result: &BranchResult,
    ) -> Result<(), StoreError> {
        let mut task = self
            .tasks
            .get_mut(&task_id)
            .ok_or_else(|| StoreError::not_found("task", task_id))?;
        task.apply_branch_result(result.clone());
        Ok(())
    }

    async fn counts_by_status(&self) -> Result<BTreeMap<TaskState, u64>, StoreError> {
        let mut counts = BTreeMap::new();
        for entry in self.tasks.iter() {
            *counts.entry(entry.status).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn delete_terminal_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<Uuid>, StoreError> {
        let expired: Vec<Uuid> = self
            .tasks
            .iter()
            .filter(|entry| {
                entry.is_terminal() && entry.completed_at.unwrap_or(entry.updated_at) < cutoff
            })
            .map(|entry| entry.task_id)
            .collect();

        for task_id in &expired {
            self.tasks.remove(task_id);
        }
        Ok(expired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AccountStrategy, ExecutionMode};
    use chrono::Duration;

    fn task(platforms: &[&str]) -> Task {
        Task::new(
            platforms.iter().map(|p| p.to_string()).collect(),
            ExecutionMode::Parallel,
            AccountStrategy::Smart,
            serde_json::Value::Null,
        )
    }

    #[tokio::test]
    async fn test_list_filters_and_pages_newest_first() {
        let store = InMemoryTaskStore::new();
        let mut ids = Vec::new();
        for i in 0..5 {
            let mut t = task(if i % 2 == 0 { &["xhs"] } else { &["dy"] });
            t.created_at = Utc::now() - Duration::minutes(10 - i);
            ids.push(t.task_id);
            store.insert(&t).await.unwrap();
        }

        let all = store.list(&TaskFilter::default()).await.unwrap();
        assert_eq!(all.len(), 5);
        assert_eq!(all[0].task_id, ids[4]);

        let xhs = store
            .list(&TaskFilter {
                platform: Some("xhs".into()),
                ..TaskFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(xhs.len(), 3);

        let page = store
            .list(&TaskFilter {
                limit: Some(2),
                offset: Some(1),
                ..TaskFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(page.iter().map(|t| t.task_id).collect::<Vec<_>>(), vec![ids[3], ids[2]]);
    }

    #[tokio::test]
    async fn test_branch_results_are_independent_deltas() {
        let store = InMemoryTaskStore::new();
        let t = task(&["xhs", "dy"]);
        store.insert(&t).await.unwrap();

        store
            .record_branch_result(t.task_id, &BranchResult::success("xhs", 4, 1, 0))
            .await
            .unwrap();
        store
            .record_branch_result(t.task_id, &BranchResult::success("dy", 6, 1, 0))
            .await
            .unwrap();

        let stored = store.get(t.task_id).await.unwrap().unwrap();
        assert_eq!(stored.total_items(), 10);
        assert_eq!(stored.settled_count(), 2);
    }

    #[tokio::test]
    async fn test_delete_terminal_before_keeps_active_tasks() {
        let store = InMemoryTaskStore::new();
        let mut old_done = task(&["xhs"]);
        old_done.status = TaskState::Completed;
        old_done.completed_at = Some(Utc::now() - Duration::hours(30));
        let mut old_running = task(&["xhs"]);
        old_running.status = TaskState::Running;
        old_running.updated_at = Utc::now() - Duration::hours(30);
        store.insert(&old_done).await.unwrap();
        store.insert(&old_running).await.unwrap();

        let purged = store
            .delete_terminal_before(Utc::now() - Duration::hours(24))
            .await
            .unwrap();
        assert_eq!(purged, vec![old_done.task_id]);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_update_missing_task() {
        let store = InMemoryTaskStore::new();
        let update = StatusUpdate {
            status: TaskState::Running,
            progress: 0,
            started_at: None,
            completed_at: None,
            message: None,
            updated_at: Utc::now(),
        };
        let result = store.update_status(Uuid::new_v4(), &update).await;
        assert!(matches!(result, Err(StoreError::NotFound { .. })));
    }
}
