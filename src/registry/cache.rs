//! Short-lived cache of task snapshots for status polling.

use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

use crate::models::Task;

#[derive(Debug)]
struct CachedTask {
    task: Task,
    stored_at: Instant,
}

#[derive(Debug)]
pub struct StatusCache {
    entries: DashMap<Uuid, CachedTask>,
    ttl: Duration,
}

impl StatusCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Fresh snapshot, if any; stale entries are dropped on read
    pub fn get(&self, task_id: Uuid) -> Option<Task> {
        match self.entries.get(&task_id) {
            Some(entry) if entry.stored_at.elapsed() < self.ttl => {
                return Some(entry.task.clone());
            }
            Some(_) => {}
            None => return None,
        }
        self.entries.remove(&task_id);
        None
    }

    pub fn put(&self, task: &Task) {
        self.entries.insert(
            task.task_id,
            CachedTask {
                task: task.clone(),
                stored_at: Instant::now(),
            },
        );
    }

    pub fn invalidate(&self, task_id: Uuid) {
        self.entries.remove(&task_id);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
