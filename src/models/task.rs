//! # Task Model
//!
//! A task is one logical crawl request spanning one or more platforms. The
//! coordinator owns the aggregate fields; branches only contribute
//! per-platform results through the registry.
//!
//! ## Invariants
//!
//! - `status` only moves forward (see `TaskStateMachine`)
//! - `progress` never decreases
//! - once `status` is terminal the record is immutable

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use super::branch_result::BranchResult;
use super::lease::AccountStrategy;
use crate::state_machine::TaskState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    #[default]
    Parallel,
    Sequential,
}

impl ExecutionMode {
    pub const ALL: [ExecutionMode; 2] = [Self::Parallel, Self::Sequential];
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parallel => write!(f, "parallel"),
            Self::Sequential => write!(f, "sequential"),
        }
    }
}

impl std::str::FromStr for ExecutionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "parallel" => Ok(Self::Parallel),
            "sequential" => Ok(Self::Sequential),
            _ => Err(format!("Invalid execution mode: {s}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub task_id: Uuid,
    /// Requested platforms in dispatch order, no duplicates
    pub platforms: Vec<String>,
    pub execution_mode: ExecutionMode,
    pub account_strategy: AccountStrategy,
    pub status: TaskState,
    pub progress: u8,
    /// Item counts per settled platform
    pub platform_results: BTreeMap<String, u32>,
    /// Error text per failed platform
    pub platform_errors: BTreeMap<String, String>,
    pub branch_results: BTreeMap<String, BranchResult>,
    /// Operation parameters as submitted
    pub params: serde_json::Value,
    /// Terminating reason for failed or timed out tasks
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn new(
        platforms: Vec<String>,
        execution_mode: ExecutionMode,
        account_strategy: AccountStrategy,
        params: serde_json::Value,
    ) -> Self {
        let now = Utc::now();
        Self {
            task_id: Uuid::new_v4(),
            platforms,
            execution_mode,
            account_strategy,
            status: TaskState::Pending,
            progress: 0,
            platform_results: BTreeMap::new(),
            platform_errors: BTreeMap::new(),
            branch_results: BTreeMap::new(),
            params,
            message: None,
            created_at: now,
            started_at: None,
            completed_at: None,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn total_items(&self) -> u64 {
        self.platform_results.values().map(|&n| n as u64).sum()
    }

    pub fn settled_count(&self) -> usize {
        self.branch_results.len()
    }

    pub fn succeeded_platforms(&self) -> impl Iterator<Item = &str> {
        self.branch_results
            .values()
            .filter(|r| r.is_ok())
            .map(|r| r.platform.as_str())
    }

    /// Fold one settled branch into the per-platform fields
    pub fn apply_branch_result(&mut self, result: BranchResult) {
        let platform = result.platform.clone();
        self.platform_results.insert(platform.clone(), result.item_count);
        match result.error_message() {
            Some(message) => {
                self.platform_errors.insert(platform.clone(), message);
            }
            None => {
                self.platform_errors.remove(&platform);
            }
        }
        self.branch_results.insert(platform, result);
        self.updated_at = Utc::now();
    }
}

/// Listing filter; newest tasks first
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskFilter {
    pub status: Option<TaskState>,
    pub platform: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl TaskFilter {
    pub fn with_status(status: TaskState) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn matches(&self, task: &Task) -> bool {
        if let Some(status) = self.status {
            if task.status != status {
                return false;
            }
        }
        if let Some(platform) = &self.platform {
            if !task.platforms.iter().any(|p| p == platform) {
                return false;
            }
        }
        true
    }

    pub fn effective_limit(&self) -> usize {
        self.limit
            .unwrap_or(crate::constants::defaults::LIST_LIMIT) as usize
    }

    pub fn effective_offset(&self) -> usize {
        self.offset.unwrap_or(0) as usize
    }
}
