use serde::{Deserialize, Serialize};
use std::fmt;

/// Task status lifecycle: pending -> running -> terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Created and persisted, no branch dispatched yet
    Pending,
    /// Branches are being dispatched or are in flight
    Running,
    /// Every branch succeeded
    Completed,
    /// At least one branch succeeded and at least one failed
    CompletedWithErrors,
    /// Every branch failed
    Failed,
    /// The watchdog fired before all branches settled
    Timeout,
}

impl TaskState {
    pub const ALL: [TaskState; 6] = [
        Self::Pending,
        Self::Running,
        Self::Completed,
        Self::CompletedWithErrors,
        Self::Failed,
        Self::Timeout,
    ];

    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::CompletedWithErrors | Self::Failed | Self::Timeout
        )
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Running)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::CompletedWithErrors => write!(f, "completed_with_errors"),
            Self::Failed => write!(f, "failed"),
            Self::Timeout => write!(f, "timeout"),
        }
    }
}

impl std::str::FromStr for TaskState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "completed_with_errors" => Ok(Self::CompletedWithErrors),
            "failed" => Ok(Self::Failed),
            "timeout" => Ok(Self::Timeout),
            _ => Err(format!("Invalid task state: {s}")),
        }
    }
}

/// Per-branch retry loop states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchState {
    Allocating,
    Executing,
    EvaluatingFailure,
    Retrying,
    SwitchingResource,
    Succeeded,
    Terminated,
}

impl BranchState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Terminated)
    }
}

impl fmt::Display for BranchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allocating => write!(f, "allocating"),
            Self::Executing => write!(f, "executing"),
            Self::EvaluatingFailure => write!(f, "evaluating_failure"),
            Self::Retrying => write!(f, "retrying"),
            Self::SwitchingResource => write!(f, "switching_resource"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Terminated => write!(f, "terminated"),
        }
    }
}

/// Why a branch stopped without succeeding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    /// No lease could be acquired or provisioned
    NoResource,
    /// Identity-invalidating error with no switch available
    Unrecoverable,
    MaxRetriesExceeded,
    /// Task-level cancellation (watchdog or delete)
    Cancelled,
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoResource => write!(f, "no_resource"),
            Self::Unrecoverable => write!(f, "unrecoverable"),
            Self::MaxRetriesExceeded => write!(f, "max_retries_exceeded"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for TerminationReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "no_resource" => Ok(Self::NoResource),
            "unrecoverable" => Ok(Self::Unrecoverable),
            "max_retries_exceeded" => Ok(Self::MaxRetriesExceeded),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("Invalid termination reason: {s}")),
        }
    }
}
