use serde::{Deserialize, Serialize};

use super::states::TerminationReason;

/// Events that can trigger task status transitions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum TaskEvent {
    /// Coordinator begins dispatching branches
    Start,
    /// All branches succeeded
    Complete,
    /// Mixed outcome across branches
    CompleteWithErrors,
    /// Every branch failed, with the terminating reason
    Fail(String),
    /// Watchdog fired
    Timeout,
}

impl TaskEvent {
    /// Get a string representation of the event type for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Complete => "complete",
            Self::CompleteWithErrors => "complete_with_errors",
            Self::Fail(_) => "fail",
            Self::Timeout => "timeout",
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Fail(msg) => Some(msg),
            _ => None,
        }
    }
}

/// Events driving one branch's retry loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum BranchEvent {
    LeaseAcquired,
    NoResource,
    AttemptSucceeded,
    AttemptFailed,
    Retry,
    Switch,
    BackoffElapsed,
    GiveUp(TerminationReason),
    Cancelled,
}

impl BranchEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::LeaseAcquired => "lease_acquired",
            Self::NoResource => "no_resource",
            Self::AttemptSucceeded => "attempt_succeeded",
            Self::AttemptFailed => "attempt_failed",
            Self::Retry => "retry",
            Self::Switch => "switch",
            Self::BackoffElapsed => "backoff_elapsed",
            Self::GiveUp(_) => "give_up",
            Self::Cancelled => "cancelled",
        }
    }
}
