use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::error_record::ErrorRecord;
use crate::state_machine::TerminationReason;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchStatus {
    Ok,
    Error,
}

impl fmt::Display for BranchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Terminal outcome of one platform branch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchResult {
    pub platform: String,
    pub status: BranchStatus,
    pub item_count: u32,
    /// Last classified error, if any attempt failed
    pub error: Option<ErrorRecord>,
    pub reason: Option<TerminationReason>,
    pub attempts: u32,
    pub switches: u32,
    pub settled_at: DateTime<Utc>,
}

impl BranchResult {
    pub fn success(platform: impl Into<String>, item_count: u32, attempts: u32, switches: u32) -> Self {
        Self {
            platform: platform.into(),
            status: BranchStatus::Ok,
            item_count,
            error: None,
            reason: None,
            attempts,
            switches,
            settled_at: Utc::now(),
        }
    }

    pub fn failure(
        platform: impl Into<String>,
        reason: TerminationReason,
        error: Option<ErrorRecord>,
        attempts: u32,
        switches: u32,
    ) -> Self {
        Self {
            platform: platform.into(),
            status: BranchStatus::Error,
            item_count: 0,
            error,
            reason: Some(reason),
            attempts,
            switches,
            settled_at: Utc::now(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == BranchStatus::Ok
    }

    /// Error text surfaced on the task: the last error, else the reason
    pub fn error_message(&self) -> Option<String> {
        if self.is_ok() {
            return None;
        }
        let reason = self
            .reason
            .map(|r| r.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        Some(match &self.error {
            Some(record) => format!("{} ({reason})", record.summary()),
            None => reason,
        })
    }
}
