//! # Error Records
//!
//! The fixed failure taxonomy and the immutable record appended to a branch's
//! error history every time an attempt fails.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Failure taxonomy produced by the error classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    PermissionDenied,
    CaptchaRequired,
    RateLimited,
    NetworkError,
    LoginRequired,
    AccountBlocked,
    Unknown,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 7] = [
        Self::PermissionDenied,
        Self::CaptchaRequired,
        Self::RateLimited,
        Self::NetworkError,
        Self::LoginRequired,
        Self::AccountBlocked,
        Self::Unknown,
    ];

    /// The identity itself is unusable; never retry on the same lease
    pub fn invalidates_identity(&self) -> bool {
        matches!(self, Self::LoginRequired | Self::AccountBlocked)
    }

    /// Prefer substituting the resource before retrying in place
    pub fn prefers_switch(&self) -> bool {
        matches!(self, Self::PermissionDenied | Self::CaptchaRequired)
    }

    /// Failures attributable to the egress path rather than the account
    pub fn is_egress_related(&self) -> bool {
        matches!(
            self,
            Self::CaptchaRequired | Self::RateLimited | Self::NetworkError
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PermissionDenied => write!(f, "permission_denied"),
            Self::CaptchaRequired => write!(f, "captcha_required"),
            Self::RateLimited => write!(f, "rate_limited"),
            Self::NetworkError => write!(f, "network_error"),
            Self::LoginRequired => write!(f, "login_required"),
            Self::AccountBlocked => write!(f, "account_blocked"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

impl std::str::FromStr for ErrorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "permission_denied" => Ok(Self::PermissionDenied),
            "captcha_required" => Ok(Self::CaptchaRequired),
            "rate_limited" => Ok(Self::RateLimited),
            "network_error" => Ok(Self::NetworkError),
            "login_required" => Ok(Self::LoginRequired),
            "account_blocked" => Ok(Self::AccountBlocked),
            "unknown" => Ok(Self::Unknown),
            _ => Err(format!("Invalid error kind: {s}")),
        }
    }
}

/// One classified failure. Created once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub kind: ErrorKind,
    pub message: String,
    pub platform: String,
    pub lease_id: Option<Uuid>,
    /// Same-lease retries already spent on this kind when the error occurred
    pub retry_count: u32,
    pub occurred_at: DateTime<Utc>,
}

impl ErrorRecord {
    pub fn new(
        kind: ErrorKind,
        message: impl Into<String>,
        platform: impl Into<String>,
        lease_id: Option<Uuid>,
        retry_count: u32,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            platform: platform.into(),
            lease_id,
            retry_count,
            occurred_at: Utc::now(),
        }
    }

    /// Human-readable summary stored in the task's per-platform error map
    pub fn summary(&self) -> String {
        format!("{}: {}", self.kind, self.message)
    }
}
