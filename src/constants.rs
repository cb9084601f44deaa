//! # System Constants
//!
//! Operational boundaries of the crawl orchestration core: platform codes,
//! pool thresholds, lifecycle event names and default timings.

/// Platform codes understood by the coordinator out of the box
pub mod platforms {
    pub const XIAOHONGSHU: &str = "xhs";
    pub const DOUYIN: &str = "dy";
    pub const KUAISHOU: &str = "ks";
    pub const BILIBILI: &str = "bili";

    pub const DEFAULT_SUPPORTED: [&str; 4] = [XIAOHONGSHU, DOUYIN, KUAISHOU, BILIBILI];
}

/// Lifecycle event names used as the `operation` field in structured logs
pub mod events {
    pub const TASK_SUBMITTED: &str = "task.submitted";
    pub const TASK_STARTED: &str = "task.started";
    pub const TASK_FINALIZED: &str = "task.finalized";
    pub const TASK_TIMED_OUT: &str = "task.timed_out";
    pub const TASK_DELETED: &str = "task.deleted";

    pub const BRANCH_STARTED: &str = "branch.started";
    pub const BRANCH_SUCCEEDED: &str = "branch.succeeded";
    pub const BRANCH_TERMINATED: &str = "branch.terminated";

    pub const LEASE_ACQUIRED: &str = "lease.acquired";
    pub const LEASE_PROVISIONED: &str = "lease.provisioned";
    pub const LEASE_RELEASED: &str = "lease.released";
    pub const LEASE_EXHAUSTED: &str = "lease.exhausted";
    pub const LEASE_DISABLED: &str = "lease.disabled";
    pub const LEASE_ENABLED: &str = "lease.enabled";
    pub const LEASE_EXPIRED: &str = "lease.expired";
}

/// Consecutive failures after which a lease is marked exhausted
pub const DEFAULT_FAIL_THRESHOLD: u32 = 3;

pub const MAX_PROGRESS: u8 = 100;

pub mod defaults {
    pub const MAX_RETRIES: u32 = 3;
    pub const BASE_DELAY_MS: u64 = 2_000;
    pub const MAX_DELAY_MS: u64 = 30_000;
    pub const EXPONENTIAL_BASE: f64 = 2.0;
    pub const MAX_RESOURCE_SWITCHES: u32 = 3;

    pub const JITTER_MIN: f64 = 0.5;
    pub const JITTER_MAX: f64 = 1.5;

    pub const WATCHDOG_TIMEOUT_SECONDS: u64 = 2_700;
    pub const INTER_BRANCH_DELAY_MS: u64 = 2_000;
    pub const MAX_PARALLEL_BRANCHES: usize = 8;

    pub const LEASE_TTL_SECONDS: i64 = 86_400;
    pub const LEASE_EXPIRY_SWEEP_SECONDS: u64 = 300;

    pub const STATUS_CACHE_TTL_SECONDS: u64 = 30;

    pub const RETENTION_MAX_AGE_HOURS: u64 = 24;
    pub const RETENTION_SWEEP_INTERVAL_SECONDS: u64 = 3_600;

    pub const MAX_COUNT_PER_PLATFORM: u32 = 50;
    pub const LIST_LIMIT: u32 = 50;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_platforms_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for platform in platforms::DEFAULT_SUPPORTED {
            assert!(seen.insert(platform), "duplicate platform {platform}");
        }
    }

    #[test]
    fn test_jitter_range_is_centered_on_one() {
        let mid = (defaults::JITTER_MIN + defaults::JITTER_MAX) / 2.0;
        assert!((mid - 1.0).abs() < f64::EPSILON);
    }
}
