//! # Data Models
//!
//! Records shared by the orchestration core: tasks, resource leases, classified
//! error records and per-platform branch results.

pub mod branch_result;
pub mod error_record;
pub mod lease;
pub mod task;

pub use branch_result::{BranchResult, BranchStatus};
pub use error_record::{ErrorKind, ErrorRecord};
pub use lease::{AccountStrategy, LeaseAuditEntry, LeaseStatus, ResourceKind, ResourceLease};
pub use task::{ExecutionMode, Task, TaskFilter};
