//! # Task Registry
//!
//! Durable task state for the coordinator.
//!
//! ## Architecture
//!
//! ```text
//! Registry
//! ├── TaskRegistry   (validated deltas, per-task write lock)
//! ├── StatusCache    (TTL snapshots for status polling)
//! └── TaskStore      (persistence contract: in-memory or Postgres)
//! ```

pub mod cache;
pub mod store;
pub mod task_registry;

pub use cache::StatusCache;
pub use store::{InMemoryTaskStore, StatusUpdate, TaskStore};
pub use task_registry::TaskRegistry;
