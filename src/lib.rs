#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # MediaCrawl Core
//!
//! Orchestration and resilience core for crawling several social media
//! platforms from a single request.
//!
//! ## Overview
//!
//! A task names one or more platforms. The coordinator fans the task out into
//! one branch per platform; each branch borrows an account (and optionally a
//! proxy) from the resource pool, runs the platform adapter, and on failure
//! classifies the error to decide whether to retry with backoff, switch to a
//! different lease, or give up. Branch outcomes are folded into one task
//! status that can be polled while the task runs.
//!
//! ## Architecture
//!
//! ```text
//!             ┌──────────────────────────┐
//!  request ──▶│ MultiPlatformCoordinator │──▶ TaskRegistry (status, progress)
//!             └────────────┬─────────────┘
//!                          │ one branch per platform
//!                          ▼
//!             ┌──────────────────────────┐     ┌─────────────────┐
//!             │    RetryOrchestrator     │────▶│ ErrorClassifier │
//!             └────────────┬─────────────┘     └─────────────────┘
//!                          │ acquire / report / release
//!                          ▼
//!             ┌──────────────────────────┐
//!             │   ResourcePoolManager    │──▶ LeaseStore
//!             └──────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`resources`] - account and proxy leases, selection strategies, provisioning
//! - [`orchestration`] - error classifier, backoff, retry orchestrator, coordinator
//! - [`registry`] - task records, status cache, retention
//! - [`state_machine`] - task and branch lifecycles
//! - [`models`] - tasks, leases, error records, branch results
//! - [`database`] - Postgres store implementations
//! - [`adapters`] - HTTP sidecar adapter
//! - [`web`] - axum REST surface
//! - [`config`] - YAML configuration with environment overrides
//! - [`bootstrap`] - wiring for the server binary and embedders
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use mediacrawl_core::bootstrap::CrawlBootstrap;
//! use mediacrawl_core::config::CrawlerConfig;
//! use mediacrawl_core::models::ResourceLease;
//! use mediacrawl_core::orchestration::{AdapterRegistry, CrawlOperation, StaticOperation, TaskRequest};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let adapters = Arc::new(AdapterRegistry::new());
//! // adapters.register(Arc::new(MyXhsAdapter::new()));
//! let system = CrawlBootstrap::in_memory(CrawlerConfig::default(), adapters)?;
//! system.pool.register(ResourceLease::account("xhs", "account-1")).await?;
//!
//! let operation = CrawlOperation { keywords: "coffee".into(), ..CrawlOperation::default() };
//! let task_id = system
//!     .coordinator
//!     .submit(TaskRequest::new(["xhs"]), Arc::new(StaticOperation(operation)))
//!     .await?;
//! let task = system.coordinator.get_status(task_id).await?;
//! println!("{} {}%", task.status, task.progress);
//! # Ok(())
//! # }
//! ```

pub mod adapters;
pub mod bootstrap;
pub mod config;
pub mod constants;
pub mod database;
pub mod error;
pub mod logging;
pub mod models;
pub mod orchestration;
pub mod registry;
pub mod resources;
pub mod state_machine;
pub mod web;

pub use config::{ConfigManager, CrawlerConfig, RetryPolicy};
pub use error::{CrawlError, Result, StoreError};
pub use models::{
    AccountStrategy, BranchResult, BranchStatus, ErrorKind, ErrorRecord, ExecutionMode,
    LeaseStatus, ResourceKind, ResourceLease, Task, TaskFilter,
};
pub use orchestration::{
    AdapterError, AdapterRegistry, CrawlOperation, CrawlResult, ExecutionContext,
    MultiPlatformCoordinator, PlatformAdapter, RetryOrchestrator, TaskRequest,
};
pub use registry::TaskRegistry;
pub use resources::ResourcePoolManager;
pub use state_machine::{TaskEvent, TaskState, TerminationReason};
