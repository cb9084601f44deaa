//! # Orchestration Engine
//!
//! Task orchestration and resilience core for multi-platform crawling.
//!
//! ## Architecture
//!
//! - **Rust owns the control loop**: resource allocation, retry decisions and
//!   aggregation all happen here
//! - **Adapters own the platform**: each `PlatformAdapter` executes one crawl
//!   with the leases it is handed and reports a tagged error on failure
//! - **Stores own durability**: task and lease state go through narrow store
//!   traits so in-memory and Postgres deployments share one contract
//!
//! ## Core Components
//!
//! - **MultiPlatformCoordinator**: fans a request out into per-platform
//!   branches, runs them in parallel or sequentially, enforces the watchdog
//! - **RetryOrchestrator**: per-branch allocate / execute / evaluate loop with
//!   retry-in-place and resource switching
//! - **ErrorClassifier**: maps `AdapterError` onto the fixed `ErrorKind`
//!   taxonomy
//! - **BackoffCalculator**: capped exponential delay with optional jitter
//! - **AdapterRegistry**: platform code to adapter lookup

pub mod adapter;
pub mod backoff_calculator;
pub mod coordinator;
pub mod error_classifier;
pub mod retry_orchestrator;

pub use adapter::{
    AdapterRegistry, CrawlOperation, CrawlResult, ExecutionContext, OperationFactory,
    PlatformAdapter, StaticOperation,
};
pub use backoff_calculator::BackoffCalculator;
pub use coordinator::{aggregate, MultiPlatformCoordinator, TaskRequest};
pub use error_classifier::{
    classify, AdapterError, ErrorClassification, ErrorClassifier, KeywordErrorClassifier,
    KeywordRule, MatchSource,
};
pub use retry_orchestrator::{
    AttemptRecord, BranchOutcome, BranchSpec, RetryDecision, RetryOrchestrator,
};
