//! # Database Operations
//!
//! Postgres implementations of the task and lease store contracts.
//!
//! ## Overview
//!
//! - [`connection`] - pool setup, embedded migrations, health check
//! - [`task_store`] - `crawl_tasks` and `crawl_task_branch_results`
//! - [`lease_store`] - `resource_leases` and `lease_audit_log`
//!
//! Queries are checked at runtime, so building the crate does not need a
//! live database.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use mediacrawl_core::config::DatabaseConfig;
//! use mediacrawl_core::database::{DatabaseConnection, PgTaskStore};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = DatabaseConnection::connect("postgresql://localhost/crawler", &DatabaseConfig::default()).await?;
//! db.run_migrations().await?;
//! let tasks = PgTaskStore::new(db.pool().clone());
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod lease_store;
pub mod task_store;

pub use connection::DatabaseConnection;
pub use lease_store::PgLeaseStore;
pub use task_store::PgTaskStore;
