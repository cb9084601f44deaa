//! # Crate Error Types
//!
//! Top-level error enum shared by the orchestration core. Layer-specific errors
//! (`ConfigurationError`, `StateMachineError`, `StoreError`) convert into
//! `CrawlError` so callers can use `?` across module boundaries.

use thiserror::Error;
use uuid::Uuid;

use crate::config::ConfigurationError;
use crate::state_machine::StateMachineError;

/// Persistence-layer failures. These are the only failures the core lets
/// escape as operational errors; everything else becomes task status.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Record not found: {entity} {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt record in {entity}: {message}")]
    Corrupt {
        entity: &'static str,
        message: String,
    },
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn corrupt(entity: &'static str, message: impl Into<String>) -> Self {
        Self::Corrupt {
            entity,
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("State transition error: {0}")]
    StateTransition(#[from] StateMachineError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Task not found: {0}")]
    TaskNotFound(Uuid),

    #[error("Lease not found: {0}")]
    LeaseNotFound(Uuid),

    #[error("No adapter registered for platform '{0}'")]
    AdapterNotRegistered(String),

    #[error("Upstream provisioning failed: {0}")]
    Provisioning(String),
}

impl CrawlError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// True when the failure came from the persistence layer
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Store(_))
    }
}

pub type Result<T> = std::result::Result<T, CrawlError>;
