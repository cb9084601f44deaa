//! # Web API Error Types
//!
//! Errors returned by HTTP handlers and their status code mappings. Core
//! `CrawlError`s convert with `?`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::error::CrawlError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Resource not found: {message}")]
    NotFound { message: String },

    #[error("Invalid request: {message}")]
    BadRequest { message: String },

    #[error("Conflict: {message}")]
    Conflict { message: String },

    #[error("Service temporarily unavailable")]
    ServiceUnavailable,

    #[error("Database operation failed: {operation}")]
    DatabaseError { operation: String },

    #[error("Internal server error")]
    Internal,
}

impl ApiError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    pub fn database_error(operation: impl Into<String>) -> Self {
        Self::DatabaseError {
            operation: operation.into(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::DatabaseError { .. } | Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NOT_FOUND",
            Self::BadRequest { .. } => "BAD_REQUEST",
            Self::Conflict { .. } => "CONFLICT",
            Self::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            Self::DatabaseError { .. } => "DATABASE_ERROR",
            Self::Internal => "INTERNAL_ERROR",
        }
    }
}

impl From<CrawlError> for ApiError {
    fn from(err: CrawlError) -> Self {
        match err {
            CrawlError::TaskNotFound(id) => Self::not_found(format!("task {id}")),
            CrawlError::LeaseNotFound(id) => Self::not_found(format!("lease {id}")),
            CrawlError::Validation(message) => Self::bad_request(message),
            CrawlError::AdapterNotRegistered(platform) => {
                Self::bad_request(format!("no adapter registered for platform '{platform}'"))
            }
            CrawlError::StateTransition(e) => Self::conflict(e.to_string()),
            CrawlError::Store(e) => {
                error!(error = %e, "❌ WEB: Store operation failed");
                Self::database_error(e.to_string())
            }
            CrawlError::Configuration(_) | CrawlError::Provisioning(_) => {
                error!(error = %err, "❌ WEB: Internal failure");
                Self::Internal
            }
        }
    }
}

impl From<crate::error::StoreError> for ApiError {
    fn from(err: crate::error::StoreError) -> Self {
        CrawlError::from(err).into()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": {
                "code": self.error_code(),
                "message": self.to_string(),
            }
        });
        (self.status_code(), Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_crawl_error_status_mapping() {
        let cases = [
            (CrawlError::TaskNotFound(Uuid::new_v4()), StatusCode::NOT_FOUND),
            (CrawlError::LeaseNotFound(Uuid::new_v4()), StatusCode::NOT_FOUND),
            (CrawlError::validation("empty"), StatusCode::BAD_REQUEST),
            (
                CrawlError::AdapterNotRegistered("xhs".into()),
                StatusCode::BAD_REQUEST,
            ),
            (
                CrawlError::Provisioning("down".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).status_code(), expected);
        }
    }

    #[test]
    fn test_store_error_is_database_error() {
        let api = ApiError::from(crate::error::StoreError::corrupt("task", "bad"));
        assert!(matches!(api, ApiError::DatabaseError { .. }));
    }
}
