//! # Web API Module
//!
//! Axum REST surface over the coordinator and the resource pools.
//!
//! ## Routes
//!
//! ```text
//! GET    /health
//! GET    /v1/info
//! POST   /v1/tasks                  submit, 202 + task id
//! GET    /v1/tasks                  list (status, platform, limit, offset)
//! GET    /v1/tasks/:task_id         status snapshot
//! DELETE /v1/tasks/:task_id         cancel and remove
//! POST   /v1/leases                 seed an account or proxy
//! POST   /v1/leases/:lease_id/enable
//! POST   /v1/leases/:lease_id/disable
//! GET    /v1/leases/:lease_id/audit
//! GET    /v1/pools/stats
//! ```

pub mod errors;
pub mod handlers;
pub mod state;

use axum::routing::{get, post};
use axum::Router;

pub use errors::{ApiError, ApiResult};
pub use state::AppState;

pub fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .route("/info", get(handlers::health::info))
        .route(
            "/tasks",
            post(handlers::tasks::create_task).get(handlers::tasks::list_tasks),
        )
        .route(
            "/tasks/:task_id",
            get(handlers::tasks::get_task).delete(handlers::tasks::delete_task),
        )
        .route("/leases", post(handlers::leases::register_lease))
        .route(
            "/leases/:lease_id/enable",
            post(handlers::leases::enable_lease),
        )
        .route(
            "/leases/:lease_id/disable",
            post(handlers::leases::disable_lease),
        )
        .route("/leases/:lease_id/audit", get(handlers::leases::lease_audit))
        .route("/pools/stats", get(handlers::leases::pool_stats))
}

/// Build the application router with tracing middleware
pub fn create_app(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health))
        .nest("/v1", api_v1_routes())
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(app_state)
}
