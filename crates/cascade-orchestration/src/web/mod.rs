//! # Web API
//!
//! Axum router and shared application state. Handlers parse the request,
//! open a transaction where a write path needs one, call into the
//! orchestration engines and wrap results in the `{code, msg, data}`
//! envelope. Authentication is an external collaborator: the gateway
//! forwards the caller's job number in the `x-job-number` header.

pub mod health;
pub mod identity;
pub mod response;
pub mod task_routes;
pub mod todo_routes;

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use sqlx::PgPool;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use cascade_shared::config::CascadeConfig;
use cascade_shared::ids::ApplyIdGenerator;

/// Shared state for all handlers
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub ids: Arc<ApplyIdGenerator>,
    pub config: Arc<CascadeConfig>,
}

/// Assemble the full application router
pub fn build_router(state: AppState) -> Router {
    let request_timeout = Duration::from_secs(state.config.server.request_timeout_seconds);

    Router::new()
        .route("/health", get(health::health))
        .route("/task/save", post(task_routes::save))
        .route("/task/save-and-generate", post(task_routes::save_and_generate))
        .route("/task/project/list", get(task_routes::project_list))
        .route("/task/project/{id}", get(task_routes::project_detail))
        .route("/todo/generate/{project_id}", post(todo_routes::generate))
        .route("/todo/submit/{task_id}", post(todo_routes::submit))
        .route("/todo/approve/{apply_id}", post(todo_routes::approve))
        .route("/todo/reject/{apply_id}", post(todo_routes::reject))
        .route("/todo/resubmit/{task_id}", post(todo_routes::resubmit))
        .route("/todo/my/tasks/list", get(todo_routes::my_tasks_list))
        .route("/todo/my/tasks/categories", get(todo_routes::my_task_categories))
        .route("/todo/history/tasks/list", get(todo_routes::history_tasks_list))
        .route(
            "/todo/history/tasks/categories",
            get(todo_routes::history_task_categories),
        )
        .route("/todo/workbench/stats", get(todo_routes::workbench_stats))
        .route("/todo/task/{id}/detail", get(todo_routes::task_detail))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(TimeoutLayer::new(request_timeout)),
        )
        .with_state(state)
}
