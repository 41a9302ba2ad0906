//! # Health Probe
//!
//! Liveness plus a lightweight database reachability check, kept off the
//! request hot path by a short timeout.

use std::time::Duration;

use axum::extract::State;
use serde::Serialize;
use sqlx::PgPool;
use tracing::error;

use crate::web::response::ApiResponse;
use crate::web::AppState;

const DB_CHECK_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub database: bool,
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> ApiResponse<HealthStatus> {
    let database = check_database(&state.pool).await;
    ApiResponse::success(HealthStatus {
        status: if database { "ok" } else { "degraded" },
        database,
    })
}

async fn check_database(pool: &PgPool) -> bool {
    match tokio::time::timeout(DB_CHECK_TIMEOUT, sqlx::query("SELECT 1").execute(pool)).await {
        Ok(Ok(_)) => true,
        Ok(Err(e)) => {
            error!(error = %e, "database health check failed");
            false
        }
        Err(_) => {
            error!(timeout_ms = DB_CHECK_TIMEOUT.as_millis() as u64, "database health check timed out");
            false
        }
    }
}
