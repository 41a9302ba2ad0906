//! # Plan Configuration Endpoints
//!
//! Saving a project graph runs validation, then reconciliation inside one
//! transaction, optionally followed by the generation sweep. Both save
//! variants answer with the full reconciled project view so the client
//! learns the freshly assigned real ids.

use axum::extract::{Path, State};
use tracing::warn;

use cascade_shared::models::TaskConfigPayload;
use cascade_shared::{CascadeError, CascadeResult};

use crate::orchestration::{persistence, queries, validator};
use crate::web::identity::Identity;
use crate::web::response::{ApiJson, ApiResponse};
use crate::web::AppState;

/// POST /task/save
pub async fn save(
    State(state): State<AppState>,
    identity: Identity,
    ApiJson(payload): ApiJson<TaskConfigPayload>,
) -> CascadeResult<ApiResponse<queries::ProjectDetail>> {
    save_inner(&state, &identity, payload, false).await
}

/// POST /task/save-and-generate
pub async fn save_and_generate(
    State(state): State<AppState>,
    identity: Identity,
    ApiJson(payload): ApiJson<TaskConfigPayload>,
) -> CascadeResult<ApiResponse<queries::ProjectDetail>> {
    save_inner(&state, &identity, payload, true).await
}

async fn save_inner(
    state: &AppState,
    identity: &Identity,
    payload: TaskConfigPayload,
    generate: bool,
) -> CascadeResult<ApiResponse<queries::ProjectDetail>> {
    let warnings = validator::validate_payload(&payload)?;
    for warning in &warnings {
        warn!(project_id = payload.project_id, "{warning}");
    }

    let mut tx = state
        .pool
        .begin()
        .await
        .map_err(|e| CascadeError::database("begin_save", e))?;
    persistence::persist_task_config(&mut tx, &payload, &identity.job_number, generate).await?;
    tx.commit()
        .await
        .map_err(|e| CascadeError::database("commit_save", e))?;

    let detail = queries::project_detail(&state.pool, payload.project_id).await?;
    Ok(ApiResponse::success(detail))
}

/// GET /task/project/list
pub async fn project_list(
    State(state): State<AppState>,
) -> CascadeResult<ApiResponse<Vec<queries::ProjectSummary>>> {
    let summaries = queries::project_summaries(&state.pool).await?;
    Ok(ApiResponse::success(summaries))
}

/// GET /task/project/{id}
pub async fn project_detail(
    State(state): State<AppState>,
    Path(project_id): Path<i64>,
) -> CascadeResult<ApiResponse<queries::ProjectDetail>> {
    let detail = queries::project_detail(&state.pool, project_id).await?;
    Ok(ApiResponse::success(detail))
}
