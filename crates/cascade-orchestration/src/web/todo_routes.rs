//! # Task Execution Endpoints
//!
//! Submit, approve, reject and resubmit plus the read-side projections. The
//! write paths each run one transaction; a failure anywhere inside (the
//! approval decision, the completion effects, the cascade) rolls the whole
//! request back.

use axum::extract::{Path, Query, State};
use serde::{Deserialize, Serialize};

use cascade_shared::{CascadeError, CascadeResult};

use crate::orchestration::{generation, queries, workflow};
use crate::web::identity::Identity;
use crate::web::response::{ApiJson, ApiResponse};
use crate::web::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SubmitBody {
    pub submit_text: Option<String>,
    pub submit_images: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct SubmitResult {
    pub apply_id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApproveBody {
    pub approval_comment: Option<String>,
    pub approval_images: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ApproveResult {
    pub is_completed: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectBody {
    pub approval_comment: String,
    #[serde(default)]
    pub approval_images: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResult {
    pub stages_generated: u32,
    pub tasks_generated: u32,
}

/// POST /todo/generate/{project_id}
pub async fn generate(
    State(state): State<AppState>,
    _identity: Identity,
    Path(project_id): Path<i64>,
) -> CascadeResult<ApiResponse<GenerateResult>> {
    let mut tx = state
        .pool
        .begin()
        .await
        .map_err(|e| CascadeError::database("begin_generate", e))?;
    let outcome = generation::generate_for_project(&mut tx, project_id).await?;
    tx.commit()
        .await
        .map_err(|e| CascadeError::database("commit_generate", e))?;

    Ok(ApiResponse::success(GenerateResult {
        stages_generated: outcome.stages_generated,
        tasks_generated: outcome.tasks_generated,
    }))
}

/// POST /todo/submit/{task_id}
pub async fn submit(
    State(state): State<AppState>,
    identity: Identity,
    Path(task_id): Path<i64>,
    ApiJson(body): ApiJson<SubmitBody>,
) -> CascadeResult<ApiResponse<SubmitResult>> {
    let mut tx = state
        .pool
        .begin()
        .await
        .map_err(|e| CascadeError::database("begin_submit", e))?;
    let apply_id = workflow::submit_task(
        &mut tx,
        &state.ids,
        task_id,
        &identity.job_number,
        body.submit_text.as_deref(),
        &body.submit_images,
    )
    .await?;
    tx.commit()
        .await
        .map_err(|e| CascadeError::database("commit_submit", e))?;

    Ok(ApiResponse::success(SubmitResult { apply_id }))
}

/// POST /todo/approve/{apply_id}
pub async fn approve(
    State(state): State<AppState>,
    identity: Identity,
    Path(apply_id): Path<String>,
    ApiJson(body): ApiJson<ApproveBody>,
) -> CascadeResult<ApiResponse<ApproveResult>> {
    let mut tx = state
        .pool
        .begin()
        .await
        .map_err(|e| CascadeError::database("begin_approve", e))?;
    let is_completed = workflow::approve_application(
        &mut tx,
        &apply_id,
        &identity.job_number,
        body.approval_comment.as_deref(),
        &body.approval_images,
    )
    .await?;
    tx.commit()
        .await
        .map_err(|e| CascadeError::database("commit_approve", e))?;

    Ok(ApiResponse::success(ApproveResult { is_completed }))
}

/// POST /todo/reject/{apply_id}
pub async fn reject(
    State(state): State<AppState>,
    identity: Identity,
    Path(apply_id): Path<String>,
    ApiJson(body): ApiJson<RejectBody>,
) -> CascadeResult<ApiResponse<()>> {
    let mut tx = state
        .pool
        .begin()
        .await
        .map_err(|e| CascadeError::database("begin_reject", e))?;
    workflow::reject_application(
        &mut tx,
        &apply_id,
        &identity.job_number,
        &body.approval_comment,
        &body.approval_images,
    )
    .await?;
    tx.commit()
        .await
        .map_err(|e| CascadeError::database("commit_reject", e))?;

    Ok(ApiResponse::success_empty())
}

/// POST /todo/resubmit/{task_id}
pub async fn resubmit(
    State(state): State<AppState>,
    identity: Identity,
    Path(task_id): Path<i64>,
) -> CascadeResult<ApiResponse<()>> {
    let mut tx = state
        .pool
        .begin()
        .await
        .map_err(|e| CascadeError::database("begin_resubmit", e))?;
    workflow::resubmit_task(&mut tx, task_id, &identity.job_number).await?;
    tx.commit()
        .await
        .map_err(|e| CascadeError::database("commit_resubmit", e))?;

    Ok(ApiResponse::success_empty())
}

/// GET /todo/my/tasks/list
pub async fn my_tasks_list(
    State(state): State<AppState>,
    identity: Identity,
    Query(filter): Query<queries::TaskListFilter>,
) -> CascadeResult<ApiResponse<queries::TaskListPage>> {
    let page = queries::my_tasks_list(&state.pool, &identity.job_number, &filter).await?;
    Ok(ApiResponse::success(page))
}

/// GET /todo/my/tasks/categories
pub async fn my_task_categories(
    State(state): State<AppState>,
    identity: Identity,
) -> CascadeResult<ApiResponse<queries::TaskCategories>> {
    let categories = queries::my_task_categories(&state.pool, &identity.job_number).await?;
    Ok(ApiResponse::success(categories))
}

/// GET /todo/history/tasks/list
pub async fn history_tasks_list(
    State(state): State<AppState>,
    identity: Identity,
    Query(filter): Query<queries::TaskListFilter>,
) -> CascadeResult<ApiResponse<queries::TaskListPage>> {
    let page = queries::history_tasks_list(&state.pool, &identity.job_number, &filter).await?;
    Ok(ApiResponse::success(page))
}

/// GET /todo/history/tasks/categories
pub async fn history_task_categories(
    State(state): State<AppState>,
    identity: Identity,
) -> CascadeResult<ApiResponse<queries::TaskCategories>> {
    let categories = queries::history_task_categories(&state.pool, &identity.job_number).await?;
    Ok(ApiResponse::success(categories))
}

/// GET /todo/workbench/stats
pub async fn workbench_stats(
    State(state): State<AppState>,
    identity: Identity,
) -> CascadeResult<ApiResponse<queries::WorkbenchStats>> {
    let stats = queries::workbench_stats(&state.pool, &identity.job_number).await?;
    Ok(ApiResponse::success(stats))
}

/// GET /todo/task/{id}/detail
pub async fn task_detail(
    State(state): State<AppState>,
    _identity: Identity,
    Path(task_id): Path<i64>,
) -> CascadeResult<ApiResponse<queries::TaskDetailView>> {
    let detail = queries::task_detail(&state.pool, task_id).await?;
    Ok(ApiResponse::success(detail))
}
