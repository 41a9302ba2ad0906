//! # Task Workflow
//!
//! Ties the approval engine to task lifecycle transitions. Submit opens an
//! application (or closes the task directly when no approval is required),
//! a completed approval drives the task to completed and cascades, a
//! rejection parks the task for resubmission. Each entry point runs inside
//! the caller's transaction; any failure rolls the whole step back,
//! including the approval decision that triggered it.

use sqlx::PgConnection;
use tracing::info;

use cascade_shared::ids::ApplyIdGenerator;
use cascade_shared::models::{
    ApprovalType, Task, TaskExecution, TaskStatus, TaskSubmission,
};
use cascade_shared::{CascadeError, CascadeResult};

use crate::orchestration::approval::{self, ApprovalOutcome};
use crate::orchestration::generation;

/// Submit a task for approval. Returns the apply id of the submission.
pub async fn submit_task(
    conn: &mut PgConnection,
    ids: &ApplyIdGenerator,
    task_id: i64,
    submitter: &str,
    submit_text: Option<&str>,
    submit_images: &[String],
) -> CascadeResult<String> {
    let execution = TaskExecution::find_by_task_id(&mut *conn, task_id)
        .await?
        .ok_or_else(|| CascadeError::not_found(format!("task {task_id} has not been generated")))?;

    if execution.task_status != TaskStatus::InProgress {
        return Err(CascadeError::invalid_state(format!(
            "task '{}' cannot be submitted in status {}",
            execution.name,
            execution.task_status.as_i16()
        )));
    }

    let plan_task = Task::find_live(&mut *conn, task_id)
        .await?
        .ok_or_else(|| CascadeError::not_found(format!("task {task_id} has no live plan row")))?;

    let apply_id = ids.generate()?;
    TaskSubmission::insert(&mut *conn, &apply_id, execution.id, submit_text, submit_images).await?;

    let approval_type = ApprovalType::from_db(plan_task.approval_type.as_deref());
    if approval_type == Some(ApprovalType::None) {
        // No approval required: the submission closes the task directly and
        // no application is opened
        TaskExecution::update_status(&mut *conn, task_id, TaskStatus::Submitted).await?;
        complete_task(conn, task_id).await?;
        info!(task_id, apply_id, "task submitted without approval, completed directly");
        return Ok(apply_id);
    }

    let nodes = &plan_task.approval_nodes.0;
    if nodes.is_empty() {
        return Err(CascadeError::invalid_state(format!(
            "task '{}' has no approval nodes configured and cannot be submitted",
            plan_task.name
        )));
    }

    let outcome = approval::submit_for_approval(conn, &apply_id, nodes, submitter).await?;
    TaskExecution::update_status(&mut *conn, task_id, TaskStatus::Submitted).await?;

    if outcome == ApprovalOutcome::Completed {
        complete_task(conn, task_id).await?;
    }

    info!(task_id, apply_id, submitter, "task submitted");
    Ok(apply_id)
}

/// Approve the current node of an application. Returns whether the
/// application is now fully approved.
pub async fn approve_application(
    conn: &mut PgConnection,
    apply_id: &str,
    approver: &str,
    comment: Option<&str>,
    images: &[String],
) -> CascadeResult<bool> {
    let outcome = approval::approve(conn, apply_id, approver, comment, images).await?;
    if outcome != ApprovalOutcome::Completed {
        return Ok(false);
    }

    let task_id = execution_task_id_for_apply(conn, apply_id).await?;
    complete_task(conn, task_id).await?;
    Ok(true)
}

/// Reject the current node of an application and park the task as rejected
pub async fn reject_application(
    conn: &mut PgConnection,
    apply_id: &str,
    approver: &str,
    comment: &str,
    images: &[String],
) -> CascadeResult<()> {
    approval::reject(conn, apply_id, approver, comment, images).await?;

    let task_id = execution_task_id_for_apply(conn, apply_id).await?;
    TaskExecution::update_status(&mut *conn, task_id, TaskStatus::Rejected).await?;
    info!(task_id, apply_id, "task rejected");
    Ok(())
}

/// Reset a rejected task so its owner can submit again. The prior
/// application and its logs stay untouched for history; the next submit
/// opens a fresh one.
pub async fn resubmit_task(
    conn: &mut PgConnection,
    task_id: i64,
    caller: &str,
) -> CascadeResult<()> {
    let execution = TaskExecution::find_by_task_id(&mut *conn, task_id)
        .await?
        .ok_or_else(|| CascadeError::not_found(format!("task {task_id} has not been generated")))?;

    if execution.task_status != TaskStatus::Rejected {
        return Err(CascadeError::invalid_state(format!(
            "task '{}' is in status {} and only rejected tasks can be resubmitted",
            execution.name,
            execution.task_status.as_i16()
        )));
    }

    if execution.job_number.as_deref() != Some(caller) {
        return Err(CascadeError::invalid_state(format!(
            "only the owner of task '{}' can resubmit it",
            execution.name
        )));
    }

    TaskExecution::update_status(&mut *conn, task_id, TaskStatus::InProgress).await?;
    info!(task_id, caller, "rejected task reset for resubmission");
    Ok(())
}

/// Drive a task to completed and run the materialization cascade. Runs in
/// the same transaction as the decision that completed it; an error here
/// fails that decision too.
async fn complete_task(conn: &mut PgConnection, task_id: i64) -> CascadeResult<()> {
    TaskExecution::mark_completed(&mut *conn, task_id).await?;
    info!(task_id, "task completed");
    generation::handle_task_completed(conn, task_id).await
}

/// Resolve an apply id back to the plan task id it belongs to
async fn execution_task_id_for_apply(
    conn: &mut PgConnection,
    apply_id: &str,
) -> CascadeResult<i64> {
    let submission = TaskSubmission::find_by_apply_id(&mut *conn, apply_id)
        .await?
        .ok_or_else(|| {
            CascadeError::not_found(format!("no task submission recorded for application {apply_id}"))
        })?;

    let execution = TaskExecution::find_by_id(&mut *conn, submission.task_execution_id)
        .await?
        .ok_or_else(|| {
            CascadeError::not_found(format!(
                "task execution {} for application {apply_id} does not exist",
                submission.task_execution_id
            ))
        })?;

    Ok(execution.task_id)
}
