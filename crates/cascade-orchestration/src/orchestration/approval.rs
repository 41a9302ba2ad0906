//! # Approval Engine
//!
//! Drives one application through its ordered list of approval nodes. Every
//! node is an organization position; the employee currently holding that
//! position approves or rejects. A position with nobody in it is an empty
//! post: the engine records a synthetic approval by `"system"` and advances,
//! resolving chains of empty posts within the same transaction.
//!
//! Terminal outcomes are returned to the caller instead of being delivered
//! through callbacks; the task workflow applies the completion or rejection
//! effects in the same transaction, so a failure there rolls the decision
//! back with everything else.

use sqlx::PgConnection;
use tracing::{debug, info};

use cascade_shared::models::approval::APPLY_TYPE_PROJECT_TASK;
use cascade_shared::models::{
    Application, ApplyStatus, ApprovalLog, ApprovalLogEntry, ApprovalResult, ApprovalRule, Employee,
};
use cascade_shared::{CascadeError, CascadeResult};

/// Approver id recorded for empty-post auto-approvals
const SYSTEM_APPROVER: &str = "system";

/// Where an application stands after submit or approve
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalOutcome {
    /// At least one node still waits for a decision
    Pending,
    /// Every node approved; the application is closed
    Completed,
}

/// Open an application and its rule for a submission, then advance through
/// any leading empty posts
pub async fn submit_for_approval(
    conn: &mut PgConnection,
    apply_id: &str,
    nodes: &[i64],
    submitter: &str,
) -> CascadeResult<ApprovalOutcome> {
    let Some(first_node) = nodes.first().copied() else {
        return Err(CascadeError::validation(
            "approval node list must not be empty",
        ));
    };

    if Application::find_by_apply_id(&mut *conn, apply_id).await?.is_none() {
        Application::insert(&mut *conn, APPLY_TYPE_PROJECT_TASK, apply_id).await?;
    }

    ApprovalRule::insert(&mut *conn, apply_id, nodes).await?;
    ApprovalLog::insert(
        &mut *conn,
        &ApprovalLogEntry {
            apply_id: apply_id.to_string(),
            approval_node: first_node,
            approver_id: submitter.to_string(),
            result: ApprovalResult::Submit,
            comment: Some("application submitted".to_string()),
            images: Vec::new(),
        },
    )
    .await?;

    if Employee::exists_active_in_position(&mut *conn, first_node).await? {
        info!(apply_id, ?nodes, "application submitted for approval");
        Ok(ApprovalOutcome::Pending)
    } else {
        let outcome = auto_advance_empty_posts(conn, apply_id, nodes, Vec::new(), first_node).await?;
        info!(apply_id, ?nodes, ?outcome, "application submitted, leading empty posts auto-approved");
        Ok(outcome)
    }
}

/// Approve at the current node. The caller must hold the cursor's position.
pub async fn approve(
    conn: &mut PgConnection,
    apply_id: &str,
    approver_job_number: &str,
    comment: Option<&str>,
    images: &[String],
) -> CascadeResult<ApprovalOutcome> {
    let rule = load_rule(conn, apply_id).await?;
    let current = require_cursor(&rule)?;
    require_position_holder(conn, approver_job_number, current).await?;

    ApprovalLog::insert(
        &mut *conn,
        &ApprovalLogEntry {
            apply_id: apply_id.to_string(),
            approval_node: current,
            approver_id: approver_job_number.to_string(),
            result: ApprovalResult::Approve,
            comment: comment.map(str::to_string),
            images: images.to_vec(),
        },
    )
    .await?;

    let nodes = rule.nodes().to_vec();
    let mut approved = rule.approved().to_vec();
    approved.push(current);

    if approved.len() >= nodes.len() {
        ApprovalRule::update_progress(&mut *conn, apply_id, &approved, None).await?;
        Application::update_status(&mut *conn, apply_id, ApplyStatus::Completed).await?;
        info!(apply_id, node = current, "final node approved, application completed");
        return Ok(ApprovalOutcome::Completed);
    }

    let next = nodes[approved.len()];
    ApprovalRule::update_progress(&mut *conn, apply_id, &approved, Some(next)).await?;

    if Employee::exists_active_in_position(&mut *conn, next).await? {
        debug!(apply_id, node = current, next_node = next, "approval advanced");
        Ok(ApprovalOutcome::Pending)
    } else {
        auto_advance_empty_posts(conn, apply_id, &nodes, approved, next).await
    }
}

/// Reject at the current node. A comment is mandatory; the application
/// closes immediately.
pub async fn reject(
    conn: &mut PgConnection,
    apply_id: &str,
    approver_job_number: &str,
    comment: &str,
    images: &[String],
) -> CascadeResult<()> {
    if comment.trim().is_empty() {
        return Err(CascadeError::invalid_state(
            "a comment is required when rejecting",
        ));
    }

    let rule = load_rule(conn, apply_id).await?;
    let current = require_cursor(&rule)?;
    require_position_holder(conn, approver_job_number, current).await?;

    ApprovalLog::insert(
        &mut *conn,
        &ApprovalLogEntry {
            apply_id: apply_id.to_string(),
            approval_node: current,
            approver_id: approver_job_number.to_string(),
            result: ApprovalResult::Reject,
            comment: Some(comment.to_string()),
            images: images.to_vec(),
        },
    )
    .await?;

    let mut approved = rule.approved().to_vec();
    approved.push(current);
    ApprovalRule::update_progress(&mut *conn, apply_id, &approved, None).await?;
    Application::update_status(&mut *conn, apply_id, ApplyStatus::Rejected).await?;

    info!(apply_id, node = current, "application rejected");
    Ok(())
}

/// Auto-approve consecutive empty posts starting at `current`, which the
/// caller already verified is empty and is the rule's cursor
async fn auto_advance_empty_posts(
    conn: &mut PgConnection,
    apply_id: &str,
    nodes: &[i64],
    mut approved: Vec<i64>,
    mut current: i64,
) -> CascadeResult<ApprovalOutcome> {
    loop {
        ApprovalLog::insert(
            &mut *conn,
            &ApprovalLogEntry {
                apply_id: apply_id.to_string(),
                approval_node: current,
                approver_id: SYSTEM_APPROVER.to_string(),
                result: ApprovalResult::Approve,
                comment: Some("empty post auto-approved".to_string()),
                images: Vec::new(),
            },
        )
        .await?;
        approved.push(current);

        if approved.len() >= nodes.len() {
            ApprovalRule::update_progress(&mut *conn, apply_id, &approved, None).await?;
            Application::update_status(&mut *conn, apply_id, ApplyStatus::Completed).await?;
            info!(apply_id, node = current, "empty post auto-approval completed the application");
            return Ok(ApprovalOutcome::Completed);
        }

        let next = nodes[approved.len()];
        ApprovalRule::update_progress(&mut *conn, apply_id, &approved, Some(next)).await?;

        if Employee::exists_active_in_position(&mut *conn, next).await? {
            debug!(apply_id, node = current, next_node = next, "auto-approval stopped at a held position");
            return Ok(ApprovalOutcome::Pending);
        }
        current = next;
    }
}

async fn load_rule(conn: &mut PgConnection, apply_id: &str) -> CascadeResult<ApprovalRule> {
    ApprovalRule::find_by_apply_id(&mut *conn, apply_id)
        .await?
        .ok_or_else(|| {
            CascadeError::not_found(format!("approval rule not found for application {apply_id}"))
        })
}

fn require_cursor(rule: &ApprovalRule) -> CascadeResult<i64> {
    rule.current_approval_node.ok_or_else(|| {
        CascadeError::invalid_state(format!(
            "application {} has no pending approval node",
            rule.apply_id
        ))
    })
}

/// The caller's organization position must equal the cursor
async fn require_position_holder(
    conn: &mut PgConnection,
    job_number: &str,
    node: i64,
) -> CascadeResult<()> {
    let employee = Employee::find_active_by_job_number(&mut *conn, job_number)
        .await?
        .ok_or_else(|| {
            CascadeError::invalid_state(format!("approver '{job_number}' is not an active employee"))
        })?;

    if employee.organization_id != Some(node) {
        return Err(CascadeError::invalid_state(format!(
            "approver '{job_number}' does not hold the current approval position"
        )));
    }
    Ok(())
}
