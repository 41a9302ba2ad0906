//! # Approval Tables
//!
//! One application per submission attempt. The application owns its approval
//! rule (the ordered node list plus the cursor) and its append-only log.
//! `todo_task_apply` links an application back to the task execution whose
//! submission opened it, together with the submitter's payload.

use chrono::{DateTime, Utc};
use sqlx::types::Json;

use crate::errors::{CascadeError, CascadeResult};
use crate::models::types::{ApplyStatus, ApprovalResult};

/// An application row (`apply_primary`)
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Application {
    pub id: i64,
    pub apply_type: i16,
    pub apply_id: String,
    pub apply_status: ApplyStatus,
    pub create_time: Option<DateTime<Utc>>,
    pub update_time: Option<DateTime<Utc>>,
}

/// Application type for project task submissions
pub const APPLY_TYPE_PROJECT_TASK: i16 = 1;

impl Application {
    pub async fn insert<'e, E>(executor: E, apply_type: i16, apply_id: &str) -> CascadeResult<()>
    where
        E: sqlx::PgExecutor<'e>,
    {
        sqlx::query(
            r#"
            INSERT INTO apply_primary (apply_type, apply_id, apply_status, create_time, update_time)
            VALUES ($1, $2, $3, NOW(), NOW())
            "#,
        )
        .bind(apply_type)
        .bind(apply_id)
        .bind(ApplyStatus::InApproval)
        .execute(executor)
        .await
        .map_err(|e| CascadeError::database("application.insert", e))?;
        Ok(())
    }

    pub async fn find_by_apply_id<'e, E>(
        executor: E,
        apply_id: &str,
    ) -> CascadeResult<Option<Application>>
    where
        E: sqlx::PgExecutor<'e>,
    {
        sqlx::query_as::<_, Application>("SELECT * FROM apply_primary WHERE apply_id = $1")
            .bind(apply_id)
            .fetch_optional(executor)
            .await
            .map_err(|e| CascadeError::database("application.find_by_apply_id", e))
    }

    pub async fn update_status<'e, E>(
        executor: E,
        apply_id: &str,
        status: ApplyStatus,
    ) -> CascadeResult<()>
    where
        E: sqlx::PgExecutor<'e>,
    {
        sqlx::query(
            "UPDATE apply_primary SET apply_status = $2, update_time = NOW() WHERE apply_id = $1",
        )
        .bind(apply_id)
        .bind(status)
        .execute(executor)
        .await
        .map_err(|e| CascadeError::database("application.update_status", e))?;
        Ok(())
    }
}

/// An approval rule row (`apply_rules`)
///
/// `approved_nodes` is a prefix of `approval_nodes` by construction;
/// `current_approval_node` is the next unapproved node or NULL once the
/// application reached a terminal state.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ApprovalRule {
    pub id: i64,
    pub apply_id: String,
    pub approval_nodes: Json<Vec<i64>>,
    pub approved_nodes: Json<Vec<i64>>,
    pub current_approval_node: Option<i64>,
    pub create_time: Option<DateTime<Utc>>,
    pub update_time: Option<DateTime<Utc>>,
}

impl ApprovalRule {
    pub fn nodes(&self) -> &[i64] {
        &self.approval_nodes.0
    }

    pub fn approved(&self) -> &[i64] {
        &self.approved_nodes.0
    }

    pub async fn insert<'e, E>(executor: E, apply_id: &str, nodes: &[i64]) -> CascadeResult<()>
    where
        E: sqlx::PgExecutor<'e>,
    {
        sqlx::query(
            r#"
            INSERT INTO apply_rules
                (apply_id, approval_nodes, approved_nodes, current_approval_node,
                 create_time, update_time)
            VALUES ($1, $2, '[]'::jsonb, $3, NOW(), NOW())
            "#,
        )
        .bind(apply_id)
        .bind(Json(nodes))
        .bind(nodes.first().copied())
        .execute(executor)
        .await
        .map_err(|e| CascadeError::database("approval_rule.insert", e))?;
        Ok(())
    }

    pub async fn find_by_apply_id<'e, E>(
        executor: E,
        apply_id: &str,
    ) -> CascadeResult<Option<ApprovalRule>>
    where
        E: sqlx::PgExecutor<'e>,
    {
        sqlx::query_as::<_, ApprovalRule>("SELECT * FROM apply_rules WHERE apply_id = $1")
            .bind(apply_id)
            .fetch_optional(executor)
            .await
            .map_err(|e| CascadeError::database("approval_rule.find_by_apply_id", e))
    }

    /// Advance (or terminate) the cursor after an approval decision
    pub async fn update_progress<'e, E>(
        executor: E,
        apply_id: &str,
        approved_nodes: &[i64],
        current_node: Option<i64>,
    ) -> CascadeResult<()>
    where
        E: sqlx::PgExecutor<'e>,
    {
        sqlx::query(
            r#"
            UPDATE apply_rules
            SET approved_nodes = $2, current_approval_node = $3, update_time = NOW()
            WHERE apply_id = $1
            "#,
        )
        .bind(apply_id)
        .bind(Json(approved_nodes))
        .bind(current_node)
        .execute(executor)
        .await
        .map_err(|e| CascadeError::database("approval_rule.update_progress", e))?;
        Ok(())
    }
}

/// An approval log row (`apply_log`), append-only
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ApprovalLog {
    pub id: i64,
    pub apply_id: String,
    pub approval_node: i64,
    pub approver_id: String,
    pub approval_result: ApprovalResult,
    pub approval_comment: Option<String>,
    pub approval_images: Option<Json<Vec<String>>>,
    pub approval_start_time: Option<DateTime<Utc>>,
    pub approval_end_time: Option<DateTime<Utc>>,
}

/// Parameters for a new approval log row
#[derive(Debug, Clone)]
pub struct ApprovalLogEntry {
    pub apply_id: String,
    pub approval_node: i64,
    pub approver_id: String,
    pub result: ApprovalResult,
    pub comment: Option<String>,
    pub images: Vec<String>,
}

impl ApprovalLog {
    pub async fn insert<'e, E>(executor: E, entry: &ApprovalLogEntry) -> CascadeResult<()>
    where
        E: sqlx::PgExecutor<'e>,
    {
        sqlx::query(
            r#"
            INSERT INTO apply_log
                (apply_id, approval_node, approver_id, approval_result,
                 approval_comment, approval_images, approval_start_time,
                 approval_end_time)
            VALUES ($1, $2, $3, $4, $5, $6, NOW(), NOW())
            "#,
        )
        .bind(&entry.apply_id)
        .bind(entry.approval_node)
        .bind(&entry.approver_id)
        .bind(entry.result)
        .bind(&entry.comment)
        .bind(Json(&entry.images))
        .execute(executor)
        .await
        .map_err(|e| CascadeError::database("approval_log.insert", e))?;
        Ok(())
    }

    pub async fn list_for_apply<'e, E>(executor: E, apply_id: &str) -> CascadeResult<Vec<ApprovalLog>>
    where
        E: sqlx::PgExecutor<'e>,
    {
        sqlx::query_as::<_, ApprovalLog>("SELECT * FROM apply_log WHERE apply_id = $1 ORDER BY id")
            .bind(apply_id)
            .fetch_all(executor)
            .await
            .map_err(|e| CascadeError::database("approval_log.list_for_apply", e))
    }
}

/// A submission detail row (`todo_task_apply`)
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TaskSubmission {
    pub id: i64,
    pub apply_id: String,
    pub task_execution_id: i64,
    pub submit_text: Option<String>,
    pub submit_images: Option<Json<Vec<String>>>,
    pub submit_time: Option<DateTime<Utc>>,
}

impl TaskSubmission {
    pub async fn insert<'e, E>(
        executor: E,
        apply_id: &str,
        task_execution_id: i64,
        submit_text: Option<&str>,
        submit_images: &[String],
    ) -> CascadeResult<()>
    where
        E: sqlx::PgExecutor<'e>,
    {
        sqlx::query(
            r#"
            INSERT INTO todo_task_apply
                (apply_id, task_execution_id, submit_text, submit_images, submit_time)
            VALUES ($1, $2, $3, $4, NOW())
            "#,
        )
        .bind(apply_id)
        .bind(task_execution_id)
        .bind(submit_text)
        .bind(Json(submit_images))
        .execute(executor)
        .await
        .map_err(|e| CascadeError::database("task_submission.insert", e))?;
        Ok(())
    }

    pub async fn find_by_apply_id<'e, E>(
        executor: E,
        apply_id: &str,
    ) -> CascadeResult<Option<TaskSubmission>>
    where
        E: sqlx::PgExecutor<'e>,
    {
        sqlx::query_as::<_, TaskSubmission>("SELECT * FROM todo_task_apply WHERE apply_id = $1")
            .bind(apply_id)
            .fetch_optional(executor)
            .await
            .map_err(|e| CascadeError::database("task_submission.find_by_apply_id", e))
    }

    /// Every submission ever made for a task execution, oldest first
    pub async fn list_for_execution<'e, E>(
        executor: E,
        task_execution_id: i64,
    ) -> CascadeResult<Vec<TaskSubmission>>
    where
        E: sqlx::PgExecutor<'e>,
    {
        sqlx::query_as::<_, TaskSubmission>(
            "SELECT * FROM todo_task_apply WHERE task_execution_id = $1 ORDER BY id",
        )
        .bind(task_execution_id)
        .fetch_all(executor)
        .await
        .map_err(|e| CascadeError::database("task_submission.list_for_execution", e))
    }

    /// Task execution ids with an application currently waiting on the given
    /// organization position
    pub async fn execution_ids_awaiting_position<'e, E>(
        executor: E,
        organization_id: i64,
    ) -> CascadeResult<Vec<i64>>
    where
        E: sqlx::PgExecutor<'e>,
    {
        sqlx::query_scalar::<_, i64>(
            r#"
            SELECT DISTINCT tta.task_execution_id
            FROM todo_task_apply tta
            JOIN apply_rules ar ON ar.apply_id = tta.apply_id
            WHERE ar.current_approval_node = $1
            "#,
        )
        .bind(organization_id)
        .fetch_all(executor)
        .await
        .map_err(|e| CascadeError::database("task_submission.execution_ids_awaiting_position", e))
    }
}
