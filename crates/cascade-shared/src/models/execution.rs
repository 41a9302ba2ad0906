//! # Execution Tables
//!
//! Materialized instances of plan rows. A stage execution shares the plan
//! stage's id and snapshots its edge sets at generation time; a task
//! execution carries a snapshot of everything an owner or approver sees, so
//! later plan edits (which the edit guard forbids anyway) cannot change
//! in-flight work.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::types::Json;

use crate::errors::{CascadeError, CascadeResult};
use crate::models::types::{StageStatus, TaskStatus};

/// A stage execution row (`todo_stage`)
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StageExecution {
    pub stage_id: i64,
    pub project_id: i64,
    pub stage_status: StageStatus,
    pub predecessor_stages: Json<Vec<i64>>,
    pub successor_stages: Json<Vec<i64>>,
    pub actual_start_time: Option<DateTime<Utc>>,
    pub actual_complete_time: Option<DateTime<Utc>>,
    pub create_time: Option<DateTime<Utc>>,
    pub update_time: Option<DateTime<Utc>>,
}

impl StageExecution {
    pub async fn find<'e, E>(executor: E, stage_id: i64) -> CascadeResult<Option<StageExecution>>
    where
        E: sqlx::PgExecutor<'e>,
    {
        sqlx::query_as::<_, StageExecution>("SELECT * FROM todo_stage WHERE stage_id = $1")
            .bind(stage_id)
            .fetch_optional(executor)
            .await
            .map_err(|e| CascadeError::database("stage_execution.find", e))
    }

    pub async fn exists<'e, E>(executor: E, stage_id: i64) -> CascadeResult<bool>
    where
        E: sqlx::PgExecutor<'e>,
    {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM todo_stage WHERE stage_id = $1)")
            .bind(stage_id)
            .fetch_one(executor)
            .await
            .map_err(|e| CascadeError::database("stage_execution.exists", e))
    }

    pub async fn for_project<'e, E>(executor: E, project_id: i64) -> CascadeResult<Vec<StageExecution>>
    where
        E: sqlx::PgExecutor<'e>,
    {
        sqlx::query_as::<_, StageExecution>(
            "SELECT * FROM todo_stage WHERE project_id = $1 ORDER BY stage_id",
        )
        .bind(project_id)
        .fetch_all(executor)
        .await
        .map_err(|e| CascadeError::database("stage_execution.for_project", e))
    }

    /// Insert a newly materialized stage. Stages are born in-progress.
    pub async fn insert<'e, E>(
        executor: E,
        stage_id: i64,
        project_id: i64,
        predecessors: &[i64],
        successors: &[i64],
    ) -> CascadeResult<()>
    where
        E: sqlx::PgExecutor<'e>,
    {
        sqlx::query(
            r#"
            INSERT INTO todo_stage
                (stage_id, project_id, stage_status, predecessor_stages,
                 successor_stages, actual_start_time, create_time, update_time)
            VALUES ($1, $2, $3, $4, $5, NOW(), NOW(), NOW())
            "#,
        )
        .bind(stage_id)
        .bind(project_id)
        .bind(StageStatus::InProgress)
        .bind(Json(predecessors))
        .bind(Json(successors))
        .execute(executor)
        .await
        .map_err(|e| CascadeError::database("stage_execution.insert", e))?;
        Ok(())
    }

    pub async fn mark_completed<'e, E>(executor: E, stage_id: i64) -> CascadeResult<()>
    where
        E: sqlx::PgExecutor<'e>,
    {
        sqlx::query(
            r#"
            UPDATE todo_stage
            SET stage_status = $2, actual_complete_time = NOW(), update_time = NOW()
            WHERE stage_id = $1
            "#,
        )
        .bind(stage_id)
        .bind(StageStatus::Completed)
        .execute(executor)
        .await
        .map_err(|e| CascadeError::database("stage_execution.mark_completed", e))?;
        Ok(())
    }

    /// Propagate an augmented successor list from the plan. Predecessor
    /// snapshots are immutable after materialization.
    pub async fn update_successors<'e, E>(
        executor: E,
        stage_id: i64,
        successors: &[i64],
    ) -> CascadeResult<()>
    where
        E: sqlx::PgExecutor<'e>,
    {
        sqlx::query(
            "UPDATE todo_stage SET successor_stages = $2, update_time = NOW() WHERE stage_id = $1",
        )
        .bind(stage_id)
        .bind(Json(successors))
        .execute(executor)
        .await
        .map_err(|e| CascadeError::database("stage_execution.update_successors", e))?;
        Ok(())
    }
}

/// A task execution row (`todo_task`)
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TaskExecution {
    pub id: i64,
    pub task_id: i64,
    pub project_id: i64,
    pub stage_id: Option<i64>,
    pub name: String,
    pub description: Option<String>,
    pub start_time: Option<NaiveDate>,
    pub end_time: Option<NaiveDate>,
    pub duration: Option<i32>,
    pub job_number: Option<String>,
    pub predecessor_tasks: Json<Vec<i64>>,
    pub successor_tasks: Json<Vec<i64>>,
    pub approval_nodes: Json<Vec<i64>>,
    pub task_status: TaskStatus,
    pub is_skipped: bool,
    pub actual_start_time: Option<DateTime<Utc>>,
    pub actual_complete_time: Option<DateTime<Utc>>,
}

/// Snapshot of a plan task taken at materialization time
#[derive(Debug, Clone)]
pub struct TaskExecutionDraft {
    pub task_id: i64,
    pub project_id: i64,
    pub stage_id: Option<i64>,
    pub name: String,
    pub description: Option<String>,
    pub start_time: Option<NaiveDate>,
    pub end_time: Option<NaiveDate>,
    pub duration: Option<i32>,
    pub job_number: Option<String>,
    pub predecessor_tasks: Vec<i64>,
    pub successor_tasks: Vec<i64>,
    pub approval_nodes: Vec<i64>,
}

impl TaskExecution {
    pub async fn find_by_task_id<'e, E>(
        executor: E,
        task_id: i64,
    ) -> CascadeResult<Option<TaskExecution>>
    where
        E: sqlx::PgExecutor<'e>,
    {
        sqlx::query_as::<_, TaskExecution>("SELECT * FROM todo_task WHERE task_id = $1")
            .bind(task_id)
            .fetch_optional(executor)
            .await
            .map_err(|e| CascadeError::database("task_execution.find_by_task_id", e))
    }

    pub async fn find_by_id<'e, E>(executor: E, id: i64) -> CascadeResult<Option<TaskExecution>>
    where
        E: sqlx::PgExecutor<'e>,
    {
        sqlx::query_as::<_, TaskExecution>("SELECT * FROM todo_task WHERE id = $1")
            .bind(id)
            .fetch_optional(executor)
            .await
            .map_err(|e| CascadeError::database("task_execution.find_by_id", e))
    }

    pub async fn exists_for_task<'e, E>(executor: E, task_id: i64) -> CascadeResult<bool>
    where
        E: sqlx::PgExecutor<'e>,
    {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM todo_task WHERE task_id = $1)")
            .bind(task_id)
            .fetch_one(executor)
            .await
            .map_err(|e| CascadeError::database("task_execution.exists_for_task", e))
    }

    pub async fn for_project<'e, E>(executor: E, project_id: i64) -> CascadeResult<Vec<TaskExecution>>
    where
        E: sqlx::PgExecutor<'e>,
    {
        sqlx::query_as::<_, TaskExecution>(
            "SELECT * FROM todo_task WHERE project_id = $1 ORDER BY task_id",
        )
        .bind(project_id)
        .fetch_all(executor)
        .await
        .map_err(|e| CascadeError::database("task_execution.for_project", e))
    }

    pub async fn for_stage<'e, E>(executor: E, stage_id: i64) -> CascadeResult<Vec<TaskExecution>>
    where
        E: sqlx::PgExecutor<'e>,
    {
        sqlx::query_as::<_, TaskExecution>(
            "SELECT * FROM todo_task WHERE stage_id = $1 ORDER BY task_id",
        )
        .bind(stage_id)
        .fetch_all(executor)
        .await
        .map_err(|e| CascadeError::database("task_execution.for_stage", e))
    }

    /// Task executions owned by a job number in any of the given statuses
    pub async fn owned_with_statuses<'e, E>(
        executor: E,
        job_number: &str,
        statuses: &[i16],
    ) -> CascadeResult<Vec<TaskExecution>>
    where
        E: sqlx::PgExecutor<'e>,
    {
        sqlx::query_as::<_, TaskExecution>(
            "SELECT * FROM todo_task WHERE job_number = $1 AND task_status = ANY($2) ORDER BY id",
        )
        .bind(job_number)
        .bind(statuses)
        .fetch_all(executor)
        .await
        .map_err(|e| CascadeError::database("task_execution.owned_with_statuses", e))
    }

    pub async fn by_ids<'e, E>(executor: E, ids: &[i64]) -> CascadeResult<Vec<TaskExecution>>
    where
        E: sqlx::PgExecutor<'e>,
    {
        sqlx::query_as::<_, TaskExecution>("SELECT * FROM todo_task WHERE id = ANY($1) ORDER BY id")
            .bind(ids)
            .fetch_all(executor)
            .await
            .map_err(|e| CascadeError::database("task_execution.by_ids", e))
    }

    /// Project ids that have at least one generated task
    pub async fn generated_project_ids<'e, E>(executor: E) -> CascadeResult<Vec<i64>>
    where
        E: sqlx::PgExecutor<'e>,
    {
        sqlx::query_scalar::<_, i64>("SELECT DISTINCT project_id FROM todo_task")
            .fetch_all(executor)
            .await
            .map_err(|e| CascadeError::database("task_execution.generated_project_ids", e))
    }

    /// Insert a newly materialized task. Tasks are born in-progress.
    pub async fn insert<'e, E>(executor: E, draft: &TaskExecutionDraft) -> CascadeResult<i64>
    where
        E: sqlx::PgExecutor<'e>,
    {
        sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO todo_task
                (task_id, project_id, stage_id, name, description, start_time,
                 end_time, duration, job_number, predecessor_tasks,
                 successor_tasks, approval_nodes, task_status, is_skipped,
                 actual_start_time)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13,
                    FALSE, NOW())
            RETURNING id
            "#,
        )
        .bind(draft.task_id)
        .bind(draft.project_id)
        .bind(draft.stage_id)
        .bind(&draft.name)
        .bind(&draft.description)
        .bind(draft.start_time)
        .bind(draft.end_time)
        .bind(draft.duration)
        .bind(&draft.job_number)
        .bind(Json(&draft.predecessor_tasks))
        .bind(Json(&draft.successor_tasks))
        .bind(Json(&draft.approval_nodes))
        .bind(TaskStatus::InProgress)
        .fetch_one(executor)
        .await
        .map_err(|e| CascadeError::database("task_execution.insert", e))
    }

    pub async fn update_status<'e, E>(
        executor: E,
        task_id: i64,
        status: TaskStatus,
    ) -> CascadeResult<()>
    where
        E: sqlx::PgExecutor<'e>,
    {
        sqlx::query("UPDATE todo_task SET task_status = $2 WHERE task_id = $1")
            .bind(task_id)
            .bind(status)
            .execute(executor)
            .await
            .map_err(|e| CascadeError::database("task_execution.update_status", e))?;
        Ok(())
    }

    pub async fn mark_completed<'e, E>(executor: E, task_id: i64) -> CascadeResult<()>
    where
        E: sqlx::PgExecutor<'e>,
    {
        sqlx::query(
            "UPDATE todo_task SET task_status = $2, actual_complete_time = NOW() WHERE task_id = $1",
        )
        .bind(task_id)
        .bind(TaskStatus::Completed)
        .execute(executor)
        .await
        .map_err(|e| CascadeError::database("task_execution.mark_completed", e))?;
        Ok(())
    }

    /// Propagate an augmented successor list from the plan
    pub async fn update_successors<'e, E>(
        executor: E,
        task_id: i64,
        successors: &[i64],
    ) -> CascadeResult<()>
    where
        E: sqlx::PgExecutor<'e>,
    {
        sqlx::query("UPDATE todo_task SET successor_tasks = $2 WHERE task_id = $1")
            .bind(task_id)
            .bind(Json(successors))
            .execute(executor)
            .await
            .map_err(|e| CascadeError::database("task_execution.update_successors", e))?;
        Ok(())
    }
}
