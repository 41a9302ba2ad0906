//! # Plan Tables
//!
//! The editable project description: stages and tasks with their dependency
//! edges. Rows are soft-deleted by clearing `enable`; the reconciler reads
//! both live and deleted rows under row locks so concurrent saves of the
//! same project serialize.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::types::Json;

use crate::errors::{CascadeError, CascadeResult};

/// A plan stage row (`proj_stage`)
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Stage {
    pub stage_id: i64,
    pub project_id: i64,
    pub name: String,
    pub start_time: Option<NaiveDate>,
    pub end_time: Option<NaiveDate>,
    pub duration: Option<i32>,
    pub predecessor_stages: Json<Vec<i64>>,
    pub successor_stages: Json<Vec<i64>>,
    pub position: Option<Json<serde_json::Value>>,
    pub enable: bool,
    pub create_by: Option<String>,
    pub create_time: Option<DateTime<Utc>>,
    pub update_by: Option<String>,
    pub update_time: Option<DateTime<Utc>>,
}

impl Stage {
    pub fn predecessors(&self) -> &[i64] {
        &self.predecessor_stages.0
    }

    pub fn successors(&self) -> &[i64] {
        &self.successor_stages.0
    }

    /// Live stages of a project, unlocked
    pub async fn for_project<'e, E>(executor: E, project_id: i64) -> CascadeResult<Vec<Stage>>
    where
        E: sqlx::PgExecutor<'e>,
    {
        sqlx::query_as::<_, Stage>(
            "SELECT * FROM proj_stage WHERE project_id = $1 AND enable = TRUE ORDER BY stage_id",
        )
        .bind(project_id)
        .fetch_all(executor)
        .await
        .map_err(|e| CascadeError::database("stage.for_project", e))
    }

    /// All stages of a project (live and soft-deleted), each row locked for
    /// the duration of the caller's transaction
    pub async fn for_project_locked<'e, E>(executor: E, project_id: i64) -> CascadeResult<Vec<Stage>>
    where
        E: sqlx::PgExecutor<'e>,
    {
        sqlx::query_as::<_, Stage>(
            "SELECT * FROM proj_stage WHERE project_id = $1 ORDER BY stage_id FOR UPDATE",
        )
        .bind(project_id)
        .fetch_all(executor)
        .await
        .map_err(|e| CascadeError::database("stage.for_project_locked", e))
    }

    pub async fn find_live<'e, E>(executor: E, stage_id: i64) -> CascadeResult<Option<Stage>>
    where
        E: sqlx::PgExecutor<'e>,
    {
        sqlx::query_as::<_, Stage>("SELECT * FROM proj_stage WHERE stage_id = $1 AND enable = TRUE")
            .bind(stage_id)
            .fetch_optional(executor)
            .await
            .map_err(|e| CascadeError::database("stage.find_live", e))
    }

    /// All live stages across projects, for the summary counters
    pub async fn all_live<'e, E>(executor: E) -> CascadeResult<Vec<Stage>>
    where
        E: sqlx::PgExecutor<'e>,
    {
        sqlx::query_as::<_, Stage>(
            "SELECT * FROM proj_stage WHERE enable = TRUE ORDER BY project_id, stage_id",
        )
        .fetch_all(executor)
        .await
        .map_err(|e| CascadeError::database("stage.all_live", e))
    }

    pub async fn insert<'e, E>(executor: E, draft: &StageDraft, actor: &str) -> CascadeResult<i64>
    where
        E: sqlx::PgExecutor<'e>,
    {
        sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO proj_stage
                (project_id, name, start_time, end_time, duration,
                 predecessor_stages, successor_stages, position, enable,
                 create_by, create_time, update_by, update_time)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, TRUE, $9, NOW(), $9, NOW())
            RETURNING stage_id
            "#,
        )
        .bind(draft.project_id)
        .bind(&draft.name)
        .bind(draft.start_time)
        .bind(draft.end_time)
        .bind(draft.duration)
        .bind(Json(&draft.predecessor_stages))
        .bind(Json(&draft.successor_stages))
        .bind(draft.position.as_ref().map(Json))
        .bind(actor)
        .fetch_one(executor)
        .await
        .map_err(|e| CascadeError::database("stage.insert", e))
    }

    /// Field-level update of an existing row. Re-enables a soft-deleted row
    /// that reappears in a payload.
    pub async fn update<'e, E>(
        executor: E,
        stage_id: i64,
        draft: &StageDraft,
        actor: &str,
    ) -> CascadeResult<()>
    where
        E: sqlx::PgExecutor<'e>,
    {
        sqlx::query(
            r#"
            UPDATE proj_stage
            SET name = $2, start_time = $3, end_time = $4, duration = $5,
                predecessor_stages = $6, successor_stages = $7, position = $8,
                enable = TRUE, update_by = $9, update_time = NOW()
            WHERE stage_id = $1
            "#,
        )
        .bind(stage_id)
        .bind(&draft.name)
        .bind(draft.start_time)
        .bind(draft.end_time)
        .bind(draft.duration)
        .bind(Json(&draft.predecessor_stages))
        .bind(Json(&draft.successor_stages))
        .bind(draft.position.as_ref().map(Json))
        .bind(actor)
        .execute(executor)
        .await
        .map_err(|e| CascadeError::database("stage.update", e))?;
        Ok(())
    }

    pub async fn update_edges<'e, E>(
        executor: E,
        stage_id: i64,
        predecessors: &[i64],
        successors: &[i64],
        actor: &str,
    ) -> CascadeResult<()>
    where
        E: sqlx::PgExecutor<'e>,
    {
        sqlx::query(
            r#"
            UPDATE proj_stage
            SET predecessor_stages = $2, successor_stages = $3,
                update_by = $4, update_time = NOW()
            WHERE stage_id = $1
            "#,
        )
        .bind(stage_id)
        .bind(Json(predecessors))
        .bind(Json(successors))
        .bind(actor)
        .execute(executor)
        .await
        .map_err(|e| CascadeError::database("stage.update_edges", e))?;
        Ok(())
    }

    pub async fn soft_delete<'e, E>(executor: E, stage_id: i64, actor: &str) -> CascadeResult<()>
    where
        E: sqlx::PgExecutor<'e>,
    {
        sqlx::query(
            "UPDATE proj_stage SET enable = FALSE, update_by = $2, update_time = NOW() WHERE stage_id = $1",
        )
        .bind(stage_id)
        .bind(actor)
        .execute(executor)
        .await
        .map_err(|e| CascadeError::database("stage.soft_delete", e))?;
        Ok(())
    }
}

/// Write-side image of a stage, produced from the payload
#[derive(Debug, Clone)]
pub struct StageDraft {
    pub project_id: i64,
    pub name: String,
    pub start_time: Option<NaiveDate>,
    pub end_time: Option<NaiveDate>,
    pub duration: Option<i32>,
    pub predecessor_stages: Vec<i64>,
    pub successor_stages: Vec<i64>,
    pub position: Option<serde_json::Value>,
}

/// A plan task row (`proj_task`)
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Task {
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
    pub position: Option<Json<serde_json::Value>>,
    pub approval_type: Option<String>,
    pub approval_nodes: Json<Vec<i64>>,
    pub enable: bool,
    pub create_by: Option<String>,
    pub create_time: Option<DateTime<Utc>>,
    pub update_by: Option<String>,
    pub update_time: Option<DateTime<Utc>>,
}

impl Task {
    pub fn predecessors(&self) -> &[i64] {
        &self.predecessor_tasks.0
    }

    pub fn successors(&self) -> &[i64] {
        &self.successor_tasks.0
    }

    pub async fn for_project<'e, E>(executor: E, project_id: i64) -> CascadeResult<Vec<Task>>
    where
        E: sqlx::PgExecutor<'e>,
    {
        sqlx::query_as::<_, Task>(
            "SELECT * FROM proj_task WHERE project_id = $1 AND enable = TRUE ORDER BY task_id",
        )
        .bind(project_id)
        .fetch_all(executor)
        .await
        .map_err(|e| CascadeError::database("task.for_project", e))
    }

    pub async fn for_project_locked<'e, E>(executor: E, project_id: i64) -> CascadeResult<Vec<Task>>
    where
        E: sqlx::PgExecutor<'e>,
    {
        sqlx::query_as::<_, Task>(
            "SELECT * FROM proj_task WHERE project_id = $1 ORDER BY task_id FOR UPDATE",
        )
        .bind(project_id)
        .fetch_all(executor)
        .await
        .map_err(|e| CascadeError::database("task.for_project_locked", e))
    }

    pub async fn find_live<'e, E>(executor: E, task_id: i64) -> CascadeResult<Option<Task>>
    where
        E: sqlx::PgExecutor<'e>,
    {
        sqlx::query_as::<_, Task>("SELECT * FROM proj_task WHERE task_id = $1 AND enable = TRUE")
            .bind(task_id)
            .fetch_optional(executor)
            .await
            .map_err(|e| CascadeError::database("task.find_live", e))
    }

    pub async fn all_live<'e, E>(executor: E) -> CascadeResult<Vec<Task>>
    where
        E: sqlx::PgExecutor<'e>,
    {
        sqlx::query_as::<_, Task>(
            "SELECT * FROM proj_task WHERE enable = TRUE ORDER BY project_id, task_id",
        )
        .fetch_all(executor)
        .await
        .map_err(|e| CascadeError::database("task.all_live", e))
    }

    pub async fn insert<'e, E>(executor: E, draft: &TaskDraft, actor: &str) -> CascadeResult<i64>
    where
        E: sqlx::PgExecutor<'e>,
    {
        sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO proj_task
                (project_id, stage_id, name, description, start_time, end_time,
                 duration, job_number, predecessor_tasks, successor_tasks,
                 position, approval_type, approval_nodes, enable,
                 create_by, create_time, update_by, update_time)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, TRUE,
                    $14, NOW(), $14, NOW())
            RETURNING task_id
            "#,
        )
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
        .bind(draft.position.as_ref().map(Json))
        .bind(&draft.approval_type)
        .bind(Json(&draft.approval_nodes))
        .bind(actor)
        .fetch_one(executor)
        .await
        .map_err(|e| CascadeError::database("task.insert", e))
    }

    pub async fn update<'e, E>(
        executor: E,
        task_id: i64,
        draft: &TaskDraft,
        actor: &str,
    ) -> CascadeResult<()>
    where
        E: sqlx::PgExecutor<'e>,
    {
        sqlx::query(
            r#"
            UPDATE proj_task
            SET stage_id = $2, name = $3, description = $4, start_time = $5,
                end_time = $6, duration = $7, job_number = $8,
                predecessor_tasks = $9, successor_tasks = $10, position = $11,
                approval_type = $12, approval_nodes = $13, enable = TRUE,
                update_by = $14, update_time = NOW()
            WHERE task_id = $1
            "#,
        )
        .bind(task_id)
        .bind(draft.stage_id)
        .bind(&draft.name)
        .bind(&draft.description)
        .bind(draft.start_time)
        .bind(draft.end_time)
        .bind(draft.duration)
        .bind(&draft.job_number)
        .bind(Json(&draft.predecessor_tasks))
        .bind(Json(&draft.successor_tasks))
        .bind(draft.position.as_ref().map(Json))
        .bind(&draft.approval_type)
        .bind(Json(&draft.approval_nodes))
        .bind(actor)
        .execute(executor)
        .await
        .map_err(|e| CascadeError::database("task.update", e))?;
        Ok(())
    }

    pub async fn update_edges<'e, E>(
        executor: E,
        task_id: i64,
        predecessors: &[i64],
        successors: &[i64],
        actor: &str,
    ) -> CascadeResult<()>
    where
        E: sqlx::PgExecutor<'e>,
    {
        sqlx::query(
            r#"
            UPDATE proj_task
            SET predecessor_tasks = $2, successor_tasks = $3,
                update_by = $4, update_time = NOW()
            WHERE task_id = $1
            "#,
        )
        .bind(task_id)
        .bind(Json(predecessors))
        .bind(Json(successors))
        .bind(actor)
        .execute(executor)
        .await
        .map_err(|e| CascadeError::database("task.update_edges", e))?;
        Ok(())
    }

    pub async fn soft_delete<'e, E>(executor: E, task_id: i64, actor: &str) -> CascadeResult<()>
    where
        E: sqlx::PgExecutor<'e>,
    {
        sqlx::query(
            "UPDATE proj_task SET enable = FALSE, update_by = $2, update_time = NOW() WHERE task_id = $1",
        )
        .bind(task_id)
        .bind(actor)
        .execute(executor)
        .await
        .map_err(|e| CascadeError::database("task.soft_delete", e))?;
        Ok(())
    }
}

/// Write-side image of a task, produced from the payload
#[derive(Debug, Clone)]
pub struct TaskDraft {
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
    pub position: Option<serde_json::Value>,
    pub approval_type: Option<String>,
    pub approval_nodes: Vec<i64>,
}
