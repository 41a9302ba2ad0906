//! # Progressive Materialization
//!
//! Turns plan rows into execution rows as their preconditions become true.
//! A stage materializes once every predecessor stage completed (or was
//! soft-deleted); a task materializes once its stage exists, it passes the
//! completeness checks, its dates do not conflict with already-committed
//! neighbor stages, and every predecessor task completed.
//!
//! The sweep runs to a fixed point so chains of empty stages and head tasks
//! resolve within the triggering transaction. Everything here executes on
//! the caller's connection; a failure rolls back the save or approval that
//! initiated it.

use std::collections::HashMap;

use sqlx::PgConnection;
use tracing::{debug, info, warn};

use cascade_shared::models::execution::TaskExecutionDraft;
use cascade_shared::models::{
    Stage, StageExecution, StageStatus, Task, TaskExecution, TaskStatus,
};
use cascade_shared::{CascadeError, CascadeResult};

use crate::orchestration::validator;

/// Counts of rows created by one sweep
#[derive(Debug, Clone, Copy, Default)]
pub struct SweepOutcome {
    pub stages_generated: u32,
    pub tasks_generated: u32,
}

/// Fixed-point generation sweep over one project.
///
/// Each round materializes every stage whose preconditions hold, then every
/// task whose preconditions hold, repeating until a round makes no progress.
/// Bounded by the number of plan rows since each row materializes at most
/// once.
pub async fn run_project_sweep(
    conn: &mut PgConnection,
    project_id: i64,
) -> CascadeResult<SweepOutcome> {
    let mut outcome = SweepOutcome::default();

    loop {
        let mut progress = false;
        let stages = Stage::for_project(&mut *conn, project_id).await?;
        let tasks = Task::for_project(&mut *conn, project_id).await?;
        let task_map: HashMap<i64, &Task> = tasks.iter().map(|t| (t.task_id, t)).collect();

        for stage in &stages {
            if StageExecution::exists(&mut *conn, stage.stage_id).await? {
                continue;
            }
            if stage_preconditions_met(conn, stage).await? {
                StageExecution::insert(
                    &mut *conn,
                    stage.stage_id,
                    stage.project_id,
                    stage.predecessors(),
                    stage.successors(),
                )
                .await?;
                info!(stage_id = stage.stage_id, project_id, "stage materialized");
                outcome.stages_generated += 1;
                progress = true;
            }
        }

        for task in &tasks {
            if TaskExecution::exists_for_task(&mut *conn, task.task_id).await? {
                continue;
            }
            if try_generate_task(conn, task, &task_map).await? {
                outcome.tasks_generated += 1;
                progress = true;
            }
        }

        if !progress {
            break;
        }
    }

    Ok(outcome)
}

/// On-demand generation for a project. Refused while the project still has
/// validation problems; generation from an inconsistent plan would strand
/// half-configured work items.
pub async fn generate_for_project(
    conn: &mut PgConnection,
    project_id: i64,
) -> CascadeResult<SweepOutcome> {
    let stages = Stage::for_project(&mut *conn, project_id).await?;
    let tasks = Task::for_project(&mut *conn, project_id).await?;

    if tasks.is_empty() {
        return Err(CascadeError::validation(format!(
            "project {project_id} has no executable tasks"
        )));
    }

    let counters = validator::project_counters(&stages, &tasks);
    if counters.has_errors() {
        warn!(
            project_id,
            missing_info = counters.missing_info_count,
            time_errors = counters.time_relation_error_count,
            unassigned = counters.unassigned_count,
            "generation refused, project has validation issues"
        );
        return Err(CascadeError::invalid_state(format!(
            "project {project_id} has validation issues ({} missing info, {} time errors, {} unassigned); complete all tasks before generating",
            counters.missing_info_count,
            counters.time_relation_error_count,
            counters.unassigned_count
        )));
    }

    let outcome = run_project_sweep(conn, project_id).await?;
    info!(
        project_id,
        stages_generated = outcome.stages_generated,
        tasks_generated = outcome.tasks_generated,
        "on-demand generation finished"
    );
    Ok(outcome)
}

/// Post-completion hook: after a task reaches completed, pick up successors
/// whose last precondition just became satisfied, then complete the stage if
/// this was its last open task (which may in turn unlock successor stages).
pub async fn handle_task_completed(conn: &mut PgConnection, task_id: i64) -> CascadeResult<()> {
    let Some(execution) = TaskExecution::find_by_task_id(&mut *conn, task_id).await? else {
        warn!(task_id, "completed task has no execution row, skipping cascade");
        return Ok(());
    };

    run_project_sweep(conn, execution.project_id).await?;

    if let Some(stage_id) = execution.stage_id {
        complete_stage_if_done(conn, stage_id, execution.project_id).await?;
    }

    Ok(())
}

/// Transition a stage execution to completed once all its generated tasks
/// completed, then sweep again for successor stages
async fn complete_stage_if_done(
    conn: &mut PgConnection,
    stage_id: i64,
    project_id: i64,
) -> CascadeResult<()> {
    let Some(stage_execution) = StageExecution::find(&mut *conn, stage_id).await? else {
        return Ok(());
    };
    if stage_execution.stage_status == StageStatus::Completed {
        return Ok(());
    }

    let stage_tasks = TaskExecution::for_stage(&mut *conn, stage_id).await?;
    let all_completed = stage_tasks
        .iter()
        .all(|t| t.task_status == TaskStatus::Completed);
    if !all_completed {
        return Ok(());
    }

    StageExecution::mark_completed(&mut *conn, stage_id).await?;
    info!(stage_id, project_id, "stage completed");

    run_project_sweep(conn, project_id).await?;
    Ok(())
}

/// A stage may materialize once every predecessor completed or was
/// soft-deleted
async fn stage_preconditions_met(conn: &mut PgConnection, stage: &Stage) -> CascadeResult<bool> {
    for pred_id in stage.predecessors() {
        if Stage::find_live(&mut *conn, *pred_id).await?.is_none() {
            // Soft-deleted predecessors no longer gate the stage
            continue;
        }
        match StageExecution::find(&mut *conn, *pred_id).await? {
            Some(pred_execution) if pred_execution.stage_status == StageStatus::Completed => {}
            _ => return Ok(false),
        }
    }
    Ok(true)
}

/// Materialize one task if every precondition holds. Returns whether a row
/// was created.
async fn try_generate_task(
    conn: &mut PgConnection,
    task: &Task,
    task_map: &HashMap<i64, &Task>,
) -> CascadeResult<bool> {
    // Stages materialize before their tasks
    let Some(stage_id) = task.stage_id else {
        return Ok(false);
    };
    if !StageExecution::exists(&mut *conn, stage_id).await? {
        debug!(task_id = task.task_id, stage_id, "stage not generated yet, task skipped");
        return Ok(false);
    }

    let check = validator::check_plan_task(task, task_map);
    if !check.is_valid() {
        debug!(
            task_id = task.task_id,
            missing_info = check.missing_info,
            unassigned = check.unassigned,
            time_error = check.time_error,
            "task failed completeness validation, skipped"
        );
        return Ok(false);
    }

    if let Some(conflict) = stage_envelope_conflict(conn, stage_id).await? {
        warn!(task_id = task.task_id, stage_id, conflict = %conflict, "task generation refused");
        return Ok(false);
    }

    for pred_id in task.predecessors() {
        match TaskExecution::find_by_task_id(&mut *conn, *pred_id).await? {
            Some(pred_execution) if pred_execution.task_status == TaskStatus::Completed => {}
            _ => return Ok(false),
        }
    }

    let draft = TaskExecutionDraft {
        task_id: task.task_id,
        project_id: task.project_id,
        stage_id: task.stage_id,
        name: task.name.clone(),
        description: task.description.clone(),
        start_time: task.start_time,
        end_time: task.end_time,
        duration: task.duration,
        job_number: task.job_number.clone(),
        predecessor_tasks: task.predecessors().to_vec(),
        successor_tasks: task.successors().to_vec(),
        approval_nodes: task.approval_nodes.0.clone(),
    };
    TaskExecution::insert(&mut *conn, &draft).await?;
    info!(task_id = task.task_id, project_id = task.project_id, "task materialized");
    Ok(true)
}

/// Check whether the stage's committed date envelope conflicts with adjacent
/// materialized stages. Only meaningful for a stage that is itself
/// materialized; new work must not expose a schedule inconsistent with
/// downstream stages that already advanced.
async fn stage_envelope_conflict(
    conn: &mut PgConnection,
    stage_id: i64,
) -> CascadeResult<Option<String>> {
    let Some(stage) = Stage::find_live(&mut *conn, stage_id).await? else {
        return Ok(None);
    };

    if let Some(start) = stage.start_time {
        for pred_id in stage.predecessors() {
            if !StageExecution::exists(&mut *conn, *pred_id).await? {
                continue;
            }
            if let Some(pred) = Stage::find_live(&mut *conn, *pred_id).await? {
                if let Some(pred_end) = pred.end_time {
                    if start <= pred_end {
                        return Ok(Some(format!(
                            "stage '{}' starts on {start} which is not after generated predecessor '{}' ending on {pred_end}",
                            stage.name, pred.name
                        )));
                    }
                }
            }
        }
    }

    if let Some(end) = stage.end_time {
        for succ_id in stage.successors() {
            if !StageExecution::exists(&mut *conn, *succ_id).await? {
                continue;
            }
            if let Some(succ) = Stage::find_live(&mut *conn, *succ_id).await? {
                if let Some(succ_start) = succ.start_time {
                    if end >= succ_start {
                        return Ok(Some(format!(
                            "stage '{}' ends on {end} which is not before generated successor '{}' starting on {succ_start}",
                            stage.name, succ.name
                        )));
                    }
                }
            }
        }
    }

    Ok(None)
}
