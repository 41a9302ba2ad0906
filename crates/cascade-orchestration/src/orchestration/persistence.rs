//! # Identity Reconciliation & Persistence
//!
//! Merges a validated payload with the stored plan inside one transaction.
//! All plan rows of the project are row-locked first so concurrent saves of
//! the same project serialize. Nodes are written in a first pass (recording
//! the temp-to-real id map), edges in a second pass once every node of the
//! type has a real id; edges may legitimately reference entities created in
//! the same save, and only the second pass can rewrite them consistently.
//!
//! The edit guard runs before any write: once an entity is materialized its
//! semantics are visible to owners and approvers, so everything except
//! additive successor edges (toward not-yet-materialized targets) is frozen.

use std::collections::{HashMap, HashSet};

use sqlx::PgConnection;
use tracing::{debug, info, warn};

use cascade_shared::models::{
    Stage, StageExecution, StagePayload, Task, TaskConfigPayload, TaskExecution, TaskPayload,
};
use cascade_shared::{CascadeError, CascadeResult};

use crate::orchestration::generation;

/// Persist a validated payload. When `generate` is set, the materialization
/// sweep runs within the same transaction after all writes.
pub async fn persist_task_config(
    conn: &mut PgConnection,
    payload: &TaskConfigPayload,
    actor: &str,
    generate: bool,
) -> CascadeResult<()> {
    let project_id = payload.project_id;
    info!(
        project_id,
        stages = payload.stages.len(),
        tasks = payload.tasks.len(),
        "persisting task configuration"
    );

    // Row-lock the whole project plan for the duration of the transaction
    let existing_stages = Stage::for_project_locked(&mut *conn, project_id).await?;
    let existing_tasks = Task::for_project_locked(&mut *conn, project_id).await?;

    let existing_stages: HashMap<i64, Stage> =
        existing_stages.into_iter().map(|s| (s.stage_id, s)).collect();
    let existing_tasks: HashMap<i64, Task> =
        existing_tasks.into_iter().map(|t| (t.task_id, t)).collect();

    let materialized_stages: HashSet<i64> = StageExecution::for_project(&mut *conn, project_id)
        .await?
        .into_iter()
        .map(|s| s.stage_id)
        .collect();
    let materialized_tasks: HashSet<i64> = TaskExecution::for_project(&mut *conn, project_id)
        .await?
        .into_iter()
        .map(|t| t.task_id)
        .collect();

    check_edit_restrictions(
        payload,
        &existing_stages,
        &existing_tasks,
        &materialized_stages,
        &materialized_tasks,
    )?;

    let stage_id_map = process_stages(
        conn,
        &payload.stages,
        &existing_stages,
        &materialized_stages,
        project_id,
        actor,
    )
    .await?;

    rewrite_stage_edges(conn, &payload.stages, &stage_id_map, &materialized_stages, actor).await?;

    let task_id_map = process_tasks(
        conn,
        &payload.tasks,
        &existing_tasks,
        &materialized_tasks,
        &stage_id_map,
        project_id,
        actor,
    )
    .await?;

    rewrite_task_edges(conn, &payload.tasks, &task_id_map, &materialized_tasks, actor).await?;

    if generate {
        let outcome = generation::run_project_sweep(conn, project_id).await?;
        info!(
            project_id,
            stages_generated = outcome.stages_generated,
            tasks_generated = outcome.tasks_generated,
            "post-save generation sweep finished"
        );
    }

    Ok(())
}

/// First stage pass: create/update nodes and soft-delete absentees.
/// Edge lists are written verbatim (possibly still temporary) and fixed up
/// by [`rewrite_stage_edges`].
async fn process_stages(
    conn: &mut PgConnection,
    stages: &[StagePayload],
    existing: &HashMap<i64, Stage>,
    materialized: &HashSet<i64>,
    project_id: i64,
    actor: &str,
) -> CascadeResult<HashMap<i64, i64>> {
    let mut id_map: HashMap<i64, i64> = HashMap::new();
    let payload_real_ids: HashSet<i64> = stages.iter().filter(|s| !s.is_temp()).map(|s| s.id).collect();

    for stage in stages {
        let draft = stage.to_draft(project_id);
        if stage.is_temp() {
            let real_id = Stage::insert(&mut *conn, &draft, actor).await?;
            debug!(temp_id = stage.id, real_id, name = %stage.name, "stage created");
            id_map.insert(stage.id, real_id);
        } else if existing.contains_key(&stage.id) {
            Stage::update(&mut *conn, stage.id, &draft, actor).await?;
        } else {
            // A positive id the database has never seen: treat as a create
            let real_id = Stage::insert(&mut *conn, &draft, actor).await?;
            warn!(
                claimed_id = stage.id,
                real_id,
                name = %stage.name,
                "payload stage carried an unknown real id, created a new row"
            );
            id_map.insert(stage.id, real_id);
        }
    }

    for (stage_id, existing_stage) in existing {
        if !payload_real_ids.contains(stage_id) && existing_stage.enable {
            if materialized.contains(stage_id) {
                return Err(CascadeError::edit_restricted(format!(
                    "stage '{}' already generated, cannot delete",
                    existing_stage.name
                )));
            }
            debug!(stage_id, name = %existing_stage.name, "stage soft-deleted");
            Stage::soft_delete(&mut *conn, *stage_id, actor).await?;
        }
    }

    Ok(id_map)
}

/// Second stage pass: rewrite edge lists through the id map and persist only
/// the ones that actually changed. Materialized stages get their successor
/// snapshot synchronized; predecessor snapshots never change.
async fn rewrite_stage_edges(
    conn: &mut PgConnection,
    stages: &[StagePayload],
    id_map: &HashMap<i64, i64>,
    materialized: &HashSet<i64>,
    actor: &str,
) -> CascadeResult<()> {
    for stage in stages {
        let Some(stage_db_id) = resolve_id(stage.id, id_map) else {
            continue;
        };

        let predecessors = rewrite_ids(&stage.predecessor_stages, id_map);
        let successors = rewrite_ids(&stage.successor_stages, id_map);

        let Some(current) = Stage::find_live(&mut *conn, stage_db_id).await? else {
            continue;
        };

        let predecessors_changed = !same_id_set(&predecessors, current.predecessors());
        let successors_changed = !same_id_set(&successors, current.successors());
        if !(predecessors_changed || successors_changed) {
            continue;
        }

        Stage::update_edges(&mut *conn, stage_db_id, &predecessors, &successors, actor).await?;
        debug!(stage_id = stage_db_id, ?predecessors, ?successors, "stage edges rewritten");

        if successors_changed && materialized.contains(&stage_db_id) {
            StageExecution::update_successors(&mut *conn, stage_db_id, &successors).await?;
        }
    }
    Ok(())
}

async fn process_tasks(
    conn: &mut PgConnection,
    tasks: &[TaskPayload],
    existing: &HashMap<i64, Task>,
    materialized: &HashSet<i64>,
    stage_id_map: &HashMap<i64, i64>,
    project_id: i64,
    actor: &str,
) -> CascadeResult<HashMap<i64, i64>> {
    let mut id_map: HashMap<i64, i64> = HashMap::new();
    let payload_real_ids: HashSet<i64> = tasks.iter().filter(|t| !t.is_temp()).map(|t| t.id).collect();

    for task in tasks {
        // A temporary stage reference resolves through the stage map; if the
        // map has no entry the task is kept without a stage
        let resolved_stage_id = match task.stage_id {
            Some(stage_id) if stage_id <= 0 => match stage_id_map.get(&stage_id) {
                Some(real) => Some(*real),
                None => {
                    warn!(
                        task = %task.name,
                        temp_stage_id = stage_id,
                        "task references an unresolvable temporary stage id, keeping it unassigned"
                    );
                    None
                }
            },
            other => other,
        };

        let draft = task.to_draft(project_id, resolved_stage_id);
        if task.is_temp() {
            let real_id = Task::insert(&mut *conn, &draft, actor).await?;
            debug!(temp_id = task.id, real_id, name = %task.name, "task created");
            id_map.insert(task.id, real_id);
        } else if existing.contains_key(&task.id) {
            Task::update(&mut *conn, task.id, &draft, actor).await?;
        } else {
            let real_id = Task::insert(&mut *conn, &draft, actor).await?;
            warn!(
                claimed_id = task.id,
                real_id,
                name = %task.name,
                "payload task carried an unknown real id, created a new row"
            );
            id_map.insert(task.id, real_id);
        }
    }

    for (task_id, existing_task) in existing {
        if !payload_real_ids.contains(task_id) && existing_task.enable {
            if materialized.contains(task_id) {
                return Err(CascadeError::edit_restricted(format!(
                    "task '{}' already generated, cannot delete",
                    existing_task.name
                )));
            }
            debug!(task_id, name = %existing_task.name, "task soft-deleted");
            Task::soft_delete(&mut *conn, *task_id, actor).await?;
        }
    }

    Ok(id_map)
}

async fn rewrite_task_edges(
    conn: &mut PgConnection,
    tasks: &[TaskPayload],
    id_map: &HashMap<i64, i64>,
    materialized: &HashSet<i64>,
    actor: &str,
) -> CascadeResult<()> {
    for task in tasks {
        let Some(task_db_id) = resolve_id(task.id, id_map) else {
            continue;
        };

        let predecessors = rewrite_ids(&task.predecessor_tasks, id_map);
        let successors = rewrite_ids(&task.successor_tasks, id_map);

        let Some(current) = Task::find_live(&mut *conn, task_db_id).await? else {
            continue;
        };

        let predecessors_changed = !same_id_set(&predecessors, current.predecessors());
        let successors_changed = !same_id_set(&successors, current.successors());
        if !(predecessors_changed || successors_changed) {
            continue;
        }

        Task::update_edges(&mut *conn, task_db_id, &predecessors, &successors, actor).await?;
        debug!(task_id = task_db_id, ?predecessors, ?successors, "task edges rewritten");

        if successors_changed && materialized.contains(&task_db_id) {
            TaskExecution::update_successors(&mut *conn, task_db_id, &successors).await?;
        }
    }
    Ok(())
}

/// Map a payload id to its database id: positive ids pass through, temporary
/// ids resolve through the map created in the first pass
fn resolve_id(id: i64, id_map: &HashMap<i64, i64>) -> Option<i64> {
    if id > 0 {
        match id_map.get(&id) {
            // An unknown positive id was re-created under a fresh id
            Some(real) => Some(*real),
            None => Some(id),
        }
    } else {
        id_map.get(&id).copied()
    }
}

fn rewrite_ids(ids: &[i64], id_map: &HashMap<i64, i64>) -> Vec<i64> {
    ids.iter()
        .map(|id| id_map.get(id).copied().unwrap_or(*id))
        .collect()
}

fn same_id_set(a: &[i64], b: &[i64]) -> bool {
    let mut left = a.to_vec();
    let mut right = b.to_vec();
    left.sort_unstable();
    right.sort_unstable();
    left == right
}

/// Reject edits to frozen fields of materialized entities before any write
fn check_edit_restrictions(
    payload: &TaskConfigPayload,
    existing_stages: &HashMap<i64, Stage>,
    existing_tasks: &HashMap<i64, Task>,
    materialized_stages: &HashSet<i64>,
    materialized_tasks: &HashSet<i64>,
) -> CascadeResult<()> {
    for stage in &payload.stages {
        if stage.is_temp() || !materialized_stages.contains(&stage.id) {
            continue;
        }
        if let Some(existing) = existing_stages.get(&stage.id) {
            guard_stage_edit(stage, existing, materialized_stages)?;
        }
    }

    for task in &payload.tasks {
        if task.is_temp() || !materialized_tasks.contains(&task.id) {
            continue;
        }
        if let Some(existing) = existing_tasks.get(&task.id) {
            guard_task_edit(task, existing, materialized_tasks)?;
        }
    }

    Ok(())
}

/// Materialized stages: name and predecessor set are frozen; successor edges
/// may only gain not-yet-materialized targets. Dates and duration may still
/// change because new downstream tasks can widen a stage's window.
fn guard_stage_edit(
    stage: &StagePayload,
    existing: &Stage,
    materialized_stages: &HashSet<i64>,
) -> CascadeResult<()> {
    if stage.name != existing.name {
        return Err(CascadeError::edit_restricted(format!(
            "stage '{}' already generated, cannot rename it",
            existing.name
        )));
    }

    if !same_id_set(&stage.predecessor_stages, existing.predecessors()) {
        return Err(CascadeError::edit_restricted(format!(
            "stage '{}' already generated, cannot modify its predecessors",
            existing.name
        )));
    }

    for succ_id in &stage.successor_stages {
        if !existing.successors().contains(succ_id) && materialized_stages.contains(succ_id) {
            return Err(CascadeError::edit_restricted(format!(
                "stage '{}' already generated, only not-yet-generated stages may be added as successors",
                existing.name
            )));
        }
    }

    Ok(())
}

/// Materialized tasks: everything an owner or approver can see is frozen;
/// successor edges may only gain not-yet-materialized targets
fn guard_task_edit(
    task: &TaskPayload,
    existing: &Task,
    materialized_tasks: &HashSet<i64>,
) -> CascadeResult<()> {
    let payload_job_number = task
        .job_number
        .as_deref()
        .map(str::trim)
        .filter(|j| !j.is_empty());
    let existing_job_number = existing
        .job_number
        .as_deref()
        .map(str::trim)
        .filter(|j| !j.is_empty());
    let payload_approval_type = task.approval_type.map(|t| t.as_str());

    let basic_info_changed = task.name != existing.name
        || task.description.as_deref().unwrap_or("") != existing.description.as_deref().unwrap_or("")
        || task.start_time != existing.start_time
        || task.end_time != existing.end_time
        || task.duration != existing.duration
        || payload_job_number != existing_job_number
        || payload_approval_type != existing.approval_type.as_deref();

    if basic_info_changed {
        return Err(CascadeError::edit_restricted(format!(
            "task '{}' already generated, cannot modify basic info",
            existing.name
        )));
    }

    if !same_id_set(&task.approval_nodes, &existing.approval_nodes.0) {
        return Err(CascadeError::edit_restricted(format!(
            "task '{}' already generated, cannot modify its approval nodes",
            existing.name
        )));
    }

    if !same_id_set(&task.predecessor_tasks, existing.predecessors()) {
        return Err(CascadeError::edit_restricted(format!(
            "task '{}' already generated, cannot modify its predecessors",
            existing.name
        )));
    }

    for succ_id in &task.successor_tasks {
        if !existing.successors().contains(succ_id) && materialized_tasks.contains(succ_id) {
            return Err(CascadeError::edit_restricted(format!(
                "task '{}' already generated, only not-yet-generated tasks may be added as successors",
                existing.name
            )));
        }
    }

    Ok(())
}
