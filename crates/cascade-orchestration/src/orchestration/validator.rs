//! # Graph Validation
//!
//! Pure validation of a submitted project graph: self-loops, edge endpoint
//! existence, stage/task miscrossing and acyclicity, in that order, aborting
//! on the first failure with an error naming the offending entity. Time
//! ordering problems are collected as warnings and never block persistence.
//!
//! The per-task completeness checks used by the materialization engine and
//! the project counters also live here so both consumers agree on what
//! "generation-eligible" means.

use std::collections::{HashMap, HashSet};

use cascade_shared::models::{ApprovalType, Stage, StagePayload, Task, TaskConfigPayload, TaskPayload};
use cascade_shared::{CascadeError, CascadeResult};

/// Validate a payload. Returns the collected non-fatal time warnings.
pub fn validate_payload(payload: &TaskConfigPayload) -> CascadeResult<Vec<String>> {
    validate_stage_graph(&payload.stages)?;
    validate_task_graph(&payload.tasks)?;

    let mut warnings = stage_time_warnings(&payload.stages);
    warnings.extend(task_time_warnings(&payload.tasks));
    Ok(warnings)
}

fn validate_stage_graph(stages: &[StagePayload]) -> CascadeResult<()> {
    if stages.is_empty() {
        return Ok(());
    }

    let stage_map: HashMap<i64, &StagePayload> = stages.iter().map(|s| (s.id, s)).collect();

    // Self-loops
    for stage in stages {
        if stage.predecessor_stages.contains(&stage.id) {
            return Err(CascadeError::validation(format!(
                "stage '{}' lists itself as a predecessor",
                stage.name
            )));
        }
        if stage.successor_stages.contains(&stage.id) {
            return Err(CascadeError::validation(format!(
                "stage '{}' lists itself as a successor",
                stage.name
            )));
        }
    }

    // Edge endpoints must be stages of this payload
    for stage in stages {
        for pred_id in &stage.predecessor_stages {
            if !stage_map.contains_key(pred_id) {
                return Err(CascadeError::validation(format!(
                    "stage '{}' references predecessor {} which is not a stage; stages may only link to stages",
                    stage.name, pred_id
                )));
            }
        }
        for succ_id in &stage.successor_stages {
            if !stage_map.contains_key(succ_id) {
                return Err(CascadeError::validation(format!(
                    "stage '{}' references successor {} which is not a stage; stages may only link to stages",
                    stage.name, succ_id
                )));
            }
        }
    }

    // Acyclicity over the union of both edge directions
    let mut adjacency: HashMap<i64, Vec<i64>> = HashMap::new();
    for stage in stages {
        adjacency
            .entry(stage.id)
            .or_default()
            .extend(stage.successor_stages.iter().copied());
        for pred_id in &stage.predecessor_stages {
            let edges = adjacency.entry(*pred_id).or_default();
            if !edges.contains(&stage.id) {
                edges.push(stage.id);
            }
        }
    }

    let node_ids: Vec<i64> = stages.iter().map(|s| s.id).collect();
    if let Some(cycle_node) = find_cycle(&node_ids, &adjacency) {
        let name = stage_map
            .get(&cycle_node)
            .map(|s| s.name.clone())
            .unwrap_or_else(|| cycle_node.to_string());
        return Err(CascadeError::validation(format!(
            "cycle detected involving stage '{name}'; check its predecessor/successor relations"
        )));
    }

    Ok(())
}

fn validate_task_graph(tasks: &[TaskPayload]) -> CascadeResult<()> {
    if tasks.is_empty() {
        return Ok(());
    }

    let task_map: HashMap<i64, &TaskPayload> = tasks.iter().map(|t| (t.id, t)).collect();

    // A task outside any stage cannot carry edges
    for task in tasks {
        if task.stage_id.is_none()
            && (!task.predecessor_tasks.is_empty() || !task.successor_tasks.is_empty())
        {
            return Err(CascadeError::validation(format!(
                "task '{}' has no stage and cannot have predecessor or successor links",
                task.name
            )));
        }
    }

    // Self-loops
    for task in tasks {
        if task.predecessor_tasks.contains(&task.id) {
            return Err(CascadeError::validation(format!(
                "task '{}' lists itself as a predecessor",
                task.name
            )));
        }
        if task.successor_tasks.contains(&task.id) {
            return Err(CascadeError::validation(format!(
                "task '{}' lists itself as a successor",
                task.name
            )));
        }
    }

    // Edge endpoints must be tasks of this payload
    for task in tasks {
        for pred_id in &task.predecessor_tasks {
            if !task_map.contains_key(pred_id) {
                return Err(CascadeError::validation(format!(
                    "task '{}' references predecessor {} which is not a task; tasks may only link to tasks",
                    task.name, pred_id
                )));
            }
        }
        for succ_id in &task.successor_tasks {
            if !task_map.contains_key(succ_id) {
                return Err(CascadeError::validation(format!(
                    "task '{}' references successor {} which is not a task; tasks may only link to tasks",
                    task.name, succ_id
                )));
            }
        }
    }

    // Group by stage; edges must stay inside one stage, and each stage's
    // task graph must be acyclic
    let mut tasks_by_stage: HashMap<i64, Vec<&TaskPayload>> = HashMap::new();
    for task in tasks {
        if let Some(stage_id) = task.stage_id {
            tasks_by_stage.entry(stage_id).or_default().push(task);
        }
    }

    for stage_tasks in tasks_by_stage.values() {
        let stage_task_ids: HashSet<i64> = stage_tasks.iter().map(|t| t.id).collect();
        let mut adjacency: HashMap<i64, Vec<i64>> = HashMap::new();

        for task in stage_tasks {
            let edges = adjacency.entry(task.id).or_default();
            for succ_id in &task.successor_tasks {
                if !stage_task_ids.contains(succ_id) {
                    return Err(CascadeError::validation(format!(
                        "cross-stage task link: task '{}' and task {} belong to different stages",
                        task.name, succ_id
                    )));
                }
                edges.push(*succ_id);
            }
            for pred_id in &task.predecessor_tasks {
                if !stage_task_ids.contains(pred_id) {
                    return Err(CascadeError::validation(format!(
                        "cross-stage task link: task '{}' and task {} belong to different stages",
                        task.name, pred_id
                    )));
                }
                let edges = adjacency.entry(*pred_id).or_default();
                if !edges.contains(&task.id) {
                    edges.push(task.id);
                }
            }
        }

        let node_ids: Vec<i64> = stage_tasks.iter().map(|t| t.id).collect();
        if let Some(cycle_node) = find_cycle(&node_ids, &adjacency) {
            let name = task_map
                .get(&cycle_node)
                .map(|t| t.name.clone())
                .unwrap_or_else(|| cycle_node.to_string());
            return Err(CascadeError::validation(format!(
                "cycle detected involving task '{name}'; check its predecessor/successor relations"
            )));
        }
    }

    Ok(())
}

/// Three-color DFS over the adjacency map. Returns a node on the first
/// detected cycle, or None when the graph is acyclic.
fn find_cycle(nodes: &[i64], adjacency: &HashMap<i64, Vec<i64>>) -> Option<i64> {
    const WHITE: u8 = 0;
    const GRAY: u8 = 1;
    const BLACK: u8 = 2;

    let mut color: HashMap<i64, u8> = nodes.iter().map(|&n| (n, WHITE)).collect();

    for &start in nodes {
        if color.get(&start).copied() != Some(WHITE) {
            continue;
        }
        let mut stack: Vec<(i64, usize)> = vec![(start, 0)];
        color.insert(start, GRAY);

        while let Some(&(node, index)) = stack.last() {
            let children = adjacency.get(&node).map(Vec::as_slice).unwrap_or(&[]);
            if index < children.len() {
                if let Some(frame) = stack.last_mut() {
                    frame.1 += 1;
                }
                let child = children[index];
                match color.get(&child).copied() {
                    Some(GRAY) => return Some(child),
                    Some(WHITE) => {
                        color.insert(child, GRAY);
                        stack.push((child, 0));
                    }
                    _ => {}
                }
            } else {
                color.insert(node, BLACK);
                stack.pop();
            }
        }
    }

    None
}

fn stage_time_warnings(stages: &[StagePayload]) -> Vec<String> {
    let stage_map: HashMap<i64, &StagePayload> = stages.iter().map(|s| (s.id, s)).collect();
    let mut warnings = Vec::new();

    for stage in stages {
        if let Some(start) = stage.start_time {
            for pred_id in &stage.predecessor_stages {
                if let Some(pred) = stage_map.get(pred_id) {
                    if let Some(pred_end) = pred.end_time {
                        if start <= pred_end {
                            warnings.push(format!(
                                "stage '{}' starts on {} which is not after predecessor '{}' ending on {}",
                                stage.name, start, pred.name, pred_end
                            ));
                            break;
                        }
                    }
                }
            }
        }
        if let Some(end) = stage.end_time {
            for succ_id in &stage.successor_stages {
                if let Some(succ) = stage_map.get(succ_id) {
                    if let Some(succ_start) = succ.start_time {
                        if end >= succ_start {
                            warnings.push(format!(
                                "stage '{}' ends on {} which is not before successor '{}' starting on {}",
                                stage.name, end, succ.name, succ_start
                            ));
                            break;
                        }
                    }
                }
            }
        }
    }

    warnings
}

fn task_time_warnings(tasks: &[TaskPayload]) -> Vec<String> {
    let task_map: HashMap<i64, &TaskPayload> = tasks.iter().map(|t| (t.id, t)).collect();
    let mut warnings = Vec::new();

    for task in tasks {
        if let Some(start) = task.start_time {
            for pred_id in &task.predecessor_tasks {
                if let Some(pred) = task_map.get(pred_id) {
                    if let Some(pred_end) = pred.end_time {
                        if start <= pred_end {
                            warnings.push(format!(
                                "task '{}' starts on {} which is not after predecessor '{}' ending on {}",
                                task.name, start, pred.name, pred_end
                            ));
                            break;
                        }
                    }
                }
            }
        }
        if let Some(end) = task.end_time {
            for succ_id in &task.successor_tasks {
                if let Some(succ) = task_map.get(succ_id) {
                    if let Some(succ_start) = succ.start_time {
                        if end >= succ_start {
                            warnings.push(format!(
                                "task '{}' ends on {} which is not before successor '{}' starting on {}",
                                task.name, end, succ.name, succ_start
                            ));
                            break;
                        }
                    }
                }
            }
        }
    }

    warnings
}

/// Outcome of the per-task completeness check over a persisted plan task
#[derive(Debug, Clone, Copy, Default)]
pub struct TaskCheck {
    pub missing_info: bool,
    pub unassigned: bool,
    pub time_error: bool,
}

impl TaskCheck {
    pub fn is_valid(&self) -> bool {
        !(self.missing_info || self.unassigned || self.time_error)
    }
}

/// Check a plan task for generation eligibility: owner, dates and approval
/// nodes present, a stage assigned, and no time contradiction with itself or
/// its adjacent tasks.
pub fn check_plan_task(task: &Task, task_map: &HashMap<i64, &Task>) -> TaskCheck {
    let mut check = TaskCheck::default();

    let job_number_missing = task
        .job_number
        .as_deref()
        .map(|j| j.trim().is_empty())
        .unwrap_or(true);

    let approval_type = ApprovalType::from_db(task.approval_type.as_deref());
    let nodes_missing = match approval_type {
        Some(ApprovalType::None) => false,
        _ => task.approval_nodes.0.is_empty(),
    };

    if job_number_missing || task.start_time.is_none() || task.end_time.is_none() || nodes_missing {
        check.missing_info = true;
    }

    if task.stage_id.is_none() {
        check.unassigned = true;
    }

    check.time_error = plan_task_time_error(task, task_map);
    check
}

fn plan_task_time_error(task: &Task, task_map: &HashMap<i64, &Task>) -> bool {
    if let (Some(start), Some(end)) = (task.start_time, task.end_time) {
        if start > end {
            return true;
        }
    }

    if let Some(start) = task.start_time {
        for pred_id in task.predecessors() {
            if let Some(pred) = task_map.get(pred_id) {
                if let Some(pred_end) = pred.end_time {
                    if start <= pred_end {
                        return true;
                    }
                }
            }
        }
    }

    if let Some(end) = task.end_time {
        for succ_id in task.successors() {
            if let Some(succ) = task_map.get(succ_id) {
                if let Some(succ_start) = succ.start_time {
                    if end >= succ_start {
                        return true;
                    }
                }
            }
        }
    }

    false
}

/// Whether a plan stage has a time contradiction with its neighbors
pub fn plan_stage_time_error(stage: &Stage, stage_map: &HashMap<i64, &Stage>) -> bool {
    if let Some(start) = stage.start_time {
        for pred_id in stage.predecessors() {
            if let Some(pred) = stage_map.get(pred_id) {
                if let Some(pred_end) = pred.end_time {
                    if start <= pred_end {
                        return true;
                    }
                }
            }
        }
    }
    if let Some(end) = stage.end_time {
        for succ_id in stage.successors() {
            if let Some(succ) = stage_map.get(succ_id) {
                if let Some(succ_start) = succ.start_time {
                    if end >= succ_start {
                        return true;
                    }
                }
            }
        }
    }
    false
}

/// Per-project validation counters for the summary view
#[derive(Debug, Clone, Copy, Default)]
pub struct ProjectCounters {
    pub missing_info_count: u32,
    pub time_relation_error_count: u32,
    pub unassigned_count: u32,
}

impl ProjectCounters {
    pub fn has_errors(&self) -> bool {
        self.missing_info_count > 0 || self.time_relation_error_count > 0 || self.unassigned_count > 0
    }
}

/// Aggregate validation counters over one project's live plan rows
pub fn project_counters(stages: &[Stage], tasks: &[Task]) -> ProjectCounters {
    let task_map: HashMap<i64, &Task> = tasks.iter().map(|t| (t.task_id, t)).collect();
    let stage_map: HashMap<i64, &Stage> = stages.iter().map(|s| (s.stage_id, s)).collect();
    let mut counters = ProjectCounters::default();

    for task in tasks {
        let check = check_plan_task(task, &task_map);
        if check.missing_info {
            counters.missing_info_count += 1;
        }
        if check.unassigned {
            counters.unassigned_count += 1;
        }
        if check.time_error {
            counters.time_relation_error_count += 1;
        }
    }

    for stage in stages {
        if plan_stage_time_error(stage, &stage_map) {
            counters.time_relation_error_count += 1;
        }
    }

    counters
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    fn payload(value: serde_json::Value) -> TaskConfigPayload {
        serde_json::from_value(value).unwrap()
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn accepts_a_valid_linear_graph() {
        let payload = payload(json!({
            "projectId": 1,
            "stages": [
                {"id": -1, "name": "S1", "startTime": "2025-01-01", "endTime": "2025-01-05",
                 "successorStages": [-2]},
                {"id": -2, "name": "S2", "startTime": "2025-01-06", "endTime": "2025-01-10",
                 "predecessorStages": [-1]}
            ],
            "tasks": [
                {"id": -10, "name": "T1", "stageId": -1, "successorTasks": [-11]},
                {"id": -11, "name": "T2", "stageId": -1, "predecessorTasks": [-10]}
            ]
        }));
        let warnings = validate_payload(&payload).unwrap();
        assert!(warnings.is_empty());
    }

    #[test]
    fn rejects_stage_self_loop() {
        let payload = payload(json!({
            "projectId": 1,
            "stages": [{"id": 1, "name": "S1", "predecessorStages": [1]}],
            "tasks": []
        }));
        let err = validate_payload(&payload).unwrap_err();
        assert!(err.to_string().contains("S1"));
        assert!(err.to_string().contains("itself"));
    }

    #[test]
    fn rejects_unknown_stage_edge_endpoint() {
        let payload = payload(json!({
            "projectId": 1,
            "stages": [{"id": 1, "name": "S1", "successorStages": [99]}],
            "tasks": []
        }));
        let err = validate_payload(&payload).unwrap_err();
        assert!(err.to_string().contains("99"));
    }

    #[test]
    fn rejects_stage_cycle() {
        let payload = payload(json!({
            "projectId": 1,
            "stages": [
                {"id": 1, "name": "S1", "successorStages": [2]},
                {"id": 2, "name": "S2", "successorStages": [1]}
            ],
            "tasks": []
        }));
        let err = validate_payload(&payload).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("cycle"));
        assert!(message.contains("S1") || message.contains("S2"));
    }

    #[test]
    fn detects_cycle_expressed_only_through_predecessors() {
        let payload = payload(json!({
            "projectId": 1,
            "stages": [
                {"id": 1, "name": "S1", "predecessorStages": [2]},
                {"id": 2, "name": "S2", "predecessorStages": [1]}
            ],
            "tasks": []
        }));
        assert!(validate_payload(&payload).is_err());
    }

    #[test]
    fn rejects_cross_stage_task_link() {
        let payload = payload(json!({
            "projectId": 1,
            "stages": [
                {"id": 1, "name": "S1"},
                {"id": 2, "name": "S2"}
            ],
            "tasks": [
                {"id": 10, "name": "T1", "stageId": 1, "successorTasks": [20]},
                {"id": 20, "name": "T2", "stageId": 2, "predecessorTasks": [10]}
            ]
        }));
        let err = validate_payload(&payload).unwrap_err();
        assert!(err.to_string().contains("cross-stage task link"));
    }

    #[test]
    fn rejects_edges_on_unassigned_task() {
        let payload = payload(json!({
            "projectId": 1,
            "stages": [{"id": 1, "name": "S1"}],
            "tasks": [
                {"id": 10, "name": "T1", "stageId": 1},
                {"id": 20, "name": "floating", "successorTasks": [10]}
            ]
        }));
        let err = validate_payload(&payload).unwrap_err();
        assert!(err.to_string().contains("floating"));
        assert!(err.to_string().contains("no stage"));
    }

    #[test]
    fn rejects_task_cycle_within_a_stage() {
        let payload = payload(json!({
            "projectId": 1,
            "stages": [{"id": 1, "name": "S1"}],
            "tasks": [
                {"id": 10, "name": "T1", "stageId": 1, "successorTasks": [20]},
                {"id": 20, "name": "T2", "stageId": 1, "successorTasks": [10]}
            ]
        }));
        let err = validate_payload(&payload).unwrap_err();
        assert!(err.to_string().contains("cycle"));
    }

    #[test]
    fn time_violations_warn_but_do_not_block() {
        let payload = payload(json!({
            "projectId": 1,
            "stages": [
                {"id": 1, "name": "S1", "startTime": "2025-01-01", "endTime": "2025-01-10",
                 "successorStages": [2]},
                {"id": 2, "name": "S2", "startTime": "2025-01-05", "endTime": "2025-01-15",
                 "predecessorStages": [1]}
            ],
            "tasks": []
        }));
        let warnings = validate_payload(&payload).unwrap();
        assert!(!warnings.is_empty());
        assert!(warnings.iter().any(|w| w.contains("S2") || w.contains("S1")));
    }

    fn plan_task(task_id: i64, stage_id: Option<i64>) -> Task {
        Task {
            task_id,
            project_id: 1,
            stage_id,
            name: format!("T{task_id}"),
            description: None,
            start_time: Some(date("2025-01-01")),
            end_time: Some(date("2025-01-05")),
            duration: Some(5),
            job_number: Some("E001".to_string()),
            predecessor_tasks: sqlx::types::Json(vec![]),
            successor_tasks: sqlx::types::Json(vec![]),
            position: None,
            approval_type: Some("specified".to_string()),
            approval_nodes: sqlx::types::Json(vec![500]),
            enable: true,
            create_by: None,
            create_time: None,
            update_by: None,
            update_time: None,
        }
    }

    #[test]
    fn complete_task_passes_the_check() {
        let task = plan_task(1, Some(7));
        let map = HashMap::from([(1, &task)]);
        assert!(check_plan_task(&task, &map).is_valid());
    }

    #[test]
    fn missing_owner_or_nodes_fails_the_check() {
        let mut task = plan_task(1, Some(7));
        task.job_number = None;
        let map = HashMap::new();
        assert!(check_plan_task(&task, &map).missing_info);

        let mut task = plan_task(2, Some(7));
        task.approval_nodes = sqlx::types::Json(vec![]);
        assert!(check_plan_task(&task, &map).missing_info);

        // approval_type none tolerates an empty node list
        let mut task = plan_task(3, Some(7));
        task.approval_type = Some("none".to_string());
        task.approval_nodes = sqlx::types::Json(vec![]);
        assert!(check_plan_task(&task, &map).is_valid());
    }

    #[test]
    fn unassigned_task_fails_the_check() {
        let task = plan_task(1, None);
        let map = HashMap::from([(1, &task)]);
        let check = check_plan_task(&task, &map);
        assert!(check.unassigned);
        assert!(!check.is_valid());
    }

    #[test]
    fn inverted_dates_fail_the_check() {
        let mut task = plan_task(1, Some(7));
        task.start_time = Some(date("2025-02-01"));
        task.end_time = Some(date("2025-01-01"));
        let map = HashMap::new();
        assert!(check_plan_task(&task, &map).time_error);
    }

    #[test]
    fn predecessor_overlap_fails_the_check() {
        let mut upstream = plan_task(1, Some(7));
        upstream.end_time = Some(date("2025-01-10"));
        let mut task = plan_task(2, Some(7));
        task.start_time = Some(date("2025-01-08"));
        task.end_time = Some(date("2025-01-20"));
        task.predecessor_tasks = sqlx::types::Json(vec![1]);
        let map = HashMap::from([(1, &upstream)]);
        assert!(check_plan_task(&task, &map).time_error);
    }

    #[test]
    fn project_counters_aggregate_per_task() {
        let healthy = plan_task(1, Some(7));
        let mut unowned = plan_task(2, Some(7));
        unowned.job_number = None;
        let floating = plan_task(3, None);
        let tasks = vec![healthy, unowned, floating];
        let counters = project_counters(&[], &tasks);
        assert_eq!(counters.missing_info_count, 1);
        assert_eq!(counters.unassigned_count, 1);
        assert_eq!(counters.time_relation_error_count, 0);
        assert!(counters.has_errors());
    }
}
