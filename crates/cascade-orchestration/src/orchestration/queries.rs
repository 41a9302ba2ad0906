//! # Query Projections
//!
//! Read-side views joining execution state with the directory: per-user task
//! lists and category counters, task detail with the full approval history,
//! project summaries with validation counters, and the workbench counters.
//! All functions read through the pool without row locks and may observe a
//! slightly stale view.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use cascade_shared::models::directory::second_level_dept_code;
use cascade_shared::models::{
    Application, ApprovalLog, ApprovalResult, ApprovalRule, Department, Employee, ProjectDictEntry,
    Stage, StageExecution, Task, TaskExecution, TaskStatus, TaskSubmission,
};
use cascade_shared::{CascadeError, CascadeResult};

use crate::orchestration::validator;

/// Statuses shown in the my-tasks views: pending submit, in approval,
/// rejected
const OPEN_STATUSES: [i16; 3] = [1, 2, 4];

// ---------------------------------------------------------------------------
// Project summaries and full project detail
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSummary {
    pub project_id: i64,
    pub project_name: String,
    pub stage_count: u32,
    pub task_count: u32,
    pub project_status: &'static str,
    pub missing_info_count: u32,
    pub time_relation_error_count: u32,
    pub unassigned_stage_count: u32,
    pub tasks_generated: bool,
}

/// Project summaries for every project known to the dictionary or carrying
/// plan rows
pub async fn project_summaries(pool: &PgPool) -> CascadeResult<Vec<ProjectSummary>> {
    let dictionary = ProjectDictEntry::all(pool).await?;
    let stages = Stage::all_live(pool).await?;
    let tasks = Task::all_live(pool).await?;
    let generated: HashSet<i64> = TaskExecution::generated_project_ids(pool)
        .await?
        .into_iter()
        .collect();

    let mut stages_by_project: BTreeMap<i64, Vec<Stage>> = BTreeMap::new();
    for stage in stages {
        stages_by_project.entry(stage.project_id).or_default().push(stage);
    }
    let mut tasks_by_project: BTreeMap<i64, Vec<Task>> = BTreeMap::new();
    for task in tasks {
        tasks_by_project.entry(task.project_id).or_default().push(task);
    }

    let mut summaries = Vec::new();
    let mut seen: HashSet<i64> = HashSet::new();

    let dictionary_names: HashMap<i64, String> = dictionary
        .iter()
        .map(|entry| (entry.project_id, entry.name.clone()))
        .collect();

    let mut project_ids: Vec<i64> = dictionary.iter().map(|e| e.project_id).collect();
    for project_id in stages_by_project.keys().chain(tasks_by_project.keys()) {
        if !project_ids.contains(project_id) {
            project_ids.push(*project_id);
        }
    }

    for project_id in project_ids {
        if !seen.insert(project_id) {
            continue;
        }
        let project_stages = stages_by_project.get(&project_id).map(Vec::as_slice).unwrap_or(&[]);
        let project_tasks = tasks_by_project.get(&project_id).map(Vec::as_slice).unwrap_or(&[]);

        let (status, counters) = if project_stages.is_empty() && project_tasks.is_empty() {
            ("unconfigured", validator::ProjectCounters::default())
        } else {
            let counters = validator::project_counters(project_stages, project_tasks);
            let status = if counters.has_errors() { "abnormal" } else { "normal" };
            (status, counters)
        };

        summaries.push(ProjectSummary {
            project_id,
            project_name: dictionary_names
                .get(&project_id)
                .cloned()
                .unwrap_or_else(|| project_id.to_string()),
            stage_count: project_stages.len() as u32,
            task_count: project_tasks.len() as u32,
            project_status: status,
            missing_info_count: counters.missing_info_count,
            time_relation_error_count: counters.time_relation_error_count,
            unassigned_stage_count: counters.unassigned_count,
            tasks_generated: generated.contains(&project_id),
        });
    }

    Ok(summaries)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectDetail {
    pub project_id: i64,
    pub tasks_generated: bool,
    pub stages: Vec<StageView>,
    pub tasks: Vec<TaskView>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageView {
    pub id: i64,
    pub name: String,
    pub start_time: Option<NaiveDate>,
    pub end_time: Option<NaiveDate>,
    pub duration: Option<i32>,
    pub predecessor_stages: Vec<i64>,
    pub successor_stages: Vec<i64>,
    pub position: Option<serde_json::Value>,
    pub is_editable: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskView {
    pub id: i64,
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
    pub is_editable: bool,
}

/// The full plan of one project with per-entity editability
pub async fn project_detail(pool: &PgPool, project_id: i64) -> CascadeResult<ProjectDetail> {
    let stages = Stage::for_project(pool, project_id).await?;
    let tasks = Task::for_project(pool, project_id).await?;

    let materialized_stages: HashSet<i64> = StageExecution::for_project(pool, project_id)
        .await?
        .into_iter()
        .map(|s| s.stage_id)
        .collect();
    let task_executions = TaskExecution::for_project(pool, project_id).await?;
    let materialized_tasks: HashSet<i64> =
        task_executions.iter().map(|t| t.task_id).collect();

    let stages = stages
        .into_iter()
        .map(|stage| StageView {
            is_editable: !materialized_stages.contains(&stage.stage_id),
            id: stage.stage_id,
            name: stage.name,
            start_time: stage.start_time,
            end_time: stage.end_time,
            duration: stage.duration,
            predecessor_stages: stage.predecessor_stages.0,
            successor_stages: stage.successor_stages.0,
            position: stage.position.map(|p| p.0),
        })
        .collect();

    let tasks = tasks
        .into_iter()
        .map(|task| TaskView {
            is_editable: !materialized_tasks.contains(&task.task_id),
            id: task.task_id,
            stage_id: task.stage_id,
            name: task.name,
            description: task.description,
            start_time: task.start_time,
            end_time: task.end_time,
            duration: task.duration,
            job_number: task.job_number,
            predecessor_tasks: task.predecessor_tasks.0,
            successor_tasks: task.successor_tasks.0,
            position: task.position.map(|p| p.0),
            approval_type: task.approval_type,
            approval_nodes: task.approval_nodes.0,
        })
        .collect();

    Ok(ProjectDetail {
        project_id,
        tasks_generated: !task_executions.is_empty(),
        stages,
        tasks,
    })
}

// ---------------------------------------------------------------------------
// Task lists and categories
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TaskListFilter {
    pub project_id: Option<i64>,
    pub dept_id: Option<i64>,
    pub task_status: Option<i16>,
    pub page_num: Option<u32>,
    pub page_size: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskListPage {
    pub total: usize,
    pub page_num: u32,
    pub page_size: u32,
    pub rows: Vec<TaskListItem>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskListItem {
    pub task_id: i64,
    pub project_id: i64,
    pub project_name: String,
    pub stage_id: Option<i64>,
    pub name: String,
    pub task_status: i16,
    pub status_label: String,
    pub job_number: Option<String>,
    pub owner_name: Option<String>,
    pub dept_id: Option<i64>,
    pub dept_name: Option<String>,
    pub start_time: Option<NaiveDate>,
    pub end_time: Option<NaiveDate>,
    pub actual_start_time: Option<DateTime<Utc>>,
    pub actual_complete_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryItem {
    pub key: i64,
    pub label: String,
    pub count: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryGroup {
    pub total: usize,
    pub items: Vec<CategoryItem>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskCategories {
    pub project: CategoryGroup,
    pub department: CategoryGroup,
    pub status: CategoryGroup,
}

/// Open tasks the viewer owns or needs to approve, filtered and paginated
pub async fn my_tasks_list(
    pool: &PgPool,
    viewer: &str,
    filter: &TaskListFilter,
) -> CascadeResult<TaskListPage> {
    let executions = my_tasks_union(pool, viewer).await?;
    let items = enrich_task_rows(pool, executions).await?;
    Ok(filter_and_paginate(items, filter))
}

/// Category counters over the same union the list shows
pub async fn my_task_categories(pool: &PgPool, viewer: &str) -> CascadeResult<TaskCategories> {
    let executions = my_tasks_union(pool, viewer).await?;
    let items = enrich_task_rows(pool, executions).await?;
    Ok(categorize(&items))
}

/// Completed tasks owned by the viewer, paginated
pub async fn history_tasks_list(
    pool: &PgPool,
    viewer: &str,
    filter: &TaskListFilter,
) -> CascadeResult<TaskListPage> {
    let executions =
        TaskExecution::owned_with_statuses(pool, viewer, &[TaskStatus::Completed.as_i16()]).await?;
    let items = enrich_task_rows(pool, executions).await?;
    Ok(filter_and_paginate(items, filter))
}

pub async fn history_task_categories(pool: &PgPool, viewer: &str) -> CascadeResult<TaskCategories> {
    let executions =
        TaskExecution::owned_with_statuses(pool, viewer, &[TaskStatus::Completed.as_i16()]).await?;
    let items = enrich_task_rows(pool, executions).await?;
    Ok(categorize(&items))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkbenchStats {
    pub pending_submit: usize,
    pub in_approval: usize,
    pub awaiting_approval: usize,
    pub rejected: usize,
    pub completed: usize,
}

/// Workbench counters for the viewer
pub async fn workbench_stats(pool: &PgPool, viewer: &str) -> CascadeResult<WorkbenchStats> {
    let owned = TaskExecution::owned_with_statuses(pool, viewer, &[1, 2, 3, 4]).await?;

    let mut stats = WorkbenchStats {
        pending_submit: 0,
        in_approval: 0,
        awaiting_approval: 0,
        rejected: 0,
        completed: 0,
    };
    for execution in &owned {
        match execution.task_status {
            TaskStatus::InProgress => stats.pending_submit += 1,
            TaskStatus::Submitted => stats.in_approval += 1,
            TaskStatus::Rejected => stats.rejected += 1,
            TaskStatus::Completed => stats.completed += 1,
            TaskStatus::NotStarted => {}
        }
    }

    if let Some(employee) = Employee::find_active_by_job_number(pool, viewer).await? {
        if let Some(organization_id) = employee.organization_id {
            stats.awaiting_approval =
                TaskSubmission::execution_ids_awaiting_position(pool, organization_id)
                    .await?
                    .len();
        }
    }

    Ok(stats)
}

/// Union of (a) executions the viewer owns in an open status and (b)
/// executions with an application waiting on the viewer's position
async fn my_tasks_union(pool: &PgPool, viewer: &str) -> CascadeResult<Vec<TaskExecution>> {
    let mut union: BTreeMap<i64, TaskExecution> = BTreeMap::new();

    for execution in TaskExecution::owned_with_statuses(pool, viewer, &OPEN_STATUSES).await? {
        union.insert(execution.id, execution);
    }

    if let Some(employee) = Employee::find_active_by_job_number(pool, viewer).await? {
        if let Some(organization_id) = employee.organization_id {
            let execution_ids =
                TaskSubmission::execution_ids_awaiting_position(pool, organization_id).await?;
            if !execution_ids.is_empty() {
                for execution in TaskExecution::by_ids(pool, &execution_ids).await? {
                    if OPEN_STATUSES.contains(&execution.task_status.as_i16()) {
                        union.entry(execution.id).or_insert(execution);
                    }
                }
            }
        }
    }

    Ok(union.into_values().collect())
}

/// Join execution rows with the project dictionary and the directory to
/// produce display rows. The department shown is the owner's second-level
/// department (five-character code prefix).
async fn enrich_task_rows(
    pool: &PgPool,
    executions: Vec<TaskExecution>,
) -> CascadeResult<Vec<TaskListItem>> {
    let project_names: HashMap<i64, String> = ProjectDictEntry::all(pool)
        .await?
        .into_iter()
        .map(|entry| (entry.project_id, entry.name))
        .collect();

    let job_numbers: Vec<String> = executions
        .iter()
        .filter_map(|e| e.job_number.clone())
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();

    let employees: HashMap<String, Employee> = if job_numbers.is_empty() {
        HashMap::new()
    } else {
        Employee::by_job_numbers(pool, &job_numbers)
            .await?
            .into_iter()
            .map(|e| (e.job_number.clone(), e))
            .collect()
    };

    let organization_ids: Vec<i64> = employees
        .values()
        .filter_map(|e| e.organization_id)
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();

    let departments: HashMap<i64, Department> = if organization_ids.is_empty() {
        HashMap::new()
    } else {
        Department::by_ids(pool, &organization_ids)
            .await?
            .into_iter()
            .map(|d| (d.id, d))
            .collect()
    };

    let second_level_codes: Vec<String> = departments
        .values()
        .filter_map(|d| d.code.as_deref())
        .filter_map(second_level_dept_code)
        .map(str::to_string)
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();

    let second_level_departments: HashMap<String, Department> = if second_level_codes.is_empty() {
        HashMap::new()
    } else {
        Department::by_codes(pool, &second_level_codes)
            .await?
            .into_iter()
            .filter_map(|d| d.code.clone().map(|code| (code, d)))
            .collect()
    };

    let items = executions
        .into_iter()
        .map(|execution| {
            let (owner_name, dept_id, dept_name) = execution
                .job_number
                .as_deref()
                .and_then(|job_number| employees.get(job_number))
                .map(|employee| {
                    let second_level = employee
                        .organization_id
                        .and_then(|org| departments.get(&org))
                        .and_then(|dept| dept.code.as_deref())
                        .and_then(second_level_dept_code)
                        .and_then(|code| second_level_departments.get(code));
                    (
                        employee.name.clone(),
                        second_level.map(|d| d.id),
                        second_level.and_then(|d| d.name.clone()),
                    )
                })
                .unwrap_or((None, None, None));

            TaskListItem {
                task_id: execution.task_id,
                project_id: execution.project_id,
                project_name: project_names
                    .get(&execution.project_id)
                    .cloned()
                    .unwrap_or_else(|| execution.project_id.to_string()),
                stage_id: execution.stage_id,
                name: execution.name,
                task_status: execution.task_status.as_i16(),
                status_label: execution.task_status.label().to_string(),
                job_number: execution.job_number,
                owner_name,
                dept_id,
                dept_name,
                start_time: execution.start_time,
                end_time: execution.end_time,
                actual_start_time: execution.actual_start_time,
                actual_complete_time: execution.actual_complete_time,
            }
        })
        .collect();

    Ok(items)
}

fn filter_and_paginate(items: Vec<TaskListItem>, filter: &TaskListFilter) -> TaskListPage {
    let filtered: Vec<TaskListItem> = items
        .into_iter()
        .filter(|item| {
            filter.project_id.is_none_or(|p| item.project_id == p)
                && filter.task_status.is_none_or(|s| item.task_status == s)
                && filter.dept_id.is_none_or(|d| item.dept_id == Some(d))
        })
        .collect();

    let page_num = filter.page_num.unwrap_or(1).max(1);
    let page_size = filter.page_size.unwrap_or(10).clamp(1, 100);
    let total = filtered.len();

    let start = ((page_num - 1) * page_size) as usize;
    let rows = filtered
        .into_iter()
        .skip(start)
        .take(page_size as usize)
        .collect();

    TaskListPage {
        total,
        page_num,
        page_size,
        rows,
    }
}

fn categorize(items: &[TaskListItem]) -> TaskCategories {
    let mut by_project: BTreeMap<i64, CategoryItem> = BTreeMap::new();
    let mut by_department: BTreeMap<i64, CategoryItem> = BTreeMap::new();
    let mut by_status: BTreeMap<i64, CategoryItem> = BTreeMap::new();

    for item in items {
        by_project
            .entry(item.project_id)
            .or_insert_with(|| CategoryItem {
                key: item.project_id,
                label: item.project_name.clone(),
                count: 0,
            })
            .count += 1;

        if let Some(dept_id) = item.dept_id {
            by_department
                .entry(dept_id)
                .or_insert_with(|| CategoryItem {
                    key: dept_id,
                    label: item.dept_name.clone().unwrap_or_else(|| dept_id.to_string()),
                    count: 0,
                })
                .count += 1;
        }

        by_status
            .entry(item.task_status as i64)
            .or_insert_with(|| CategoryItem {
                key: item.task_status as i64,
                label: item.status_label.clone(),
                count: 0,
            })
            .count += 1;
    }

    TaskCategories {
        project: CategoryGroup {
            total: items.len(),
            items: by_project.into_values().collect(),
        },
        department: CategoryGroup {
            total: items.len(),
            items: by_department.into_values().collect(),
        },
        status: CategoryGroup {
            total: items.len(),
            items: by_status.into_values().collect(),
        },
    }
}

// ---------------------------------------------------------------------------
// Task detail with approval history
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDetailView {
    pub task_id: i64,
    pub project_id: i64,
    pub project_name: String,
    pub stage_id: Option<i64>,
    pub stage_name: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub start_time: Option<NaiveDate>,
    pub end_time: Option<NaiveDate>,
    pub duration: Option<i32>,
    pub job_number: Option<String>,
    pub owner_name: Option<String>,
    pub dept_name: Option<String>,
    pub task_status: i16,
    pub status_label: String,
    pub actual_start_time: Option<DateTime<Utc>>,
    pub actual_complete_time: Option<DateTime<Utc>>,
    pub approval_type: Option<String>,
    pub approval_nodes: Vec<i64>,
    pub applications: Vec<ApplicationView>,
    pub predecessors: Vec<TaskBrief>,
    pub successors: Vec<TaskBrief>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationView {
    pub apply_id: String,
    pub apply_status: i16,
    pub submit_text: Option<String>,
    pub submit_images: Vec<String>,
    pub submit_time: Option<DateTime<Utc>>,
    pub nodes: Vec<ApprovalNodeView>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalNodeView {
    pub node: i64,
    pub node_name: Option<String>,
    /// approved | rejected | current | pending
    pub status: &'static str,
    pub approver: Option<String>,
    pub comment: Option<String>,
    pub images: Vec<String>,
    pub decided_at: Option<DateTime<Utc>>,
}

/// A neighbor task projection; tasks on the plan with no execution get the
/// pseudo-status "not-generated"
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskBrief {
    pub task_id: i64,
    pub name: String,
    pub job_number: Option<String>,
    pub start_time: Option<NaiveDate>,
    pub end_time: Option<NaiveDate>,
    pub task_status: Option<i16>,
    pub status_label: String,
}

/// Full detail of one generated task: plan, execution, every application
/// ever opened for it, and enriched neighbor projections
pub async fn task_detail(pool: &PgPool, task_id: i64) -> CascadeResult<TaskDetailView> {
    let execution = TaskExecution::find_by_task_id(pool, task_id)
        .await?
        .ok_or_else(|| CascadeError::not_found(format!("task {task_id} has not been generated")))?;

    let plan_task = Task::find_live(pool, task_id).await?;

    let stage_name = match execution.stage_id {
        Some(stage_id) => Stage::find_live(pool, stage_id).await?.map(|s| s.name),
        None => None,
    };

    let project_name = ProjectDictEntry::all(pool)
        .await?
        .into_iter()
        .find(|entry| entry.project_id == execution.project_id)
        .map(|entry| entry.name)
        .unwrap_or_else(|| execution.project_id.to_string());

    let (owner_name, dept_name) = match execution.job_number.as_deref() {
        Some(job_number) => match Employee::find_active_by_job_number(pool, job_number).await? {
            Some(employee) => {
                let dept_name = match employee.organization_id {
                    Some(organization_id) => Department::by_ids(pool, &[organization_id])
                        .await?
                        .into_iter()
                        .next()
                        .and_then(|d| d.name),
                    None => None,
                };
                (employee.name, dept_name)
            }
            None => (None, None),
        },
        None => (None, None),
    };

    let submissions = TaskSubmission::list_for_execution(pool, execution.id).await?;
    let mut applications = Vec::with_capacity(submissions.len());
    for submission in submissions {
        if let Some(view) = application_view(pool, &submission).await? {
            applications.push(view);
        }
    }

    let (predecessors, successors) = match &plan_task {
        Some(task) => (
            task_briefs(pool, task.predecessors()).await?,
            task_briefs(pool, task.successors()).await?,
        ),
        None => (Vec::new(), Vec::new()),
    };

    Ok(TaskDetailView {
        task_id: execution.task_id,
        project_id: execution.project_id,
        project_name,
        stage_id: execution.stage_id,
        stage_name,
        name: execution.name,
        description: execution.description,
        start_time: execution.start_time,
        end_time: execution.end_time,
        duration: execution.duration,
        job_number: execution.job_number,
        owner_name,
        dept_name,
        task_status: execution.task_status.as_i16(),
        status_label: execution.task_status.label().to_string(),
        actual_start_time: execution.actual_start_time,
        actual_complete_time: execution.actual_complete_time,
        approval_type: plan_task.as_ref().and_then(|t| t.approval_type.clone()),
        approval_nodes: execution.approval_nodes.0,
        applications,
        predecessors,
        successors,
    })
}

/// Build the per-node approval view for one application. Submissions made
/// with approval type `none` have no application row and are skipped.
async fn application_view(
    pool: &PgPool,
    submission: &TaskSubmission,
) -> CascadeResult<Option<ApplicationView>> {
    let Some(application) = Application::find_by_apply_id(pool, &submission.apply_id).await? else {
        return Ok(None);
    };
    let Some(rule) = ApprovalRule::find_by_apply_id(pool, &submission.apply_id).await? else {
        return Ok(None);
    };
    let logs = ApprovalLog::list_for_apply(pool, &submission.apply_id).await?;

    let node_ids = rule.nodes().to_vec();
    let node_names: HashMap<i64, Option<String>> = if node_ids.is_empty() {
        HashMap::new()
    } else {
        Department::by_ids(pool, &node_ids)
            .await?
            .into_iter()
            .map(|d| (d.id, d.name))
            .collect()
    };

    let approved: HashSet<i64> = rule.approved().iter().copied().collect();
    let nodes = node_ids
        .iter()
        .map(|&node| {
            // The submit log (result 0) belongs to the submission, not to a
            // node decision
            let decision = logs
                .iter()
                .filter(|log| {
                    log.approval_node == node && log.approval_result != ApprovalResult::Submit
                })
                .next_back();

            let status = if approved.contains(&node) {
                match decision.map(|log| log.approval_result) {
                    Some(ApprovalResult::Reject) => "rejected",
                    _ => "approved",
                }
            } else if rule.current_approval_node == Some(node) {
                "current"
            } else {
                "pending"
            };

            ApprovalNodeView {
                node,
                node_name: node_names.get(&node).cloned().flatten(),
                status,
                approver: decision.map(|log| log.approver_id.clone()),
                comment: decision.and_then(|log| log.approval_comment.clone()),
                images: decision
                    .and_then(|log| log.approval_images.clone())
                    .map(|images| images.0)
                    .unwrap_or_default(),
                decided_at: decision.and_then(|log| log.approval_end_time),
            }
        })
        .collect();

    Ok(Some(ApplicationView {
        apply_id: application.apply_id,
        apply_status: application.apply_status.as_i16(),
        submit_text: submission.submit_text.clone(),
        submit_images: submission
            .submit_images
            .clone()
            .map(|images| images.0)
            .unwrap_or_default(),
        submit_time: submission.submit_time,
        nodes,
    }))
}

async fn task_briefs(pool: &PgPool, task_ids: &[i64]) -> CascadeResult<Vec<TaskBrief>> {
    let mut briefs = Vec::with_capacity(task_ids.len());
    for &task_id in task_ids {
        let Some(plan_task) = Task::find_live(pool, task_id).await? else {
            continue;
        };
        let execution = TaskExecution::find_by_task_id(pool, task_id).await?;
        let (task_status, status_label) = match &execution {
            Some(execution) => (
                Some(execution.task_status.as_i16()),
                execution.task_status.label().to_string(),
            ),
            None => (None, "not-generated".to_string()),
        };
        briefs.push(TaskBrief {
            task_id,
            name: plan_task.name,
            job_number: plan_task.job_number,
            start_time: plan_task.start_time,
            end_time: plan_task.end_time,
            task_status,
            status_label,
        });
    }
    Ok(briefs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(task_id: i64, project_id: i64, status: i16, dept_id: Option<i64>) -> TaskListItem {
        TaskListItem {
            task_id,
            project_id,
            project_name: format!("P{project_id}"),
            stage_id: None,
            name: format!("T{task_id}"),
            task_status: status,
            status_label: TaskStatus::from_i16(status)
                .map(|s| s.label().to_string())
                .unwrap_or_default(),
            job_number: None,
            owner_name: None,
            dept_id,
            dept_name: dept_id.map(|d| format!("D{d}")),
            start_time: None,
            end_time: None,
            actual_start_time: None,
            actual_complete_time: None,
        }
    }

    #[test]
    fn filters_compose_and_pagination_slices() {
        let items = vec![
            item(1, 100, 1, Some(5)),
            item(2, 100, 2, Some(5)),
            item(3, 200, 1, Some(6)),
            item(4, 100, 1, Some(5)),
        ];
        let filter = TaskListFilter {
            project_id: Some(100),
            task_status: Some(1),
            page_num: Some(1),
            page_size: Some(1),
            ..Default::default()
        };
        let page = filter_and_paginate(items, &filter);
        assert_eq!(page.total, 2);
        assert_eq!(page.rows.len(), 1);
        assert_eq!(page.rows[0].task_id, 1);
    }

    #[test]
    fn out_of_range_page_is_empty_but_total_is_kept() {
        let items = vec![item(1, 100, 1, None)];
        let filter = TaskListFilter {
            page_num: Some(9),
            page_size: Some(10),
            ..Default::default()
        };
        let page = filter_and_paginate(items, &filter);
        assert_eq!(page.total, 1);
        assert!(page.rows.is_empty());
    }

    #[test]
    fn categories_group_by_all_three_axes() {
        let items = vec![
            item(1, 100, 1, Some(5)),
            item(2, 100, 2, Some(5)),
            item(3, 200, 1, None),
        ];
        let categories = categorize(&items);
        assert_eq!(categories.project.total, 3);
        assert_eq!(categories.project.items.len(), 2);
        assert_eq!(categories.department.items.len(), 1);
        assert_eq!(categories.department.items[0].count, 2);
        assert_eq!(categories.status.items.len(), 2);
        let pending = categories
            .status
            .items
            .iter()
            .find(|i| i.key == 1)
            .unwrap();
        assert_eq!(pending.count, 2);
        assert_eq!(pending.label, "pending-submit");
    }
}
