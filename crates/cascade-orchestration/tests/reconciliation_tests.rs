//! Integration tests for identity reconciliation and the edit guard:
//! temp-id resolution with edge rewriting, soft-delete diffing, and the
//! immutability rules for materialized entities.

mod common;

use sqlx::PgPool;

use cascade_orchestration::orchestration::{persistence, queries};
use cascade_shared::models::{Stage, StageExecution, Task, TaskConfigPayload, TaskExecution};

use common::{linear_payload, seed_directory};

async fn save(pool: &PgPool, payload: &TaskConfigPayload, generate: bool) -> anyhow::Result<()> {
    let mut tx = pool.begin().await?;
    persistence::persist_task_config(&mut tx, payload, "tester", generate).await?;
    tx.commit().await?;
    Ok(())
}

#[sqlx::test(migrator = "cascade_shared::database::MIGRATOR")]
async fn save_resolves_temp_ids_and_rewrites_edges(pool: PgPool) -> anyhow::Result<()> {
    seed_directory(&pool).await?;
    save(&pool, &linear_payload(), false).await?;

    let stages = Stage::for_project(&pool, 100).await?;
    let tasks = Task::for_project(&pool, 100).await?;

    assert_eq!(stages.len(), 2);
    assert_eq!(tasks.len(), 2);
    assert!(stages.iter().all(|s| s.stage_id > 0));
    assert!(tasks.iter().all(|t| t.task_id > 0));

    let s1 = stages.iter().find(|s| s.name == "S1").unwrap();
    let s2 = stages.iter().find(|s| s.name == "S2").unwrap();
    assert_eq!(s1.successors(), &[s2.stage_id]);
    assert_eq!(s2.predecessors(), &[s1.stage_id]);

    let t1 = tasks.iter().find(|t| t.name == "T1").unwrap();
    let t2 = tasks.iter().find(|t| t.name == "T2").unwrap();
    assert_eq!(t1.stage_id, Some(s1.stage_id));
    assert_eq!(t2.stage_id, Some(s2.stage_id));
    assert_eq!(t1.job_number.as_deref(), Some("E001"));
    assert_eq!(t1.approval_nodes.0, vec![500]);

    // Nothing materialized on a plain save
    assert!(StageExecution::for_project(&pool, 100).await?.is_empty());
    assert!(TaskExecution::for_project(&pool, 100).await?.is_empty());
    Ok(())
}

#[sqlx::test(migrator = "cascade_shared::database::MIGRATOR")]
async fn resave_updates_in_place_and_soft_deletes_absentees(pool: PgPool) -> anyhow::Result<()> {
    seed_directory(&pool).await?;
    save(&pool, &linear_payload(), false).await?;

    let stages = Stage::for_project(&pool, 100).await?;
    let tasks = Task::for_project(&pool, 100).await?;
    let s1 = stages.iter().find(|s| s.name == "S1").unwrap();
    let t1 = tasks.iter().find(|t| t.name == "T1").unwrap();

    // Resubmit only S1/T1 with a rename; S2/T2 disappear from the payload
    let payload: TaskConfigPayload = serde_json::from_value(serde_json::json!({
        "projectId": 100,
        "stages": [
            {"id": s1.stage_id, "name": "S1 renamed",
             "startTime": "2025-01-01", "endTime": "2025-01-05"}
        ],
        "tasks": [
            {"id": t1.task_id, "name": "T1", "stageId": s1.stage_id, "jobNumber": "E001",
             "startTime": "2025-01-01", "endTime": "2025-01-05",
             "approvalType": "specified", "approvalNodes": [500]}
        ]
    }))?;
    save(&pool, &payload, false).await?;

    let stages = Stage::for_project(&pool, 100).await?;
    assert_eq!(stages.len(), 1);
    assert_eq!(stages[0].name, "S1 renamed");
    assert_eq!(stages[0].stage_id, s1.stage_id);
    assert!(stages[0].successors().is_empty());

    let tasks = Task::for_project(&pool, 100).await?;
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].task_id, t1.task_id);
    Ok(())
}

#[sqlx::test(migrator = "cascade_shared::database::MIGRATOR")]
async fn materialized_task_rejects_basic_info_edits(pool: PgPool) -> anyhow::Result<()> {
    seed_directory(&pool).await?;
    save(&pool, &linear_payload(), true).await?;

    let tasks = Task::for_project(&pool, 100).await?;
    let stages = Stage::for_project(&pool, 100).await?;
    let s1 = stages.iter().find(|s| s.name == "S1").unwrap();
    let s2 = stages.iter().find(|s| s.name == "S2").unwrap();
    let t1 = tasks.iter().find(|t| t.name == "T1").unwrap();
    let t2 = tasks.iter().find(|t| t.name == "T2").unwrap();
    assert!(TaskExecution::exists_for_task(&pool, t1.task_id).await?);

    let mut payload = serde_json::json!({
        "projectId": 100,
        "stages": [
            {"id": s1.stage_id, "name": "S1", "startTime": "2025-01-01", "endTime": "2025-01-05",
             "successorStages": [s2.stage_id]},
            {"id": s2.stage_id, "name": "S2", "startTime": "2025-01-06", "endTime": "2025-01-10",
             "predecessorStages": [s1.stage_id]}
        ],
        "tasks": [
            {"id": t1.task_id, "name": "T1 edited", "stageId": s1.stage_id, "jobNumber": "E001",
             "startTime": "2025-01-01", "endTime": "2025-01-05",
             "approvalType": "specified", "approvalNodes": [500]},
            {"id": t2.task_id, "name": "T2", "stageId": s2.stage_id, "jobNumber": "E002",
             "startTime": "2025-01-06", "endTime": "2025-01-10",
             "approvalType": "specified", "approvalNodes": [501]}
        ]
    });

    let edited: TaskConfigPayload = serde_json::from_value(payload.clone())?;
    let err = save(&pool, &edited, false).await.unwrap_err();
    assert!(err.to_string().contains("already generated"));

    // Adding a brand new successor task to the materialized T1 is allowed
    payload["tasks"][0]["name"] = serde_json::json!("T1");
    payload["tasks"][0]["successorTasks"] = serde_json::json!([-30]);
    payload["tasks"]
        .as_array_mut()
        .unwrap()
        .push(serde_json::json!({
            "id": -30, "name": "T1b", "stageId": s1.stage_id, "jobNumber": "E002",
            "startTime": "2025-01-06", "endTime": "2025-01-10",
            "predecessorTasks": [t1.task_id],
            "approvalType": "specified", "approvalNodes": [501]
        }));
    let extended: TaskConfigPayload = serde_json::from_value(payload)?;
    save(&pool, &extended, false).await?;

    let tasks = Task::for_project(&pool, 100).await?;
    assert_eq!(tasks.len(), 3);
    let t1b = tasks.iter().find(|t| t.name == "T1b").unwrap();
    let t1 = tasks.iter().find(|t| t.name == "T1").unwrap();
    assert_eq!(t1.successors(), &[t1b.task_id]);
    assert_eq!(t1b.predecessors(), &[t1.task_id]);
    Ok(())
}

#[sqlx::test(migrator = "cascade_shared::database::MIGRATOR")]
async fn materialized_stage_cannot_be_deleted(pool: PgPool) -> anyhow::Result<()> {
    seed_directory(&pool).await?;
    save(&pool, &linear_payload(), true).await?;

    let stages = Stage::for_project(&pool, 100).await?;
    let s2 = stages.iter().find(|s| s.name == "S2").unwrap();

    // Dropping S1 (materialized) from the payload must fail by name
    let payload: TaskConfigPayload = serde_json::from_value(serde_json::json!({
        "projectId": 100,
        "stages": [
            {"id": s2.stage_id, "name": "S2", "startTime": "2025-01-06", "endTime": "2025-01-10"}
        ],
        "tasks": []
    }))?;
    let err = save(&pool, &payload, false).await.unwrap_err();
    let message = err.to_string();
    assert!(message.contains("S1"));
    assert!(message.contains("cannot delete"));
    Ok(())
}

#[sqlx::test(migrator = "cascade_shared::database::MIGRATOR")]
async fn project_views_report_editability_and_counters(pool: PgPool) -> anyhow::Result<()> {
    seed_directory(&pool).await?;
    save(&pool, &linear_payload(), true).await?;

    let detail = queries::project_detail(&pool, 100).await?;
    assert!(detail.tasks_generated);
    let s1 = detail.stages.iter().find(|s| s.name == "S1").unwrap();
    let s2 = detail.stages.iter().find(|s| s.name == "S2").unwrap();
    assert!(!s1.is_editable);
    assert!(s2.is_editable);
    let t1 = detail.tasks.iter().find(|t| t.name == "T1").unwrap();
    let t2 = detail.tasks.iter().find(|t| t.name == "T2").unwrap();
    assert!(!t1.is_editable);
    assert!(t2.is_editable);

    let summaries = queries::project_summaries(&pool).await?;
    let launch = summaries.iter().find(|s| s.project_id == 100).unwrap();
    assert_eq!(launch.project_name, "Launch");
    assert_eq!(launch.stage_count, 2);
    assert_eq!(launch.task_count, 2);
    assert_eq!(launch.project_status, "normal");
    assert!(launch.tasks_generated);
    Ok(())
}
