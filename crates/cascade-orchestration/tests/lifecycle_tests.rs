//! End-to-end lifecycle tests: progressive materialization on save,
//! submit/approve/reject/resubmit through the approval engine, empty-post
//! auto-approval, and the no-approval short circuit.

mod common;

use sqlx::PgPool;

use cascade_orchestration::orchestration::{persistence, queries, workflow};
use cascade_shared::ids::ApplyIdGenerator;
use cascade_shared::models::{
    Application, ApplyStatus, ApprovalLog, ApprovalRule, Stage, StageExecution, StageStatus, Task,
    TaskExecution, TaskStatus,
};

use common::{linear_payload, seed_directory, seed_empty_position, single_task_payload};

async fn save_and_generate(pool: &PgPool, payload: &cascade_shared::models::TaskConfigPayload) -> anyhow::Result<()> {
    let mut tx = pool.begin().await?;
    persistence::persist_task_config(&mut tx, payload, "tester", true).await?;
    tx.commit().await?;
    Ok(())
}

async fn submit(
    pool: &PgPool,
    ids: &ApplyIdGenerator,
    task_id: i64,
    submitter: &str,
) -> anyhow::Result<String> {
    let mut tx = pool.begin().await?;
    let apply_id = workflow::submit_task(&mut tx, ids, task_id, submitter, Some("done"), &[]).await?;
    tx.commit().await?;
    Ok(apply_id)
}

async fn approve(pool: &PgPool, apply_id: &str, approver: &str) -> anyhow::Result<bool> {
    let mut tx = pool.begin().await?;
    let completed = workflow::approve_application(&mut tx, apply_id, approver, None, &[]).await?;
    tx.commit().await?;
    Ok(completed)
}

async fn task_id_by_name(pool: &PgPool, name: &str) -> anyhow::Result<i64> {
    let tasks = Task::for_project(pool, 100).await?;
    Ok(tasks.iter().find(|t| t.name == name).unwrap().task_id)
}

#[sqlx::test(migrator = "cascade_shared::database::MIGRATOR")]
async fn linear_plan_full_lifecycle(pool: PgPool) -> anyhow::Result<()> {
    seed_directory(&pool).await?;
    save_and_generate(&pool, &linear_payload()).await?;

    let stages = Stage::for_project(&pool, 100).await?;
    let s1_id = stages.iter().find(|s| s.name == "S1").unwrap().stage_id;
    let s2_id = stages.iter().find(|s| s.name == "S2").unwrap().stage_id;
    let t1_id = task_id_by_name(&pool, "T1").await?;
    let t2_id = task_id_by_name(&pool, "T2").await?;

    // Only the head of the graph materializes at save time
    assert!(StageExecution::exists(&pool, s1_id).await?);
    assert!(!StageExecution::exists(&pool, s2_id).await?);
    assert!(TaskExecution::exists_for_task(&pool, t1_id).await?);
    assert!(!TaskExecution::exists_for_task(&pool, t2_id).await?);

    let s1_execution = StageExecution::find(&pool, s1_id).await?.unwrap();
    assert_eq!(s1_execution.stage_status, StageStatus::InProgress);
    assert!(s1_execution.actual_start_time.is_some());

    // Submit T1 and walk its single approval node
    let ids = ApplyIdGenerator::new(1, 1)?;
    let apply_id = submit(&pool, &ids, t1_id, "E001").await?;

    let execution = TaskExecution::find_by_task_id(&pool, t1_id).await?.unwrap();
    assert_eq!(execution.task_status, TaskStatus::Submitted);
    let rule = ApprovalRule::find_by_apply_id(&pool, &apply_id).await?.unwrap();
    assert_eq!(rule.current_approval_node, Some(common::POSITION_QA));

    let completed = approve(&pool, &apply_id, "A500").await?;
    assert!(completed);

    // T1 completed, S1 completed, and the completion cascaded into S2/T2
    let t1_execution = TaskExecution::find_by_task_id(&pool, t1_id).await?.unwrap();
    assert_eq!(t1_execution.task_status, TaskStatus::Completed);
    assert!(t1_execution.actual_complete_time.is_some());

    let s1_execution = StageExecution::find(&pool, s1_id).await?.unwrap();
    assert_eq!(s1_execution.stage_status, StageStatus::Completed);

    let s2_execution = StageExecution::find(&pool, s2_id).await?.unwrap();
    assert_eq!(s2_execution.stage_status, StageStatus::InProgress);
    let t2_execution = TaskExecution::find_by_task_id(&pool, t2_id).await?.unwrap();
    assert_eq!(t2_execution.task_status, TaskStatus::InProgress);

    let application = Application::find_by_apply_id(&pool, &apply_id).await?.unwrap();
    assert_eq!(application.apply_status, ApplyStatus::Completed);
    Ok(())
}

#[sqlx::test(migrator = "cascade_shared::database::MIGRATOR")]
async fn wrong_position_cannot_approve(pool: PgPool) -> anyhow::Result<()> {
    seed_directory(&pool).await?;
    save_and_generate(&pool, &linear_payload()).await?;
    let t1_id = task_id_by_name(&pool, "T1").await?;

    let ids = ApplyIdGenerator::new(1, 1)?;
    let apply_id = submit(&pool, &ids, t1_id, "E001").await?;

    // A501 sits at position 501, the cursor is at 500
    let err = approve(&pool, &apply_id, "A501").await.unwrap_err();
    assert!(err.to_string().contains("does not hold"));

    // The cursor and the task did not move
    let rule = ApprovalRule::find_by_apply_id(&pool, &apply_id).await?.unwrap();
    assert_eq!(rule.current_approval_node, Some(common::POSITION_QA));
    Ok(())
}

#[sqlx::test(migrator = "cascade_shared::database::MIGRATOR")]
async fn empty_posts_auto_approve(pool: PgPool) -> anyhow::Result<()> {
    seed_directory(&pool).await?;
    // Position 701 exists but nobody sits there; 500 and 501 are held
    seed_empty_position(&pool, 701).await?;
    save_and_generate(&pool, &single_task_payload("sequential", &[500, 701, 501])).await?;
    let t1_id = task_id_by_name(&pool, "T1").await?;

    let ids = ApplyIdGenerator::new(1, 1)?;
    let apply_id = submit(&pool, &ids, t1_id, "E001").await?;

    // First approval advances over the empty 701 straight to 501
    let completed = approve(&pool, &apply_id, "A500").await?;
    assert!(!completed);

    let rule = ApprovalRule::find_by_apply_id(&pool, &apply_id).await?.unwrap();
    assert_eq!(rule.approved(), &[500, 701]);
    assert_eq!(rule.current_approval_node, Some(501));

    let application = Application::find_by_apply_id(&pool, &apply_id).await?.unwrap();
    assert_eq!(application.apply_status, ApplyStatus::InApproval);

    let logs = ApprovalLog::list_for_apply(&pool, &apply_id).await?;
    let auto = logs.iter().find(|l| l.approval_node == 701).unwrap();
    assert_eq!(auto.approver_id, "system");
    assert_eq!(auto.approval_comment.as_deref(), Some("empty post auto-approved"));

    // The held tail still needs its decision
    let completed = approve(&pool, &apply_id, "A501").await?;
    assert!(completed);
    let execution = TaskExecution::find_by_task_id(&pool, t1_id).await?.unwrap();
    assert_eq!(execution.task_status, TaskStatus::Completed);
    Ok(())
}

#[sqlx::test(migrator = "cascade_shared::database::MIGRATOR")]
async fn no_approval_submission_completes_directly(pool: PgPool) -> anyhow::Result<()> {
    seed_directory(&pool).await?;
    save_and_generate(&pool, &single_task_payload("none", &[])).await?;
    let t1_id = task_id_by_name(&pool, "T1").await?;

    let ids = ApplyIdGenerator::new(1, 1)?;
    let apply_id = submit(&pool, &ids, t1_id, "E001").await?;

    let execution = TaskExecution::find_by_task_id(&pool, t1_id).await?.unwrap();
    assert_eq!(execution.task_status, TaskStatus::Completed);

    // No application row is opened for approval-free submissions
    assert!(Application::find_by_apply_id(&pool, &apply_id).await?.is_none());

    // The stage had a single task, so it completed too
    let stages = Stage::for_project(&pool, 100).await?;
    let s1_execution = StageExecution::find(&pool, stages[0].stage_id).await?.unwrap();
    assert_eq!(s1_execution.stage_status, StageStatus::Completed);
    Ok(())
}

#[sqlx::test(migrator = "cascade_shared::database::MIGRATOR")]
async fn reject_resubmit_approve_keeps_history(pool: PgPool) -> anyhow::Result<()> {
    seed_directory(&pool).await?;
    save_and_generate(&pool, &single_task_payload("specified", &[500])).await?;
    let t1_id = task_id_by_name(&pool, "T1").await?;
    let ids = ApplyIdGenerator::new(1, 1)?;

    // First attempt gets rejected
    let first_apply = submit(&pool, &ids, t1_id, "E001").await?;
    {
        let mut tx = pool.begin().await?;
        workflow::reject_application(&mut tx, &first_apply, "A500", "missing doc", &[]).await?;
        tx.commit().await?;
    }
    let execution = TaskExecution::find_by_task_id(&pool, t1_id).await?.unwrap();
    assert_eq!(execution.task_status, TaskStatus::Rejected);

    // Only the owner can resubmit
    {
        let mut tx = pool.begin().await?;
        let err = workflow::resubmit_task(&mut tx, t1_id, "E002").await.unwrap_err();
        assert!(err.to_string().contains("owner"));
    }
    {
        let mut tx = pool.begin().await?;
        workflow::resubmit_task(&mut tx, t1_id, "E001").await?;
        tx.commit().await?;
    }
    let execution = TaskExecution::find_by_task_id(&pool, t1_id).await?.unwrap();
    assert_eq!(execution.task_status, TaskStatus::InProgress);

    // Second attempt goes through
    let second_apply = submit(&pool, &ids, t1_id, "E001").await?;
    assert_ne!(first_apply, second_apply);
    let completed = approve(&pool, &second_apply, "A500").await?;
    assert!(completed);

    // The detail view shows both applications with their terminal states
    let detail = queries::task_detail(&pool, t1_id).await?;
    assert_eq!(detail.task_status, TaskStatus::Completed.as_i16());
    assert_eq!(detail.applications.len(), 2);
    assert_eq!(detail.applications[0].apply_id, first_apply);
    assert_eq!(detail.applications[0].apply_status, ApplyStatus::Rejected.as_i16());
    assert_eq!(detail.applications[1].apply_id, second_apply);
    assert_eq!(detail.applications[1].apply_status, ApplyStatus::Completed.as_i16());

    let first = Application::find_by_apply_id(&pool, &first_apply).await?.unwrap();
    assert_eq!(first.apply_status, ApplyStatus::Rejected);
    Ok(())
}

#[sqlx::test(migrator = "cascade_shared::database::MIGRATOR")]
async fn reject_requires_a_comment(pool: PgPool) -> anyhow::Result<()> {
    seed_directory(&pool).await?;
    save_and_generate(&pool, &single_task_payload("specified", &[500])).await?;
    let t1_id = task_id_by_name(&pool, "T1").await?;
    let ids = ApplyIdGenerator::new(1, 1)?;
    let apply_id = submit(&pool, &ids, t1_id, "E001").await?;

    let mut tx = pool.begin().await?;
    let err = workflow::reject_application(&mut tx, &apply_id, "A500", "  ", &[])
        .await
        .unwrap_err();
    assert!(err.to_string().contains("comment"));
    Ok(())
}

#[sqlx::test(migrator = "cascade_shared::database::MIGRATOR")]
async fn my_tasks_union_includes_owned_and_awaiting_approval(pool: PgPool) -> anyhow::Result<()> {
    seed_directory(&pool).await?;
    save_and_generate(&pool, &linear_payload()).await?;
    let t1_id = task_id_by_name(&pool, "T1").await?;

    // Owner sees the pending task
    let page = queries::my_tasks_list(&pool, "E001", &Default::default()).await?;
    assert_eq!(page.total, 1);
    assert_eq!(page.rows[0].task_id, t1_id);
    assert_eq!(page.rows[0].status_label, "pending-submit");
    assert_eq!(page.rows[0].project_name, "Launch");

    // After submission the approver at the cursor sees it too
    let ids = ApplyIdGenerator::new(1, 1)?;
    submit(&pool, &ids, t1_id, "E001").await?;

    let approver_page = queries::my_tasks_list(&pool, "A500", &Default::default()).await?;
    assert_eq!(approver_page.total, 1);
    assert_eq!(approver_page.rows[0].task_id, t1_id);
    assert_eq!(approver_page.rows[0].task_status, TaskStatus::Submitted.as_i16());

    // Not the approver at the other position
    let other_page = queries::my_tasks_list(&pool, "A501", &Default::default()).await?;
    assert_eq!(other_page.total, 0);

    let stats = queries::workbench_stats(&pool, "A500").await?;
    assert_eq!(stats.awaiting_approval, 1);
    Ok(())
}
