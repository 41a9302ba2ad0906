//! Shared fixtures for the database-backed integration tests.

#![allow(dead_code)]

use sqlx::PgPool;

use cascade_shared::models::TaskConfigPayload;

/// Organization positions used across tests
pub const POSITION_QA: i64 = 500;
pub const POSITION_OPS: i64 = 501;

/// Seed a minimal directory: two approver positions with one employee each,
/// plus two task owners, plus the project dictionary entry
pub async fn seed_directory(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO oa_department (id, name, code, parent_id, enable) VALUES
            (500, 'QA Lead', '02A01B01', 2, TRUE),
            (501, 'Ops Lead', '02A02B01', 2, TRUE),
            (2,   'Engineering', '02A01', NULL, TRUE)
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO oa_employee (id, name, job_number, organization_id, enable) VALUES
            (1, 'Alice',  'E001', 2, TRUE),
            (2, 'Bob',    'E002', 2, TRUE),
            (3, 'Carol',  'A500', 500, TRUE),
            (4, 'Dave',   'A501', 501, TRUE)
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("INSERT INTO dict_project (project_id, name, enable) VALUES (100, 'Launch', TRUE)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Insert a department with no active employee, usable as an empty post
pub async fn seed_empty_position(pool: &PgPool, position: i64) -> anyhow::Result<()> {
    sqlx::query("INSERT INTO oa_department (id, name, code, parent_id, enable) VALUES ($1, 'Vacant', NULL, NULL, TRUE)")
        .bind(position)
        .execute(pool)
        .await?;
    Ok(())
}

/// The two-stage linear plan from the end-to-end scenario: S1 -> S2, each
/// with one task, owners E001/E002, approvers at positions 500/501
pub fn linear_payload() -> TaskConfigPayload {
    serde_json::from_value(serde_json::json!({
        "projectId": 100,
        "stages": [
            {"id": -1, "name": "S1", "startTime": "2025-01-01", "endTime": "2025-01-05",
             "predecessorStages": [], "successorStages": [-2]},
            {"id": -2, "name": "S2", "startTime": "2025-01-06", "endTime": "2025-01-10",
             "predecessorStages": [-1], "successorStages": []}
        ],
        "tasks": [
            {"id": -10, "name": "T1", "stageId": -1, "jobNumber": "E001",
             "startTime": "2025-01-01", "endTime": "2025-01-05",
             "approvalType": "specified", "approvalNodes": [500]},
            {"id": -20, "name": "T2", "stageId": -2, "jobNumber": "E002",
             "startTime": "2025-01-06", "endTime": "2025-01-10",
             "approvalType": "specified", "approvalNodes": [501]}
        ]
    }))
    .expect("linear payload must deserialize")
}

/// Single stage with one task owned by E001, approval at the given nodes
pub fn single_task_payload(approval_type: &str, nodes: &[i64]) -> TaskConfigPayload {
    serde_json::from_value(serde_json::json!({
        "projectId": 100,
        "stages": [
            {"id": -1, "name": "S1", "startTime": "2025-01-01", "endTime": "2025-01-05"}
        ],
        "tasks": [
            {"id": -10, "name": "T1", "stageId": -1, "jobNumber": "E001",
             "startTime": "2025-01-01", "endTime": "2025-01-05",
             "approvalType": approval_type, "approvalNodes": nodes}
        ]
    }))
    .expect("single task payload must deserialize")
}
