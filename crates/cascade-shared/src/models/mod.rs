//! # Data Model (Graph Store)
//!
//! Row structs and all SQL for the core tables. Plan tables (`proj_stage`,
//! `proj_task`) hold the editable project description; execution tables
//! (`todo_stage`, `todo_task`) hold materialized instances; the approval
//! tables (`apply_primary`, `apply_rules`, `apply_log`, `todo_task_apply`)
//! hold one application per submission attempt. Directory tables are
//! read-only inputs owned by an external system.
//!
//! Every function takes a [`sqlx::PgExecutor`] so callers compose reads and
//! writes inside their own transactions; nothing here begins or commits one.

pub mod approval;
pub mod directory;
pub mod execution;
pub mod payload;
pub mod plan;
pub mod types;

pub use approval::{Application, ApprovalLog, ApprovalLogEntry, ApprovalRule, TaskSubmission};
pub use directory::{Department, Employee, ProjectDictEntry};
pub use execution::{StageExecution, TaskExecution};
pub use payload::{ApprovalType, StagePayload, TaskConfigPayload, TaskPayload};
pub use plan::{Stage, StageDraft, Task, TaskDraft};
pub use types::{ApplyStatus, ApprovalResult, StageStatus, TaskStatus};
