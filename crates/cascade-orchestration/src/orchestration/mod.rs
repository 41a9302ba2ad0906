//! # Orchestration Engines
//!
//! The subsystems that drive a project from an edited plan graph to
//! completed work items:
//!
//! - [`validator`] — pure structural validation of a submitted graph plus
//!   the per-task completeness checks shared with generation and reporting
//! - [`persistence`] — two-pass identity reconciliation under row locks,
//!   with the edit guard for materialized entities
//! - [`generation`] — the progressive materialization engine and its
//!   fixed-point cascade
//! - [`approval`] — the per-application approval state machine
//! - [`workflow`] — submit/approve/reject/resubmit orchestration tying the
//!   approval engine to task completion
//! - [`queries`] — read-side projections joining execution state with the
//!   directory

pub mod approval;
pub mod generation;
pub mod persistence;
pub mod queries;
pub mod validator;
pub mod workflow;
