//! # Cascade Orchestration
//!
//! The engine side of the cascade workspace: graph validation, identity
//! reconciliation with edit guards, progressive materialization, the
//! approval state machine, the query projections, and the axum web API
//! exposing all of it.

pub mod orchestration;
pub mod web;
