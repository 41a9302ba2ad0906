//! # Cascade Shared Components
//!
//! Shared building blocks for the cascade orchestration engine: the plan and
//! execution data model (the graph store), configuration, error types,
//! structured logging setup, and the apply-id generator.
//!
//! The orchestration crate layers the validator, reconciler, generation and
//! approval engines on top of the model layer exposed here. All SQL against
//! the core tables lives in [`models`]; no other crate issues queries
//! directly.

pub mod config;
pub mod database;
pub mod errors;
pub mod ids;
pub mod logging;
pub mod models;

pub use errors::{CascadeError, CascadeResult};
