//! sfc-model: process models for sfcmend
//!
//! Provides the sequential-function-chart representation consumed by the
//! repair loop, together with:
//!
//! - a restricted literal grammar for model sources and oracle replies
//! - model load/save and structural validation
//! - the `ContainmentVerifier` seam plus a path-enumerating verifier
//!
//! ## Layer 0 - Model
//!
//! Focus: representation and verification verdicts.

pub mod error;
pub mod literal;
pub mod model;
pub mod verify;

pub use error::ModelError;
pub use literal::{parse_assignments, parse_literal, render_assignment, render_literal, Assignment};
pub use model::{
    load_model, save_model, steps_from_value, steps_to_value, transitions_from_value,
    transitions_to_value, ProcessModel, Step, Transition,
};
pub use verify::{ContainmentVerdict, ContainmentVerifier, PathEvent, PathVerifier, UnmatchedPath};

/// Result type for model operations
pub type Result<T> = std::result::Result<T, ModelError>;
