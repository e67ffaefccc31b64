//! Shared types and models for the Factory Flow Platform
//!
//! This crate contains the pure domain layer: the per-state quantity ledger,
//! batch and job-work models, and the rules that govern material flow. It
//! has no I/O; the backend wires these types to storage and HTTP.

pub mod error;
pub mod models;
pub mod types;
pub mod validation;

pub use error::*;
pub use models::*;
pub use types::*;
pub use validation::*;
