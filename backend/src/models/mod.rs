//! Database models for the Factory Flow Platform
//!
//! Re-exports models from the shared crate

pub use shared::models::*;
