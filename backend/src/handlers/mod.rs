//! HTTP handlers for the Factory Flow Platform

mod batch;
mod health;
mod item;
mod job_work;
mod stock;
mod traceability;

pub use batch::*;
pub use health::*;
pub use item::*;
pub use job_work::*;
pub use stock::*;
pub use traceability::*;

use validator::Validate;

use crate::error::{AppError, AppResult};

/// Run declarative input validation, mapping failures into the standard
/// validation error shape.
pub(crate) fn validate_input<T: Validate>(input: &T) -> AppResult<()> {
    input.validate().map_err(|errors| {
        let field = errors
            .field_errors()
            .keys()
            .next()
            .map(|k| k.to_string())
            .unwrap_or_else(|| "input".to_string());
        AppError::Validation {
            field,
            message: errors.to_string(),
        }
    })
}
