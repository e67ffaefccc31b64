//! Business logic services for the Factory Flow Platform

pub mod batch;
pub mod item;
pub mod job_work;
pub mod process;
pub mod stock;
pub mod traceability;

pub use batch::BatchService;
pub use item::ItemService;
pub use job_work::JobWorkService;
pub use process::ProcessService;
pub use stock::StockService;
pub use traceability::TraceabilityService;

/// Postgres unique-constraint violation (SQLSTATE 23505).
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23505")
    )
}
