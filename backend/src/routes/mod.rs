//! Route definitions for the Factory Flow Platform

use axum::{
    routing::{get, post, put},
    Router,
};

use crate::{handlers, AppState};

/// Create API routes
pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Traceability (movement chain for a batch)
        .route("/trace/:batch_id", get(handlers::get_batch_trace))
        // Item management
        .nest("/items", item_routes())
        // Batch management
        .nest("/batches", batch_routes())
        // Stock transitions
        .nest("/stock", stock_routes())
        // Job-work orders
        .nest("/job-works", job_work_routes())
}

/// Item management routes
fn item_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_items).post(handlers::create_item))
        .route("/below-minimum", get(handlers::list_items_below_minimum))
        .route(
            "/:item_id",
            get(handlers::get_item)
                .put(handlers::update_item)
                .delete(handlers::deactivate_item),
        )
        .route("/:item_id/batches", get(handlers::list_item_batches))
        .route("/:item_id/summary", get(handlers::get_item_summary))
        .route("/:item_id/consistency", get(handlers::check_item_consistency))
}

/// Batch management routes
fn batch_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(handlers::create_batch))
        .route(
            "/:batch_id",
            get(handlers::get_batch).delete(handlers::deactivate_batch),
        )
        .route("/:batch_id/inspection", put(handlers::set_inspection_status))
}

/// Stock transition routes
fn stock_routes() -> Router<AppState> {
    Router::new()
        .route("/move-to-wip", post(handlers::move_to_wip))
        .route("/move-between", post(handlers::move_between_processes))
        .route("/receive-from-wip", post(handlers::receive_from_wip))
        .route("/release-inspection", post(handlers::release_inspection))
        .route("/summary", get(handlers::get_factory_summary))
}

/// Job-work routes
fn job_work_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_job_works).post(handlers::create_job_work))
        .route("/:job_work_id", get(handlers::get_job_work))
        .route("/:job_work_id/issue", post(handlers::issue_job_work))
        .route("/:job_work_id/receive", post(handlers::receive_job_work))
        .route("/:job_work_id/processes", post(handlers::plan_processes))
        .route(
            "/processes/:process_id/status",
            put(handlers::advance_process_status),
        )
}
