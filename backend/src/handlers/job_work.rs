//! HTTP handlers for job-work endpoints

use axum::{
    extract::{Path, Query, State},
    Json,
};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::CurrentActor;
use crate::services::job_work::{
    CreateJobWorkInput, IssueInput, JobWorkOrderDetail, ReceiveInput,
};
use crate::services::process::{AdvanceProcessInput, ProcessPlanInput};
use crate::services::{JobWorkService, ProcessService};
use crate::AppState;
use shared::models::{JobWorkOrder, JobWorkProcess};
use shared::types::{PaginatedResponse, Pagination};

fn job_work_service(state: &AppState) -> JobWorkService {
    JobWorkService::new(
        state.db.clone(),
        state.config.job_work.number_allocation_retries,
    )
}

/// Create a job-work order
pub async fn create_job_work(
    State(state): State<AppState>,
    Json(input): Json<CreateJobWorkInput>,
) -> AppResult<Json<JobWorkOrder>> {
    let order = job_work_service(&state).create_order(input).await?;
    Ok(Json(order))
}

/// List job-work orders
pub async fn list_job_works(
    State(state): State<AppState>,
    Query(pagination): Query<Pagination>,
) -> AppResult<Json<PaginatedResponse<JobWorkOrder>>> {
    let orders = job_work_service(&state).list_orders(pagination).await?;
    Ok(Json(orders))
}

/// Get a job-work order with its stages and issuance links
pub async fn get_job_work(
    State(state): State<AppState>,
    Path(job_work_id): Path<Uuid>,
) -> AppResult<Json<JobWorkOrderDetail>> {
    let detail = job_work_service(&state).get_order(job_work_id).await?;
    Ok(Json(detail))
}

/// Issue material from batches to a job-work order
pub async fn issue_job_work(
    State(state): State<AppState>,
    actor: CurrentActor,
    Path(job_work_id): Path<Uuid>,
    Json(input): Json<IssueInput>,
) -> AppResult<Json<JobWorkOrderDetail>> {
    let detail = job_work_service(&state)
        .issue(job_work_id, input, actor.into_inner())
        .await?;
    Ok(Json(detail))
}

/// Reconcile a job-work return
pub async fn receive_job_work(
    State(state): State<AppState>,
    actor: CurrentActor,
    Path(job_work_id): Path<Uuid>,
    Json(input): Json<ReceiveInput>,
) -> AppResult<Json<JobWorkOrderDetail>> {
    let detail = job_work_service(&state)
        .receive(job_work_id, input, actor.into_inner())
        .await?;
    Ok(Json(detail))
}

/// Plan the ordered process stages of an order
pub async fn plan_processes(
    State(state): State<AppState>,
    Path(job_work_id): Path<Uuid>,
    Json(stages): Json<Vec<ProcessPlanInput>>,
) -> AppResult<Json<Vec<JobWorkProcess>>> {
    let service = ProcessService::new(state.db);
    let processes = service.plan_processes(job_work_id, stages).await?;
    Ok(Json(processes))
}

/// Advance a process stage's status
pub async fn advance_process_status(
    State(state): State<AppState>,
    actor: CurrentActor,
    Path(process_id): Path<Uuid>,
    Json(input): Json<AdvanceProcessInput>,
) -> AppResult<Json<JobWorkProcess>> {
    let service = ProcessService::new(state.db);
    let process = service
        .advance_status(process_id, input, actor.into_inner())
        .await?;
    Ok(Json(process))
}
