//! HTTP handlers for batch management endpoints

use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use crate::error::AppResult;
use crate::handlers::validate_input;
use crate::middleware::CurrentActor;
use crate::services::batch::{CreateBatchInput, SetInspectionInput};
use crate::services::stock::BatchStockView;
use crate::services::BatchService;
use crate::AppState;

/// Receive material into a new batch
pub async fn create_batch(
    State(state): State<AppState>,
    actor: CurrentActor,
    Json(input): Json<CreateBatchInput>,
) -> AppResult<Json<BatchStockView>> {
    validate_input(&input)?;
    let service = BatchService::new(state.db);
    let batch = service.create_batch(input, actor.into_inner()).await?;
    Ok(Json(batch))
}

/// Get a batch with its states
pub async fn get_batch(
    State(state): State<AppState>,
    Path(batch_id): Path<Uuid>,
) -> AppResult<Json<BatchStockView>> {
    let service = BatchService::new(state.db);
    let batch = service.get_batch(batch_id).await?;
    Ok(Json(batch))
}

/// Move a batch through its quality gate
pub async fn set_inspection_status(
    State(state): State<AppState>,
    actor: CurrentActor,
    Path(batch_id): Path<Uuid>,
    Json(input): Json<SetInspectionInput>,
) -> AppResult<Json<BatchStockView>> {
    let service = BatchService::new(state.db);
    let batch = service
        .set_inspection_status(batch_id, input, actor.into_inner())
        .await?;
    Ok(Json(batch))
}

/// Deactivate a batch
pub async fn deactivate_batch(
    State(state): State<AppState>,
    Path(batch_id): Path<Uuid>,
) -> AppResult<Json<()>> {
    let service = BatchService::new(state.db);
    service.deactivate_batch(batch_id).await?;
    Ok(Json(()))
}
