//! HTTP handlers for traceability and occupancy reporting

use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use crate::error::AppResult;
use crate::services::traceability::{BatchTraceView, ProcessOccupancy, StateOccupancy};
use crate::services::TraceabilityService;
use crate::AppState;

/// Full traceability chain for a batch
pub async fn get_batch_trace(
    State(state): State<AppState>,
    Path(batch_id): Path<Uuid>,
) -> AppResult<Json<BatchTraceView>> {
    let service = TraceabilityService::new(state.db);
    let trace = service.get_batch_trace(batch_id).await?;
    Ok(Json(trace))
}

/// Per-state occupancy for one item across its batches
pub async fn get_item_summary(
    State(state): State<AppState>,
    Path(item_id): Path<Uuid>,
) -> AppResult<Json<Vec<StateOccupancy>>> {
    let service = TraceabilityService::new(state.db);
    let summary = service.get_item_summary(item_id).await?;
    Ok(Json(summary))
}

/// Factory-wide WIP occupancy per process
pub async fn get_factory_summary(
    State(state): State<AppState>,
) -> AppResult<Json<Vec<ProcessOccupancy>>> {
    let service = TraceabilityService::new(state.db);
    let summary = service.get_factory_summary().await?;
    Ok(Json(summary))
}
