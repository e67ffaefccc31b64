//! HTTP handlers for stock transition endpoints

use axum::{extract::State, Json};

use crate::error::AppResult;
use crate::middleware::CurrentActor;
use crate::services::stock::{
    BatchStockView, MoveBetweenInput, MoveToWipInput, ReceiveFromWipInput, ReleaseInspectionInput,
};
use crate::services::StockService;
use crate::AppState;

/// Move raw stock into a process's WIP slot
pub async fn move_to_wip(
    State(state): State<AppState>,
    actor: CurrentActor,
    Json(input): Json<MoveToWipInput>,
) -> AppResult<Json<Vec<BatchStockView>>> {
    let service = StockService::new(state.db);
    let batches = service.move_to_wip(input, actor.into_inner()).await?;
    Ok(Json(batches))
}

/// Move WIP between two processes
pub async fn move_between_processes(
    State(state): State<AppState>,
    actor: CurrentActor,
    Json(input): Json<MoveBetweenInput>,
) -> AppResult<Json<BatchStockView>> {
    let service = StockService::new(state.db);
    let batch = service
        .move_between_processes(input, actor.into_inner())
        .await?;
    Ok(Json(batch))
}

/// Close out a WIP slot into finished and scrap
pub async fn receive_from_wip(
    State(state): State<AppState>,
    actor: CurrentActor,
    Json(input): Json<ReceiveFromWipInput>,
) -> AppResult<Json<BatchStockView>> {
    let service = StockService::new(state.db);
    let batch = service.receive_from_wip(input, actor.into_inner()).await?;
    Ok(Json(batch))
}

/// Release passed inspection quantity back to raw
pub async fn release_inspection(
    State(state): State<AppState>,
    actor: CurrentActor,
    Json(input): Json<ReleaseInspectionInput>,
) -> AppResult<Json<BatchStockView>> {
    let service = StockService::new(state.db);
    let batch = service.release_inspection(input, actor.into_inner()).await?;
    Ok(Json(batch))
}
