//! HTTP handlers for item management endpoints

use axum::{
    extract::{Path, Query, State},
    Json,
};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::AppResult;
use crate::handlers::validate_input;
use crate::services::item::{CreateItemInput, UpdateItemInput};
use crate::services::stock::{BatchStockView, StateMismatch};
use crate::services::{BatchService, ItemService, StockService};
use crate::AppState;
use shared::models::{Item, ItemStock};
use shared::types::{PaginatedResponse, Pagination};

/// Register a new item
pub async fn create_item(
    State(state): State<AppState>,
    Json(input): Json<CreateItemInput>,
) -> AppResult<Json<Item>> {
    validate_input(&input)?;
    let service = ItemService::new(state.db);
    let item = service.create_item(input).await?;
    Ok(Json(item))
}

/// List items
pub async fn list_items(
    State(state): State<AppState>,
    Query(pagination): Query<Pagination>,
) -> AppResult<Json<PaginatedResponse<Item>>> {
    let service = ItemService::new(state.db);
    let items = service.list_items(pagination).await?;
    Ok(Json(items))
}

/// Get an item with its aggregate per-state quantities
pub async fn get_item(
    State(state): State<AppState>,
    Path(item_id): Path<Uuid>,
) -> AppResult<Json<ItemStockResponse>> {
    let service = ItemService::new(state.db);
    let stock = service.get_item(item_id).await?;
    let available_quantity = service.get_available_quantity(item_id).await?;
    let total_quantity = stock.total_quantity();
    Ok(Json(ItemStockResponse {
        stock,
        total_quantity,
        available_quantity,
    }))
}

/// Update an item
pub async fn update_item(
    State(state): State<AppState>,
    Path(item_id): Path<Uuid>,
    Json(input): Json<UpdateItemInput>,
) -> AppResult<Json<Item>> {
    validate_input(&input)?;
    let service = ItemService::new(state.db);
    let item = service.update_item(item_id, input).await?;
    Ok(Json(item))
}

/// Deactivate an item
pub async fn deactivate_item(
    State(state): State<AppState>,
    Path(item_id): Path<Uuid>,
) -> AppResult<Json<()>> {
    let service = ItemService::new(state.db);
    service.deactivate_item(item_id).await?;
    Ok(Json(()))
}

/// List batches of an item, in issue (FIFO) order
pub async fn list_item_batches(
    State(state): State<AppState>,
    Path(item_id): Path<Uuid>,
) -> AppResult<Json<Vec<BatchStockView>>> {
    let service = BatchService::new(state.db);
    let batches = service.list_batches(item_id).await?;
    Ok(Json(batches))
}

/// Items at or below their reorder threshold
pub async fn list_items_below_minimum(
    State(state): State<AppState>,
) -> AppResult<Json<Vec<LowStockResponse>>> {
    let service = ItemService::new(state.db);
    let items = service.list_below_minimum().await?;
    Ok(Json(
        items
            .into_iter()
            .map(|(item, raw_quantity)| LowStockResponse { item, raw_quantity })
            .collect(),
    ))
}

/// Check the item-aggregate-equals-batch-sum invariant
pub async fn check_item_consistency(
    State(state): State<AppState>,
    Path(item_id): Path<Uuid>,
) -> AppResult<Json<Vec<StateMismatch>>> {
    let service = StockService::new(state.db);
    let mismatches = service.check_item_consistency(item_id).await?;
    Ok(Json(mismatches))
}

/// Item with its current raw stock, below its threshold
#[derive(Debug, serde::Serialize)]
pub struct LowStockResponse {
    #[serde(flatten)]
    pub item: Item,
    pub raw_quantity: Decimal,
}

/// Item stock snapshot with its derived totals
#[derive(Debug, serde::Serialize)]
pub struct ItemStockResponse {
    #[serde(flatten)]
    pub stock: ItemStock,
    pub total_quantity: Decimal,
    pub available_quantity: Decimal,
}
