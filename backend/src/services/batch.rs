//! Batch receipt, quality gate and lifecycle service

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::services::is_unique_violation;
use crate::services::stock::{
    append_movement, apply_item_deltas, load_batch_for_update, movement, state_deltas,
    write_batch_states, BatchStockView,
};
use shared::models::{InspectionStatus, StockState};
use shared::validation::{validate_batch_code, validate_positive_quantity};

/// Batch service for receipts and the inspection gate
#[derive(Clone)]
pub struct BatchService {
    db: PgPool,
}

/// Input for receiving material into a new batch
#[derive(Debug, Deserialize, Validate)]
pub struct CreateBatchInput {
    pub item_id: Uuid,
    #[validate(length(min = 2, max = 30))]
    pub batch_code: String,
    #[validate(length(max = 100))]
    pub supplier_batch: Option<String>,
    pub manufacture_date: NaiveDate,
    pub expiry_date: Option<NaiveDate>,
    #[validate(length(max = 100))]
    pub storage_location: Option<String>,
    pub quantity: Decimal,
    /// Route the receipt through the inspection state instead of raw
    #[serde(default)]
    pub hold_for_inspection: bool,
}

/// Input for moving a batch through its quality gate
#[derive(Debug, Deserialize)]
pub struct SetInspectionInput {
    pub status: InspectionStatus,
}

impl BatchService {
    /// Create a new BatchService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Receive material into a new batch. Quantity lands in raw, or in
    /// inspection when the receipt is held for QC.
    pub async fn create_batch(
        &self,
        input: CreateBatchInput,
        actor: Option<String>,
    ) -> AppResult<BatchStockView> {
        validate_batch_code(&input.batch_code).map_err(|message| AppError::Validation {
            field: "batch_code".to_string(),
            message: message.to_string(),
        })?;
        validate_positive_quantity(input.quantity).map_err(|message| AppError::Validation {
            field: "quantity".to_string(),
            message: message.to_string(),
        })?;
        if let Some(expiry) = input.expiry_date {
            if expiry < input.manufacture_date {
                return Err(AppError::Validation {
                    field: "expiry_date".to_string(),
                    message: "Expiry date cannot precede manufacture date".to_string(),
                });
            }
        }

        let item_active: Option<bool> =
            sqlx::query_scalar("SELECT is_active FROM items WHERE id = $1")
                .bind(input.item_id)
                .fetch_optional(&self.db)
                .await?;
        match item_active {
            None => return Err(AppError::NotFound("Item".to_string())),
            Some(false) => {
                return Err(AppError::Validation {
                    field: "item_id".to_string(),
                    message: "Item is deactivated".to_string(),
                })
            }
            Some(true) => {}
        }

        let inspection_status = if input.hold_for_inspection {
            InspectionStatus::Pending
        } else {
            InspectionStatus::Passed
        };
        let initial_state = if input.hold_for_inspection {
            StockState::Inspection
        } else {
            StockState::Raw
        };

        let mut tx = self.db.begin().await?;

        let batch_id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO batches (item_id, batch_code, supplier_batch, manufacture_date,
                                 expiry_date, storage_location, inspection_status)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
        )
        .bind(input.item_id)
        .bind(&input.batch_code)
        .bind(&input.supplier_batch)
        .bind(input.manufacture_date)
        .bind(input.expiry_date)
        .bind(&input.storage_location)
        .bind(inspection_status.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                AppError::DuplicateEntry("batch code".to_string())
            } else {
                err.into()
            }
        })?;

        let mut batch = load_batch_for_update(&mut tx, batch_id).await?;
        let before = batch.states.clone();
        batch.states.credit(initial_state.clone(), input.quantity)?;
        write_batch_states(&mut tx, &batch).await?;
        apply_item_deltas(&mut tx, batch.item_id, &state_deltas(&before, &batch.states)).await?;
        append_movement(
            &mut tx,
            &movement(
                &batch,
                None,
                initial_state,
                input.quantity,
                None,
                actor.as_deref(),
                Some(("receipt", batch_id)),
            ),
        )
        .await?;

        tx.commit().await?;
        Ok(batch.into())
    }

    /// Move a batch through its quality gate. Passing a batch releases any
    /// quantity held in inspection back to raw.
    pub async fn set_inspection_status(
        &self,
        batch_id: Uuid,
        input: SetInspectionInput,
        actor: Option<String>,
    ) -> AppResult<BatchStockView> {
        let mut tx = self.db.begin().await?;

        let mut batch = load_batch_for_update(&mut tx, batch_id).await?;
        batch.inspection_status = input.status;

        sqlx::query("UPDATE batches SET inspection_status = $1, updated_at = NOW() WHERE id = $2")
            .bind(input.status.as_str())
            .bind(batch_id)
            .execute(&mut *tx)
            .await?;

        if input.status == InspectionStatus::Passed {
            let held = batch.states.quantity(&StockState::Inspection);
            if held > Decimal::ZERO {
                let before = batch.states.clone();
                batch.states.release_inspection(held)?;
                write_batch_states(&mut tx, &batch).await?;
                apply_item_deltas(&mut tx, batch.item_id, &state_deltas(&before, &batch.states))
                    .await?;
                append_movement(
                    &mut tx,
                    &movement(
                        &batch,
                        Some(StockState::Inspection),
                        StockState::Raw,
                        held,
                        None,
                        actor.as_deref(),
                        Some(("inspection", batch_id)),
                    ),
                )
                .await?;
            }
        }

        tx.commit().await?;
        Ok(batch.into())
    }

    /// Get a batch with its states
    pub async fn get_batch(&self, batch_id: Uuid) -> AppResult<BatchStockView> {
        crate::services::stock::StockService::new(self.db.clone())
            .get_batch_stock(batch_id)
            .await
    }

    /// List batches of an item, oldest manufacture date first (issue order)
    pub async fn list_batches(&self, item_id: Uuid) -> AppResult<Vec<BatchStockView>> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM batches WHERE item_id = $1 ORDER BY manufacture_date ASC, created_at ASC",
        )
        .bind(item_id)
        .fetch_all(&self.db)
        .await?;

        let stock = crate::services::stock::StockService::new(self.db.clone());
        let mut views = Vec::with_capacity(ids.len());
        for id in ids {
            views.push(stock.get_batch_stock(id).await?);
        }
        Ok(views)
    }

    /// Soft-deactivate a batch. Blocked while material is still out in WIP;
    /// batches with movement history are never deleted.
    pub async fn deactivate_batch(&self, batch_id: Uuid) -> AppResult<()> {
        let mut tx = self.db.begin().await?;

        let batch = load_batch_for_update(&mut tx, batch_id).await?;
        if batch.states.wip_total() > Decimal::ZERO {
            return Err(AppError::Validation {
                field: "batch_id".to_string(),
                message: "Batch still has work-in-process quantity".to_string(),
            });
        }

        sqlx::query("UPDATE batches SET is_active = FALSE, updated_at = NOW() WHERE id = $1")
            .bind(batch_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}
