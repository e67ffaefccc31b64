//! Item registration and stock snapshot service

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::services::is_unique_violation;
use crate::services::stock::parse_state_rows;
use shared::models::{Item, ItemStock, ItemType, StockState};
use shared::types::{PaginatedResponse, Pagination, PaginationMeta};
use shared::validation::{validate_item_code, validate_unit};

/// Item service for managing stock-keeping units
#[derive(Clone)]
pub struct ItemService {
    db: PgPool,
}

/// Input for registering an item
#[derive(Debug, Deserialize, Validate)]
pub struct CreateItemInput {
    #[validate(length(min = 3, max = 20))]
    pub code: String,
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    pub unit: String,
    pub unit_price: Option<Decimal>,
    pub minimum_stock: Option<Decimal>,
    pub item_type: ItemType,
}

/// Input for updating an item
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateItemInput {
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    pub unit_price: Option<Decimal>,
    pub minimum_stock: Option<Decimal>,
}

#[derive(Debug, FromRow)]
struct ItemRow {
    id: Uuid,
    code: String,
    name: String,
    unit: String,
    unit_price: Decimal,
    minimum_stock: Decimal,
    item_type: String,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ItemRow {
    fn into_item(self) -> AppResult<Item> {
        let item_type = ItemType::from_str(&self.item_type).ok_or_else(|| {
            AppError::Internal(format!(
                "Unknown item type stored for item {}: {}",
                self.id, self.item_type
            ))
        })?;
        Ok(Item {
            id: self.id,
            code: self.code,
            name: self.name,
            unit: self.unit,
            unit_price: self.unit_price,
            minimum_stock: self.minimum_stock,
            item_type,
            is_active: self.is_active,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

const ITEM_COLUMNS: &str = "id, code, name, unit, unit_price, minimum_stock, item_type, \
                            is_active, created_at, updated_at";

impl ItemService {
    /// Create a new ItemService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Register a new item
    pub async fn create_item(&self, input: CreateItemInput) -> AppResult<Item> {
        validate_item_code(&input.code).map_err(|message| AppError::Validation {
            field: "code".to_string(),
            message: message.to_string(),
        })?;
        validate_unit(&input.unit).map_err(|message| AppError::Validation {
            field: "unit".to_string(),
            message: message.to_string(),
        })?;

        let unit_price = input.unit_price.unwrap_or(Decimal::ZERO);
        let minimum_stock = input.minimum_stock.unwrap_or(Decimal::ZERO);
        if unit_price < Decimal::ZERO || minimum_stock < Decimal::ZERO {
            return Err(AppError::Validation {
                field: "unit_price".to_string(),
                message: "Prices and thresholds cannot be negative".to_string(),
            });
        }

        let row = sqlx::query_as::<_, ItemRow>(&format!(
            r#"
            INSERT INTO items (code, name, unit, unit_price, minimum_stock, item_type)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {}
            "#,
            ITEM_COLUMNS
        ))
        .bind(&input.code)
        .bind(&input.name)
        .bind(&input.unit)
        .bind(unit_price)
        .bind(minimum_stock)
        .bind(input.item_type.as_str())
        .fetch_one(&self.db)
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                AppError::DuplicateEntry("item code".to_string())
            } else {
                err.into()
            }
        })?;

        row.into_item()
    }

    /// Update mutable item fields
    pub async fn update_item(&self, item_id: Uuid, input: UpdateItemInput) -> AppResult<Item> {
        let existing = self.get_item(item_id).await?.item;

        let name = input.name.unwrap_or(existing.name);
        let unit_price = input.unit_price.unwrap_or(existing.unit_price);
        let minimum_stock = input.minimum_stock.unwrap_or(existing.minimum_stock);
        if unit_price < Decimal::ZERO || minimum_stock < Decimal::ZERO {
            return Err(AppError::Validation {
                field: "unit_price".to_string(),
                message: "Prices and thresholds cannot be negative".to_string(),
            });
        }

        let row = sqlx::query_as::<_, ItemRow>(&format!(
            r#"
            UPDATE items
            SET name = $1, unit_price = $2, minimum_stock = $3, updated_at = NOW()
            WHERE id = $4
            RETURNING {}
            "#,
            ITEM_COLUMNS
        ))
        .bind(&name)
        .bind(unit_price)
        .bind(minimum_stock)
        .bind(item_id)
        .fetch_one(&self.db)
        .await?;

        row.into_item()
    }

    /// Get an item with its aggregate per-state quantities
    pub async fn get_item(&self, item_id: Uuid) -> AppResult<ItemStock> {
        let row = sqlx::query_as::<_, ItemRow>(&format!(
            "SELECT {} FROM items WHERE id = $1",
            ITEM_COLUMNS
        ))
        .bind(item_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Item".to_string()))?;

        let states = sqlx::query_as::<_, (String, Decimal)>(
            "SELECT state_key, quantity FROM item_states WHERE item_id = $1",
        )
        .bind(item_id)
        .fetch_all(&self.db)
        .await?;

        Ok(ItemStock {
            item: row.into_item()?,
            states: parse_state_rows(states)?,
        })
    }

    /// Usable quantity for an item: everything except scrap and except
    /// inspection quantity sitting in failed or quarantined batches.
    pub async fn get_available_quantity(&self, item_id: Uuid) -> AppResult<Decimal> {
        let total: Option<Decimal> =
            sqlx::query_scalar("SELECT SUM(quantity) FROM item_states WHERE item_id = $1")
                .bind(item_id)
                .fetch_one(&self.db)
                .await?;

        let excluded: Option<Decimal> = sqlx::query_scalar(
            r#"
            SELECT SUM(bs.quantity)
            FROM batch_states bs
            JOIN batches b ON b.id = bs.batch_id
            WHERE b.item_id = $1
              AND (bs.state_key = 'scrap'
                   OR (bs.state_key = 'inspection'
                       AND b.inspection_status IN ('failed', 'quarantine')))
            "#,
        )
        .bind(item_id)
        .fetch_one(&self.db)
        .await?;

        Ok(total.unwrap_or(Decimal::ZERO) - excluded.unwrap_or(Decimal::ZERO))
    }

    /// List items, newest first
    pub async fn list_items(&self, pagination: Pagination) -> AppResult<PaginatedResponse<Item>> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM items")
            .fetch_one(&self.db)
            .await?;

        let rows = sqlx::query_as::<_, ItemRow>(&format!(
            "SELECT {} FROM items ORDER BY created_at DESC LIMIT $1 OFFSET $2",
            ITEM_COLUMNS
        ))
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            items.push(row.into_item()?);
        }

        Ok(PaginatedResponse {
            pagination: PaginationMeta::new(&pagination, total as u64),
            data: items,
        })
    }

    /// Items whose raw stock has fallen to or below their reorder threshold
    pub async fn list_below_minimum(&self) -> AppResult<Vec<(Item, Decimal)>> {
        let rows = sqlx::query_as::<_, ItemRow>(&format!(
            r#"
            SELECT {}
            FROM items
            WHERE is_active = TRUE AND minimum_stock > 0
            ORDER BY code
            "#,
            ITEM_COLUMNS
        ))
        .fetch_all(&self.db)
        .await?;

        let mut result = Vec::new();
        for row in rows {
            let raw: Option<Decimal> = sqlx::query_scalar(
                "SELECT quantity FROM item_states WHERE item_id = $1 AND state_key = $2",
            )
            .bind(row.id)
            .bind(StockState::Raw.key())
            .fetch_optional(&self.db)
            .await?;
            let raw = raw.unwrap_or(Decimal::ZERO);

            let item = row.into_item()?;
            if item.is_below_minimum(raw) {
                result.push((item, raw));
            }
        }
        Ok(result)
    }

    /// Soft-deactivate an item. Items referenced by batches or history are
    /// never deleted.
    pub async fn deactivate_item(&self, item_id: Uuid) -> AppResult<()> {
        let result = sqlx::query("UPDATE items SET is_active = FALSE, updated_at = NOW() WHERE id = $1")
            .bind(item_id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Item".to_string()));
        }
        Ok(())
    }
}
