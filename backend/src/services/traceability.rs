//! Batch traceability and process-occupancy reporting
//!
//! Read-only views over the movement ledger and the state maps; owns no
//! state of its own.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use shared::models::{MovementEntry, ProcessName, StockState};

/// Traceability service for movement chains and occupancy summaries
#[derive(Clone)]
pub struct TraceabilityService {
    db: PgPool,
}

/// Complete traceability view for a batch
#[derive(Debug, Serialize)]
pub struct BatchTraceView {
    pub batch_id: Uuid,
    pub batch_code: String,
    pub item_id: Uuid,
    pub item_code: String,
    pub item_name: String,
    pub movements: Vec<MovementEntry>,
    pub job_works: Vec<JobWorkLinkInfo>,
}

/// One job-work involvement of a batch
#[derive(Debug, Serialize)]
pub struct JobWorkLinkInfo {
    pub job_work_id: Uuid,
    pub job_number: String,
    pub vendor: String,
    pub process: Option<String>,
    pub quantity_issued: Decimal,
    pub quantity_finished: Decimal,
    pub quantity_scrap: Decimal,
    pub quantity_unused: Decimal,
    pub status: String,
    pub issued_date: NaiveDate,
    pub received_date: Option<NaiveDate>,
}

/// Occupancy of one state for an item, summed across its batches
#[derive(Debug, Serialize)]
pub struct StateOccupancy {
    pub state_key: String,
    pub quantity: Decimal,
    pub batch_count: i64,
}

/// Factory-wide occupancy of one process's WIP slot
#[derive(Debug, Serialize)]
pub struct ProcessOccupancy {
    pub process: String,
    pub quantity: Decimal,
    pub item_count: i64,
}

#[derive(Debug, FromRow)]
struct MovementRow {
    id: Uuid,
    batch_id: Uuid,
    item_id: Uuid,
    from_state: Option<String>,
    to_state: String,
    quantity: Decimal,
    process: Option<String>,
    actor: Option<String>,
    reference_type: Option<String>,
    reference_id: Option<Uuid>,
    created_at: DateTime<Utc>,
}

impl MovementRow {
    fn into_entry(self) -> AppResult<MovementEntry> {
        let from_state = match self.from_state {
            Some(key) => Some(
                StockState::parse_key(&key)
                    .map_err(|e| AppError::Internal(format!("Corrupt state key '{}': {}", key, e)))?,
            ),
            None => None,
        };
        let to_state = StockState::parse_key(&self.to_state).map_err(|e| {
            AppError::Internal(format!("Corrupt state key '{}': {}", self.to_state, e))
        })?;
        let process = match self.process {
            Some(name) => Some(
                ProcessName::parse(&name)
                    .map_err(|e| AppError::Internal(format!("Corrupt process name: {}", e)))?,
            ),
            None => None,
        };
        Ok(MovementEntry {
            id: self.id,
            batch_id: self.batch_id,
            item_id: self.item_id,
            from_state,
            to_state,
            quantity: self.quantity,
            process,
            actor: self.actor,
            reference_type: self.reference_type,
            reference_id: self.reference_id,
            created_at: self.created_at,
        })
    }
}

impl TraceabilityService {
    /// Create a new TraceabilityService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Full traceability chain for a batch: its ordered movement ledger
    /// entries and every job work it fed.
    pub async fn get_batch_trace(&self, batch_id: Uuid) -> AppResult<BatchTraceView> {
        let header = sqlx::query_as::<_, (Uuid, String, Uuid, String, String)>(
            r#"
            SELECT b.id, b.batch_code, i.id, i.code, i.name
            FROM batches b
            JOIN items i ON i.id = b.item_id
            WHERE b.id = $1
            "#,
        )
        .bind(batch_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Batch".to_string()))?;

        let movement_rows = sqlx::query_as::<_, MovementRow>(
            r#"
            SELECT id, batch_id, item_id, from_state, to_state, quantity, process,
                   actor, reference_type, reference_id, created_at
            FROM stock_movements
            WHERE batch_id = $1
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(batch_id)
        .fetch_all(&self.db)
        .await?;

        let mut movements = Vec::with_capacity(movement_rows.len());
        for row in movement_rows {
            movements.push(row.into_entry()?);
        }

        let job_works = sqlx::query_as::<_, (Uuid, String, String, Option<String>, Decimal, Decimal, Decimal, Decimal, String, NaiveDate, Option<NaiveDate>)>(
            r#"
            SELECT o.id, o.job_number, o.vendor, jb.process, jb.quantity_issued,
                   jb.quantity_finished, jb.quantity_scrap, jb.quantity_unused,
                   jb.status, jb.issued_date, jb.received_date
            FROM job_work_batches jb
            JOIN job_work_orders o ON o.id = jb.job_work_id
            WHERE jb.input_batch_id = $1 OR jb.output_batch_id = $1
            ORDER BY jb.issued_date ASC
            "#,
        )
        .bind(batch_id)
        .fetch_all(&self.db)
        .await?;

        Ok(BatchTraceView {
            batch_id: header.0,
            batch_code: header.1,
            item_id: header.2,
            item_code: header.3,
            item_name: header.4,
            movements,
            job_works: job_works
                .into_iter()
                .map(|r| JobWorkLinkInfo {
                    job_work_id: r.0,
                    job_number: r.1,
                    vendor: r.2,
                    process: r.3,
                    quantity_issued: r.4,
                    quantity_finished: r.5,
                    quantity_scrap: r.6,
                    quantity_unused: r.7,
                    status: r.8,
                    issued_date: r.9,
                    received_date: r.10,
                })
                .collect(),
        })
    }

    /// Per-state occupancy for one item, summed across its batches.
    pub async fn get_item_summary(&self, item_id: Uuid) -> AppResult<Vec<StateOccupancy>> {
        let item_exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM items WHERE id = $1)")
                .bind(item_id)
                .fetch_one(&self.db)
                .await?;
        if !item_exists {
            return Err(AppError::NotFound("Item".to_string()));
        }

        let rows = sqlx::query_as::<_, (String, Decimal, i64)>(
            r#"
            SELECT bs.state_key, SUM(bs.quantity) AS quantity,
                   COUNT(DISTINCT bs.batch_id) FILTER (WHERE bs.quantity > 0) AS batch_count
            FROM batch_states bs
            JOIN batches b ON b.id = bs.batch_id
            WHERE b.item_id = $1
            GROUP BY bs.state_key
            ORDER BY bs.state_key
            "#,
        )
        .bind(item_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(state_key, quantity, batch_count)| StateOccupancy {
                state_key,
                quantity,
                batch_count,
            })
            .collect())
    }

    /// Factory-wide WIP occupancy per process across all items.
    pub async fn get_factory_summary(&self) -> AppResult<Vec<ProcessOccupancy>> {
        let rows = sqlx::query_as::<_, (String, Decimal, i64)>(
            r#"
            SELECT bs.state_key, SUM(bs.quantity) AS quantity,
                   COUNT(DISTINCT b.item_id) FILTER (WHERE bs.quantity > 0) AS item_count
            FROM batch_states bs
            JOIN batches b ON b.id = bs.batch_id
            WHERE bs.state_key LIKE 'wip:%' AND bs.quantity > 0
            GROUP BY bs.state_key
            ORDER BY quantity DESC
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(state_key, quantity, item_count)| ProcessOccupancy {
                process: state_key.trim_start_matches("wip:").to_string(),
                quantity,
                item_count,
            })
            .collect())
    }
}
