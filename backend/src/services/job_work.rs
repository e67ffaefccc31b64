//! Job-work order service: creation, multi-batch issuance and return
//! reconciliation
//!
//! Issuance and returns are all-or-nothing across every batch a call
//! touches: batches are locked in ascending id order inside one transaction
//! and any precondition failure rolls the whole call back.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::services::is_unique_violation;
use crate::services::process::load_processes;
use crate::services::stock::{
    apply_move_to_wip, apply_reconcile_return, load_batch_for_update,
    load_item_batches_for_update, parse_process,
};
use shared::models::{
    format_job_number, return_status, select_fifo, IssueStatus, JobWorkBatch, JobWorkKind,
    JobWorkOrder, JobWorkProcess, JobWorkStatus, ProcessName,
};
use shared::StockError;
use shared::types::{PaginatedResponse, Pagination, PaginationMeta};
use shared::validation::validate_positive_quantity;

/// Job-work service covering order lifecycle and reconciliation
#[derive(Clone)]
pub struct JobWorkService {
    db: PgPool,
    number_allocation_retries: u32,
}

/// Input for creating a job-work order
#[derive(Debug, Deserialize)]
pub struct CreateJobWorkInput {
    pub vendor: String,
    pub item_id: Uuid,
    pub rate_per_unit: Option<Decimal>,
    pub kind: JobWorkKind,
    pub expected_return_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

/// One caller-chosen batch share of an issuance
#[derive(Debug, Deserialize)]
pub struct BatchSelectionInput {
    pub batch_id: Uuid,
    pub quantity: Decimal,
}

/// Input for issuing material to a job-work order
#[derive(Debug, Deserialize)]
pub struct IssueInput {
    pub quantity: Decimal,
    /// Target process; falls back to the order's first planned stage
    pub process: Option<String>,
    /// Explicit batch split; omitted means FIFO across the item's batches
    pub selections: Option<Vec<BatchSelectionInput>>,
}

/// One batch's share of a job-work return
#[derive(Debug, Deserialize)]
pub struct ReturnEntryInput {
    pub batch_id: Uuid,
    pub finished_quantity: Decimal,
    pub scrap_quantity: Decimal,
    pub unused_quantity: Decimal,
    /// Process the material was in; falls back to the issuance link's process
    pub process: Option<String>,
}

/// Input for reconciling a job-work return
#[derive(Debug, Deserialize)]
pub struct ReceiveInput {
    pub returns: Vec<ReturnEntryInput>,
}

/// Order with its stages and issuance links
#[derive(Debug, Serialize)]
pub struct JobWorkOrderDetail {
    #[serde(flatten)]
    pub order: JobWorkOrder,
    pub processes: Vec<JobWorkProcess>,
    pub batches: Vec<JobWorkBatch>,
}

#[derive(Debug, FromRow)]
pub(crate) struct OrderRow {
    pub id: Uuid,
    pub job_number: String,
    pub vendor: String,
    pub item_id: Uuid,
    pub quantity_sent: Decimal,
    pub quantity_received: Decimal,
    pub rate_per_unit: Decimal,
    pub status: String,
    pub kind: String,
    pub sent_date: Option<NaiveDate>,
    pub expected_return_date: Option<NaiveDate>,
    pub actual_return_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderRow {
    pub(crate) fn into_order(self) -> AppResult<JobWorkOrder> {
        let status = JobWorkStatus::from_str(&self.status).ok_or_else(|| {
            AppError::Internal(format!("Unknown job-work status: {}", self.status))
        })?;
        let kind = JobWorkKind::from_str(&self.kind)
            .ok_or_else(|| AppError::Internal(format!("Unknown job-work kind: {}", self.kind)))?;
        Ok(JobWorkOrder {
            id: self.id,
            job_number: self.job_number,
            vendor: self.vendor,
            item_id: self.item_id,
            quantity_sent: self.quantity_sent,
            quantity_received: self.quantity_received,
            rate_per_unit: self.rate_per_unit,
            status,
            kind,
            sent_date: self.sent_date,
            expected_return_date: self.expected_return_date,
            actual_return_date: self.actual_return_date,
            notes: self.notes,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct LinkRow {
    id: Uuid,
    job_work_id: Uuid,
    input_batch_id: Uuid,
    output_batch_id: Option<Uuid>,
    quantity_issued: Decimal,
    quantity_finished: Decimal,
    quantity_scrap: Decimal,
    quantity_unused: Decimal,
    process: Option<String>,
    status: String,
    issued_date: NaiveDate,
    received_date: Option<NaiveDate>,
}

impl LinkRow {
    fn into_link(self) -> AppResult<JobWorkBatch> {
        let process = match self.process {
            Some(name) => Some(
                ProcessName::parse(&name)
                    .map_err(|e| AppError::Internal(format!("Corrupt process name: {}", e)))?,
            ),
            None => None,
        };
        let status = IssueStatus::from_str(&self.status)
            .ok_or_else(|| AppError::Internal(format!("Unknown issuance status: {}", self.status)))?;
        Ok(JobWorkBatch {
            id: self.id,
            job_work_id: self.job_work_id,
            input_batch_id: self.input_batch_id,
            output_batch_id: self.output_batch_id,
            quantity_issued: self.quantity_issued,
            quantity_finished: self.quantity_finished,
            quantity_scrap: self.quantity_scrap,
            quantity_unused: self.quantity_unused,
            process,
            status,
            issued_date: self.issued_date,
            received_date: self.received_date,
        })
    }
}

pub(crate) const ORDER_COLUMNS: &str =
    "id, job_number, vendor, item_id, quantity_sent, quantity_received, rate_per_unit, \
     status, kind, sent_date, expected_return_date, actual_return_date, notes, \
     created_at, updated_at";

const LINK_COLUMNS: &str =
    "id, job_work_id, input_batch_id, output_batch_id, quantity_issued, quantity_finished, \
     quantity_scrap, quantity_unused, process, status, issued_date, received_date";

/// Load an order, locking its row.
pub(crate) async fn load_order_for_update(
    tx: &mut Transaction<'_, Postgres>,
    job_work_id: Uuid,
) -> AppResult<JobWorkOrder> {
    sqlx::query_as::<_, OrderRow>(&format!(
        "SELECT {} FROM job_work_orders WHERE id = $1 FOR UPDATE",
        ORDER_COLUMNS
    ))
    .bind(job_work_id)
    .fetch_optional(&mut **tx)
    .await?
    .ok_or_else(|| AppError::NotFound("Job work order".to_string()))?
    .into_order()
}

/// Load an order's issuance links, ascending input batch id.
pub(crate) async fn load_links(
    tx: &mut Transaction<'_, Postgres>,
    job_work_id: Uuid,
) -> AppResult<Vec<JobWorkBatch>> {
    let rows = sqlx::query_as::<_, LinkRow>(&format!(
        "SELECT {} FROM job_work_batches WHERE job_work_id = $1 ORDER BY input_batch_id ASC, id ASC",
        LINK_COLUMNS
    ))
    .bind(job_work_id)
    .fetch_all(&mut **tx)
    .await?;

    rows.into_iter().map(LinkRow::into_link).collect()
}

/// Persist a link's reconciliation fields.
pub(crate) async fn update_link(
    tx: &mut Transaction<'_, Postgres>,
    link: &JobWorkBatch,
) -> AppResult<()> {
    sqlx::query(
        r#"
        UPDATE job_work_batches
        SET quantity_finished = $1, quantity_scrap = $2, quantity_unused = $3,
            status = $4, received_date = $5, output_batch_id = $6
        WHERE id = $7
        "#,
    )
    .bind(link.quantity_finished)
    .bind(link.quantity_scrap)
    .bind(link.quantity_unused)
    .bind(link.status.as_str())
    .bind(link.received_date)
    .bind(link.output_batch_id)
    .bind(link.id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Refresh order totals and status from its links after a return.
pub(crate) async fn refresh_order_after_return(
    tx: &mut Transaction<'_, Postgres>,
    job_work_id: Uuid,
    today: NaiveDate,
) -> AppResult<JobWorkStatus> {
    let (issued, finished, reconciled): (Decimal, Decimal, Decimal) =
        sqlx::query_as::<_, (Option<Decimal>, Option<Decimal>, Option<Decimal>)>(
            r#"
            SELECT SUM(quantity_issued), SUM(quantity_finished),
                   SUM(quantity_finished + quantity_scrap + quantity_unused)
            FROM job_work_batches
            WHERE job_work_id = $1
            "#,
        )
        .bind(job_work_id)
        .fetch_one(&mut **tx)
        .await
        .map(|(a, b, c)| {
            (
                a.unwrap_or(Decimal::ZERO),
                b.unwrap_or(Decimal::ZERO),
                c.unwrap_or(Decimal::ZERO),
            )
        })?;

    let status = return_status(issued, reconciled);
    sqlx::query(
        r#"
        UPDATE job_work_orders
        SET quantity_received = $1, status = $2,
            actual_return_date = CASE WHEN $3 THEN $4 ELSE actual_return_date END,
            updated_at = NOW()
        WHERE id = $5
        "#,
    )
    .bind(finished)
    .bind(status.as_str())
    .bind(status == JobWorkStatus::Completed)
    .bind(today)
    .bind(job_work_id)
    .execute(&mut **tx)
    .await?;
    Ok(status)
}

impl JobWorkService {
    /// Create a new JobWorkService instance
    pub fn new(db: PgPool, number_allocation_retries: u32) -> Self {
        Self {
            db,
            number_allocation_retries,
        }
    }

    /// Create a job-work order with a race-safe job number. Numbers are
    /// sequential per calendar year; the unique index on job_number is the
    /// safety net, a lost race re-reads the max and retries.
    pub async fn create_order(&self, input: CreateJobWorkInput) -> AppResult<JobWorkOrder> {
        if input.vendor.trim().is_empty() {
            return Err(AppError::Validation {
                field: "vendor".to_string(),
                message: "Vendor cannot be empty".to_string(),
            });
        }
        let rate = input.rate_per_unit.unwrap_or(Decimal::ZERO);
        if rate < Decimal::ZERO {
            return Err(AppError::Validation {
                field: "rate_per_unit".to_string(),
                message: "Rate cannot be negative".to_string(),
            });
        }

        let item_exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM items WHERE id = $1)")
                .bind(input.item_id)
                .fetch_one(&self.db)
                .await?;
        if !item_exists {
            return Err(AppError::NotFound("Item".to_string()));
        }

        let year = Utc::now().year();
        let prefix = format!("JOB-{}-%", year);
        let attempts = self.number_allocation_retries.max(1);

        for attempt in 0..attempts {
            let max_sequence: Option<i32> = sqlx::query_scalar(
                r#"
                SELECT MAX(CAST(SPLIT_PART(job_number, '-', 3) AS INTEGER))
                FROM job_work_orders
                WHERE job_number LIKE $1
                "#,
            )
            .bind(&prefix)
            .fetch_one(&self.db)
            .await?;

            let job_number = format_job_number(year, (max_sequence.unwrap_or(0) + 1) as u32);

            let result = sqlx::query_as::<_, OrderRow>(&format!(
                r#"
                INSERT INTO job_work_orders (job_number, vendor, item_id, rate_per_unit,
                                             kind, expected_return_date, notes)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                RETURNING {}
                "#,
                ORDER_COLUMNS
            ))
            .bind(&job_number)
            .bind(input.vendor.trim())
            .bind(input.item_id)
            .bind(rate)
            .bind(input.kind.as_str())
            .bind(input.expected_return_date)
            .bind(&input.notes)
            .fetch_one(&self.db)
            .await;

            match result {
                Ok(row) => return row.into_order(),
                Err(err) if is_unique_violation(&err) && attempt + 1 < attempts => {
                    tracing::debug!("Job number {} lost allocation race, retrying", job_number);
                    continue;
                }
                Err(err) if is_unique_violation(&err) => {
                    return Err(AppError::Stock(StockError::ConcurrencyConflict));
                }
                Err(err) => return Err(err.into()),
            }
        }
        Err(AppError::Stock(StockError::ConcurrencyConflict))
    }

    /// Issue material from one or more batches to an order. Explicit
    /// selections are honored as given; without them batches are drawn FIFO
    /// (oldest manufacture date first). The whole issuance succeeds or
    /// nothing moves.
    pub async fn issue(
        &self,
        job_work_id: Uuid,
        input: IssueInput,
        actor: Option<String>,
    ) -> AppResult<JobWorkOrderDetail> {
        validate_positive_quantity(input.quantity).map_err(|message| AppError::Validation {
            field: "quantity".to_string(),
            message: message.to_string(),
        })?;

        let today = Utc::now().date_naive();
        let mut tx = self.db.begin().await?;

        let order = load_order_for_update(&mut tx, job_work_id).await?;
        if order.status.is_terminal() {
            return Err(AppError::Stock(StockError::InvalidStatusTransition {
                from: order.status.as_str().to_string(),
                to: JobWorkStatus::MaterialsSent.as_str().to_string(),
            }));
        }

        // Resolve the target process: explicit, or the first planned stage.
        let process = match &input.process {
            Some(name) => parse_process("process", name)?,
            None => {
                let processes = load_processes(&mut tx, job_work_id).await?;
                processes
                    .into_iter()
                    .min_by_key(|p| p.sequence)
                    .map(|p| p.process)
                    .ok_or_else(|| AppError::Validation {
                        field: "process".to_string(),
                        message: "No process given and the order has no planned stages"
                            .to_string(),
                    })?
            }
        };

        // Resolve the batch split.
        let draws: Vec<(Uuid, Decimal)> = match input.selections {
            Some(mut selections) => {
                if selections.is_empty() {
                    return Err(AppError::Validation {
                        field: "selections".to_string(),
                        message: "Batch selections cannot be empty".to_string(),
                    });
                }
                let total: Decimal = selections.iter().map(|s| s.quantity).sum();
                if total != input.quantity {
                    return Err(AppError::Validation {
                        field: "selections".to_string(),
                        message: format!(
                            "Selections total {} does not match requested quantity {}",
                            total, input.quantity
                        ),
                    });
                }
                // Fixed lock order across batches.
                selections.sort_by_key(|s| s.batch_id);
                for window in selections.windows(2) {
                    if window[0].batch_id == window[1].batch_id {
                        return Err(AppError::Validation {
                            field: "selections".to_string(),
                            message: "Duplicate batch in selections".to_string(),
                        });
                    }
                }
                let mut draws = Vec::with_capacity(selections.len());
                for selection in &selections {
                    validate_positive_quantity(selection.quantity).map_err(|message| {
                        AppError::Validation {
                            field: "selections".to_string(),
                            message: message.to_string(),
                        }
                    })?;
                    draws.push((selection.batch_id, selection.quantity));
                }
                draws
            }
            None => {
                let batches = load_item_batches_for_update(&mut tx, order.item_id).await?;
                select_fifo(&batches, input.quantity, today)?
                    .into_iter()
                    .map(|draw| (draw.batch_id, draw.quantity))
                    .collect()
            }
        };

        for (batch_id, quantity) in &draws {
            let mut batch = load_batch_for_update(&mut tx, *batch_id).await?;
            if batch.item_id != order.item_id {
                return Err(AppError::Validation {
                    field: "selections".to_string(),
                    message: format!(
                        "Batch {} does not belong to the order's item",
                        batch.batch_code
                    ),
                });
            }
            batch.ensure_issuable(today)?;
            apply_move_to_wip(
                &mut tx,
                &mut batch,
                *quantity,
                process.clone(),
                actor.as_deref(),
                Some(("job_work", job_work_id)),
            )
            .await?;

            sqlx::query(
                r#"
                INSERT INTO job_work_batches (job_work_id, input_batch_id, quantity_issued,
                                              process, status, issued_date)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(job_work_id)
            .bind(batch_id)
            .bind(quantity)
            .bind(process.as_str())
            .bind(IssueStatus::Issued.as_str())
            .bind(today)
            .execute(&mut *tx)
            .await?;
        }

        let new_status = if order.status == JobWorkStatus::Planned {
            JobWorkStatus::MaterialsSent
        } else {
            order.status
        };
        sqlx::query(
            r#"
            UPDATE job_work_orders
            SET quantity_sent = quantity_sent + $1, status = $2,
                sent_date = COALESCE(sent_date, $3), updated_at = NOW()
            WHERE id = $4
            "#,
        )
        .bind(input.quantity)
        .bind(new_status.as_str())
        .bind(today)
        .bind(job_work_id)
        .execute(&mut *tx)
        .await?;

        let detail = self.load_detail(&mut tx, job_work_id).await?;
        tx.commit().await?;
        Ok(detail)
    }

    /// Reconcile a return against an order. Each entry is validated against
    /// the remaining issued quantity of its batch link; finished and scrap
    /// leave WIP, unused goes back to raw. All entries commit together or
    /// not at all.
    pub async fn receive(
        &self,
        job_work_id: Uuid,
        input: ReceiveInput,
        actor: Option<String>,
    ) -> AppResult<JobWorkOrderDetail> {
        if input.returns.is_empty() {
            return Err(AppError::Validation {
                field: "returns".to_string(),
                message: "Return entries cannot be empty".to_string(),
            });
        }

        let today = Utc::now().date_naive();
        let mut tx = self.db.begin().await?;

        let order = load_order_for_update(&mut tx, job_work_id).await?;
        if order.status == JobWorkStatus::Cancelled {
            return Err(AppError::Stock(StockError::InvalidStatusTransition {
                from: order.status.as_str().to_string(),
                to: JobWorkStatus::PartialReceived.as_str().to_string(),
            }));
        }

        // Fixed lock order across batches.
        let mut entries = input.returns;
        entries.sort_by_key(|entry| entry.batch_id);

        for entry in &entries {
            let link_row = sqlx::query_as::<_, LinkRow>(&format!(
                r#"
                SELECT {}
                FROM job_work_batches
                WHERE job_work_id = $1 AND input_batch_id = $2 AND status <> 'completed'
                ORDER BY issued_date ASC, id ASC
                LIMIT 1
                FOR UPDATE
                "#,
                LINK_COLUMNS
            ))
            .bind(job_work_id)
            .bind(entry.batch_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound("Job work issuance for batch".to_string()))?;
            let mut link = link_row.into_link()?;

            let process = match &entry.process {
                Some(name) => parse_process("process", name)?,
                None => link.process.clone().ok_or_else(|| AppError::Validation {
                    field: "process".to_string(),
                    message: "No process given and the issuance has none recorded".to_string(),
                })?,
            };

            // Over-return guard against the link's remaining issued quantity.
            link.apply_return(
                entry.finished_quantity,
                entry.scrap_quantity,
                entry.unused_quantity,
                today,
            )?;

            let mut batch = load_batch_for_update(&mut tx, entry.batch_id).await?;
            apply_reconcile_return(
                &mut tx,
                &mut batch,
                entry.finished_quantity,
                entry.scrap_quantity,
                entry.unused_quantity,
                process,
                actor.as_deref(),
                Some(("job_work", job_work_id)),
            )
            .await?;

            update_link(&mut tx, &link).await?;
        }

        refresh_order_after_return(&mut tx, job_work_id, today).await?;

        let detail = self.load_detail(&mut tx, job_work_id).await?;
        tx.commit().await?;
        Ok(detail)
    }

    /// Get an order with its stages and issuance links
    pub async fn get_order(&self, job_work_id: Uuid) -> AppResult<JobWorkOrderDetail> {
        let mut tx = self.db.begin().await?;
        let detail = self.load_detail(&mut tx, job_work_id).await?;
        tx.commit().await?;
        Ok(detail)
    }

    /// List orders, newest first
    pub async fn list_orders(
        &self,
        pagination: Pagination,
    ) -> AppResult<PaginatedResponse<JobWorkOrder>> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM job_work_orders")
            .fetch_one(&self.db)
            .await?;

        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {} FROM job_work_orders ORDER BY created_at DESC LIMIT $1 OFFSET $2",
            ORDER_COLUMNS
        ))
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        let mut orders = Vec::with_capacity(rows.len());
        for row in rows {
            orders.push(row.into_order()?);
        }

        Ok(PaginatedResponse {
            pagination: PaginationMeta::new(&pagination, total as u64),
            data: orders,
        })
    }

    async fn load_detail(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        job_work_id: Uuid,
    ) -> AppResult<JobWorkOrderDetail> {
        let order = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {} FROM job_work_orders WHERE id = $1",
            ORDER_COLUMNS
        ))
        .bind(job_work_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Job work order".to_string()))?
        .into_order()?;

        let processes = load_processes(tx, job_work_id).await?;
        let batches = load_links(tx, job_work_id).await?;

        Ok(JobWorkOrderDetail {
            order,
            processes,
            batches,
        })
    }
}
