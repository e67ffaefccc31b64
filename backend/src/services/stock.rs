//! State transition engine
//!
//! The only code path that changes per-state quantities. Every command runs
//! in one transaction: batch rows are locked with SELECT ... FOR UPDATE (in
//! ascending id order when more than one batch is involved), the pure
//! ledger operation is applied in memory, and only then are batch states,
//! the item-level mirror and the movement ledger written. A failed
//! precondition aborts the transaction with nothing changed.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use shared::models::{
    select_fifo, Batch, InspectionStatus, MovementEntry, ProcessName, StockLedger, StockState,
};

/// Stock service wrapping the state transition engine
#[derive(Clone)]
pub struct StockService {
    db: PgPool,
}

/// Batch with derived quantities, as returned by stock commands
#[derive(Debug, Serialize)]
pub struct BatchStockView {
    #[serde(flatten)]
    pub batch: Batch,
    pub total_quantity: Decimal,
    pub available_quantity: Decimal,
}

impl From<Batch> for BatchStockView {
    fn from(batch: Batch) -> Self {
        let total_quantity = batch.total_quantity();
        let available_quantity = batch.available_quantity();
        Self {
            batch,
            total_quantity,
            available_quantity,
        }
    }
}

/// Input for moving raw stock into a WIP slot. Either a specific batch or
/// an item (FIFO across its batches) must be named.
#[derive(Debug, Deserialize)]
pub struct MoveToWipInput {
    pub batch_id: Option<Uuid>,
    pub item_id: Option<Uuid>,
    pub quantity: Decimal,
    pub process: String,
}

/// Input for moving WIP between two processes
#[derive(Debug, Deserialize)]
pub struct MoveBetweenInput {
    pub batch_id: Uuid,
    pub quantity: Decimal,
    pub from_process: String,
    pub to_process: String,
}

/// Input for closing a WIP slot into finished and scrap
#[derive(Debug, Deserialize)]
pub struct ReceiveFromWipInput {
    pub batch_id: Uuid,
    pub finished_quantity: Decimal,
    pub scrap_quantity: Decimal,
    pub process: String,
}

/// Input for releasing passed inspection quantity back to raw
#[derive(Debug, Deserialize)]
pub struct ReleaseInspectionInput {
    pub batch_id: Uuid,
    pub quantity: Decimal,
}

/// One state where the item aggregate disagrees with the batch sum
#[derive(Debug, Serialize)]
pub struct StateMismatch {
    pub state_key: String,
    pub item_quantity: Decimal,
    pub batch_sum: Decimal,
}

#[derive(Debug, FromRow)]
pub(crate) struct BatchRow {
    pub id: Uuid,
    pub item_id: Uuid,
    pub batch_code: String,
    pub supplier_batch: Option<String>,
    pub manufacture_date: NaiveDate,
    pub expiry_date: Option<NaiveDate>,
    pub storage_location: Option<String>,
    pub inspection_status: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BatchRow {
    pub(crate) fn into_batch(self, states: StockLedger) -> AppResult<Batch> {
        let inspection_status =
            InspectionStatus::from_str(&self.inspection_status).ok_or_else(|| {
                AppError::Internal(format!(
                    "Unknown inspection status stored for batch {}: {}",
                    self.id, self.inspection_status
                ))
            })?;
        Ok(Batch {
            id: self.id,
            item_id: self.item_id,
            batch_code: self.batch_code,
            supplier_batch: self.supplier_batch,
            manufacture_date: self.manufacture_date,
            expiry_date: self.expiry_date,
            storage_location: self.storage_location,
            inspection_status,
            states,
            is_active: self.is_active,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

const BATCH_COLUMNS: &str = "id, item_id, batch_code, supplier_batch, manufacture_date, \
                             expiry_date, storage_location, inspection_status, is_active, \
                             created_at, updated_at";

/// Parse persisted `(state_key, quantity)` rows into a ledger.
pub(crate) fn parse_state_rows(rows: Vec<(String, Decimal)>) -> AppResult<StockLedger> {
    let mut entries = Vec::with_capacity(rows.len());
    for (key, quantity) in rows {
        let state = StockState::parse_key(&key)
            .map_err(|e| AppError::Internal(format!("Corrupt state key '{}': {}", key, e)))?;
        entries.push((state, quantity));
    }
    StockLedger::from_entries(entries).map_err(AppError::Stock)
}

/// Parse a process name out of request input.
pub(crate) fn parse_process(field: &str, value: &str) -> AppResult<ProcessName> {
    ProcessName::parse(value).map_err(|message| AppError::Validation {
        field: field.to_string(),
        message: message.to_string(),
    })
}

/// Load one batch with its states, locking the batch row.
pub(crate) async fn load_batch_for_update(
    tx: &mut Transaction<'_, Postgres>,
    batch_id: Uuid,
) -> AppResult<Batch> {
    let row = sqlx::query_as::<_, BatchRow>(&format!(
        "SELECT {} FROM batches WHERE id = $1 FOR UPDATE",
        BATCH_COLUMNS
    ))
    .bind(batch_id)
    .fetch_optional(&mut **tx)
    .await?
    .ok_or_else(|| AppError::NotFound("Batch".to_string()))?;

    let states = sqlx::query_as::<_, (String, Decimal)>(
        "SELECT state_key, quantity FROM batch_states WHERE batch_id = $1",
    )
    .bind(batch_id)
    .fetch_all(&mut **tx)
    .await?;

    row.into_batch(parse_state_rows(states)?)
}

/// Load all active batches of an item with their states, locking the batch
/// rows in ascending id order to keep multi-batch lock acquisition
/// deadlock-free.
pub(crate) async fn load_item_batches_for_update(
    tx: &mut Transaction<'_, Postgres>,
    item_id: Uuid,
) -> AppResult<Vec<Batch>> {
    let rows = sqlx::query_as::<_, BatchRow>(&format!(
        "SELECT {} FROM batches WHERE item_id = $1 AND is_active = TRUE ORDER BY id ASC FOR UPDATE",
        BATCH_COLUMNS
    ))
    .bind(item_id)
    .fetch_all(&mut **tx)
    .await?;

    let mut batches = Vec::with_capacity(rows.len());
    for row in rows {
        let states = sqlx::query_as::<_, (String, Decimal)>(
            "SELECT state_key, quantity FROM batch_states WHERE batch_id = $1",
        )
        .bind(row.id)
        .fetch_all(&mut **tx)
        .await?;
        batches.push(row.into_batch(parse_state_rows(states)?)?);
    }
    Ok(batches)
}

/// Persist a batch's ledger and refresh its updated_at.
pub(crate) async fn write_batch_states(
    tx: &mut Transaction<'_, Postgres>,
    batch: &Batch,
) -> AppResult<()> {
    for (state, quantity) in batch.states.entries() {
        sqlx::query(
            r#"
            INSERT INTO batch_states (batch_id, state_key, quantity)
            VALUES ($1, $2, $3)
            ON CONFLICT (batch_id, state_key) DO UPDATE SET quantity = EXCLUDED.quantity
            "#,
        )
        .bind(batch.id)
        .bind(state.key())
        .bind(quantity)
        .execute(&mut **tx)
        .await?;
    }

    sqlx::query("UPDATE batches SET updated_at = NOW() WHERE id = $1")
        .bind(batch.id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

/// Per-state differences between two ledger snapshots.
pub(crate) fn state_deltas(before: &StockLedger, after: &StockLedger) -> Vec<(StockState, Decimal)> {
    let mut deltas = Vec::new();
    for (state, after_quantity) in after.entries() {
        let delta = after_quantity - before.quantity(state);
        if delta != Decimal::ZERO {
            deltas.push((state.clone(), delta));
        }
    }
    // States present before but absent after cannot occur: ledger slots are
    // never removed. Guarded here anyway.
    for (state, before_quantity) in before.entries() {
        if after.quantity(state) == Decimal::ZERO
            && before_quantity != Decimal::ZERO
            && !deltas.iter().any(|(s, _)| s == state)
        {
            deltas.push((state.clone(), -before_quantity));
        }
    }
    deltas
}

/// Mirror batch-level deltas onto the item aggregate and refresh the item's
/// updated_at.
pub(crate) async fn apply_item_deltas(
    tx: &mut Transaction<'_, Postgres>,
    item_id: Uuid,
    deltas: &[(StockState, Decimal)],
) -> AppResult<()> {
    for (state, delta) in deltas {
        sqlx::query(
            r#"
            INSERT INTO item_states (item_id, state_key, quantity)
            VALUES ($1, $2, $3)
            ON CONFLICT (item_id, state_key)
                DO UPDATE SET quantity = item_states.quantity + EXCLUDED.quantity
            "#,
        )
        .bind(item_id)
        .bind(state.key())
        .bind(delta)
        .execute(&mut **tx)
        .await?;
    }

    sqlx::query("UPDATE items SET updated_at = NOW() WHERE id = $1")
        .bind(item_id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

/// Append one entry to the movement ledger.
pub(crate) async fn append_movement(
    tx: &mut Transaction<'_, Postgres>,
    entry: &MovementEntry,
) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO stock_movements (id, batch_id, item_id, from_state, to_state, quantity,
                                     process, actor, reference_type, reference_id, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        "#,
    )
    .bind(entry.id)
    .bind(entry.batch_id)
    .bind(entry.item_id)
    .bind(entry.from_state.as_ref().map(|s| s.key()))
    .bind(entry.to_state.key())
    .bind(entry.quantity)
    .bind(entry.process.as_ref().map(|p| p.as_str().to_string()))
    .bind(entry.actor.as_deref())
    .bind(entry.reference_type.as_deref())
    .bind(entry.reference_id)
    .bind(entry.created_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Build a movement entry stamped now.
pub(crate) fn movement(
    batch: &Batch,
    from_state: Option<StockState>,
    to_state: StockState,
    quantity: Decimal,
    process: Option<ProcessName>,
    actor: Option<&str>,
    reference: Option<(&str, Uuid)>,
) -> MovementEntry {
    MovementEntry {
        id: Uuid::new_v4(),
        batch_id: batch.id,
        item_id: batch.item_id,
        from_state,
        to_state,
        quantity,
        process,
        actor: actor.map(String::from),
        reference_type: reference.map(|(kind, _)| kind.to_string()),
        reference_id: reference.map(|(_, id)| id),
        created_at: Utc::now(),
    }
}

impl StockService {
    /// Create a new StockService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Move raw stock into a process's WIP slot. With a batch named, draws
    /// from that batch alone; with only an item named, draws FIFO across the
    /// item's batches (oldest manufacture date first), all-or-nothing.
    pub async fn move_to_wip(
        &self,
        input: MoveToWipInput,
        actor: Option<String>,
    ) -> AppResult<Vec<BatchStockView>> {
        let process = parse_process("process", &input.process)?;
        let today = Utc::now().date_naive();
        let mut tx = self.db.begin().await?;

        let mut touched = Vec::new();
        match (input.batch_id, input.item_id) {
            (Some(batch_id), _) => {
                let mut batch = load_batch_for_update(&mut tx, batch_id).await?;
                batch.ensure_issuable(today)?;
                apply_move_to_wip(
                    &mut tx,
                    &mut batch,
                    input.quantity,
                    process,
                    actor.as_deref(),
                    None,
                )
                .await?;
                touched.push(batch);
            }
            (None, Some(item_id)) => {
                let mut batches = load_item_batches_for_update(&mut tx, item_id).await?;
                let draws = select_fifo(&batches, input.quantity, today)?;
                for draw in draws {
                    let batch = batches
                        .iter_mut()
                        .find(|b| b.id == draw.batch_id)
                        .ok_or_else(|| {
                            AppError::Internal("FIFO draw references an unloaded batch".to_string())
                        })?;
                    apply_move_to_wip(
                        &mut tx,
                        batch,
                        draw.quantity,
                        process.clone(),
                        actor.as_deref(),
                        None,
                    )
                    .await?;
                    touched.push(batch.clone());
                }
            }
            (None, None) => {
                return Err(AppError::Validation {
                    field: "batch_id".to_string(),
                    message: "Either batch_id or item_id must be provided".to_string(),
                });
            }
        }

        tx.commit().await?;
        Ok(touched.into_iter().map(BatchStockView::from).collect())
    }

    /// Move WIP quantity from one process slot to another.
    pub async fn move_between_processes(
        &self,
        input: MoveBetweenInput,
        actor: Option<String>,
    ) -> AppResult<BatchStockView> {
        let from = parse_process("from_process", &input.from_process)?;
        let to = parse_process("to_process", &input.to_process)?;
        let today = Utc::now().date_naive();
        let mut tx = self.db.begin().await?;

        let mut batch = load_batch_for_update(&mut tx, input.batch_id).await?;
        batch.ensure_issuable(today)?;

        let before = batch.states.clone();
        batch
            .states
            .move_between_processes(input.quantity, from.clone(), to.clone())?;
        write_batch_states(&mut tx, &batch).await?;
        apply_item_deltas(&mut tx, batch.item_id, &state_deltas(&before, &batch.states)).await?;
        append_movement(
            &mut tx,
            &movement(
                &batch,
                Some(StockState::Wip(from)),
                StockState::Wip(to.clone()),
                input.quantity,
                Some(to),
                actor.as_deref(),
                None,
            ),
        )
        .await?;

        tx.commit().await?;
        Ok(batch.into())
    }

    /// Close out a WIP slot into finished and scrap.
    pub async fn receive_from_wip(
        &self,
        input: ReceiveFromWipInput,
        actor: Option<String>,
    ) -> AppResult<BatchStockView> {
        let process = parse_process("process", &input.process)?;
        let mut tx = self.db.begin().await?;

        let mut batch = load_batch_for_update(&mut tx, input.batch_id).await?;
        apply_receive_from_wip(
            &mut tx,
            &mut batch,
            input.finished_quantity,
            input.scrap_quantity,
            process,
            actor.as_deref(),
            None,
        )
        .await?;

        tx.commit().await?;
        Ok(batch.into())
    }

    /// Release quantity held in inspection back to raw, once the batch has
    /// passed its quality gate.
    pub async fn release_inspection(
        &self,
        input: ReleaseInspectionInput,
        actor: Option<String>,
    ) -> AppResult<BatchStockView> {
        let mut tx = self.db.begin().await?;

        let mut batch = load_batch_for_update(&mut tx, input.batch_id).await?;
        if batch.inspection_status.blocks_issue() {
            return Err(AppError::Stock(shared::StockError::ExpiredOrRejectedBatch {
                batch_code: batch.batch_code.clone(),
                reason: format!(
                    "inspection status is {}",
                    batch.inspection_status.as_str()
                ),
            }));
        }

        let before = batch.states.clone();
        batch.states.release_inspection(input.quantity)?;
        write_batch_states(&mut tx, &batch).await?;
        apply_item_deltas(&mut tx, batch.item_id, &state_deltas(&before, &batch.states)).await?;
        append_movement(
            &mut tx,
            &movement(
                &batch,
                Some(StockState::Inspection),
                StockState::Raw,
                input.quantity,
                None,
                actor.as_deref(),
                None,
            ),
        )
        .await?;

        tx.commit().await?;
        Ok(batch.into())
    }

    /// Read a batch with its current states.
    pub async fn get_batch_stock(&self, batch_id: Uuid) -> AppResult<BatchStockView> {
        let row = sqlx::query_as::<_, BatchRow>(&format!(
            "SELECT {} FROM batches WHERE id = $1",
            BATCH_COLUMNS
        ))
        .bind(batch_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Batch".to_string()))?;

        let states = sqlx::query_as::<_, (String, Decimal)>(
            "SELECT state_key, quantity FROM batch_states WHERE batch_id = $1",
        )
        .bind(batch_id)
        .fetch_all(&self.db)
        .await?;

        Ok(row.into_batch(parse_state_rows(states)?)?.into())
    }

    /// Compare the item aggregate against the sum over its batches, state by
    /// state. An empty result means the mirror invariant holds.
    pub async fn check_item_consistency(&self, item_id: Uuid) -> AppResult<Vec<StateMismatch>> {
        let rows = sqlx::query_as::<_, (String, Decimal, Decimal)>(
            r#"
            SELECT COALESCE(i.state_key, b.state_key) AS state_key,
                   COALESCE(i.quantity, 0) AS item_quantity,
                   COALESCE(b.quantity, 0) AS batch_sum
            FROM (
                SELECT state_key, quantity FROM item_states WHERE item_id = $1
            ) i
            FULL OUTER JOIN (
                SELECT bs.state_key, SUM(bs.quantity) AS quantity
                FROM batch_states bs
                JOIN batches b ON b.id = bs.batch_id
                WHERE b.item_id = $1
                GROUP BY bs.state_key
            ) b ON b.state_key = i.state_key
            WHERE COALESCE(i.quantity, 0) <> COALESCE(b.quantity, 0)
            "#,
        )
        .bind(item_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(state_key, item_quantity, batch_sum)| StateMismatch {
                state_key,
                item_quantity,
                batch_sum,
            })
            .collect())
    }
}

/// Apply a raw -> WIP move on a locked batch: ledger, write-back, item
/// mirror and movement entry.
pub(crate) async fn apply_move_to_wip(
    tx: &mut Transaction<'_, Postgres>,
    batch: &mut Batch,
    quantity: Decimal,
    process: ProcessName,
    actor: Option<&str>,
    reference: Option<(&str, Uuid)>,
) -> AppResult<()> {
    let before = batch.states.clone();
    batch.states.move_to_wip(quantity, process.clone())?;
    write_batch_states(tx, batch).await?;
    apply_item_deltas(tx, batch.item_id, &state_deltas(&before, &batch.states)).await?;
    append_movement(
        tx,
        &movement(
            batch,
            Some(StockState::Raw),
            StockState::Wip(process.clone()),
            quantity,
            Some(process),
            actor,
            reference,
        ),
    )
    .await?;
    Ok(())
}

/// Apply a WIP -> WIP move between two processes on a locked batch.
pub(crate) async fn apply_move_between(
    tx: &mut Transaction<'_, Postgres>,
    batch: &mut Batch,
    quantity: Decimal,
    from: ProcessName,
    to: ProcessName,
    actor: Option<&str>,
    reference: Option<(&str, Uuid)>,
) -> AppResult<()> {
    let before = batch.states.clone();
    batch
        .states
        .move_between_processes(quantity, from.clone(), to.clone())?;
    write_batch_states(tx, batch).await?;
    apply_item_deltas(tx, batch.item_id, &state_deltas(&before, &batch.states)).await?;
    append_movement(
        tx,
        &movement(
            batch,
            Some(StockState::Wip(from)),
            StockState::Wip(to.clone()),
            quantity,
            Some(to),
            actor,
            reference,
        ),
    )
    .await?;
    Ok(())
}

/// Apply a WIP -> finished/scrap receipt on a locked batch.
pub(crate) async fn apply_receive_from_wip(
    tx: &mut Transaction<'_, Postgres>,
    batch: &mut Batch,
    finished: Decimal,
    scrap: Decimal,
    process: ProcessName,
    actor: Option<&str>,
    reference: Option<(&str, Uuid)>,
) -> AppResult<()> {
    let before = batch.states.clone();
    batch
        .states
        .receive_from_wip(finished, scrap, process.clone())?;
    write_batch_states(tx, batch).await?;
    apply_item_deltas(tx, batch.item_id, &state_deltas(&before, &batch.states)).await?;

    if finished > Decimal::ZERO {
        append_movement(
            tx,
            &movement(
                batch,
                Some(StockState::Wip(process.clone())),
                StockState::Finished,
                finished,
                Some(process.clone()),
                actor,
                reference,
            ),
        )
        .await?;
    }
    if scrap > Decimal::ZERO {
        append_movement(
            tx,
            &movement(
                batch,
                Some(StockState::Wip(process.clone())),
                StockState::Scrap,
                scrap,
                Some(process),
                actor,
                reference,
            ),
        )
        .await?;
    }
    Ok(())
}

/// Apply a job-work return on a locked batch: finished and scrap leave WIP,
/// unused goes back to raw.
pub(crate) async fn apply_reconcile_return(
    tx: &mut Transaction<'_, Postgres>,
    batch: &mut Batch,
    finished: Decimal,
    scrap: Decimal,
    unused: Decimal,
    process: ProcessName,
    actor: Option<&str>,
    reference: Option<(&str, Uuid)>,
) -> AppResult<()> {
    let before = batch.states.clone();
    batch
        .states
        .reconcile_return(finished, scrap, unused, process.clone())?;
    write_batch_states(tx, batch).await?;
    apply_item_deltas(tx, batch.item_id, &state_deltas(&before, &batch.states)).await?;

    if finished > Decimal::ZERO {
        append_movement(
            tx,
            &movement(
                batch,
                Some(StockState::Wip(process.clone())),
                StockState::Finished,
                finished,
                Some(process.clone()),
                actor,
                reference,
            ),
        )
        .await?;
    }
    if scrap > Decimal::ZERO {
        append_movement(
            tx,
            &movement(
                batch,
                Some(StockState::Wip(process.clone())),
                StockState::Scrap,
                scrap,
                Some(process.clone()),
                actor,
                reference,
            ),
        )
        .await?;
    }
    if unused > Decimal::ZERO {
        append_movement(
            tx,
            &movement(
                batch,
                Some(StockState::Wip(process.clone())),
                StockState::Raw,
                unused,
                Some(process),
                actor,
                reference,
            ),
        )
        .await?;
    }
    Ok(())
}
