//! Multi-process job-work orchestrator
//!
//! Sequences the ordered stages of a job-work order. Completing a stage
//! propagates its output: into the next stage's WIP (renamed to that
//! stage's process) when one exists, or into finished/scrap through the
//! transition engine when the stage is terminal. Every status change lands
//! in the stage's append-only history.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::services::job_work::{load_links, load_order_for_update, update_link};
use crate::services::stock::{
    apply_move_between, apply_receive_from_wip, load_batch_for_update, parse_process,
};
use shared::models::{
    IssueStatus, JobWorkKind, JobWorkProcess, JobWorkStatus, ProcessName, ProcessStatus,
    StatusChange, StockState, WorkType,
};
use shared::validation::validate_percent;
use shared::StockError;

/// Orchestrator service for multi-process job works
#[derive(Clone)]
pub struct ProcessService {
    db: PgPool,
}

/// One stage of a process plan
#[derive(Debug, Deserialize)]
pub struct ProcessPlanInput {
    pub process: String,
    pub sequence: i32,
    pub quantity_input: Option<Decimal>,
    pub expected_scrap_percent: Option<Decimal>,
    pub work_type: WorkType,
    pub assignee: Option<String>,
    pub rate_per_unit: Option<Decimal>,
    pub output_item_id: Option<Uuid>,
    pub start_date: Option<NaiveDate>,
    pub expected_completion_date: Option<NaiveDate>,
}

/// Input for advancing a stage's status
#[derive(Debug, Deserialize)]
pub struct AdvanceProcessInput {
    pub status: ProcessStatus,
    pub reason: Option<String>,
    /// Completion only; defaults to input minus expected scrap
    pub quantity_output: Option<Decimal>,
    /// Completion only; defaults to the expected scrap quantity
    pub quantity_scrap: Option<Decimal>,
}

#[derive(Debug, FromRow)]
struct ProcessRow {
    id: Uuid,
    job_work_id: Uuid,
    process: String,
    sequence: i32,
    quantity_input: Decimal,
    expected_scrap_percent: Decimal,
    work_type: String,
    assignee: Option<String>,
    rate_per_unit: Decimal,
    output_item_id: Option<Uuid>,
    quantity_output: Decimal,
    quantity_scrap: Decimal,
    status: String,
    start_date: Option<NaiveDate>,
    expected_completion_date: Option<NaiveDate>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ProcessRow {
    fn into_process(self, status_history: Vec<StatusChange>) -> AppResult<JobWorkProcess> {
        let process = ProcessName::parse(&self.process)
            .map_err(|e| AppError::Internal(format!("Corrupt process name: {}", e)))?;
        let work_type = WorkType::from_str(&self.work_type)
            .ok_or_else(|| AppError::Internal(format!("Unknown work type: {}", self.work_type)))?;
        let status = ProcessStatus::from_str(&self.status)
            .ok_or_else(|| AppError::Internal(format!("Unknown process status: {}", self.status)))?;
        Ok(JobWorkProcess {
            id: self.id,
            job_work_id: self.job_work_id,
            process,
            sequence: self.sequence,
            quantity_input: self.quantity_input,
            expected_scrap_percent: self.expected_scrap_percent,
            work_type,
            assignee: self.assignee,
            rate_per_unit: self.rate_per_unit,
            output_item_id: self.output_item_id,
            quantity_output: self.quantity_output,
            quantity_scrap: self.quantity_scrap,
            status,
            status_history,
            start_date: self.start_date,
            expected_completion_date: self.expected_completion_date,
            started_at: self.started_at,
            completed_at: self.completed_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

const PROCESS_COLUMNS: &str =
    "id, job_work_id, process, sequence, quantity_input, expected_scrap_percent, work_type, \
     assignee, rate_per_unit, output_item_id, quantity_output, quantity_scrap, status, \
     start_date, expected_completion_date, started_at, completed_at, created_at, updated_at";

async fn load_history(
    tx: &mut Transaction<'_, Postgres>,
    process_id: Uuid,
) -> AppResult<Vec<StatusChange>> {
    let rows = sqlx::query_as::<_, (String, Option<String>, Option<String>, DateTime<Utc>)>(
        r#"
        SELECT status, actor, reason, changed_at
        FROM job_work_process_history
        WHERE process_id = $1
        ORDER BY changed_at ASC, id ASC
        "#,
    )
    .bind(process_id)
    .fetch_all(&mut **tx)
    .await?;

    let mut history = Vec::with_capacity(rows.len());
    for (status, actor, reason, changed_at) in rows {
        let status = ProcessStatus::from_str(&status)
            .ok_or_else(|| AppError::Internal(format!("Unknown process status: {}", status)))?;
        history.push(StatusChange {
            status,
            actor,
            reason,
            changed_at,
        });
    }
    Ok(history)
}

/// Load an order's stages in sequence order, history included.
pub(crate) async fn load_processes(
    tx: &mut Transaction<'_, Postgres>,
    job_work_id: Uuid,
) -> AppResult<Vec<JobWorkProcess>> {
    let rows = sqlx::query_as::<_, ProcessRow>(&format!(
        "SELECT {} FROM job_work_processes WHERE job_work_id = $1 ORDER BY sequence ASC",
        PROCESS_COLUMNS
    ))
    .bind(job_work_id)
    .fetch_all(&mut **tx)
    .await?;

    let mut processes = Vec::with_capacity(rows.len());
    for row in rows {
        let history = load_history(tx, row.id).await?;
        processes.push(row.into_process(history)?);
    }
    Ok(processes)
}

async fn insert_history(
    tx: &mut Transaction<'_, Postgres>,
    process_id: Uuid,
    change: &StatusChange,
) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO job_work_process_history (process_id, status, actor, reason, changed_at)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(process_id)
    .bind(change.status.as_str())
    .bind(&change.actor)
    .bind(&change.reason)
    .bind(change.changed_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn persist_stage(
    tx: &mut Transaction<'_, Postgres>,
    stage: &JobWorkProcess,
) -> AppResult<()> {
    sqlx::query(
        r#"
        UPDATE job_work_processes
        SET status = $1, quantity_output = $2, quantity_scrap = $3,
            started_at = $4, completed_at = $5, updated_at = NOW()
        WHERE id = $6
        "#,
    )
    .bind(stage.status.as_str())
    .bind(stage.quantity_output)
    .bind(stage.quantity_scrap)
    .bind(stage.started_at)
    .bind(stage.completed_at)
    .bind(stage.id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

impl ProcessService {
    /// Create a new ProcessService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Plan the ordered stages of a job-work order. Sequence numbers must be
    /// unique within the order.
    pub async fn plan_processes(
        &self,
        job_work_id: Uuid,
        stages: Vec<ProcessPlanInput>,
    ) -> AppResult<Vec<JobWorkProcess>> {
        if stages.is_empty() {
            return Err(AppError::Validation {
                field: "stages".to_string(),
                message: "Process plan cannot be empty".to_string(),
            });
        }

        let mut sequences: Vec<i32> = stages.iter().map(|s| s.sequence).collect();
        sequences.sort_unstable();
        if sequences.windows(2).any(|w| w[0] == w[1]) {
            return Err(AppError::Stock(StockError::SequenceIntegrity(
                "duplicate sequence numbers in process plan".to_string(),
            )));
        }
        if sequences.iter().any(|s| *s <= 0) {
            return Err(AppError::Validation {
                field: "sequence".to_string(),
                message: "Sequence numbers must be positive".to_string(),
            });
        }

        let mut tx = self.db.begin().await?;
        let order = load_order_for_update(&mut tx, job_work_id).await?;

        if order.kind == JobWorkKind::SingleProcess && stages.len() > 1 {
            return Err(AppError::Validation {
                field: "stages".to_string(),
                message: "Single-process orders take exactly one stage".to_string(),
            });
        }

        let existing: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM job_work_processes WHERE job_work_id = $1",
        )
        .bind(job_work_id)
        .fetch_one(&mut *tx)
        .await?;
        if existing > 0 {
            return Err(AppError::Stock(StockError::SequenceIntegrity(
                "order already has a process plan".to_string(),
            )));
        }

        for stage in &stages {
            let process = parse_process("process", &stage.process)?;
            let scrap_percent = stage.expected_scrap_percent.unwrap_or(Decimal::ZERO);
            validate_percent(scrap_percent).map_err(|message| AppError::Validation {
                field: "expected_scrap_percent".to_string(),
                message: message.to_string(),
            })?;
            let quantity_input = stage.quantity_input.unwrap_or(Decimal::ZERO);
            if quantity_input < Decimal::ZERO {
                return Err(AppError::Validation {
                    field: "quantity_input".to_string(),
                    message: "Input quantity cannot be negative".to_string(),
                });
            }
            let rate = stage.rate_per_unit.unwrap_or(Decimal::ZERO);

            sqlx::query(
                r#"
                INSERT INTO job_work_processes
                    (job_work_id, process, sequence, quantity_input, expected_scrap_percent,
                     work_type, assignee, rate_per_unit, output_item_id,
                     start_date, expected_completion_date)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                "#,
            )
            .bind(job_work_id)
            .bind(process.as_str())
            .bind(stage.sequence)
            .bind(quantity_input)
            .bind(scrap_percent)
            .bind(stage.work_type.as_str())
            .bind(&stage.assignee)
            .bind(rate)
            .bind(stage.output_item_id)
            .bind(stage.start_date)
            .bind(stage.expected_completion_date)
            .execute(&mut *tx)
            .await?;
        }

        let processes = load_processes(&mut tx, job_work_id).await?;
        tx.commit().await?;
        Ok(processes)
    }

    /// Advance a stage's status. Starting a stage requires every earlier
    /// stage to be completed; completing one propagates its output into the
    /// next stage's WIP or, for the terminal stage, into finished/scrap.
    pub async fn advance_status(
        &self,
        process_id: Uuid,
        input: AdvanceProcessInput,
        actor: Option<String>,
    ) -> AppResult<JobWorkProcess> {
        let now = Utc::now();
        let today = now.date_naive();
        let mut tx = self.db.begin().await?;

        // Resolve the parent order first so locks are always taken in
        // order -> process -> batch order.
        let job_work_id: Uuid =
            sqlx::query_scalar("SELECT job_work_id FROM job_work_processes WHERE id = $1")
                .bind(process_id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| AppError::NotFound("Job work process".to_string()))?;
        let order = load_order_for_update(&mut tx, job_work_id).await?;

        let row = sqlx::query_as::<_, ProcessRow>(&format!(
            "SELECT {} FROM job_work_processes WHERE id = $1 FOR UPDATE",
            PROCESS_COLUMNS
        ))
        .bind(process_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Job work process".to_string()))?;
        let history = load_history(&mut tx, process_id).await?;
        let mut stage = row.into_process(history)?;

        if input.status == ProcessStatus::InProgress && stage.status == ProcessStatus::Pending {
            let blocked: bool = sqlx::query_scalar(
                r#"
                SELECT EXISTS(
                    SELECT 1 FROM job_work_processes
                    WHERE job_work_id = $1 AND sequence < $2 AND status <> 'completed'
                )
                "#,
            )
            .bind(job_work_id)
            .bind(stage.sequence)
            .fetch_one(&mut *tx)
            .await?;
            if blocked {
                return Err(AppError::Stock(StockError::SequenceIntegrity(format!(
                    "stage {} cannot start before earlier stages complete",
                    stage.sequence
                ))));
            }
        }

        match input.status {
            ProcessStatus::Completed => {
                let scrap = input
                    .quantity_scrap
                    .unwrap_or_else(|| stage.expected_scrap_quantity());
                let output = input
                    .quantity_output
                    .unwrap_or(stage.quantity_input - scrap);
                stage.validate_completion(output, scrap)?;

                stage.record_status(
                    ProcessStatus::Completed,
                    actor.clone(),
                    input.reason.clone(),
                    now,
                )?;
                stage.quantity_output = output;
                stage.quantity_scrap = scrap;
                persist_stage(&mut tx, &stage).await?;
                if let Some(change) = stage.status_history.last() {
                    insert_history(&mut tx, stage.id, change).await?;
                }

                self.propagate_completion(&mut tx, &order, &stage, output, scrap, actor.as_deref(), today)
                    .await?;
            }
            status => {
                stage.record_status(status, actor.clone(), input.reason.clone(), now)?;
                persist_stage(&mut tx, &stage).await?;
                if let Some(change) = stage.status_history.last() {
                    insert_history(&mut tx, stage.id, change).await?;
                }

                // First stage starting moves the order into in_progress.
                if status == ProcessStatus::InProgress
                    && matches!(
                        order.status,
                        JobWorkStatus::Planned | JobWorkStatus::MaterialsSent
                    )
                {
                    sqlx::query(
                        "UPDATE job_work_orders SET status = $1, updated_at = NOW() WHERE id = $2",
                    )
                    .bind(JobWorkStatus::InProgress.as_str())
                    .bind(job_work_id)
                    .execute(&mut *tx)
                    .await?;
                }
            }
        }

        let history = load_history(&mut tx, process_id).await?;
        let row = sqlx::query_as::<_, ProcessRow>(&format!(
            "SELECT {} FROM job_work_processes WHERE id = $1",
            PROCESS_COLUMNS
        ))
        .bind(process_id)
        .fetch_one(&mut *tx)
        .await?;
        let stage = row.into_process(history)?;

        tx.commit().await?;
        Ok(stage)
    }

    /// Push a completed stage's output downstream. Non-terminal: WIP moves
    /// from this stage's process slot to the next stage's and becomes its
    /// input. Terminal: output lands in finished, scrap in scrap, and the
    /// order's issuance links are reconciled.
    #[allow(clippy::too_many_arguments)]
    async fn propagate_completion(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        order: &shared::models::JobWorkOrder,
        stage: &JobWorkProcess,
        output: Decimal,
        scrap: Decimal,
        actor: Option<&str>,
        today: NaiveDate,
    ) -> AppResult<()> {
        let next = sqlx::query_as::<_, ProcessRow>(&format!(
            r#"
            SELECT {} FROM job_work_processes
            WHERE job_work_id = $1 AND sequence > $2
            ORDER BY sequence ASC
            LIMIT 1
            FOR UPDATE
            "#,
            PROCESS_COLUMNS
        ))
        .bind(stage.job_work_id)
        .bind(stage.sequence)
        .fetch_optional(&mut **tx)
        .await?;

        let mut links = load_links(tx, stage.job_work_id).await?;
        let reference = Some(("job_work", stage.job_work_id));

        match next {
            Some(next_row) => {
                let next_process = ProcessName::parse(&next_row.process)
                    .map_err(|e| AppError::Internal(format!("Corrupt process name: {}", e)))?;

                // Stage scrap leaves WIP now; the surviving output moves
                // under the next process's name, staying in process.
                let mut scrap_left = scrap;
                let mut output_left = output;
                for link in &mut links {
                    if scrap_left <= Decimal::ZERO && output_left <= Decimal::ZERO {
                        break;
                    }
                    let mut batch = load_batch_for_update(tx, link.input_batch_id).await?;
                    let available = batch
                        .states
                        .quantity(&StockState::Wip(stage.process.clone()));
                    if available <= Decimal::ZERO {
                        continue;
                    }

                    let take_scrap = scrap_left.min(available);
                    if take_scrap > Decimal::ZERO {
                        apply_receive_from_wip(
                            tx,
                            &mut batch,
                            Decimal::ZERO,
                            take_scrap,
                            stage.process.clone(),
                            actor,
                            reference,
                        )
                        .await?;
                        scrap_left -= take_scrap;
                        if link.status != IssueStatus::Completed {
                            link.apply_return(Decimal::ZERO, take_scrap, Decimal::ZERO, today)?;
                            update_link(tx, link).await?;
                        }
                    }

                    let take_output = output_left.min(available - take_scrap);
                    if take_output > Decimal::ZERO {
                        apply_move_between(
                            tx,
                            &mut batch,
                            take_output,
                            stage.process.clone(),
                            next_process.clone(),
                            actor,
                            reference,
                        )
                        .await?;
                        output_left -= take_output;
                    }
                }
                if scrap_left > Decimal::ZERO || output_left > Decimal::ZERO {
                    return Err(AppError::Stock(StockError::Conservation {
                        state: StockState::Wip(stage.process.clone()).key(),
                        requested: output + scrap,
                        available: output + scrap - output_left - scrap_left,
                    }));
                }

                sqlx::query(
                    "UPDATE job_work_processes SET quantity_input = $1, updated_at = NOW() WHERE id = $2",
                )
                .bind(output)
                .bind(next_row.id)
                .execute(&mut **tx)
                .await?;
            }
            None => {
                // Terminal stage: output reaches finished, scrap is written
                // off, and the issuance links reconcile.
                let mut finished_left = output;
                let mut scrap_left = scrap;
                for link in &mut links {
                    if finished_left <= Decimal::ZERO && scrap_left <= Decimal::ZERO {
                        break;
                    }
                    let mut batch = load_batch_for_update(tx, link.input_batch_id).await?;
                    let available = batch
                        .states
                        .quantity(&StockState::Wip(stage.process.clone()));
                    if available <= Decimal::ZERO {
                        continue;
                    }

                    let take_finished = finished_left.min(available);
                    let take_scrap = scrap_left.min(available - take_finished);
                    if take_finished + take_scrap <= Decimal::ZERO {
                        continue;
                    }
                    apply_receive_from_wip(
                        tx,
                        &mut batch,
                        take_finished,
                        take_scrap,
                        stage.process.clone(),
                        actor,
                        reference,
                    )
                    .await?;
                    finished_left -= take_finished;
                    scrap_left -= take_scrap;

                    if link.status != IssueStatus::Completed && take_finished + take_scrap > Decimal::ZERO {
                        link.apply_return(take_finished, take_scrap, Decimal::ZERO, today)?;
                        update_link(tx, link).await?;
                    }
                }
                if finished_left > Decimal::ZERO || scrap_left > Decimal::ZERO {
                    return Err(AppError::Stock(StockError::Conservation {
                        state: StockState::Wip(stage.process.clone()).key(),
                        requested: output + scrap,
                        available: output + scrap - finished_left - scrap_left,
                    }));
                }

                sqlx::query(
                    r#"
                    UPDATE job_work_orders
                    SET status = $1, quantity_received = quantity_received + $2,
                        actual_return_date = $3, updated_at = NOW()
                    WHERE id = $4
                    "#,
                )
                .bind(JobWorkStatus::Completed.as_str())
                .bind(output)
                .bind(today)
                .bind(order.id)
                .execute(&mut **tx)
                .await?;
            }
        }
        Ok(())
    }
}
