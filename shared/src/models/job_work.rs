//! Job-work models: orders, process stages and batch issuance links

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StockError;
use crate::models::process::ProcessName;

/// Material sent to an external vendor or internal department for
/// processing, expected back as finished product, scrap or unused material.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobWorkOrder {
    pub id: Uuid,
    /// Sequential per calendar year (e.g., "JOB-2025-0001")
    pub job_number: String,
    pub vendor: String,
    pub item_id: Uuid,
    pub quantity_sent: Decimal,
    pub quantity_received: Decimal,
    pub rate_per_unit: Decimal,
    pub status: JobWorkStatus,
    pub kind: JobWorkKind,
    pub sent_date: Option<NaiveDate>,
    pub expected_return_date: Option<NaiveDate>,
    pub actual_return_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Order lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobWorkStatus {
    Planned,
    MaterialsSent,
    PartialReceived,
    InProgress,
    Completed,
    OnHold,
    Cancelled,
}

impl JobWorkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobWorkStatus::Planned => "planned",
            JobWorkStatus::MaterialsSent => "materials_sent",
            JobWorkStatus::PartialReceived => "partial_received",
            JobWorkStatus::InProgress => "in_progress",
            JobWorkStatus::Completed => "completed",
            JobWorkStatus::OnHold => "on_hold",
            JobWorkStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "planned" => Some(JobWorkStatus::Planned),
            "materials_sent" => Some(JobWorkStatus::MaterialsSent),
            "partial_received" => Some(JobWorkStatus::PartialReceived),
            "in_progress" => Some(JobWorkStatus::InProgress),
            "completed" => Some(JobWorkStatus::Completed),
            "on_hold" => Some(JobWorkStatus::OnHold),
            "cancelled" => Some(JobWorkStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobWorkStatus::Completed | JobWorkStatus::Cancelled)
    }
}

/// Single-process legacy orders vs multi-process orders with an ordered
/// stage chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobWorkKind {
    SingleProcess,
    MultiProcess,
}

impl JobWorkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobWorkKind::SingleProcess => "single_process",
            JobWorkKind::MultiProcess => "multi_process",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "single_process" => Some(JobWorkKind::SingleProcess),
            "multi_process" => Some(JobWorkKind::MultiProcess),
            _ => None,
        }
    }
}

/// Where a process stage is worked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkType {
    Outsourced,
    InHouse,
}

impl WorkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkType::Outsourced => "outsourced",
            WorkType::InHouse => "in_house",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "outsourced" => Some(WorkType::Outsourced),
            "in_house" => Some(WorkType::InHouse),
            _ => None,
        }
    }
}

/// One stage within a job-work order. Sequence numbers are unique per order
/// and define the processing order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobWorkProcess {
    pub id: Uuid,
    pub job_work_id: Uuid,
    pub process: ProcessName,
    pub sequence: i32,
    pub quantity_input: Decimal,
    pub expected_scrap_percent: Decimal,
    pub work_type: WorkType,
    /// Vendor or internal department working this stage
    pub assignee: Option<String>,
    pub rate_per_unit: Decimal,
    /// Product the stage outputs, when it differs from the order's item
    pub output_item_id: Option<Uuid>,
    pub quantity_output: Decimal,
    pub quantity_scrap: Decimal,
    pub status: ProcessStatus,
    pub status_history: Vec<StatusChange>,
    pub start_date: Option<NaiveDate>,
    pub expected_completion_date: Option<NaiveDate>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobWorkProcess {
    /// Scrap allowance derived from the stage's expected scrap percentage.
    pub fn expected_scrap_quantity(&self) -> Decimal {
        expected_scrap_quantity(self.quantity_input, self.expected_scrap_percent)
    }

    /// Output over input, clamped to [0, 100].
    pub fn completion_percentage(&self) -> Decimal {
        completion_percentage(self.quantity_output, self.quantity_input)
    }

    /// A stage is delayed while unfinished past its expected completion date.
    pub fn is_delayed(&self, today: NaiveDate) -> bool {
        match (self.status, self.expected_completion_date) {
            (ProcessStatus::Completed, _) => false,
            (_, Some(expected)) => today > expected,
            _ => false,
        }
    }

    /// Apply a status change, enforcing the stage state machine and
    /// appending to the ordered history log.
    pub fn record_status(
        &mut self,
        status: ProcessStatus,
        actor: Option<String>,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), StockError> {
        if !self.status.can_transition(status) {
            return Err(StockError::InvalidStatusTransition {
                from: self.status.as_str().to_string(),
                to: status.as_str().to_string(),
            });
        }
        self.status = status;
        match status {
            ProcessStatus::InProgress => {
                if self.started_at.is_none() {
                    self.started_at = Some(now);
                }
            }
            ProcessStatus::Completed => self.completed_at = Some(now),
            _ => {}
        }
        self.status_history.push(StatusChange {
            status,
            actor,
            reason,
            changed_at: now,
        });
        self.updated_at = now;
        Ok(())
    }

    /// Completion requires output + scrap within the stage's input.
    pub fn validate_completion(&self, output: Decimal, scrap: Decimal) -> Result<(), StockError> {
        if output < Decimal::ZERO || scrap < Decimal::ZERO {
            return Err(StockError::InvalidQuantity(output.min(scrap)));
        }
        let total = output + scrap;
        if total > self.quantity_input {
            return Err(StockError::Conservation {
                state: format!("wip:{}", self.process),
                requested: total,
                available: self.quantity_input,
            });
        }
        Ok(())
    }
}

/// Stage state machine: pending -> in_progress -> completed, with a
/// resumable on_hold side branch. Completed is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessStatus {
    Pending,
    InProgress,
    Completed,
    OnHold,
}

impl ProcessStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessStatus::Pending => "pending",
            ProcessStatus::InProgress => "in_progress",
            ProcessStatus::Completed => "completed",
            ProcessStatus::OnHold => "on_hold",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ProcessStatus::Pending),
            "in_progress" => Some(ProcessStatus::InProgress),
            "completed" => Some(ProcessStatus::Completed),
            "on_hold" => Some(ProcessStatus::OnHold),
            _ => None,
        }
    }

    pub fn can_transition(&self, to: ProcessStatus) -> bool {
        matches!(
            (self, to),
            (ProcessStatus::Pending, ProcessStatus::InProgress)
                | (ProcessStatus::InProgress, ProcessStatus::Completed)
                | (ProcessStatus::InProgress, ProcessStatus::OnHold)
                | (ProcessStatus::OnHold, ProcessStatus::InProgress)
        )
    }
}

/// One entry in a stage's append-only status history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusChange {
    pub status: ProcessStatus,
    pub actor: Option<String>,
    pub reason: Option<String>,
    pub changed_at: DateTime<Utc>,
}

/// Link between a job-work order and an input batch it consumed, carrying
/// the running return reconciliation. Immutable once completed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobWorkBatch {
    pub id: Uuid,
    pub job_work_id: Uuid,
    pub input_batch_id: Uuid,
    /// Set when the return produces a new batch
    pub output_batch_id: Option<Uuid>,
    pub quantity_issued: Decimal,
    pub quantity_finished: Decimal,
    pub quantity_scrap: Decimal,
    pub quantity_unused: Decimal,
    pub process: Option<ProcessName>,
    pub status: IssueStatus,
    pub issued_date: NaiveDate,
    pub received_date: Option<NaiveDate>,
}

impl JobWorkBatch {
    /// Issued quantity not yet reconciled by returns.
    pub fn remaining(&self) -> Decimal {
        self.quantity_issued - self.quantity_finished - self.quantity_scrap - self.quantity_unused
    }

    /// Reconcile one return against this issuance. The return total may
    /// never exceed what remains issued; the link completes when remaining
    /// reaches zero.
    pub fn apply_return(
        &mut self,
        finished: Decimal,
        scrap: Decimal,
        unused: Decimal,
        received: NaiveDate,
    ) -> Result<(), StockError> {
        if finished < Decimal::ZERO || scrap < Decimal::ZERO || unused < Decimal::ZERO {
            return Err(StockError::InvalidQuantity(finished.min(scrap).min(unused)));
        }
        let total = finished + scrap + unused;
        if total <= Decimal::ZERO {
            return Err(StockError::InvalidQuantity(total));
        }
        let remaining = self.remaining();
        if total > remaining {
            return Err(StockError::OverReturn {
                requested: total,
                remaining,
            });
        }

        self.quantity_finished += finished;
        self.quantity_scrap += scrap;
        self.quantity_unused += unused;
        self.received_date = Some(received);
        self.status = if self.remaining() == Decimal::ZERO {
            IssueStatus::Completed
        } else {
            IssueStatus::Partial
        };
        Ok(())
    }
}

/// Reconciliation state of one issuance link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueStatus {
    Issued,
    Partial,
    Completed,
}

impl IssueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueStatus::Issued => "issued",
            IssueStatus::Partial => "partial",
            IssueStatus::Completed => "completed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "issued" => Some(IssueStatus::Issued),
            "partial" => Some(IssueStatus::Partial),
            "completed" => Some(IssueStatus::Completed),
            _ => None,
        }
    }
}

/// Format a job number: sequential per calendar year, zero-padded to four
/// digits (e.g., "JOB-2025-0001").
pub fn format_job_number(year: i32, sequence: u32) -> String {
    format!("JOB-{}-{:04}", year, sequence)
}

/// Parse a job number back into (year, sequence). Returns None for anything
/// that does not match the scheme.
pub fn parse_job_number(job_number: &str) -> Option<(i32, u32)> {
    let rest = job_number.strip_prefix("JOB-")?;
    let (year, sequence) = rest.split_once('-')?;
    if year.len() != 4 || sequence.len() < 4 {
        return None;
    }
    Some((year.parse().ok()?, sequence.parse().ok()?))
}

/// Scrap allowance from a percentage of the input quantity.
pub fn expected_scrap_quantity(input: Decimal, percent: Decimal) -> Decimal {
    if percent <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    input * percent / Decimal::from(100)
}

/// Output over input as a percentage, clamped to [0, 100].
pub fn completion_percentage(output: Decimal, input: Decimal) -> Decimal {
    if input <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    (output / input * Decimal::from(100))
        .clamp(Decimal::ZERO, Decimal::from(100))
}

/// Order status derived from how much of the issued quantity has been
/// reconciled.
pub fn return_status(total_issued: Decimal, total_reconciled: Decimal) -> JobWorkStatus {
    if total_reconciled >= total_issued {
        JobWorkStatus::Completed
    } else {
        JobWorkStatus::PartialReceived
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(n: i64) -> Decimal {
        Decimal::from(n)
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn issuance(issued: i64) -> JobWorkBatch {
        JobWorkBatch {
            id: Uuid::new_v4(),
            job_work_id: Uuid::new_v4(),
            input_batch_id: Uuid::new_v4(),
            output_batch_id: None,
            quantity_issued: dec(issued),
            quantity_finished: Decimal::ZERO,
            quantity_scrap: Decimal::ZERO,
            quantity_unused: Decimal::ZERO,
            process: Some(ProcessName::Cutting),
            status: IssueStatus::Issued,
            issued_date: date(2025, 3, 1),
            received_date: None,
        }
    }

    fn stage(input: i64) -> JobWorkProcess {
        JobWorkProcess {
            id: Uuid::new_v4(),
            job_work_id: Uuid::new_v4(),
            process: ProcessName::Cutting,
            sequence: 1,
            quantity_input: dec(input),
            expected_scrap_percent: dec(5),
            work_type: WorkType::Outsourced,
            assignee: Some("Precision Works".to_string()),
            rate_per_unit: dec(12),
            output_item_id: None,
            quantity_output: Decimal::ZERO,
            quantity_scrap: Decimal::ZERO,
            status: ProcessStatus::Pending,
            status_history: Vec::new(),
            start_date: None,
            expected_completion_date: None,
            started_at: None,
            completed_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_job_number_format() {
        assert_eq!(format_job_number(2025, 1), "JOB-2025-0001");
        assert_eq!(format_job_number(2025, 432), "JOB-2025-0432");
        assert_eq!(format_job_number(2025, 12345), "JOB-2025-12345");
    }

    #[test]
    fn test_job_number_parse() {
        assert_eq!(parse_job_number("JOB-2025-0001"), Some((2025, 1)));
        assert_eq!(parse_job_number("JOB-2024-0999"), Some((2024, 999)));
        assert_eq!(parse_job_number("PO-2025-0001"), None);
        assert_eq!(parse_job_number("JOB-25-0001"), None);
        assert_eq!(parse_job_number("JOB-2025-1"), None);
    }

    #[test]
    fn test_over_return_rejected() {
        let mut link = issuance(100);
        let err = link
            .apply_return(dec(60), dec(50), Decimal::ZERO, date(2025, 4, 1))
            .unwrap_err();
        assert!(matches!(err, StockError::OverReturn { .. }));
        assert_eq!(link.quantity_finished, Decimal::ZERO);
        assert_eq!(link.status, IssueStatus::Issued);
    }

    #[test]
    fn test_partial_then_complete_return() {
        let mut link = issuance(100);
        link.apply_return(dec(40), dec(5), Decimal::ZERO, date(2025, 4, 1))
            .unwrap();
        assert_eq!(link.status, IssueStatus::Partial);
        assert_eq!(link.remaining(), dec(55));

        link.apply_return(dec(50), Decimal::ZERO, dec(5), date(2025, 4, 10))
            .unwrap();
        assert_eq!(link.status, IssueStatus::Completed);
        assert_eq!(link.remaining(), Decimal::ZERO);

        // Completed links accept no further returns.
        let err = link
            .apply_return(dec(1), Decimal::ZERO, Decimal::ZERO, date(2025, 4, 11))
            .unwrap_err();
        assert!(matches!(err, StockError::OverReturn { .. }));
    }

    #[test]
    fn test_status_machine() {
        assert!(ProcessStatus::Pending.can_transition(ProcessStatus::InProgress));
        assert!(ProcessStatus::InProgress.can_transition(ProcessStatus::OnHold));
        assert!(ProcessStatus::OnHold.can_transition(ProcessStatus::InProgress));
        assert!(ProcessStatus::InProgress.can_transition(ProcessStatus::Completed));

        assert!(!ProcessStatus::Pending.can_transition(ProcessStatus::Completed));
        assert!(!ProcessStatus::Completed.can_transition(ProcessStatus::InProgress));
        assert!(!ProcessStatus::Completed.can_transition(ProcessStatus::OnHold));
        assert!(!ProcessStatus::OnHold.can_transition(ProcessStatus::Completed));
    }

    #[test]
    fn test_record_status_appends_history() {
        let mut s = stage(100);
        let now = Utc::now();
        s.record_status(ProcessStatus::InProgress, Some("ops".to_string()), None, now)
            .unwrap();
        s.record_status(
            ProcessStatus::OnHold,
            Some("ops".to_string()),
            Some("vendor shutdown".to_string()),
            now,
        )
        .unwrap();
        s.record_status(ProcessStatus::InProgress, Some("ops".to_string()), None, now)
            .unwrap();

        assert_eq!(s.status_history.len(), 3);
        assert_eq!(s.status_history[1].reason.as_deref(), Some("vendor shutdown"));
        assert!(s.started_at.is_some());
        assert!(s.completed_at.is_none());
    }

    #[test]
    fn test_record_status_rejects_invalid_jump() {
        let mut s = stage(100);
        let err = s
            .record_status(ProcessStatus::Completed, None, None, Utc::now())
            .unwrap_err();
        assert!(matches!(err, StockError::InvalidStatusTransition { .. }));
        assert!(s.status_history.is_empty());
    }

    #[test]
    fn test_validate_completion() {
        let s = stage(100);
        assert!(s.validate_completion(dec(90), dec(10)).is_ok());
        assert!(s.validate_completion(dec(80), dec(10)).is_ok());
        let err = s.validate_completion(dec(95), dec(10)).unwrap_err();
        assert!(matches!(err, StockError::Conservation { .. }));
    }

    #[test]
    fn test_completion_percentage_clamped() {
        assert_eq!(completion_percentage(dec(90), dec(100)), dec(90));
        assert_eq!(completion_percentage(dec(150), dec(100)), dec(100));
        assert_eq!(completion_percentage(dec(10), Decimal::ZERO), Decimal::ZERO);
    }

    #[test]
    fn test_expected_scrap_quantity() {
        assert_eq!(expected_scrap_quantity(dec(200), dec(5)), dec(10));
        assert_eq!(expected_scrap_quantity(dec(200), Decimal::ZERO), Decimal::ZERO);
    }

    #[test]
    fn test_is_delayed() {
        let mut s = stage(100);
        s.expected_completion_date = Some(date(2025, 3, 1));
        assert!(s.is_delayed(date(2025, 3, 2)));
        assert!(!s.is_delayed(date(2025, 3, 1)));

        s.status = ProcessStatus::Completed;
        assert!(!s.is_delayed(date(2025, 6, 1)));
    }

    #[test]
    fn test_return_status_derivation() {
        assert_eq!(return_status(dec(100), dec(100)), JobWorkStatus::Completed);
        assert_eq!(return_status(dec(100), dec(60)), JobWorkStatus::PartialReceived);
    }
}
