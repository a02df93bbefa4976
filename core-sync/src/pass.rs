//! # Sync Pass State Machine
//!
//! Record of one sync pass with validated state transitions.
//!
//! ## State Machine
//!
//! ```text
//! Idle → Running → Committed
//!          │    └→ PartiallyFailed
//!          └─────→ Cancelled
//! ```
//!
//! `Committed` means the stale-record collection succeeded. Failed batches
//! do not change that; they are kept in the scheduler report and surfaced
//! through [`SyncPass::all_batches_succeeded`] and [`SyncPass::strict_success`].

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::collector::CollectionReport;
use crate::error::{Result, SyncError};
use crate::reconciler::BatchStats;
use crate::scheduler::SchedulerReport;

// ============================================================================
// ID Types
// ============================================================================

/// Unique identifier for a sync pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyncPassId(Uuid);

impl SyncPassId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// # Errors
    ///
    /// Returns [`SyncError::Config`] if the string is not a valid UUID
    pub fn from_string(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| SyncError::Config(format!("invalid pass id '{s}': {e}")))
    }
}

impl Default for SyncPassId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SyncPassId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for SyncPassId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

// ============================================================================
// Status Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassStatus {
    Idle,
    Running,
    /// Collection succeeded
    Committed,
    /// Collection failed
    PartiallyFailed,
    /// Stopped between batches; collection skipped
    Cancelled,
}

impl PassStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PassStatus::Committed | PassStatus::PartiallyFailed | PassStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PassStatus::Idle => "idle",
            PassStatus::Running => "running",
            PassStatus::Committed => "committed",
            PassStatus::PartiallyFailed => "partially_failed",
            PassStatus::Cancelled => "cancelled",
        }
    }
}

impl FromStr for PassStatus {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "idle" => Ok(PassStatus::Idle),
            "running" => Ok(PassStatus::Running),
            "committed" => Ok(PassStatus::Committed),
            "partially_failed" => Ok(PassStatus::PartiallyFailed),
            "cancelled" => Ok(PassStatus::Cancelled),
            _ => Err(SyncError::InvalidStatus(s.to_string())),
        }
    }
}

impl std::fmt::Display for PassStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What the stale-record collector did at the end of a pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CollectionOutcome {
    Collected { cutoff: i64, deleted: Vec<String> },
    Failed { message: String },
    /// Not run because the pass was cancelled
    Skipped,
}

impl CollectionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, CollectionOutcome::Collected { .. })
    }

    /// Identifiers of deleted films, empty unless collected
    pub fn deleted(&self) -> &[String] {
        match self {
            CollectionOutcome::Collected { deleted, .. } => deleted,
            _ => &[],
        }
    }
}

impl From<&CollectionReport> for CollectionOutcome {
    fn from(report: &CollectionReport) -> Self {
        CollectionOutcome::Collected {
            cutoff: report.cutoff,
            deleted: report.deleted.iter().map(|film| film.id.clone()).collect(),
        }
    }
}

// ============================================================================
// Sync Pass Entity
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncPass {
    pub id: SyncPassId,
    pub status: PassStatus,
    /// Pass timestamp stamped on every observed film (Unix milliseconds)
    pub observed_at: Option<i64>,
    pub total_rows: usize,
    pub started_at: Option<i64>,
    pub finished_at: Option<i64>,
    pub scheduler: Option<SchedulerReport>,
    pub collection: Option<CollectionOutcome>,
}

impl SyncPass {
    pub fn new() -> Self {
        Self {
            id: SyncPassId::new(),
            status: PassStatus::Idle,
            observed_at: None,
            total_rows: 0,
            started_at: None,
            finished_at: None,
            scheduler: None,
            collection: None,
        }
    }

    /// Enter `Running` with the pass timestamp
    ///
    /// # Errors
    ///
    /// Returns an error unless the pass is `Idle`
    pub fn start(mut self, observed_at: i64, total_rows: usize) -> Result<Self> {
        self.validate_transition(PassStatus::Running)?;
        self.status = PassStatus::Running;
        self.observed_at = Some(observed_at);
        self.started_at = Some(observed_at);
        self.total_rows = total_rows;
        Ok(self)
    }

    /// Finish after the collector ran; its outcome picks the final status
    ///
    /// # Errors
    ///
    /// Returns an error unless the pass is `Running`
    pub fn finish(
        mut self,
        report: SchedulerReport,
        collection: CollectionOutcome,
        finished_at: i64,
    ) -> Result<Self> {
        let to = if collection.is_success() {
            PassStatus::Committed
        } else {
            PassStatus::PartiallyFailed
        };
        self.validate_transition(to)?;
        self.status = to;
        self.scheduler = Some(report);
        self.collection = Some(collection);
        self.finished_at = Some(finished_at);
        Ok(self)
    }

    /// # Errors
    ///
    /// Returns an error unless the pass is `Running`
    pub fn cancel(mut self, report: SchedulerReport, finished_at: i64) -> Result<Self> {
        self.validate_transition(PassStatus::Cancelled)?;
        self.status = PassStatus::Cancelled;
        self.scheduler = Some(report);
        self.collection = Some(CollectionOutcome::Skipped);
        self.finished_at = Some(finished_at);
        Ok(self)
    }

    /// Aggregate outcome: the stale-record collection succeeded
    pub fn succeeded(&self) -> bool {
        self.status == PassStatus::Committed
    }

    /// Every batch ran and committed
    pub fn all_batches_succeeded(&self) -> bool {
        self.scheduler
            .as_ref()
            .is_some_and(SchedulerReport::is_success)
    }

    pub fn strict_success(&self) -> bool {
        self.succeeded() && self.all_batches_succeeded()
    }

    /// Totals over committed batches
    pub fn stats(&self) -> BatchStats {
        self.scheduler
            .as_ref()
            .map(|report| report.stats)
            .unwrap_or_default()
    }

    pub fn duration_ms(&self) -> Option<u64> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => u64::try_from(end - start).ok(),
            _ => None,
        }
    }

    fn validate_transition(&self, to: PassStatus) -> Result<()> {
        let valid = matches!(
            (self.status, to),
            (PassStatus::Idle, PassStatus::Running)
                | (PassStatus::Running, PassStatus::Committed)
                | (PassStatus::Running, PassStatus::PartiallyFailed)
                | (PassStatus::Running, PassStatus::Cancelled)
        );

        if !valid {
            return Err(SyncError::InvalidStateTransition {
                from: self.status.as_str().to_string(),
                to: to.as_str().to_string(),
            });
        }

        Ok(())
    }
}

impl Default for SyncPass {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use core_library::DeletedFilm;

    fn report(failed: Vec<usize>) -> SchedulerReport {
        SchedulerReport {
            total_batches: 3,
            batches_attempted: 3,
            failed_batches: failed,
            ..SchedulerReport::default()
        }
    }

    fn collected() -> CollectionOutcome {
        CollectionOutcome::Collected {
            cutoff: 0,
            deleted: vec![],
        }
    }

    #[test]
    fn test_pass_id_round_trip() {
        let uuid_str = "550e8400-e29b-41d4-a716-446655440000";
        let id = SyncPassId::from_string(uuid_str).unwrap();
        assert_eq!(id.to_string(), uuid_str);
        assert!(SyncPassId::from_string("nope").is_err());
        assert_ne!(SyncPassId::new(), SyncPassId::new());
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!("IDLE".parse::<PassStatus>().unwrap(), PassStatus::Idle);
        assert_eq!(
            "partially_failed".parse::<PassStatus>().unwrap(),
            PassStatus::PartiallyFailed
        );
        assert!(matches!(
            "done".parse::<PassStatus>(),
            Err(SyncError::InvalidStatus(_))
        ));
        assert_eq!(PassStatus::Committed.to_string(), "committed");
    }

    #[test]
    fn test_terminal_states() {
        assert!(!PassStatus::Idle.is_terminal());
        assert!(!PassStatus::Running.is_terminal());
        assert!(PassStatus::Committed.is_terminal());
        assert!(PassStatus::PartiallyFailed.is_terminal());
        assert!(PassStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_committed_pass() {
        let pass = SyncPass::new().start(1_000, 600).unwrap();
        assert_eq!(pass.status, PassStatus::Running);
        assert_eq!(pass.observed_at, Some(1_000));

        let pass = pass.finish(report(vec![]), collected(), 1_250).unwrap();

        assert_eq!(pass.status, PassStatus::Committed);
        assert!(pass.succeeded());
        assert!(pass.strict_success());
        assert_eq!(pass.duration_ms(), Some(250));
    }

    #[test]
    fn test_failed_batch_is_swallowed_by_aggregate_outcome() {
        let pass = SyncPass::new()
            .start(0, 600)
            .unwrap()
            .finish(report(vec![1]), collected(), 10)
            .unwrap();

        assert!(pass.succeeded());
        assert!(!pass.all_batches_succeeded());
        assert!(!pass.strict_success());
    }

    #[test]
    fn test_collector_failure_is_partially_failed() {
        let pass = SyncPass::new()
            .start(0, 1)
            .unwrap()
            .finish(
                report(vec![]),
                CollectionOutcome::Failed {
                    message: "disk I/O error".to_string(),
                },
                10,
            )
            .unwrap();

        assert_eq!(pass.status, PassStatus::PartiallyFailed);
        assert!(!pass.succeeded());
        assert!(pass.all_batches_succeeded());
    }

    #[test]
    fn test_cancel_skips_collection() {
        let pass = SyncPass::new()
            .start(0, 10)
            .unwrap()
            .cancel(report(vec![]), 5)
            .unwrap();

        assert_eq!(pass.status, PassStatus::Cancelled);
        assert_eq!(pass.collection, Some(CollectionOutcome::Skipped));
        assert!(!pass.succeeded());
    }

    #[test]
    fn test_invalid_transitions() {
        assert!(SyncPass::new()
            .finish(report(vec![]), collected(), 0)
            .is_err());
        assert!(SyncPass::new().cancel(report(vec![]), 0).is_err());

        let done = SyncPass::new()
            .start(0, 0)
            .unwrap()
            .finish(report(vec![]), collected(), 0)
            .unwrap();
        assert!(matches!(
            done.clone().start(1, 1),
            Err(SyncError::InvalidStateTransition { .. })
        ));
        assert!(done.cancel(report(vec![]), 1).is_err());
    }

    #[test]
    fn test_outcome_from_report() {
        let report = CollectionReport {
            cutoff: 42,
            deleted: vec![DeletedFilm {
                id: "f1".to_string(),
                natural_key: "k1".to_string(),
            }],
        };

        let outcome = CollectionOutcome::from(&report);

        assert!(outcome.is_success());
        assert_eq!(outcome.deleted(), ["f1".to_string()]);
        assert!(CollectionOutcome::Skipped.deleted().is_empty());
    }

    #[test]
    fn test_serializes_status_snake_case() {
        let json = serde_json::to_string(&PassStatus::PartiallyFailed).unwrap();
        assert_eq!(json, "\"partially_failed\"");
    }
}
