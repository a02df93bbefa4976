//! # Batch Scheduler
//!
//! Splits a payload into contiguous fixed-size batches and reconciles them
//! strictly in order. A failed batch is recorded and the next one still runs.
//! Cancellation is honoured only between batches.

use std::sync::Arc;

use core_library::WriteContext;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::decoder::RawRow;
use crate::error::{Result, SyncError};
use crate::reconciler::{Batch, BatchReconciler, BatchStats};

/// Result of one attempted batch, handed to the observer as it completes
#[derive(Debug)]
pub struct BatchOutcome {
    pub index: usize,
    pub rows: usize,
    pub result: Result<BatchStats>,
}

/// Aggregate of one scheduler run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerReport {
    pub total_batches: usize,
    pub batches_attempted: usize,
    /// Indices of batches whose changes were discarded
    pub failed_batches: Vec<usize>,
    /// Totals over committed batches only
    pub stats: BatchStats,
    pub cancelled: bool,
}

impl SchedulerReport {
    /// Every batch ran and committed
    pub fn is_success(&self) -> bool {
        !self.cancelled && self.failed_batches.is_empty()
    }
}

pub struct BatchScheduler {
    batch_size: usize,
    reconciler: Arc<dyn BatchReconciler>,
}

impl BatchScheduler {
    /// # Errors
    ///
    /// Returns [`SyncError::Config`] when `batch_size` is zero.
    pub fn new(batch_size: usize, reconciler: Arc<dyn BatchReconciler>) -> Result<Self> {
        if batch_size == 0 {
            return Err(SyncError::Config("batch size must be positive".to_string()));
        }
        Ok(Self {
            batch_size,
            reconciler,
        })
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Number of batches `rows` rows split into
    pub fn batch_count(&self, rows: usize) -> usize {
        rows.div_ceil(self.batch_size)
    }

    /// Reconcile every batch of `rows` in order
    ///
    /// `on_batch` sees each outcome as soon as its batch finishes.
    pub async fn run(
        &self,
        rows: &[RawRow],
        observed_at: i64,
        context: &mut WriteContext,
        cancel: &CancellationToken,
        on_batch: &mut (dyn FnMut(&BatchOutcome) + Send),
    ) -> SchedulerReport {
        let mut report = SchedulerReport {
            total_batches: self.batch_count(rows.len()),
            ..SchedulerReport::default()
        };

        for (index, chunk) in rows.chunks(self.batch_size).enumerate() {
            if cancel.is_cancelled() {
                info!(batch_index = index, "Sync cancelled before batch");
                report.cancelled = true;
                break;
            }

            let batch = Batch {
                index,
                rows: chunk,
                observed_at,
            };
            let result = self.reconciler.reconcile(batch, context).await;
            report.batches_attempted += 1;

            match &result {
                Ok(stats) => report.stats.merge(stats),
                Err(e) => {
                    warn!(batch_index = index, error = %e, "Batch failed, continuing with next batch");
                    report.failed_batches.push(index);
                }
            }

            on_batch(&BatchOutcome {
                index,
                rows: chunk.len(),
                result,
            });
        }

        report
    }
}
