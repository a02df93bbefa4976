//! # Sync Coordinator
//!
//! Runs sync passes over an already-fetched payload.
//!
//! ## Overview
//!
//! A pass:
//! 1. Takes the pass timestamp from the clock and enters `Running`
//! 2. Runs the batch scheduler over the whole payload
//! 3. Runs the stale-record collector, whatever the batches did
//! 4. Reports the collector's outcome as the pass outcome
//!
//! Only one pass runs per coordinator at a time; a second caller gets
//! [`SyncError::SyncInProgress`]. A pass can be cancelled between batches,
//! in which case the collector does not run.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_sync::{SyncConfig, SyncCoordinator};
//!
//! let coordinator = SyncCoordinator::new(SyncConfig::default(), store, clock, event_bus)?;
//! let pass = coordinator.sync_pass(&rows).await?;
//! if !pass.succeeded() {
//!     // stale-record collection failed
//! }
//! ```

use std::sync::{Arc, Mutex as SyncMutex, PoisonError};
use std::time::Duration;

use bridge_traits::Clock;
use core_library::{FilmStore, WriteContext};
use core_runtime::config::{CoreConfig, DEFAULT_BATCH_SIZE, DEFAULT_STALENESS_WINDOW};
use core_runtime::events::{CoreEvent, EventBus, LibraryEvent, SyncEvent};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::collector::StaleFilmCollector;
use crate::decoder::RawRow;
use crate::error::{Result, SyncError};
use crate::pass::{CollectionOutcome, SyncPass};
use crate::reconciler::{BatchReconciler, FilmReconciler};
use crate::scheduler::{BatchOutcome, BatchScheduler};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Rows reconciled and committed per transaction
    pub batch_size: usize,

    /// Films not touched within this window before collection are deleted
    pub staleness_window: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            staleness_window: DEFAULT_STALENESS_WINDOW,
        }
    }
}

impl From<&CoreConfig> for SyncConfig {
    fn from(config: &CoreConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            staleness_window: config.staleness_window,
        }
    }
}

impl SyncConfig {
    /// # Errors
    ///
    /// Returns [`SyncError::Config`] for a zero batch size or window
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(SyncError::Config("batch_size must be positive".to_string()));
        }
        if self.staleness_window.is_zero() {
            return Err(SyncError::Config(
                "staleness_window must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

pub struct SyncCoordinator {
    config: SyncConfig,
    store: Arc<dyn FilmStore>,
    clock: Arc<dyn Clock>,
    event_bus: EventBus,
    scheduler: BatchScheduler,
    collector: StaleFilmCollector,
    /// Held for the duration of a pass
    running: Mutex<()>,
    /// Cancellation handle of the pass in flight
    active: SyncMutex<Option<CancellationToken>>,
}

/// Publishes a pass's cancellation token and withdraws it on drop, so a
/// `sync_pass` future dropped mid-pass leaves nothing to cancel.
struct ActivePass<'a> {
    slot: &'a SyncMutex<Option<CancellationToken>>,
}

impl<'a> ActivePass<'a> {
    fn publish(slot: &'a SyncMutex<Option<CancellationToken>>, token: CancellationToken) -> Self {
        *slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(token);
        Self { slot }
    }
}

impl Drop for ActivePass<'_> {
    fn drop(&mut self) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl SyncCoordinator {
    /// # Errors
    ///
    /// Returns [`SyncError::Config`] when `config` does not validate
    pub fn new(
        config: SyncConfig,
        store: Arc<dyn FilmStore>,
        clock: Arc<dyn Clock>,
        event_bus: EventBus,
    ) -> Result<Self> {
        config.validate()?;

        let scheduler = BatchScheduler::new(config.batch_size, Arc::new(FilmReconciler::new()))?;
        let collector = StaleFilmCollector::new(clock.clone(), config.staleness_window)
            .with_event_bus(event_bus.clone());

        Ok(Self {
            config,
            store,
            clock,
            event_bus,
            scheduler,
            collector,
            running: Mutex::new(()),
            active: SyncMutex::new(None),
        })
    }

    /// Replace the per-batch reconciler
    pub fn with_reconciler(mut self, reconciler: Arc<dyn BatchReconciler>) -> Result<Self> {
        self.scheduler = BatchScheduler::new(self.config.batch_size, reconciler)?;
        Ok(self)
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn FilmStore> {
        &self.store
    }

    /// Whether a pass is in flight
    pub fn is_running(&self) -> bool {
        self.running.try_lock().is_err()
    }

    /// Request cancellation of the pass in flight
    ///
    /// Takes effect before the next batch. Returns `false` when no pass is
    /// running.
    pub async fn cancel_sync(&self) -> bool {
        if !self.is_running() {
            return false;
        }
        match self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            Some(token) => {
                info!("Cancelling sync pass");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Run one sync pass over `rows`
    ///
    /// The returned pass is terminal. [`SyncPass::succeeded`] is the
    /// collector's outcome; failed batches are listed in its scheduler
    /// report.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::SyncInProgress`] if another pass is running.
    #[instrument(skip(self, rows), fields(rows = rows.len()))]
    pub async fn sync_pass(&self, rows: &[RawRow]) -> Result<SyncPass> {
        let _guard = self
            .running
            .try_lock()
            .map_err(|_| SyncError::SyncInProgress)?;

        let cancel = CancellationToken::new();
        let _active = ActivePass::publish(&self.active, cancel.clone());

        self.run_pass(rows, &cancel).await
    }

    async fn run_pass(&self, rows: &[RawRow], cancel: &CancellationToken) -> Result<SyncPass> {
        let observed_at = self.clock.unix_timestamp_millis();
        let pass = SyncPass::new().start(observed_at, rows.len())?;
        let pass_id = pass.id.to_string();

        info!(pass_id = %pass_id, observed_at, "Starting sync pass");
        self.emit(SyncEvent::Started {
            pass_id: pass_id.clone(),
            total_rows: rows.len() as u64,
            total_batches: self.scheduler.batch_count(rows.len()) as u64,
        });

        let mut context = WriteContext::new(self.store.clone());
        let report = self
            .scheduler
            .run(rows, observed_at, &mut context, cancel, &mut |outcome| {
                self.announce_batch(&pass_id, outcome)
            })
            .await;

        if report.cancelled {
            let batches_processed = report.batches_attempted as u64;
            let pass = pass.cancel(report, self.clock.unix_timestamp_millis())?;
            info!(pass_id = %pass_id, batches_processed, "Sync pass cancelled");
            self.emit(SyncEvent::Cancelled {
                pass_id,
                batches_processed,
            });
            return Ok(pass);
        }

        if !report.failed_batches.is_empty() {
            warn!(
                pass_id = %pass_id,
                failed = ?report.failed_batches,
                "Collecting stale films after failed batches"
            );
        }

        let collection = match self.collector.collect(&mut context).await {
            Ok(collected) => CollectionOutcome::from(&collected),
            Err(e) => {
                error!(pass_id = %pass_id, error = %e, "Stale-record collection failed");
                CollectionOutcome::Failed {
                    message: e.to_string(),
                }
            }
        };

        let pass = pass.finish(report, collection, self.clock.unix_timestamp_millis())?;
        self.announce_completion(&pass);

        Ok(pass)
    }

    fn announce_batch(&self, pass_id: &str, outcome: &BatchOutcome) {
        match &outcome.result {
            Ok(stats) => {
                self.emit(SyncEvent::BatchCommitted {
                    pass_id: pass_id.to_string(),
                    batch_index: outcome.index as u64,
                    created: stats.created,
                    touched: stats.touched,
                    rejected: stats.rejected,
                });
                if stats.created > 0 {
                    self.event_bus
                        .emit(CoreEvent::Library(LibraryEvent::FilmsAdded {
                            count: stats.created,
                        }))
                        .ok();
                }
            }
            Err(e) => self.emit(SyncEvent::BatchFailed {
                pass_id: pass_id.to_string(),
                batch_index: outcome.index as u64,
                message: e.to_string(),
            }),
        }
    }

    fn announce_completion(&self, pass: &SyncPass) {
        let report = pass.scheduler.clone().unwrap_or_default();
        let films_deleted = pass
            .collection
            .as_ref()
            .map_or(0, |outcome| outcome.deleted().len()) as u64;

        info!(
            pass_id = %pass.id,
            status = %pass.status,
            rows = report.stats.rows,
            created = report.stats.created,
            touched = report.stats.touched,
            failed_batches = report.failed_batches.len(),
            films_deleted,
            "Sync pass finished"
        );

        self.emit(SyncEvent::Completed {
            pass_id: pass.id.to_string(),
            rows_processed: report.stats.rows,
            batches_failed: report.failed_batches.len() as u64,
            films_deleted,
            duration_ms: pass.duration_ms().unwrap_or(0),
            succeeded: pass.succeeded(),
        });
    }

    fn emit(&self, event: SyncEvent) {
        // No subscribers is not an error
        self.event_bus.emit(CoreEvent::Sync(event)).ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pass::PassStatus;
    use crate::reconciler::{Batch, BatchStats};
    use async_trait::async_trait;
    use bridge_traits::ManualClock;
    use chrono::DateTime;
    use core_library::{create_test_pool, FilmPredicate, SqliteFilmStore};
    use serde_json::{json, Value};
    use tokio::sync::Notify;

    const NOW_SECS: i64 = 1_509_143_469;

    fn row(key: &str) -> RawRow {
        let mut row = vec![Value::Null; 15];
        row[1] = json!(key);
        row[8] = json!("Vertigo");
        row[9] = json!("1958");
        row[10] = json!("Fort Point");
        row[14] = json!("Alfred Hitchcock");
        row
    }

    async fn coordinator(config: SyncConfig) -> (SyncCoordinator, Arc<ManualClock>, EventBus) {
        let store = SqliteFilmStore::new(create_test_pool().await.unwrap());
        let clock = Arc::new(ManualClock::new(DateTime::from_timestamp(NOW_SECS, 0).unwrap()));
        let bus = EventBus::new(64);
        let coordinator =
            SyncCoordinator::new(config, Arc::new(store), clock.clone(), bus.clone()).unwrap();
        (coordinator, clock, bus)
    }

    /// Blocks every batch until released
    #[derive(Default)]
    struct GateReconciler {
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl BatchReconciler for GateReconciler {
        async fn reconcile(
            &self,
            batch: Batch<'_>,
            _context: &mut WriteContext,
        ) -> Result<BatchStats> {
            self.entered.notify_one();
            self.release.notified().await;
            Ok(BatchStats {
                rows: batch.rows.len() as u64,
                ..BatchStats::default()
            })
        }
    }

    #[test]
    fn test_config_validation() {
        assert!(SyncConfig::default().validate().is_ok());
        assert_eq!(SyncConfig::default().batch_size, 256);
        assert_eq!(SyncConfig::default().staleness_window, Duration::from_secs(60));

        let zero_batch = SyncConfig {
            batch_size: 0,
            ..SyncConfig::default()
        };
        assert!(matches!(zero_batch.validate(), Err(SyncError::Config(_))));

        let zero_window = SyncConfig {
            staleness_window: Duration::ZERO,
            ..SyncConfig::default()
        };
        assert!(zero_window.validate().is_err());
    }

    #[tokio::test]
    async fn test_pass_commits_and_reports() {
        let (coordinator, _, _) = coordinator(SyncConfig::default()).await;

        let pass = coordinator.sync_pass(&[row("a"), row("b")]).await.unwrap();

        assert_eq!(pass.status, PassStatus::Committed);
        assert!(pass.strict_success());
        assert_eq!(pass.stats().created, 2);
        assert_eq!(pass.observed_at, Some(NOW_SECS * 1000));
        assert!(!coordinator.is_running());

        let films = coordinator
            .store()
            .fetch(&FilmPredicate::All, None)
            .await
            .unwrap();
        assert_eq!(films.len(), 2);
        assert!(films.iter().all(|f| f.last_touched == NOW_SECS * 1000));
    }

    #[tokio::test]
    async fn test_event_sequence() {
        let (coordinator, _, bus) = coordinator(SyncConfig {
            batch_size: 1,
            ..SyncConfig::default()
        })
        .await;
        let mut sub = bus.subscribe();

        coordinator.sync_pass(&[row("a"), row("b")]).await.unwrap();

        let mut kinds = Vec::new();
        while let Ok(event) = sub.try_recv() {
            kinds.push(event.description().to_string());
        }
        assert_eq!(
            kinds,
            vec![
                "Sync started",
                "Sync batch committed",
                "Films added to store",
                "Sync batch committed",
                "Films added to store",
                "Sync completed",
            ]
        );
    }

    #[tokio::test]
    async fn test_empty_payload_still_collects() {
        let (coordinator, clock, _) = coordinator(SyncConfig::default()).await;
        coordinator.sync_pass(&[row("a")]).await.unwrap();

        clock.advance(Duration::from_secs(120));
        let pass = coordinator.sync_pass(&[]).await.unwrap();

        assert!(pass.succeeded());
        assert_eq!(pass.collection.as_ref().unwrap().deleted().len(), 1);
        assert!(coordinator
            .store()
            .fetch(&FilmPredicate::All, None)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_overlapping_pass_is_rejected() {
        let (coordinator, _, _) = coordinator(SyncConfig::default()).await;
        let gate = Arc::new(GateReconciler::default());
        let coordinator = Arc::new(coordinator.with_reconciler(gate.clone()).unwrap());

        let first = tokio::spawn({
            let coordinator = coordinator.clone();
            async move { coordinator.sync_pass(&[row("a")]).await }
        });

        gate.entered.notified().await;
        assert!(coordinator.is_running());
        assert!(matches!(
            coordinator.sync_pass(&[row("b")]).await,
            Err(SyncError::SyncInProgress)
        ));

        gate.release.notify_one();
        let pass = first.await.unwrap().unwrap();
        assert!(pass.succeeded());
        assert!(!coordinator.is_running());
    }

    #[tokio::test]
    async fn test_cancel_between_batches_skips_collector() {
        let (coordinator, _, bus) = coordinator(SyncConfig {
            batch_size: 1,
            ..SyncConfig::default()
        })
        .await;
        let gate = Arc::new(GateReconciler::default());
        let coordinator = Arc::new(coordinator.with_reconciler(gate.clone()).unwrap());
        let mut sub = bus.subscribe();

        let pass = tokio::spawn({
            let coordinator = coordinator.clone();
            async move { coordinator.sync_pass(&[row("a"), row("b"), row("c")]).await }
        });

        gate.entered.notified().await;
        assert!(coordinator.cancel_sync().await);
        gate.release.notify_one();

        let pass = pass.await.unwrap().unwrap();
        assert_eq!(pass.status, PassStatus::Cancelled);
        assert_eq!(pass.collection, Some(CollectionOutcome::Skipped));
        assert_eq!(pass.scheduler.as_ref().unwrap().batches_attempted, 1);

        let mut cancelled = false;
        while let Ok(event) = sub.try_recv() {
            if let CoreEvent::Sync(SyncEvent::Cancelled {
                batches_processed, ..
            }) = event
            {
                assert_eq!(batches_processed, 1);
                cancelled = true;
            }
        }
        assert!(cancelled);
    }

    #[tokio::test]
    async fn test_cancel_without_pass() {
        let (coordinator, _, _) = coordinator(SyncConfig::default()).await;
        assert!(!coordinator.cancel_sync().await);
    }

    #[tokio::test]
    async fn test_dropped_pass_leaves_nothing_to_cancel() {
        let (coordinator, _, _) = coordinator(SyncConfig::default()).await;
        let gate = Arc::new(GateReconciler::default());
        let coordinator = coordinator.with_reconciler(gate.clone()).unwrap();

        let abandoned = tokio::time::timeout(
            Duration::from_millis(50),
            coordinator.sync_pass(&[row("a")]),
        )
        .await;

        assert!(abandoned.is_err(), "Pass should still be blocked in the reconciler");
        assert!(!coordinator.is_running());
        assert!(!coordinator.cancel_sync().await);

        gate.release.notify_one();
        let pass = coordinator.sync_pass(&[row("b")]).await.unwrap();
        assert_eq!(pass.status, PassStatus::Committed);
        assert!(!coordinator.cancel_sync().await);
    }
}
