//! # Stale-Record Collector
//!
//! Deletes every film whose freshness marker predates the cutoff, in one
//! bulk delete, then evicts the same identities from the pass's working set
//! and announces them on the event bus.
//!
//! The cutoff is taken when the collector runs, not when the pass started.
//! A pass slower than the staleness window therefore sees its own early
//! batches as stale; size the window accordingly.

use std::sync::Arc;
use std::time::Duration;

use bridge_traits::Clock;
use core_library::{DeletedFilm, FilmPredicate, WriteContext};
use core_runtime::events::{CoreEvent, EventBus, LibraryEvent};
use tracing::{info, instrument};

use crate::error::{Result, SyncError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionReport {
    /// Unix milliseconds; films touched strictly before it were deleted
    pub cutoff: i64,
    pub deleted: Vec<DeletedFilm>,
}

pub struct StaleFilmCollector {
    clock: Arc<dyn Clock>,
    staleness_window: Duration,
    event_bus: Option<EventBus>,
}

impl StaleFilmCollector {
    pub fn new(clock: Arc<dyn Clock>, staleness_window: Duration) -> Self {
        Self {
            clock,
            staleness_window,
            event_bus: None,
        }
    }

    /// Announce deletions on `event_bus`
    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Current cutoff: now minus the staleness window
    pub fn cutoff(&self) -> i64 {
        let window = i64::try_from(self.staleness_window.as_millis()).unwrap_or(i64::MAX);
        self.clock.unix_timestamp_millis().saturating_sub(window)
    }

    /// Collect against the cutoff as of now
    pub async fn collect(&self, context: &mut WriteContext) -> Result<CollectionReport> {
        self.collect_before(self.cutoff(), context).await
    }

    /// Collect against an explicit cutoff
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Collector`] when the bulk delete fails. Nothing
    /// is deleted in that case.
    #[instrument(skip(self, context))]
    pub async fn collect_before(
        &self,
        cutoff: i64,
        context: &mut WriteContext,
    ) -> Result<CollectionReport> {
        let deleted = context
            .store()
            .delete_where(&FilmPredicate::TouchedBefore(cutoff))
            .await
            .map_err(SyncError::Collector)?;

        let evicted = context.merge_deletions(&deleted);
        info!(deleted = deleted.len(), evicted, "Stale films collected");

        if !deleted.is_empty() {
            if let Some(bus) = &self.event_bus {
                bus.emit(CoreEvent::Library(LibraryEvent::FilmsDeleted {
                    film_ids: deleted.iter().map(|film| film.id.clone()).collect(),
                }))
                .ok();
            }
        }

        Ok(CollectionReport { cutoff, deleted })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::ManualClock;
    use chrono::DateTime;
    use core_library::{create_test_pool, ChangeSet, FilmStore, SqliteFilmStore, StoredFilm};

    const NOW_SECS: i64 = 1_509_143_469;

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(DateTime::from_timestamp(NOW_SECS, 0).unwrap()))
    }

    fn film(key: &str, last_touched: i64) -> StoredFilm {
        let mut film = StoredFilm::placeholder(key);
        film.last_touched = last_touched;
        film
    }

    async fn seeded(films: Vec<StoredFilm>) -> WriteContext {
        let store = SqliteFilmStore::new(create_test_pool().await.unwrap());
        store
            .apply(&ChangeSet {
                inserted: films,
                touched: vec![],
            })
            .await
            .unwrap();
        WriteContext::new(Arc::new(store))
    }

    #[tokio::test]
    async fn test_removes_exactly_the_stale_film() {
        let now = NOW_SECS * 1000;
        let mut ctx = seeded(vec![film("stale", now - 120_000), film("fresh", now - 1_000)]).await;
        let collector = StaleFilmCollector::new(clock(), Duration::from_secs(60));

        let report = collector.collect(&mut ctx).await.unwrap();

        assert_eq!(report.cutoff, now - 60_000);
        assert_eq!(report.deleted.len(), 1);
        assert_eq!(report.deleted[0].natural_key, "stale");

        let remaining = ctx.store().fetch(&FilmPredicate::All, None).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].natural_key, "fresh");
    }

    #[tokio::test]
    async fn test_cutoff_moves_with_clock() {
        let clock = clock();
        let collector = StaleFilmCollector::new(clock.clone(), Duration::from_secs(60));
        let before = collector.cutoff();

        clock.advance(Duration::from_secs(30));

        assert_eq!(collector.cutoff(), before + 30_000);
    }

    #[tokio::test]
    async fn test_deletions_are_announced_and_evicted() {
        let bus = EventBus::new(10);
        let mut sub = bus.subscribe();
        let mut ctx = seeded(vec![film("old", 0)]).await;
        ctx.find_first(&FilmPredicate::NaturalKey("old".to_string()))
            .await
            .unwrap();
        assert_eq!(ctx.registered_count(), 1);

        let collector =
            StaleFilmCollector::new(clock(), Duration::from_secs(60)).with_event_bus(bus);
        let report = collector.collect(&mut ctx).await.unwrap();

        assert_eq!(ctx.registered_count(), 0);
        match sub.recv().await.unwrap() {
            CoreEvent::Library(LibraryEvent::FilmsDeleted { film_ids }) => {
                assert_eq!(film_ids, vec![report.deleted[0].id.clone()]);
            }
            other => panic!("Unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_nothing_stale_emits_nothing() {
        let bus = EventBus::new(10);
        let mut sub = bus.subscribe();
        let now = NOW_SECS * 1000;
        let mut ctx = seeded(vec![film("fresh", now)]).await;

        let collector =
            StaleFilmCollector::new(clock(), Duration::from_secs(60)).with_event_bus(bus);
        let report = collector.collect(&mut ctx).await.unwrap();

        assert!(report.deleted.is_empty());
        assert!(sub.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_collect_before_explicit_cutoff() {
        let mut ctx = seeded(vec![film("a", 10), film("b", 20), film("c", 30)]).await;
        let collector = StaleFilmCollector::new(clock(), Duration::from_secs(60));

        let report = collector.collect_before(25, &mut ctx).await.unwrap();

        assert_eq!(report.deleted.len(), 2);
    }
}
