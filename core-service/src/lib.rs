//! Core service façade and bootstrap helpers.
//!
//! This crate wires a [`CoreConfig`] into the film store, the feed client and
//! the sync coordinator, and exposes the handful of operations a host needs:
//! refresh from the feed, list films, and watch sync events. Desktop hosts
//! enable the `desktop-shims` feature to get the default `reqwest` HTTP
//! client; other hosts inject their own through the config builder.

pub mod error;

pub use error::{CoreError, Result};

use std::sync::Arc;

use core_library::{
    create_pool, DatabaseConfig, FilmRepository, FilmSort, SqliteFilmRepository, SqliteFilmStore,
    StoredFilm,
};
use core_runtime::config::CoreConfig;
use core_runtime::events::{CoreEvent, EventBus, EventStream, SyncEvent};
use core_sync::{FeedClient, RawRow, SyncConfig, SyncCoordinator, SyncError, SyncPass};
use tracing::{error, info, instrument};

/// Primary façade exposed to host applications.
#[derive(Clone)]
pub struct FilmService {
    coordinator: Arc<SyncCoordinator>,
    feed: Arc<FeedClient>,
    films: Arc<dyn FilmRepository>,
    events: EventBus,
}

impl FilmService {
    /// Open the database at `config.database_path` and wire every component.
    ///
    /// # Errors
    ///
    /// Fails if the database cannot be opened or migrated, or the feed URL or
    /// sync settings are invalid.
    pub async fn bootstrap(config: CoreConfig) -> Result<Self> {
        let database = DatabaseConfig::new(config.database_path.clone());
        Self::bootstrap_with_database(config, database).await
    }

    /// Like [`FilmService::bootstrap`], with explicit database settings.
    #[instrument(skip_all, fields(database_url = %database.database_url))]
    pub async fn bootstrap_with_database(
        config: CoreConfig,
        database: DatabaseConfig,
    ) -> Result<Self> {
        config.validate()?;

        let pool = create_pool(database).await?;
        let events = EventBus::new(config.event_buffer_size);

        let coordinator = SyncCoordinator::new(
            SyncConfig::from(&config),
            Arc::new(SqliteFilmStore::new(pool.clone())),
            config.clock.clone(),
            events.clone(),
        )?;
        let feed = FeedClient::new(config.http_client.clone(), &config.feed_url)?;

        info!(feed_url = %feed.request_url(), "Film service ready");

        Ok(Self {
            coordinator: Arc::new(coordinator),
            feed: Arc::new(feed),
            films: Arc::new(SqliteFilmRepository::new(pool)),
            events,
        })
    }

    /// Fetch the feed and run one sync pass over it.
    ///
    /// # Errors
    ///
    /// - [`CoreError::Sync`] with [`SyncError::SyncInProgress`] if a pass is
    ///   already running; the feed is not fetched in that case
    /// - [`CoreError::Fetch`] if the feed could not be fetched; the store is
    ///   left untouched
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> Result<SyncPass> {
        if self.coordinator.is_running() {
            return Err(SyncError::SyncInProgress.into());
        }

        let rows = match self.feed.fetch().await {
            Ok(rows) => rows,
            Err(e) => {
                error!(error = %e, "Feed fetch failed");
                self.events
                    .emit(CoreEvent::Sync(SyncEvent::Failed {
                        pass_id: None,
                        message: e.to_string(),
                    }))
                    .ok();
                return Err(e.into());
            }
        };

        self.sync_payload(&rows).await
    }

    /// Run one sync pass over an already-fetched payload.
    pub async fn sync_payload(&self, rows: &[RawRow]) -> Result<SyncPass> {
        Ok(self.coordinator.sync_pass(rows).await?)
    }

    pub async fn films(&self, sort: FilmSort) -> Result<Vec<StoredFilm>> {
        Ok(self.films.list(sort).await?)
    }

    pub async fn film(&self, natural_key: &str) -> Result<Option<StoredFilm>> {
        Ok(self.films.find_by_natural_key(natural_key).await?)
    }

    pub async fn film_count(&self) -> Result<i64> {
        Ok(self.films.count().await?)
    }

    /// Subscribe to sync and library events.
    pub fn subscribe(&self) -> EventStream {
        EventStream::new(self.events.subscribe())
    }

    /// Stop the running pass before its next batch. `false` if none is running.
    pub async fn cancel_sync(&self) -> bool {
        self.coordinator.cancel_sync().await
    }

    pub fn is_syncing(&self) -> bool {
        self.coordinator.is_running()
    }
}
