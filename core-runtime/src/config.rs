//! # Core Configuration Module
//!
//! Provides configuration management for the film sync core.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a `CoreConfig`
//! instance holding the injected host capabilities and the sync tunables.
//! `build()` validates everything up front so a bad value never reaches a
//! running sync pass.
//!
//! ## Required
//!
//! - `database_path` - location of the SQLite film store
//! - `HttpClient` - fetches the feed (desktop default: reqwest, behind the
//!   `desktop-shims` feature)
//!
//! ## Defaults
//!
//! | Setting             | Default                                   |
//! |---------------------|-------------------------------------------|
//! | `feed_url`          | [`DEFAULT_FEED_URL`]                      |
//! | `batch_size`        | [`DEFAULT_BATCH_SIZE`] rows               |
//! | `staleness_window`  | [`DEFAULT_STALENESS_WINDOW`]              |
//! | `event_buffer_size` | [`DEFAULT_EVENT_BUFFER_SIZE`]             |
//! | `clock`             | `SystemClock`                             |
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//! use std::time::Duration;
//!
//! let config = CoreConfig::builder()
//!     .database_path("/path/to/films.db")
//!     .batch_size(128)
//!     .staleness_window(Duration::from_secs(120))
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use crate::events::DEFAULT_EVENT_BUFFER_SIZE;
use bridge_traits::{Clock, HttpClient, SystemClock};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Public film locations feed
pub const DEFAULT_FEED_URL: &str = "https://data.sfgov.org/api/views/yitu-d5am/rows.json";

/// Rows reconciled and committed per unit of work
pub const DEFAULT_BATCH_SIZE: usize = 256;

/// Films not observed within this window of a pass are collected
pub const DEFAULT_STALENESS_WINDOW: Duration = Duration::from_secs(60);

/// Core configuration for the film sync core.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// Path to the SQLite database file
    pub database_path: PathBuf,

    /// Feed endpoint, without the download query parameter
    pub feed_url: String,

    /// Rows per batch
    pub batch_size: usize,

    /// Age past which an unobserved film is deleted
    pub staleness_window: Duration,

    /// Buffer of the event bus channel
    pub event_buffer_size: usize,

    /// HTTP client used to fetch the feed
    pub http_client: Arc<dyn HttpClient>,

    /// Source of "now" for freshness markers and cutoffs
    pub clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("database_path", &self.database_path)
            .field("feed_url", &self.feed_url)
            .field("batch_size", &self.batch_size)
            .field("staleness_window", &self.staleness_window)
            .field("event_buffer_size", &self.event_buffer_size)
            .field("http_client", &"HttpClient { ... }")
            .field("clock", &"Clock { ... }")
            .finish()
    }
}

impl CoreConfig {
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - Database path is not empty
    /// - Feed URL parses as an absolute http(s) URL
    /// - Batch size, staleness window and event buffer are non-zero
    pub fn validate(&self) -> Result<()> {
        if self.database_path.as_os_str().is_empty() {
            return Err(Error::Config("Database path cannot be empty".to_string()));
        }

        let url = url::Url::parse(&self.feed_url)
            .map_err(|e| Error::Config(format!("Invalid feed URL '{}': {}", self.feed_url, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::Config(format!(
                "Feed URL must use http or https, got '{}'",
                url.scheme()
            )));
        }

        if self.batch_size == 0 {
            return Err(Error::Config(
                "Batch size must be greater than 0".to_string(),
            ));
        }

        if self.staleness_window.is_zero() {
            return Err(Error::Config(
                "Staleness window must be greater than 0".to_string(),
            ));
        }

        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn http_client_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "HttpClient".to_string(),
        message: "HttpClient implementation is required to fetch the film feed. \
                 Desktop: enable the 'desktop-shims' feature to use the default ReqwestHttpClient. \
                 Other hosts: inject a platform HTTP client with .http_client()."
            .to_string(),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    use bridge_desktop::ReqwestHttpClient;

    let client: Arc<dyn HttpClient> = Arc::new(ReqwestHttpClient::new());
    Ok(client)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    Err(http_client_missing_error())
}

/// Builder for constructing [`CoreConfig`] instances.
#[derive(Default)]
pub struct CoreConfigBuilder {
    database_path: Option<PathBuf>,
    feed_url: Option<String>,
    batch_size: Option<usize>,
    staleness_window: Option<Duration>,
    event_buffer_size: Option<usize>,
    http_client: Option<Arc<dyn HttpClient>>,
    clock: Option<Arc<dyn Clock>>,
}

impl CoreConfigBuilder {
    /// Sets the database path.
    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.database_path = Some(path.into());
        self
    }

    /// Sets the feed endpoint.
    ///
    /// Default: [`DEFAULT_FEED_URL`]
    pub fn feed_url(mut self, url: impl Into<String>) -> Self {
        self.feed_url = Some(url.into());
        self
    }

    /// Sets the number of rows per batch.
    ///
    /// Default: 256
    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = Some(size);
        self
    }

    /// Sets the staleness window used by the collector.
    ///
    /// Default: 60 seconds
    pub fn staleness_window(mut self, window: Duration) -> Self {
        self.staleness_window = Some(window);
        self
    }

    /// Sets the event bus buffer size.
    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    /// Sets the HTTP client implementation.
    ///
    /// If not provided, the reqwest-based client is used when the
    /// `desktop-shims` feature is enabled.
    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Sets the clock. Tests inject a `ManualClock` here.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Builds the final `CoreConfig` instance.
    ///
    /// # Errors
    ///
    /// Returns an error if the database path is missing, no HTTP client is
    /// available, or any value fails [`CoreConfig::validate`].
    pub fn build(self) -> Result<CoreConfig> {
        let database_path = self.database_path.ok_or_else(|| {
            Error::Config("Database path is required. Use .database_path() to set it.".to_string())
        })?;

        let http_client = match self.http_client {
            Some(client) => client,
            None => provide_default_http_client()?,
        };

        let config = CoreConfig {
            database_path,
            feed_url: self
                .feed_url
                .unwrap_or_else(|| DEFAULT_FEED_URL.to_string()),
            batch_size: self.batch_size.unwrap_or(DEFAULT_BATCH_SIZE),
            staleness_window: self.staleness_window.unwrap_or(DEFAULT_STALENESS_WINDOW),
            event_buffer_size: self.event_buffer_size.unwrap_or(DEFAULT_EVENT_BUFFER_SIZE),
            http_client,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
        };

        config.validate()?;

        Ok(config)
    }
}
