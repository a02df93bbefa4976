//! Integration tests for logging system
//!
//! A global subscriber can only be installed once per process, so every
//! check that needs one lives in a single test.

use async_trait::async_trait;
use bridge_traits::error::Result as SinkResult;
use bridge_traits::time::{LogEntry, LogLevel, LoggerSink};
use core_runtime::logging::{init_logging, LogFormat, LoggingConfig};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct CapturingSink {
    entries: Mutex<Vec<LogEntry>>,
}

#[async_trait]
impl LoggerSink for CapturingSink {
    async fn log(&self, entry: LogEntry) -> SinkResult<()> {
        self.entries.lock().unwrap().push(entry);
        Ok(())
    }

    fn min_level(&self) -> LogLevel {
        LogLevel::Info
    }
}

#[test]
fn test_global_subscriber_forwards_workspace_events() {
    let sink = Arc::new(CapturingSink::default());
    let config = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_level(LogLevel::Debug)
        .with_logger_sink(sink.clone());

    init_logging(config).unwrap();

    tracing::info!(target: "core_sync", batch_index = 2u64, "Batch reconciled");
    tracing::debug!(target: "core_sync", "Below the sink's minimum level");
    tracing::info!(target: "sqlx", "Filtered out by the dependency filter");

    let entries = sink.entries.lock().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].message, "Batch reconciled");
    assert_eq!(entries[0].target, "core_sync");
    assert_eq!(entries[0].fields.get("batch_index"), Some(&"2".to_string()));
    drop(entries);

    let second = init_logging(LoggingConfig::default());
    assert!(second.is_err(), "Second initialization must be rejected");
}

#[test]
fn test_invalid_filter_is_reported() {
    let config = LoggingConfig::default().with_filter("core_sync=[");
    assert!(init_logging(config).is_err());
}
