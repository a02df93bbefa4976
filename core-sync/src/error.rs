use bridge_traits::BridgeError;
use core_library::LibraryError;
use thiserror::Error;

/// A row whose natural key is present but whose fields are unusable
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Ill-formatted input for {natural_key}: field '{field}' is missing or not a string")]
    IllFormattedInput {
        natural_key: String,
        field: &'static str,
    },
}

/// Failure to obtain a usable payload from the feed
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Invalid feed URL: {0}")]
    InvalidUrl(String),

    #[error("Transport error: {0}")]
    Transport(#[from] BridgeError),

    #[error("Feed returned HTTP {status}")]
    Status { status: u16 },

    #[error("Feed body is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid feed payload: {0}")]
    InvalidPayload(String),
}

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Sync already in progress")]
    SyncInProgress,

    #[error("Batch {batch_index} lookup failed: {source}")]
    Lookup {
        batch_index: usize,
        #[source]
        source: LibraryError,
    },

    #[error("Batch {batch_index} failed to commit: {source}")]
    Commit {
        batch_index: usize,
        #[source]
        source: LibraryError,
    },

    #[error("Stale-record collection failed: {0}")]
    Collector(#[source] LibraryError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("Invalid pass status: {0}")]
    InvalidStatus(String),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Invalid sync configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, SyncError>;
