//! # Film Sync Engine
//!
//! Reconciles the remote film locations feed into the local film store.
//!
//! ## Overview
//!
//! A sync pass takes the already-fetched rows of the feed and:
//! - Decodes each positional row into a typed record (`decoder`)
//! - Finds or creates the stored film by natural key and stamps its
//!   freshness marker (`reconciler`)
//! - Commits one transaction per fixed-size batch, continuing past failed
//!   batches (`scheduler`)
//! - Deletes every film the pass did not observe within the staleness
//!   window (`collector`)
//!
//! ## Components
//!
//! - **Feed Client** (`feed`): Fetches and shape-checks the raw payload
//! - **Sync Pass** (`pass`): Pass record with validated state transitions
//! - **Sync Coordinator** (`coordinator`): Runs passes, one at a time

pub mod collector;
pub mod coordinator;
pub mod decoder;
pub mod error;
pub mod feed;
pub mod pass;
pub mod reconciler;
pub mod scheduler;

pub use collector::{CollectionReport, StaleFilmCollector};
pub use coordinator::{SyncConfig, SyncCoordinator};
pub use decoder::{FilmColumns, RawRow};
pub use error::{DecodeError, FetchError, Result, SyncError};
pub use feed::FeedClient;
pub use pass::{CollectionOutcome, PassStatus, SyncPass, SyncPassId};
pub use reconciler::{Batch, BatchReconciler, BatchStats, FilmReconciler};
pub use scheduler::{BatchOutcome, BatchScheduler, SchedulerReport};
