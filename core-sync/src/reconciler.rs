//! # Reconciler
//!
//! Applies one batch of feed rows to the store through a [`WriteContext`].
//!
//! ## Overview
//!
//! For every row the reconciler:
//! 1. Reads the natural key, skipping the row when it is missing
//! 2. Finds the film by natural key, working set first, then the store
//! 3. When found, leaves its fields alone
//! 4. When not found, decodes the remaining fields and registers a new film
//!    (a row that fails to decode is rejected and the batch moves on)
//! 5. Stamps the found or created film with the pass timestamp
//!
//! After the last row the pending changes are committed as one transaction
//! and the working set is reset, whether or not the commit succeeded.

use async_trait::async_trait;
use core_library::{FilmPredicate, StoredFilm, WriteContext};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::decoder::{self, RawRow};
use crate::error::{Result, SyncError};

/// One slice of the payload, reconciled as a unit
#[derive(Debug, Clone, Copy)]
pub struct Batch<'a> {
    /// Zero-based position of the batch within the pass
    pub index: usize,
    pub rows: &'a [RawRow],
    /// Pass timestamp (Unix milliseconds) stamped on every observed film
    pub observed_at: i64,
}

/// Row accounting for one or more batches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStats {
    pub rows: u64,
    /// New films registered
    pub created: u64,
    /// Existing films whose freshness marker was refreshed
    pub touched: u64,
    /// Rows without a usable natural key
    pub skipped: u64,
    /// Rows with a natural key but ill-formatted fields
    pub rejected: u64,
}

impl BatchStats {
    pub fn merge(&mut self, other: &BatchStats) {
        self.rows += other.rows;
        self.created += other.created;
        self.touched += other.touched;
        self.skipped += other.skipped;
        self.rejected += other.rejected;
    }
}

/// Reconciles one batch and commits it
#[async_trait]
pub trait BatchReconciler: Send + Sync {
    /// # Errors
    ///
    /// Returns [`SyncError::Lookup`] or [`SyncError::Commit`] when the batch
    /// could not be committed. Nothing from a failed batch persists.
    async fn reconcile(&self, batch: Batch<'_>, context: &mut WriteContext) -> Result<BatchStats>;
}

/// The film reconciler
#[derive(Debug, Clone, Copy, Default)]
pub struct FilmReconciler;

impl FilmReconciler {
    pub fn new() -> Self {
        Self
    }

    async fn apply_rows(&self, batch: &Batch<'_>, context: &mut WriteContext) -> Result<BatchStats> {
        let mut stats = BatchStats {
            rows: batch.rows.len() as u64,
            ..BatchStats::default()
        };

        for row in batch.rows {
            let Some(key) = decoder::natural_key(row) else {
                stats.skipped += 1;
                continue;
            };

            let found = context
                .find_first(&FilmPredicate::NaturalKey(key.to_owned()))
                .await
                .map_err(|source| SyncError::Lookup {
                    batch_index: batch.index,
                    source,
                })?
                .is_some();

            if found {
                stats.touched += 1;
            } else {
                match decoder::decode_fields(key, row) {
                    Ok(record) => {
                        context.insert(StoredFilm::from_record(&record));
                        stats.created += 1;
                    }
                    Err(e) => {
                        warn!(batch_index = batch.index, error = %e, "Rejecting feed row");
                        stats.rejected += 1;
                        continue;
                    }
                }
            }

            context.touch(key, batch.observed_at);
        }

        Ok(stats)
    }
}

#[async_trait]
impl BatchReconciler for FilmReconciler {
    #[instrument(skip(self, batch, context), fields(batch_index = batch.index, rows = batch.rows.len()))]
    async fn reconcile(&self, batch: Batch<'_>, context: &mut WriteContext) -> Result<BatchStats> {
        let result = match self.apply_rows(&batch, context).await {
            Ok(stats) => context
                .save()
                .await
                .map(|_| stats)
                .map_err(|source| SyncError::Commit {
                    batch_index: batch.index,
                    source,
                }),
            Err(e) => Err(e),
        };

        context.reset();

        if let Ok(stats) = &result {
            debug!(
                created = stats.created,
                touched = stats.touched,
                skipped = stats.skipped,
                rejected = stats.rejected,
                "Batch reconciled"
            );
        }

        result
    }
}
