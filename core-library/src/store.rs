//! # Film Store Contract
//!
//! The abstract persistence boundary the sync engine writes through.
//!
//! ## Overview
//!
//! A store answers predicate lookups, applies a batch of pending changes as
//! one transaction, and deletes by predicate as one transaction. Each
//! [`WriteContext`](crate::context::WriteContext) talks to the store only
//! through this trait, so tests can wrap or replace it.

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{DeletedFilm, StoredFilm};

/// Selection criteria for store lookups and bulk deletes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilmPredicate {
    /// Exact match on the feed's row identifier
    NaturalKey(String),
    /// Freshness marker strictly before the cutoff (Unix milliseconds)
    TouchedBefore(i64),
    /// Every stored film
    All,
}

impl FilmPredicate {
    /// Evaluate the predicate against an in-memory entity
    pub fn matches(&self, film: &StoredFilm) -> bool {
        match self {
            FilmPredicate::NaturalKey(key) => film.natural_key == *key,
            FilmPredicate::TouchedBefore(cutoff) => film.is_stale(*cutoff),
            FilmPredicate::All => true,
        }
    }
}

/// Freshness update for an entity that already exists in the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Touch {
    pub id: String,
    pub last_touched: i64,
}

/// Pending writes of one context, applied atomically
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub inserted: Vec<StoredFilm>,
    pub touched: Vec<Touch>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.inserted.is_empty() && self.touched.is_empty()
    }

    pub fn len(&self) -> usize {
        self.inserted.len() + self.touched.len()
    }
}

/// Persistence boundary for films
#[async_trait]
pub trait FilmStore: Send + Sync {
    /// Fetch films matching `predicate`, at most `limit` of them when given
    async fn fetch(&self, predicate: &FilmPredicate, limit: Option<u32>)
        -> Result<Vec<StoredFilm>>;

    /// Apply every change in one transaction
    ///
    /// # Errors
    ///
    /// On any failure nothing from `changes` is persisted.
    async fn apply(&self, changes: &ChangeSet) -> Result<()>;

    /// Delete every film matching `predicate` in one transaction
    ///
    /// Returns the identities of the removed films.
    async fn delete_where(&self, predicate: &FilmPredicate) -> Result<Vec<DeletedFilm>>;
}
