//! # Scoped Write Context
//!
//! A short-lived unit of work over a [`FilmStore`].
//!
//! ## Overview
//!
//! The sync engine opens one context per batch. Entities it looks up or
//! creates are registered in the context's working set and tracked until
//! [`WriteContext::save`] commits them in one transaction.
//! [`WriteContext::reset`] drops the whole working set, which bounds memory
//! to a single batch.
//!
//! Lookups consult the working set before the store, so an entity inserted
//! earlier in the same batch is found without a round trip.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::error::Result;
use crate::models::{DeletedFilm, StoredFilm};
use crate::store::{ChangeSet, FilmPredicate, FilmStore, Touch};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntityState {
    /// Loaded from the store, unchanged
    Clean,
    /// Created in this context, not yet committed
    Inserted,
    /// Loaded from the store with a new freshness marker
    Touched,
}

#[derive(Debug, Clone)]
struct Registered {
    film: StoredFilm,
    state: EntityState,
}

/// Unit of work over a [`FilmStore`], keyed by natural key
pub struct WriteContext {
    store: Arc<dyn FilmStore>,
    registered: HashMap<String, Registered>,
}

impl WriteContext {
    pub fn new(store: Arc<dyn FilmStore>) -> Self {
        Self {
            store,
            registered: HashMap::new(),
        }
    }

    /// Number of entities currently held in the working set
    pub fn registered_count(&self) -> usize {
        self.registered.len()
    }

    /// Look up a registered entity without touching the store
    pub fn registered(&self, natural_key: &str) -> Option<&StoredFilm> {
        self.registered.get(natural_key).map(|r| &r.film)
    }

    /// Find the first entity matching `predicate`
    ///
    /// Registered entities win. Otherwise the store is queried with a limit of
    /// one and the result, if any, is registered.
    pub async fn find_first(&mut self, predicate: &FilmPredicate) -> Result<Option<&StoredFilm>> {
        let hit = self
            .registered
            .iter()
            .find(|(_, r)| predicate.matches(&r.film))
            .map(|(key, _)| key.clone());

        if let Some(key) = hit {
            return Ok(self.registered.get(&key).map(|r| &r.film));
        }

        let Some(film) = self.store.fetch(predicate, Some(1)).await?.pop() else {
            return Ok(None);
        };

        let entry = self
            .registered
            .entry(film.natural_key.clone())
            .or_insert(Registered {
                film,
                state: EntityState::Clean,
            });
        Ok(Some(&entry.film))
    }

    /// Register a new entity for insertion on the next save
    ///
    /// An entity already registered under the same natural key is kept.
    pub fn insert(&mut self, film: StoredFilm) -> &StoredFilm {
        let entry = self
            .registered
            .entry(film.natural_key.clone())
            .or_insert(Registered {
                film,
                state: EntityState::Inserted,
            });
        &entry.film
    }

    /// Stamp the freshness marker of a registered entity
    ///
    /// Returns `false` when nothing is registered under `natural_key`.
    pub fn touch(&mut self, natural_key: &str, at: i64) -> bool {
        let Some(entry) = self.registered.get_mut(natural_key) else {
            return false;
        };

        entry.film.last_touched = at;
        if entry.state == EntityState::Clean {
            entry.state = EntityState::Touched;
        }
        true
    }

    /// Whether a save would write anything
    pub fn has_changes(&self) -> bool {
        self.registered
            .values()
            .any(|r| r.state != EntityState::Clean)
    }

    /// Snapshot of everything a save would write
    pub fn pending_changes(&self) -> ChangeSet {
        let mut changes = ChangeSet::default();
        for entry in self.registered.values() {
            match entry.state {
                EntityState::Clean => {}
                EntityState::Inserted => changes.inserted.push(entry.film.clone()),
                EntityState::Touched => changes.touched.push(Touch {
                    id: entry.film.id.clone(),
                    last_touched: entry.film.last_touched,
                }),
            }
        }
        changes
    }

    /// Commit pending changes in one transaction
    ///
    /// Returns the number of entities written. On failure the working set is
    /// left as it was; callers decide whether to reset.
    pub async fn save(&mut self) -> Result<usize> {
        let changes = self.pending_changes();
        if changes.is_empty() {
            return Ok(0);
        }

        self.store.apply(&changes).await?;

        for entry in self.registered.values_mut() {
            entry.state = EntityState::Clean;
        }

        debug!(
            inserted = changes.inserted.len(),
            touched = changes.touched.len(),
            "Write context saved"
        );
        Ok(changes.len())
    }

    /// Drop every registered entity, committed or not
    pub fn reset(&mut self) {
        self.registered.clear();
    }

    /// Forget entities that a bulk delete removed from the store
    ///
    /// Returns how many registered entities were dropped.
    pub fn merge_deletions(&mut self, deleted: &[DeletedFilm]) -> usize {
        let before = self.registered.len();
        for film in deleted {
            if self
                .registered
                .get(&film.natural_key)
                .is_some_and(|r| r.film.id == film.id)
            {
                self.registered.remove(&film.natural_key);
            }
        }
        before - self.registered.len()
    }

    pub fn store(&self) -> &Arc<dyn FilmStore> {
        &self.store
    }
}
