//! Domain models for the film library
//!
//! `FilmRecord` is the transient, decoded shape of one feed row.
//! `StoredFilm` is the persisted entity that carries a freshness marker.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Freshness marker of an entity that no sync pass has confirmed yet.
///
/// 0001-01-01T00:00:00Z expressed in Unix milliseconds.
pub const DISTANT_PAST: i64 = -62_135_596_800_000;

// =============================================================================
// Decoded Record
// =============================================================================

/// One film row after validation, before persistence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilmRecord {
    /// The feed's own unique row identifier
    pub natural_key: String,
    pub title: String,
    pub director: String,
    /// Kept as text, exactly as the feed provides it
    pub release_year: String,
    pub location: String,
}

// =============================================================================
// Persisted Entity
// =============================================================================

/// A film owned by the persistence layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct StoredFilm {
    /// Local identity, stable for the lifetime of the row
    pub id: String,
    /// Unique across all stored films
    pub natural_key: String,
    pub title: String,
    pub director: String,
    pub release_year: String,
    pub location: String,
    /// Unix milliseconds of the last sync pass that observed this film
    pub last_touched: i64,
}

impl StoredFilm {
    /// Create an unpopulated entity for `natural_key`.
    ///
    /// The freshness marker starts at [`DISTANT_PAST`]; callers stamp it once
    /// the entity has been populated.
    pub fn placeholder(natural_key: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            natural_key: natural_key.into(),
            title: String::new(),
            director: String::new(),
            release_year: String::new(),
            location: String::new(),
            last_touched: DISTANT_PAST,
        }
    }

    /// Copy every editable field from a decoded record
    pub fn populate(&mut self, record: &FilmRecord) {
        self.natural_key = record.natural_key.clone();
        self.title = record.title.clone();
        self.director = record.director.clone();
        self.release_year = record.release_year.clone();
        self.location = record.location.clone();
    }

    /// Build a new entity from a decoded record, marker still at the sentinel
    pub fn from_record(record: &FilmRecord) -> Self {
        let mut film = Self::placeholder(record.natural_key.clone());
        film.populate(record);
        film
    }

    /// Whether the freshness marker predates `cutoff` (Unix milliseconds)
    pub fn is_stale(&self, cutoff: i64) -> bool {
        self.last_touched < cutoff
    }

    /// Whether no sync pass has confirmed this entity yet
    pub fn is_unconfirmed(&self) -> bool {
        self.last_touched == DISTANT_PAST
    }
}

/// Identity of an entity removed by a bulk delete
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, FromRow)]
pub struct DeletedFilm {
    pub id: String,
    pub natural_key: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> FilmRecord {
        FilmRecord {
            natural_key: "E832AF7F".to_string(),
            title: "180".to_string(),
            director: "Jayendra".to_string(),
            release_year: "2011".to_string(),
            location: "Epic Roasthouse (399 Embarcadero)".to_string(),
        }
    }

    #[test]
    fn test_placeholder_starts_in_distant_past() {
        let film = StoredFilm::placeholder("key-1");

        assert_eq!(film.natural_key, "key-1");
        assert_eq!(film.last_touched, DISTANT_PAST);
        assert!(film.is_unconfirmed());
        assert!(film.title.is_empty());
        assert!(Uuid::parse_str(&film.id).is_ok());
    }

    #[test]
    fn test_from_record_populates_all_fields() {
        let film = StoredFilm::from_record(&record());

        assert_eq!(film.natural_key, "E832AF7F");
        assert_eq!(film.title, "180");
        assert_eq!(film.director, "Jayendra");
        assert_eq!(film.release_year, "2011");
        assert_eq!(film.location, "Epic Roasthouse (399 Embarcadero)");
        assert_eq!(film.last_touched, DISTANT_PAST);
    }

    #[test]
    fn test_placeholders_get_distinct_ids() {
        let a = StoredFilm::placeholder("same");
        let b = StoredFilm::placeholder("same");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_is_stale() {
        let mut film = StoredFilm::from_record(&record());
        film.last_touched = 1_000;

        assert!(film.is_stale(1_001));
        assert!(!film.is_stale(1_000));
        assert!(!film.is_stale(999));
        assert!(!film.is_unconfirmed());
    }
}
