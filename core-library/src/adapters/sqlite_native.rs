//! SQLite Film Store
//!
//! Implements [`FilmStore`] on top of a `sqlx` SQLite pool. Batch commits and
//! bulk deletes each run in their own transaction.

use async_trait::async_trait;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::{debug, instrument, warn};

use crate::error::{LibraryError, Result};
use crate::models::{DeletedFilm, StoredFilm};
use crate::store::{ChangeSet, FilmPredicate, FilmStore};

const FILM_COLUMNS: &str = "id, natural_key, title, director, release_year, location, last_touched";

/// SQLite implementation of [`FilmStore`]
#[derive(Clone)]
pub struct SqliteFilmStore {
    pool: SqlitePool,
}

impl SqliteFilmStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn push_predicate(builder: &mut QueryBuilder<'_, Sqlite>, predicate: &FilmPredicate) {
        match predicate {
            FilmPredicate::NaturalKey(key) => {
                builder.push(" WHERE natural_key = ").push_bind(key.clone());
            }
            FilmPredicate::TouchedBefore(cutoff) => {
                builder.push(" WHERE last_touched < ").push_bind(*cutoff);
            }
            FilmPredicate::All => {}
        }
    }

    fn map_insert_error(e: sqlx::Error, film: &StoredFilm) -> LibraryError {
        let unique = e
            .as_database_error()
            .map(|db| db.is_unique_violation())
            .unwrap_or(false);

        if unique {
            LibraryError::DuplicateNaturalKey {
                natural_key: film.natural_key.clone(),
            }
        } else {
            LibraryError::Database(e)
        }
    }
}

#[async_trait]
impl FilmStore for SqliteFilmStore {
    async fn fetch(
        &self,
        predicate: &FilmPredicate,
        limit: Option<u32>,
    ) -> Result<Vec<StoredFilm>> {
        let mut builder = QueryBuilder::<Sqlite>::new(format!("SELECT {FILM_COLUMNS} FROM films"));
        Self::push_predicate(&mut builder, predicate);
        if let Some(limit) = limit {
            builder.push(" LIMIT ").push_bind(i64::from(limit));
        }

        let films = builder
            .build_query_as::<StoredFilm>()
            .fetch_all(&self.pool)
            .await?;

        Ok(films)
    }

    #[instrument(skip(self, changes), fields(inserted = changes.inserted.len(), touched = changes.touched.len()))]
    async fn apply(&self, changes: &ChangeSet) -> Result<()> {
        if changes.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;

        for film in &changes.inserted {
            sqlx::query(
                r#"
                INSERT INTO films (
                    id, natural_key, title, director, release_year, location, last_touched
                ) VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&film.id)
            .bind(&film.natural_key)
            .bind(&film.title)
            .bind(&film.director)
            .bind(&film.release_year)
            .bind(&film.location)
            .bind(film.last_touched)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                warn!(natural_key = %film.natural_key, error = %e, "Insert failed, rolling back");
                Self::map_insert_error(e, film)
            })?;
        }

        for touch in &changes.touched {
            sqlx::query("UPDATE films SET last_touched = ? WHERE id = ?")
                .bind(touch.last_touched)
                .bind(&touch.id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        debug!("Change set committed");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_where(&self, predicate: &FilmPredicate) -> Result<Vec<DeletedFilm>> {
        let mut tx = self.pool.begin().await?;

        let mut builder = QueryBuilder::<Sqlite>::new("DELETE FROM films");
        Self::push_predicate(&mut builder, predicate);
        builder.push(" RETURNING id, natural_key");

        let deleted = builder
            .build_query_as::<DeletedFilm>()
            .fetch_all(&mut *tx)
            .await?;

        tx.commit().await?;
        debug!(count = deleted.len(), "Bulk delete committed");
        Ok(deleted)
    }
}
