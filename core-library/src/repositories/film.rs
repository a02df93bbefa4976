//! Film repository trait and implementation

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::{query_as, SqlitePool};

use crate::error::Result;
use crate::models::StoredFilm;

/// Sort order for film listings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilmSort {
    #[default]
    Title,
    Director,
    Location,
}

impl FilmSort {
    fn order_by(&self) -> &'static str {
        match self {
            FilmSort::Title => "title COLLATE NOCASE, natural_key",
            FilmSort::Director => "director COLLATE NOCASE, title COLLATE NOCASE, natural_key",
            FilmSort::Location => "location COLLATE NOCASE, title COLLATE NOCASE, natural_key",
        }
    }
}

/// Read-side access to stored films
#[async_trait]
pub trait FilmRepository: Send + Sync {
    /// Find a film by the feed's row identifier
    ///
    /// # Returns
    /// - `Ok(Some(film))` if found
    /// - `Ok(None)` if not found
    async fn find_by_natural_key(&self, natural_key: &str) -> Result<Option<StoredFilm>>;

    /// List every stored film in the given order
    async fn list(&self, sort: FilmSort) -> Result<Vec<StoredFilm>>;

    /// Count stored films
    async fn count(&self) -> Result<i64>;
}

/// SQLite implementation of FilmRepository
pub struct SqliteFilmRepository {
    pool: SqlitePool,
}

impl SqliteFilmRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FilmRepository for SqliteFilmRepository {
    async fn find_by_natural_key(&self, natural_key: &str) -> Result<Option<StoredFilm>> {
        let film = query_as::<_, StoredFilm>("SELECT * FROM films WHERE natural_key = ?")
            .bind(natural_key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(film)
    }

    async fn list(&self, sort: FilmSort) -> Result<Vec<StoredFilm>> {
        let sql = format!("SELECT * FROM films ORDER BY {}", sort.order_by());
        let films = query_as::<_, StoredFilm>(&sql)
            .fetch_all(&self.pool)
            .await?;

        Ok(films)
    }

    async fn count(&self) -> Result<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM films")
            .fetch_one(&self.pool)
            .await?;

        Ok(count.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::SqliteFilmStore;
    use crate::db::create_test_pool;
    use crate::store::{ChangeSet, FilmStore};

    fn film(key: &str, title: &str, director: &str, location: &str) -> StoredFilm {
        let mut film = StoredFilm::placeholder(key);
        film.title = title.to_string();
        film.director = director.to_string();
        film.release_year = "2011".to_string();
        film.location = location.to_string();
        film.last_touched = 0;
        film
    }

    async fn seeded() -> SqliteFilmRepository {
        let pool = create_test_pool().await.unwrap();
        SqliteFilmStore::new(pool.clone())
            .apply(&ChangeSet {
                inserted: vec![
                    film("k1", "Vertigo", "Hitchcock", "Fort Point"),
                    film("k2", "180", "Jayendra", "Epic Roasthouse"),
                    film("k3", "Bullitt", "Yates", "Alcatraz"),
                ],
                touched: vec![],
            })
            .await
            .unwrap();
        SqliteFilmRepository::new(pool)
    }

    #[tokio::test]
    async fn test_find_by_natural_key() {
        let repo = seeded().await;

        let found = repo.find_by_natural_key("k1").await.unwrap();
        assert_eq!(found.map(|f| f.title), Some("Vertigo".to_string()));
        assert!(repo.find_by_natural_key("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_sorted() {
        let repo = seeded().await;

        let titles: Vec<_> = repo
            .list(FilmSort::Title)
            .await
            .unwrap()
            .into_iter()
            .map(|f| f.title)
            .collect();
        assert_eq!(titles, vec!["180", "Bullitt", "Vertigo"]);

        let directors: Vec<_> = repo
            .list(FilmSort::Director)
            .await
            .unwrap()
            .into_iter()
            .map(|f| f.director)
            .collect();
        assert_eq!(directors, vec!["Hitchcock", "Jayendra", "Yates"]);

        let locations: Vec<_> = repo
            .list(FilmSort::Location)
            .await
            .unwrap()
            .into_iter()
            .map(|f| f.location)
            .collect();
        assert_eq!(locations, vec!["Alcatraz", "Epic Roasthouse", "Fort Point"]);
    }

    #[tokio::test]
    async fn test_count() {
        let repo = seeded().await;
        assert_eq!(repo.count().await.unwrap(), 3);
    }
}
