//! # Film Library Module
//!
//! Owns the local film store that list and map views read from, and the
//! write-side abstractions the sync engine reconciles into.
//!
//! ## Overview
//!
//! This module manages:
//! - SQLite connection pool and schema migrations (`db`)
//! - Domain models for decoded and persisted films (`models`)
//! - The abstract store contract and its predicates (`store`)
//! - Scoped, per-batch write contexts with a bounded working set (`context`)
//! - The SQLite store adapter (`adapters`)
//! - Read-side queries for downstream consumers (`repositories`)

pub mod adapters;
pub mod context;
pub mod db;
pub mod error;
pub mod models;
pub mod repositories;
pub mod store;

pub use adapters::SqliteFilmStore;
pub use context::WriteContext;
pub use db::{create_pool, create_test_pool, DatabaseConfig};
pub use error::{LibraryError, Result};
pub use models::{DeletedFilm, FilmRecord, StoredFilm, DISTANT_PAST};
pub use repositories::{FilmRepository, FilmSort, SqliteFilmRepository};
pub use store::{ChangeSet, FilmPredicate, FilmStore, Touch};
