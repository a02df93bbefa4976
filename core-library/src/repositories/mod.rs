//! # Read-side Repositories
//!
//! Queries used by list and map views. Writes go through
//! [`WriteContext`](crate::context::WriteContext) instead.

pub mod film;

pub use film::{FilmRepository, FilmSort, SqliteFilmRepository};
