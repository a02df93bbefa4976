//! # Row Decoder
//!
//! Maps one positional feed row into a [`FilmRecord`].
//!
//! Feed rows are loosely typed JSON arrays. Field positions live in
//! [`FilmColumns`] and raw indices never leave this module.

use core_library::FilmRecord;
use serde_json::Value;

use crate::error::DecodeError;

/// One row of the feed, as delivered
pub type RawRow = Vec<Value>;

/// Positions of the fields the sync engine reads
pub struct FilmColumns;

impl FilmColumns {
    pub const NATURAL_KEY: usize = 1;
    pub const TITLE: usize = 8;
    pub const RELEASE_YEAR: usize = 9;
    pub const LOCATION: usize = 10;
    pub const DIRECTOR: usize = 14;
}

/// The row's natural key, if present and a string
pub fn natural_key(row: &[Value]) -> Option<&str> {
    row.get(FilmColumns::NATURAL_KEY)?.as_str()
}

/// Decode a full row
///
/// Returns `Ok(None)` when the natural key is absent or not a string; such
/// rows are skipped, not rejected.
pub fn decode(row: &[Value]) -> Result<Option<FilmRecord>, DecodeError> {
    match natural_key(row) {
        Some(key) => decode_fields(key, row).map(Some),
        None => Ok(None),
    }
}

/// Decode the non-key fields of a row whose natural key is already known
pub fn decode_fields(natural_key: &str, row: &[Value]) -> Result<FilmRecord, DecodeError> {
    let field = |index: usize, name: &'static str| -> Result<String, DecodeError> {
        row.get(index)
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| DecodeError::IllFormattedInput {
                natural_key: natural_key.to_owned(),
                field: name,
            })
    };

    Ok(FilmRecord {
        natural_key: natural_key.to_owned(),
        title: field(FilmColumns::TITLE, "title")?,
        director: field(FilmColumns::DIRECTOR, "director")?,
        release_year: field(FilmColumns::RELEASE_YEAR, "release_year")?,
        location: field(FilmColumns::LOCATION, "location")?,
    })
}
