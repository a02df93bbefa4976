//! Workspace placeholder crate.
//!
//! This crate exposes the feature flags that map to the individual workspace
//! crates. Host applications can depend on `film-sync-workspace`, enable
//! `desktop-shims`, and reach the service façade without wiring each crate
//! individually.

#[cfg(feature = "desktop-shims")]
pub use core_service::{CoreError, FilmService};
