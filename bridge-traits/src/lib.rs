//! # Host Bridge Traits
//!
//! Capability traits the sync core needs from its host.
//!
//! ## Overview
//!
//! The core never reaches for ambient state. Everything it needs from the
//! outside world is injected through one of these traits:
//!
//! - [`HttpClient`](http::HttpClient) - fetches the raw film feed
//! - [`Clock`](time::Clock) - source of "now" for freshness markers and staleness cutoffs
//! - [`LoggerSink`](time::LoggerSink) - forwards structured logs to host logging
//!
//! ## Platform Implementations
//!
//! | Platform | Implementation Crate |
//! |----------|---------------------|
//! | Desktop  | `bridge-desktop`    |
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations
//! convert platform-specific failures into it with an actionable message.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so a handle can be shared across
//! async tasks behind an `Arc`.

pub mod error;
pub mod http;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
pub use time::{Clock, ConsoleLogger, LogEntry, LogLevel, LoggerSink, ManualClock, SystemClock};
