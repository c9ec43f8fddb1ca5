//! Local persistence for location history.
//!
//! This crate provides SQLite-based storage for location fixes: an
//! append-only table of `(latitude, longitude, captured_at_millis)` rows
//! with store-assigned ids.
//!
//! # Features
//!
//! - Atomic batch inserts (all of a batch or none of it)
//! - Calendar-day queries in any time zone, newest first
//! - Half-open range queries with pagination
//! - CSV export
//!
//! # Example
//!
//! ```no_run
//! use lochist_store::Store;
//! use lochist_types::CandidateRecord;
//!
//! let store = Store::open_default()?;
//! store.insert_batch(&[CandidateRecord::new(35.0116, 135.768, 1_714_550_400_000)?])?;
//!
//! for record in store.select_day(2024, 5, 1)? {
//!     println!("{record}");
//! }
//! # Ok::<(), lochist_store::Error>(())
//! ```

mod day;
mod error;
mod models;
mod queries;
mod schema;
mod store;

pub use day::day_bounds;
pub use error::{Error, Result};
pub use models::StoreStats;
pub use queries::LocationQuery;
pub use schema::SCHEMA_VERSION;
pub use store::Store;

/// Default database path following platform conventions.
///
/// - Linux: `~/.local/share/lochist/locations.db`
/// - macOS: `~/Library/Application Support/lochist/locations.db`
/// - Windows: `C:\Users\<user>\AppData\Local\lochist\locations.db`
pub fn default_db_path() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("lochist")
        .join("locations.db")
}
