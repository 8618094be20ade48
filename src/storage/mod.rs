//! Storage module for the crawler's external collaborators
//!
//! This module defines the indexing sink and recrawl source interfaces the
//! crawler talks to, plus a SQLite implementation of both:
//! - Page persistence (metadata, text, raw HTML, outgoing links)
//! - The per-domain recrawl schedule

mod schema;
mod sqlite;
mod traits;

pub use sqlite::{SqliteStore, StoredPage};
pub use traits::{IndexSink, IndexedPage, RecrawlSource, StoreError, StoreResult};

use std::path::Path;
use std::time::Duration;

/// Opens the SQLite store at `path`
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
/// * `default_interval` - Recrawl interval for newly seen domains
pub fn open_store(path: &Path, default_interval: Duration) -> StoreResult<SqliteStore> {
    SqliteStore::open(path, default_interval)
}
