//! Collaborator traits and error types
//!
//! The crawler writes pages through [`IndexSink`] and asks [`RecrawlSource`]
//! which domains are due for another crawl. Both are async traits so that
//! network-backed implementations can sit behind them.

use crate::crawler::PageMetadata;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use url::Url;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StoreResult<T> = Result<T, StoreError>;

/// A fetched page handed to the indexing pipeline
#[derive(Debug, Clone)]
pub struct IndexedPage {
    /// Final URL after redirects
    pub url: Url,

    pub fetched_at: DateTime<Utc>,

    /// Undecoded HTML as served
    pub raw_content: String,

    pub extracted_links: Vec<Url>,

    pub metadata: PageMetadata,
}

/// Receives crawled pages
///
/// Errors are logged by the worker and never fail the crawl.
#[async_trait]
pub trait IndexSink: Send + Sync {
    async fn index_page(&self, page: IndexedPage) -> StoreResult<()>;
}

/// Tracks when domains should be crawled again
#[async_trait]
pub trait RecrawlSource: Send + Sync {
    /// Domains whose next crawl time has passed
    async fn domains_due_for_recrawl(&self) -> StoreResult<Vec<String>>;

    /// Records that a crawl of `domain` finished at `at`
    async fn record_crawl_completed(&self, domain: &str, at: DateTime<Utc>) -> StoreResult<()>;
}
