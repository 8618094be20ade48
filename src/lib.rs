//! Nova crawler: the crawl orchestration engine behind the Nova search index
//!
//! This crate discovers pages from seed URLs and sitemaps, fetches them under
//! robots.txt and per-domain politeness constraints, and hands extracted
//! content to an indexing sink.

pub mod config;
pub mod crawler;
pub mod prioritizer;
pub mod robots;
pub mod sitemap;
pub mod state;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for crawler operations
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Sitemap error: {0}")]
    Sitemap(#[from] sitemap::SitemapError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StoreError),

    #[error("Setup of crawl job {job_id} failed: {message}")]
    Setup { job_id: uuid::Uuid, message: String },

    #[error("Crawl job not found: {0}")]
    JobNotFound(uuid::Uuid),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,
}

/// Classified failure of a single HTTP fetch
///
/// Transient failures (timeouts, connection errors, 5xx) may succeed on a
/// later crawl; permanent failures (4xx, unsupported content, oversize
/// bodies) will not.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("Transient failure fetching {url}: {reason}")]
    Transient { url: String, reason: String },

    #[error("Permanent failure fetching {url}: {reason}")]
    Permanent { url: String, reason: String },
}

const TIMEOUT_REASON: &str = "Request timeout";

impl FetchError {
    pub fn transient(url: &str, reason: impl Into<String>) -> Self {
        Self::Transient {
            url: url.to_string(),
            reason: reason.into(),
        }
    }

    pub fn permanent(url: &str, reason: impl Into<String>) -> Self {
        Self::Permanent {
            url: url.to_string(),
            reason: reason.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// True if the request gave up waiting for the server
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Transient { reason, .. } if reason == TIMEOUT_REASON)
    }

    /// Classifies a reqwest error
    pub fn from_reqwest(url: &str, error: &reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::transient(url, TIMEOUT_REASON)
        } else if error.is_connect() {
            Self::transient(url, "Connection failed")
        } else if error.is_redirect() {
            Self::permanent(url, "Too many redirects")
        } else if let Some(status) = error.status() {
            if status.is_server_error() {
                Self::transient(url, format!("HTTP {}", status.as_u16()))
            } else {
                Self::permanent(url, format!("HTTP {}", status.as_u16()))
            }
        } else {
            Self::transient(url, error.to_string())
        }
    }
}

/// Result type alias for crawler operations
pub type Result<T> = std::result::Result<T, CrawlError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{CrawlManager, JobId};
pub use state::{JobState, JobStatus};
pub use url::{domain_key, normalize_url};
