//! Sitemap discovery module
//!
//! Resolves seed URLs into the set of page URLs their sitemaps list,
//! following sitemap indexes recursively under a global rate limit.

mod parser;
mod resolver;

pub use parser::{decode_body, parse_sitemap, SitemapDocument};
pub use resolver::{SitemapResolution, SitemapResolver};

use crate::FetchError;
use thiserror::Error;

/// Errors raised while fetching or parsing sitemaps
#[derive(Debug, Error)]
pub enum SitemapError {
    #[error("Sitemap fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Malformed sitemap XML: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("Not a sitemap document: {0}")]
    NotSitemap(String),

    #[error("Failed to decompress sitemap: {0}")]
    Decompress(#[from] std::io::Error),

    #[error("Decompressed sitemap exceeds {0} bytes")]
    TooLarge(usize),

    #[error("Every seed failed to resolve")]
    AllSeedsFailed,
}
