//! URL handling module
//!
//! This module provides URL normalization (the dedup key of the visited set),
//! per-domain keys for robots.txt and politeness state, and the link filters
//! applied during extraction.

mod domain;
mod filters;
mod normalize;

// Re-export main functions
pub use domain::{domain_key, extract_domain, origin_of};
pub use filters::{is_binary_asset, is_sitemap_url, path_segment_count};
pub use normalize::{normalize_url, normalized_key};
