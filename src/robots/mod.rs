//! Robots.txt handling module
//!
//! This module fetches, parses, and caches robots.txt files. The crawler
//! consults the cache before every page fetch and reads `Crawl-delay` and
//! `Sitemap` directives from it.

mod cache;
mod parser;

pub use cache::{RobotsCache, RobotsRecord};
pub use parser::ParsedRobots;
