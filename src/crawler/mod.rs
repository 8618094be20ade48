//! Crawler module for job orchestration, fetching and page processing
//!
//! This module contains the core crawling logic, including:
//! - HTTP fetching with body limits and error classification
//! - HTML parsing, metadata and link extraction
//! - The per-job frontier and the per-domain politeness throttle
//! - Worker pools and the job manager driving them

mod fetcher;
mod frontier;
mod manager;
mod parser;
mod throttle;
mod worker;

pub use fetcher::{build_http_client, FetchResult, HttpFetcher, RawResponse};
pub use frontier::{CrawlTask, Frontier};
pub use manager::{CrawlManager, JobId};
pub use parser::{parse_html, PageMetadata, ParsedPage};
pub use throttle::{DomainPermit, DomainThrottle};
