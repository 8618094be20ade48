//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building HTTP clients with proper user agent strings and redirect bounds
//! - GET requests with per-request timeouts and a response size cap
//! - Content-Type checks before parsing
//! - Error classification into transient and permanent failures
//!
//! The same client serves page fetches, robots.txt fetches and sitemap
//! fetches; each caller passes its own timeout.

use crate::config::{CrawlerConfig, UserAgentConfig};
use crate::crawler::parser::{parse_html, PageMetadata};
use crate::FetchError;
use reqwest::{header, redirect::Policy, Client, Response};
use std::time::Duration;
use url::Url;

/// Result of a successful page fetch
#[derive(Debug, Clone)]
pub struct FetchResult {
    /// HTTP status code
    pub status: u16,

    /// Final URL after redirects
    pub final_url: Url,

    /// Page body content
    pub body: String,

    /// Outgoing links, resolved against the final URL
    pub links: Vec<Url>,

    /// Extracted page metadata
    pub metadata: PageMetadata,
}

/// A raw HTTP response body, read under the size cap
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub final_url: Url,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `user_agent` - The user agent configuration
/// * `crawler` - Crawler settings (redirect bound, connect timeout)
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
///
/// # Example
///
/// ```no_run
/// use nova_crawler::config::{CrawlerConfig, UserAgentConfig};
/// use nova_crawler::crawler::build_http_client;
///
/// let client = build_http_client(&UserAgentConfig::default(), &CrawlerConfig::default()).unwrap();
/// ```
pub fn build_http_client(
    user_agent: &UserAgentConfig,
    crawler: &CrawlerConfig,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent.header_value())
        .connect_timeout(crawler.fetch_timeout())
        .redirect(Policy::limited(crawler.max_redirects))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Performs bounded GET requests on behalf of every crawler component
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    page_timeout: Duration,
    max_body_bytes: usize,
}

impl HttpFetcher {
    pub fn new(client: Client, page_timeout: Duration, max_body_bytes: usize) -> Self {
        Self {
            client,
            page_timeout,
            max_body_bytes,
        }
    }

    /// Creates a fetcher from the crawler configuration
    pub fn from_config(client: Client, config: &CrawlerConfig) -> Self {
        Self::new(client, config.fetch_timeout(), config.max_body_bytes)
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Sends a GET request and reads the body under the size cap
    ///
    /// Any non-2xx status is returned as an error, classified as transient
    /// for 5xx and 429, permanent otherwise.
    pub async fn get(&self, url: &Url, timeout: Duration) -> Result<RawResponse, FetchError> {
        let response = self
            .client
            .get(url.clone())
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(url.as_str(), &e))?;

        let status = response.status();
        if !status.is_success() {
            let reason = format!("HTTP {}", status.as_u16());
            return Err(
                if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                    FetchError::transient(url.as_str(), reason)
                } else {
                    FetchError::permanent(url.as_str(), reason)
                },
            );
        }

        let final_url = response.url().clone();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());

        let body = self.read_body(url, response).await?;

        Ok(RawResponse {
            status: status.as_u16(),
            final_url,
            content_type,
            body,
        })
    }

    /// Reads a response body chunk by chunk, rejecting oversized bodies
    async fn read_body(&self, url: &Url, mut response: Response) -> Result<Vec<u8>, FetchError> {
        if let Some(length) = response.content_length() {
            if length > self.max_body_bytes as u64 {
                return Err(FetchError::permanent(
                    url.as_str(),
                    format!("Response of {} bytes exceeds limit", length),
                ));
            }
        }

        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| FetchError::from_reqwest(url.as_str(), &e))?
        {
            if body.len() + chunk.len() > self.max_body_bytes {
                return Err(FetchError::permanent(
                    url.as_str(),
                    format!("Response exceeds {} bytes", self.max_body_bytes),
                ));
            }
            body.extend_from_slice(&chunk);
        }

        Ok(body)
    }

    /// Fetches an HTML page and extracts its links and metadata
    ///
    /// # Request Flow
    ///
    /// 1. GET with the page timeout (redirects followed by the client)
    /// 2. Reject non-2xx statuses and non-HTML content types
    /// 3. Parse the document relative to the final URL
    ///
    /// # Error Classification
    ///
    /// | Condition | Result |
    /// |-----------|--------|
    /// | Timeout / connection failure | Transient |
    /// | HTTP 5xx, 429 | Transient |
    /// | HTTP 4xx | Permanent |
    /// | Too many redirects | Permanent |
    /// | Not HTML | Permanent |
    /// | Body over size cap | Permanent |
    pub async fn fetch_page(&self, url: &Url) -> Result<FetchResult, FetchError> {
        let raw = self.get(url, self.page_timeout).await?;

        if let Some(content_type) = &raw.content_type {
            if !is_html_content_type(content_type) {
                return Err(FetchError::permanent(
                    url.as_str(),
                    format!("Unsupported content type: {}", content_type),
                ));
            }
        }

        let body = String::from_utf8_lossy(&raw.body).into_owned();
        let parsed = parse_html(&body, &raw.final_url);

        Ok(FetchResult {
            status: raw.status,
            final_url: raw.final_url,
            body,
            links: parsed.links,
            metadata: parsed.metadata,
        })
    }
}

fn is_html_content_type(content_type: &str) -> bool {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    mime == "text/html" || mime == "application/xhtml+xml"
}
