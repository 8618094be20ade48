use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for the crawler
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(default, rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    #[serde(default)]
    pub robots: RobotsConfig,
    #[serde(default)]
    pub sitemap: SitemapConfig,
    #[serde(default)]
    pub prioritizer: PrioritizerConfig,
    #[serde(default)]
    pub recrawl: RecrawlConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    /// Seed URLs used when no seeds are given on the command line
    #[serde(default)]
    pub seeds: Vec<String>,
}

/// Crawl job behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CrawlerConfig {
    /// Number of concurrent workers per crawl job
    pub workers: usize,

    /// Maximum link depth from the seed URLs
    pub max_depth: u32,

    /// Maximum number of pages a single job may admit
    pub max_pages: u64,

    /// Minimum time between two fetches to the same domain (milliseconds)
    pub min_delay_ms: u64,

    /// Timeout for a single page fetch (seconds)
    pub fetch_timeout_secs: u64,

    /// Responses larger than this are rejected
    pub max_body_bytes: usize,

    /// Maximum number of redirects followed per request
    pub max_redirects: usize,
}

impl CrawlerConfig {
    pub fn min_delay(&self) -> Duration {
        Duration::from_millis(self.min_delay_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            max_depth: 3,
            max_pages: 1000,
            min_delay_ms: 1000,
            fetch_timeout_secs: 10,
            max_body_bytes: 5 * 1024 * 1024,
            max_redirects: 5,
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct UserAgentConfig {
    /// Name of the crawler, also the token matched against robots.txt groups
    pub crawler_name: String,

    /// Version of the crawler
    pub crawler_version: String,

    /// URL with information about the crawler
    pub contact_url: String,

    /// Optional email address for crawler-related contact
    pub contact_email: Option<String>,
}

impl UserAgentConfig {
    /// Formats the full user agent header value
    ///
    /// Format: `CrawlerName/Version (+ContactURL)` or
    /// `CrawlerName/Version (+ContactURL; ContactEmail)`
    pub fn header_value(&self) -> String {
        match &self.contact_email {
            Some(email) => format!(
                "{}/{} (+{}; {})",
                self.crawler_name, self.crawler_version, self.contact_url, email
            ),
            None => format!(
                "{}/{} (+{})",
                self.crawler_name, self.crawler_version, self.contact_url
            ),
        }
    }
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            crawler_name: "NovaSearchBot".to_string(),
            crawler_version: "1.0".to_string(),
            contact_url: "http://novasearch.com/bot".to_string(),
            contact_email: None,
        }
    }
}

/// Robots.txt cache configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RobotsConfig {
    /// How long a fetched robots.txt stays fresh (seconds)
    pub cache_ttl_secs: u64,

    /// How long to wait before retrying a failed robots.txt fetch (seconds)
    pub failure_cooldown_secs: u64,

    /// Upper bound on how long a compliance check waits for a refresh (seconds)
    pub fetch_timeout_secs: u64,
}

impl RobotsConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn failure_cooldown(&self) -> Duration {
        Duration::from_secs(self.failure_cooldown_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

impl Default for RobotsConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 3600,
            failure_cooldown_secs: 60,
            fetch_timeout_secs: 10,
        }
    }
}

/// Sitemap discovery configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SitemapConfig {
    /// Global rate limit across all sitemap fetches
    pub requests_per_second: u32,

    /// Maximum number of sitemap fetches in flight
    pub max_concurrency: usize,

    /// Maximum number of sitemap documents fetched per resolution pass
    pub max_sitemaps: usize,

    /// Timeout for a single sitemap fetch (seconds)
    pub fetch_timeout_secs: u64,

    /// Well-known sitemap paths tried when robots.txt declares none
    pub paths: Vec<String>,
}

impl SitemapConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

impl Default for SitemapConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 10,
            max_concurrency: 8,
            max_sitemaps: 500,
            fetch_timeout_secs: 30,
            paths: vec!["/sitemap.xml".to_string()],
        }
    }
}

/// URL prioritization configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct PrioritizerConfig {
    /// How long a computed score stays cached (seconds)
    pub cache_ttl_secs: u64,

    /// Path patterns that raise a URL's score
    pub patterns: Vec<PatternEntry>,
}

impl PrioritizerConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

impl Default for PrioritizerConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 3600,
            patterns: vec![
                PatternEntry::new("/article/", 0.8),
                PatternEntry::new("/blog/", 0.7),
                PatternEntry::new("/news/", 0.9),
                PatternEntry::new("/product/", 0.6),
            ],
        }
    }
}

/// A path pattern (regular expression) and the score it grants
#[derive(Debug, Clone, Deserialize)]
pub struct PatternEntry {
    pub pattern: String,
    pub weight: f64,
}

impl PatternEntry {
    pub fn new(pattern: &str, weight: f64) -> Self {
        Self {
            pattern: pattern.to_string(),
            weight,
        }
    }
}

/// Periodic recrawl configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RecrawlConfig {
    /// How often the scheduler asks for domains due for recrawl (seconds)
    pub check_interval_secs: u64,

    /// Recrawl interval assigned to newly seen domains (seconds)
    pub default_interval_secs: u64,
}

impl RecrawlConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }
}

impl Default for RecrawlConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: 3600,
            default_interval_secs: 86400,
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct StorageConfig {
    /// Path to the SQLite database file
    pub database_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: "./nova-crawl.db".to_string(),
        }
    }
}
