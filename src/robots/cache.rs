//! Robots.txt caching implementation
//!
//! Records are kept per domain key (host plus non-default port) and refreshed
//! lazily once their TTL has passed. Refreshes are single-flight: callers for
//! the same domain queue on a per-domain lock and reuse whatever the first
//! caller stored. Failed fetches are never cached as success; they only start
//! a cooldown after which the next check tries again.

use crate::config::RobotsConfig;
use crate::crawler::HttpFetcher;
use crate::robots::ParsedRobots;
use crate::url::{domain_key, origin_of};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use url::Url;

/// Upper bound applied to `Crawl-delay` directives
const MAX_CRAWL_DELAY: Duration = Duration::from_secs(120);

/// Cached robots.txt data for a domain
#[derive(Debug, Clone)]
pub struct RobotsRecord {
    /// Domain key the record belongs to
    pub domain: String,

    /// The parsed robots.txt content
    pub rules: ParsedRobots,

    /// When the robots.txt was fetched
    pub fetched_at: DateTime<Utc>,

    /// How long the record stays fresh
    pub ttl: Duration,
}

impl RobotsRecord {
    /// Creates a record stamped with the current time
    pub fn new(domain: &str, rules: ParsedRobots, ttl: Duration) -> Self {
        Self {
            domain: domain.to_string(),
            rules,
            fetched_at: Utc::now(),
            ttl,
        }
    }

    /// Returns the age of the record
    pub fn age(&self) -> chrono::Duration {
        Utc::now() - self.fetched_at
    }

    /// Checks if the record is older than its TTL
    pub fn is_stale(&self) -> bool {
        match self.age().to_std() {
            Ok(age) => age > self.ttl,
            // fetched_at in the future
            Err(_) => false,
        }
    }
}

/// Shared robots.txt cache with single-flight refresh per domain
#[derive(Debug)]
pub struct RobotsCache {
    fetcher: HttpFetcher,
    user_agent: String,
    ttl: Duration,
    failure_cooldown: Duration,
    fetch_timeout: Duration,
    records: RwLock<HashMap<String, RobotsRecord>>,
    failures: Mutex<HashMap<String, Instant>>,
    refreshes: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl RobotsCache {
    /// Creates an empty cache
    ///
    /// # Arguments
    ///
    /// * `fetcher` - HTTP fetcher used for robots.txt requests
    /// * `user_agent` - Product token matched against `User-agent` groups
    /// * `config` - TTL, failure cooldown and fetch timeout
    pub fn new(fetcher: HttpFetcher, user_agent: &str, config: &RobotsConfig) -> Self {
        Self {
            fetcher,
            user_agent: user_agent.to_string(),
            ttl: config.cache_ttl(),
            failure_cooldown: config.failure_cooldown(),
            fetch_timeout: config.fetch_timeout(),
            records: RwLock::new(HashMap::new()),
            failures: Mutex::new(HashMap::new()),
            refreshes: Mutex::new(HashMap::new()),
        }
    }

    /// Checks whether the crawler may fetch a URL
    ///
    /// Missing or stale records are refreshed first. When robots.txt cannot
    /// be obtained (error, non-200, timeout) the URL is allowed.
    pub async fn can_fetch(&self, url: &Url) -> bool {
        let key = match domain_key(url) {
            Some(key) => key,
            None => return true,
        };

        if let Some(allowed) = self.check_cached(&key, url) {
            return allowed;
        }

        self.ensure_fresh(&key, url).await;

        self.check_cached(&key, url).unwrap_or(true)
    }

    /// Returns the `Crawl-delay` for the URL's domain, if a record is cached
    ///
    /// Never triggers a fetch; the worker calls this right after `can_fetch`.
    pub fn crawl_delay(&self, url: &Url) -> Option<Duration> {
        let key = domain_key(url)?;
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        let seconds = records.get(&key)?.rules.crawl_delay(&self.user_agent)?;

        Duration::try_from_secs_f64(seconds)
            .ok()
            .map(|delay| delay.min(MAX_CRAWL_DELAY))
    }

    /// Returns the `Sitemap:` entries declared by the URL's domain
    pub async fn sitemaps(&self, url: &Url) -> Vec<String> {
        let key = match domain_key(url) {
            Some(key) => key,
            None => return Vec::new(),
        };

        if !self.has_fresh_record(&key) {
            self.ensure_fresh(&key, url).await;
        }

        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        records
            .get(&key)
            .map(|record| record.rules.sitemaps().to_vec())
            .unwrap_or_default()
    }

    /// Stores a record directly, replacing any existing one for its domain
    pub fn insert(&self, record: RobotsRecord) {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        records.insert(record.domain.clone(), record);
    }

    /// Returns true if a record (fresh or stale) is cached for the domain key
    pub fn is_cached(&self, domain: &str) -> bool {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        records.contains_key(domain)
    }

    /// Evaluates a URL against a fresh cached record
    fn check_cached(&self, key: &str, url: &Url) -> Option<bool> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        let record = records.get(key).filter(|record| !record.is_stale())?;
        Some(record.rules.is_allowed(url.as_str(), &self.user_agent))
    }

    fn has_fresh_record(&self, key: &str) -> bool {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        records.get(key).map(|r| !r.is_stale()).unwrap_or(false)
    }

    fn in_cooldown(&self, key: &str) -> bool {
        let failures = self.failures.lock().unwrap_or_else(PoisonError::into_inner);
        failures
            .get(key)
            .map(|failed_at| failed_at.elapsed() < self.failure_cooldown)
            .unwrap_or(false)
    }

    fn record_failure(&self, key: &str) {
        let mut failures = self.failures.lock().unwrap_or_else(PoisonError::into_inner);
        failures.retain(|_, failed_at| failed_at.elapsed() < self.failure_cooldown);
        failures.insert(key.to_string(), Instant::now());
    }

    fn refresh_lock(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut refreshes = self.refreshes.lock().unwrap_or_else(PoisonError::into_inner);
        // Locks nobody holds or waits on can go; the map keeps the only reference
        refreshes.retain(|_, lock| Arc::strong_count(lock) > 1);
        refreshes
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Refreshes the domain's record, waiting at most the fetch timeout
    async fn ensure_fresh(&self, key: &str, url: &Url) {
        if tokio::time::timeout(self.fetch_timeout, self.refresh(key, url))
            .await
            .is_err()
        {
            debug!("robots.txt refresh for {} timed out, allowing", key);
        }
    }

    async fn refresh(&self, key: &str, url: &Url) {
        let lock = self.refresh_lock(key);
        let _guard = lock.lock().await;

        // Another caller may have finished the refresh while we waited
        if self.has_fresh_record(key) || self.in_cooldown(key) {
            return;
        }

        let robots_url = match origin_of(url).and_then(|origin| {
            Url::parse(&format!("{}/robots.txt", origin)).ok()
        }) {
            Some(robots_url) => robots_url,
            None => return,
        };

        debug!("Fetching {}", robots_url);

        match self.fetcher.get(&robots_url, self.fetch_timeout).await {
            Ok(response) if response.status == 200 => {
                let content = String::from_utf8_lossy(&response.body);
                let rules = ParsedRobots::from_content(&content);
                self.insert(RobotsRecord::new(key, rules, self.ttl));

                let mut failures = self.failures.lock().unwrap_or_else(PoisonError::into_inner);
                failures.remove(key);
            }
            Ok(response) => {
                debug!(
                    "robots.txt for {} returned HTTP {}, allowing",
                    key, response.status
                );
                self.record_failure(key);
            }
            Err(e) if e.is_timeout() => {
                debug!("robots.txt fetch for {} timed out, allowing", key);
            }
            Err(e) => {
                warn!("robots.txt unavailable for {}: {}", key, e);
                self.record_failure(key);
            }
        }
    }
}
