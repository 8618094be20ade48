use crate::config::SitemapConfig;
use crate::crawler::HttpFetcher;
use crate::robots::RobotsCache;
use crate::sitemap::{decode_body, parse_sitemap, SitemapDocument, SitemapError};
use crate::url::{is_sitemap_url, normalize_url, origin_of};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use url::Url;

/// Spaces sitemap requests evenly across all concurrent resolutions
#[derive(Debug)]
struct RateLimiter {
    interval: Duration,
    next_slot: Mutex<Instant>,
}

impl RateLimiter {
    fn new(requests_per_second: u32) -> Self {
        let interval = Duration::from_secs(1) / requests_per_second.max(1);
        Self {
            interval,
            next_slot: Mutex::new(Instant::now()),
        }
    }

    /// Reserves the next free slot and sleeps until it arrives
    async fn acquire(&self) {
        let slot = {
            let mut next_slot = self.next_slot.lock().unwrap_or_else(PoisonError::into_inner);
            let slot = (*next_slot).max(Instant::now());
            *next_slot = slot + self.interval;
            slot
        };

        tokio::time::sleep_until(slot).await;
    }
}

/// A sitemap waiting to be fetched
#[derive(Debug, Clone)]
struct SitemapTask {
    url: Url,
    /// Index of the seed this sitemap was discovered from
    seed: usize,
    /// True for the seed's own candidate locations, false for index children
    top_level: bool,
}

/// Outcome of fetching one sitemap
struct SitemapOutcome {
    task: SitemapTask,
    result: Result<SitemapDocument, SitemapError>,
}

/// Outcome of one resolution pass
#[derive(Debug, Default)]
pub struct SitemapResolution {
    /// Normalized page URLs listed by the resolved sitemaps
    pub pages: HashSet<Url>,

    /// Seeds that looked like sitemaps but turned out to be other documents
    pub page_seeds: Vec<Url>,

    /// True when no seed produced a usable sitemap
    pub all_failed: bool,
}

/// Expands seed URLs into the page URLs their sitemaps list
///
/// Holds clones of the shared HTTP client and robots cache, so it is cheap
/// to keep one per manager.
#[derive(Debug, Clone)]
pub struct SitemapResolver {
    fetcher: HttpFetcher,
    robots: Option<Arc<RobotsCache>>,
    limiter: Arc<RateLimiter>,
    permits: Arc<Semaphore>,
    config: SitemapConfig,
    max_body_bytes: usize,
}

impl SitemapResolver {
    /// Creates a resolver
    ///
    /// # Arguments
    ///
    /// * `fetcher` - HTTP fetcher for sitemap requests
    /// * `robots` - Robots cache used to read `Sitemap:` directives, if any
    /// * `config` - Rate limit, concurrency, document cap and fallback paths
    /// * `max_body_bytes` - Cap on a decompressed sitemap body
    pub fn new(
        fetcher: HttpFetcher,
        robots: Option<Arc<RobotsCache>>,
        config: SitemapConfig,
        max_body_bytes: usize,
    ) -> Self {
        Self {
            fetcher,
            robots,
            limiter: Arc::new(RateLimiter::new(config.requests_per_second)),
            permits: Arc::new(Semaphore::new(config.max_concurrency.max(1))),
            config,
            max_body_bytes,
        }
    }

    /// Resolves seed URLs into a deduplicated set of page URLs
    ///
    /// Each sitemap URL is fetched at most once per call. A failing sitemap
    /// is logged and skipped; the call fails only when no seed produced a
    /// usable sitemap.
    pub async fn resolve(&self, seeds: &[Url]) -> Result<HashSet<Url>, SitemapError> {
        let resolution = self.resolve_all(seeds).await;
        if resolution.all_failed {
            return Err(SitemapError::AllSeedsFailed);
        }
        Ok(resolution.pages)
    }

    /// Resolves seeds, also reporting seeds that are not sitemaps at all
    ///
    /// A seed whose URL looks like a sitemap but whose body is some other
    /// document (an HTML page, an RSS feed) lands in `page_seeds` so the
    /// caller can crawl it as a page.
    pub async fn resolve_all(&self, seeds: &[Url]) -> SitemapResolution {
        let mut pages = HashSet::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut seed_ok = vec![false; seeds.len()];
        let mut page_seeds = Vec::new();
        let mut fetched = 0usize;
        let mut pending: Vec<SitemapTask> = Vec::new();

        for (index, seed) in seeds.iter().enumerate() {
            for url in self.candidate_sitemaps(seed).await {
                pending.push(SitemapTask {
                    url,
                    seed: index,
                    top_level: true,
                });
            }
        }

        let mut in_flight: JoinSet<SitemapOutcome> = JoinSet::new();

        loop {
            while let Some(task) = pending.pop() {
                if !seen.insert(task.url.as_str().to_string()) {
                    debug!("Sitemap {} already resolved in this pass", task.url);
                    continue;
                }

                if fetched >= self.config.max_sitemaps {
                    warn!(
                        "Sitemap limit of {} reached, skipping {}",
                        self.config.max_sitemaps, task.url
                    );
                    continue;
                }
                fetched += 1;

                let resolver = self.clone();
                in_flight.spawn(async move {
                    let result = resolver.fetch_sitemap(&task.url).await;
                    SitemapOutcome { task, result }
                });
            }

            let outcome = match in_flight.join_next().await {
                Some(Ok(outcome)) => outcome,
                Some(Err(e)) => {
                    warn!("Sitemap task failed: {}", e);
                    continue;
                }
                None => break,
            };

            match outcome.result {
                Ok(SitemapDocument::Index(children)) => {
                    debug!(
                        "Sitemap index {} lists {} sitemaps",
                        outcome.task.url,
                        children.len()
                    );
                    if outcome.task.top_level {
                        seed_ok[outcome.task.seed] = true;
                    }
                    for child in children {
                        match Url::parse(&child) {
                            Ok(url) => pending.push(SitemapTask {
                                url,
                                seed: outcome.task.seed,
                                top_level: false,
                            }),
                            Err(e) => debug!("Skipping child sitemap {}: {}", child, e),
                        }
                    }
                }
                Ok(SitemapDocument::UrlSet(locations)) => {
                    debug!(
                        "Sitemap {} lists {} URLs",
                        outcome.task.url,
                        locations.len()
                    );
                    if outcome.task.top_level {
                        seed_ok[outcome.task.seed] = true;
                    }
                    pages.extend(locations.iter().filter_map(|loc| normalize_url(loc).ok()));
                }
                Err(SitemapError::NotSitemap(reason))
                    if outcome.task.top_level && outcome.task.url == seeds[outcome.task.seed] =>
                {
                    debug!(
                        "Seed {} is not a sitemap ({}), crawling it as a page",
                        outcome.task.url, reason
                    );
                    page_seeds.push(outcome.task.url);
                }
                Err(e) => {
                    warn!("Skipping sitemap {}: {}", outcome.task.url, e);
                }
            }
        }

        let all_failed = !seeds.is_empty() && !seed_ok.iter().any(|ok| *ok);

        info!(
            "Resolved {} URLs from {} sitemaps",
            pages.len(),
            fetched
        );

        SitemapResolution {
            pages,
            page_seeds,
            all_failed,
        }
    }

    /// Determines where to look for a seed's sitemaps
    ///
    /// A seed that names a sitemap is used directly. Otherwise the site's
    /// robots.txt `Sitemap:` entries are used, falling back to the
    /// configured well-known paths.
    async fn candidate_sitemaps(&self, seed: &Url) -> Vec<Url> {
        if is_sitemap_url(seed) {
            return vec![seed.clone()];
        }

        if let Some(robots) = &self.robots {
            let declared: Vec<Url> = robots
                .sitemaps(seed)
                .await
                .iter()
                .filter_map(|s| Url::parse(s).ok())
                .collect();
            if !declared.is_empty() {
                return declared;
            }
        }

        let origin = match origin_of(seed) {
            Some(origin) => origin,
            None => return Vec::new(),
        };

        self.config
            .paths
            .iter()
            .filter_map(|path| Url::parse(&format!("{}{}", origin, path)).ok())
            .collect()
    }

    async fn fetch_sitemap(&self, url: &Url) -> Result<SitemapDocument, SitemapError> {
        // The semaphore is never closed
        let _permit = self.permits.acquire().await.ok();
        self.limiter.acquire().await;

        debug!("Fetching sitemap {}", url);

        let response = self.fetcher.get(url, self.config.fetch_timeout()).await?;
        let body = decode_body(response.body, self.max_body_bytes)?;
        parse_sitemap(&body)
    }
}
