//! Crawl manager - job lifecycle orchestration
//!
//! The manager owns the components shared by every job (HTTP client, robots
//! cache, score cache, sitemap resolver, domain throttle) and the table of
//! jobs. Starting a job resolves sitemaps, seeds a fresh frontier and spawns
//! a supervisor task that runs the job's workers and records the outcome.
//!
//! # Job states
//!
//! ```text
//! Pending ──> Running ──> Completed
//!    │           └──────> Cancelled
//!    ├──────────────────> Cancelled
//!    └──────────────────> Failed
//! ```
//!
//! Only the manager (during setup) and the job's supervisor change a job's
//! state. Workers only add to its progress counters and error list.

use crate::config::{validate, Config};
use crate::crawler::worker::{run_worker, CrawlContext, JobProgress};
use crate::crawler::{build_http_client, CrawlTask, DomainThrottle, Frontier, HttpFetcher};
use crate::prioritizer::{PriorityScorer, UrlPrioritizer, BASE_SCORE};
use crate::robots::RobotsCache;
use crate::sitemap::{SitemapError, SitemapResolver};
use crate::state::{JobState, JobStatus};
use crate::storage::{IndexSink, RecrawlSource};
use crate::url::{is_sitemap_url, normalize_url, normalized_key, origin_of};
use crate::{CrawlError, Result};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;
use uuid::Uuid;

/// Identifier of a crawl job
pub type JobId = Uuid;

/// Finished jobs kept for status queries by the recrawl scheduler
pub const FINISHED_JOB_RETENTION: usize = 100;

/// Shared state of one job
#[derive(Debug)]
struct JobRecord {
    status: Mutex<JobStatus>,
    state: watch::Sender<JobState>,
    progress: Arc<JobProgress>,
    frontier: Mutex<Option<Arc<Frontier>>>,
    cancel: CancellationToken,
    /// Origins of the job's valid seeds, the keys of the recrawl schedule
    seed_origins: Vec<String>,
}

impl JobRecord {
    fn new(status: JobStatus, seed_origins: Vec<String>) -> Self {
        let (state, _) = watch::channel(status.status);
        Self {
            status: Mutex::new(status),
            state,
            progress: Arc::new(JobProgress::default()),
            frontier: Mutex::new(None),
            cancel: CancellationToken::new(),
            seed_origins,
        }
    }

    fn current_state(&self) -> JobState {
        *self.state.borrow()
    }

    fn transition(&self, next: JobState) -> bool {
        let mut status = self.status.lock().unwrap_or_else(PoisonError::into_inner);
        if status.transition(next) {
            self.state.send_replace(next);
            true
        } else {
            false
        }
    }

    fn frontier(&self) -> Option<Arc<Frontier>> {
        self.frontier
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_frontier(&self, frontier: Arc<Frontier>) {
        *self.frontier.lock().unwrap_or_else(PoisonError::into_inner) = Some(frontier);
    }

    fn snapshot(&self) -> JobStatus {
        let mut status = self
            .status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        status.pages_crawled = self.progress.pages_crawled();
        status.queue_size = self.frontier().map(|f| f.size()).unwrap_or(0);
        status.errors = self.progress.errors();
        status
    }
}

struct JobEntry {
    record: Arc<JobRecord>,
    supervisor: Option<JoinHandle<()>>,
}

/// Orchestrates crawl jobs and periodic recrawls
pub struct CrawlManager {
    config: Config,
    fetcher: HttpFetcher,
    robots: Arc<RobotsCache>,
    prioritizer: Arc<UrlPrioritizer>,
    resolver: SitemapResolver,
    throttle: Arc<DomainThrottle>,
    sink: Arc<dyn IndexSink>,
    recrawl: Arc<dyn RecrawlSource>,
    jobs: Mutex<HashMap<JobId, JobEntry>>,
}

impl CrawlManager {
    /// Creates a manager and the components its jobs share
    ///
    /// # Arguments
    ///
    /// * `config` - Validated crawler configuration
    /// * `sink` - Receives every crawled page
    /// * `recrawl` - Recrawl schedule consulted by [`CrawlManager::schedule_recrawls`]
    ///
    /// # Returns
    ///
    /// * `Ok(CrawlManager)` - Ready to start jobs
    /// * `Err(CrawlError)` - Invalid configuration or HTTP client setup failure
    pub fn new(
        config: Config,
        sink: Arc<dyn IndexSink>,
        recrawl: Arc<dyn RecrawlSource>,
    ) -> Result<Self> {
        validate(&config)?;

        let client = build_http_client(&config.user_agent, &config.crawler)?;
        let fetcher = HttpFetcher::from_config(client, &config.crawler);

        let robots = Arc::new(RobotsCache::new(
            fetcher.clone(),
            &config.user_agent.crawler_name,
            &config.robots,
        ));
        let prioritizer = Arc::new(UrlPrioritizer::from_config(&config.prioritizer)?);
        let resolver = SitemapResolver::new(
            fetcher.clone(),
            Some(robots.clone()),
            config.sitemap.clone(),
            config.crawler.max_body_bytes,
        );
        let throttle = Arc::new(DomainThrottle::new(config.crawler.min_delay()));

        Ok(Self {
            config,
            fetcher,
            robots,
            prioritizer,
            resolver,
            throttle,
            sink,
            recrawl,
            jobs: Mutex::new(HashMap::new()),
        })
    }

    /// Replaces the heuristic scorer with a custom one
    pub fn with_scorer(mut self, scorer: Arc<dyn PriorityScorer>) -> Self {
        self.prioritizer = Arc::new(UrlPrioritizer::new(
            scorer,
            self.config.prioritizer.cache_ttl(),
        ));
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn robots(&self) -> &Arc<RobotsCache> {
        &self.robots
    }

    fn lock_jobs(&self) -> MutexGuard<'_, HashMap<JobId, JobEntry>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, job_id: JobId) -> Option<Arc<JobRecord>> {
        self.lock_jobs().get(&job_id).map(|entry| entry.record.clone())
    }

    /// Starts a crawl job
    ///
    /// Resolves the seeds' sitemaps, scores and admits the resulting URLs,
    /// moves the job to `Running` and spawns its workers. Returns as soon as
    /// the workers are running; use [`CrawlManager::wait`] to await the end.
    ///
    /// Seeds naming a sitemap are expanded; other seeds are crawled as pages
    /// and their sites' sitemaps are added. A sitemap-looking seed that serves
    /// some other document is crawled as a page. Failing sitemaps are skipped.
    ///
    /// # Arguments
    ///
    /// * `seeds` - Seed URLs
    /// * `max_depth` - Link depth limit, defaulting to the configured one
    ///
    /// # Returns
    ///
    /// * `Ok(JobId)` - The job is running (or was cancelled during setup)
    /// * `Err(CrawlError::Setup)` - No crawlable URL could be derived from the
    ///   seeds; the job exists in state `Failed`
    pub async fn start_crawling<S: AsRef<str>>(
        &self,
        seeds: &[S],
        max_depth: Option<u32>,
    ) -> Result<JobId> {
        let job_id = Uuid::new_v4();
        let max_depth = max_depth.unwrap_or(self.config.crawler.max_depth);
        let max_pages = self.config.crawler.max_pages;
        let seed_strings: Vec<String> = seeds.iter().map(|s| s.as_ref().to_string()).collect();

        let mut valid_seeds = Vec::new();
        let mut invalid_seeds = Vec::new();
        for seed in &seed_strings {
            match normalize_url(seed) {
                Ok(url) => valid_seeds.push(url),
                Err(e) => invalid_seeds.push(format!("Invalid seed {}: {}", seed, e)),
            }
        }

        let mut seed_origins: Vec<String> = valid_seeds.iter().filter_map(origin_of).collect();
        seed_origins.sort();
        seed_origins.dedup();

        let record = Arc::new(JobRecord::new(
            JobStatus::pending(job_id, seed_strings, max_depth, max_pages),
            seed_origins,
        ));
        for error in invalid_seeds {
            record.progress.record_error(error);
        }

        self.lock_jobs().insert(
            job_id,
            JobEntry {
                record: record.clone(),
                supervisor: None,
            },
        );

        info!(
            "Crawl job {} created with {} seeds (max depth {}, max pages {})",
            job_id,
            valid_seeds.len(),
            max_depth,
            max_pages
        );

        if valid_seeds.is_empty() {
            return Err(self.fail_setup(&record, job_id, "no valid seed URLs"));
        }

        let initial = self.initial_urls(&record, &valid_seeds).await;
        if initial.is_empty() {
            return Err(self.fail_setup(
                &record,
                job_id,
                "no seed or sitemap produced a crawlable URL",
            ));
        }

        if record.cancel.is_cancelled() {
            record.transition(JobState::Cancelled);
            info!("Crawl job {} cancelled during setup", job_id);
            return Ok(job_id);
        }

        let frontier = Arc::new(Frontier::new(max_depth, max_pages));
        let scores = self.prioritizer.score(&initial);
        let admitted = initial
            .into_iter()
            .filter(|url| {
                let priority = normalized_key(url)
                    .ok()
                    .and_then(|key| scores.get(&key).copied())
                    .unwrap_or(BASE_SCORE);
                frontier.push(CrawlTask::new(url.clone(), 0, priority))
            })
            .count();

        record.set_frontier(frontier.clone());
        record.transition(JobState::Running);
        info!("Crawl job {} running with {} initial URLs", job_id, admitted);

        let ctx = Arc::new(CrawlContext {
            frontier,
            robots: self.robots.clone(),
            throttle: self.throttle.clone(),
            prioritizer: self.prioritizer.clone(),
            fetcher: self.fetcher.clone(),
            sink: self.sink.clone(),
            progress: record.progress.clone(),
            cancel: record.cancel.clone(),
            max_depth,
            max_pages,
        });

        let supervisor = tokio::spawn(supervise(
            job_id,
            record,
            ctx,
            self.config.crawler.workers,
            self.recrawl.clone(),
        ));

        if let Some(entry) = self.lock_jobs().get_mut(&job_id) {
            entry.supervisor = Some(supervisor);
        }

        Ok(job_id)
    }

    /// Builds the job's initial URL set: page seeds plus sitemap contents
    async fn initial_urls(&self, record: &JobRecord, seeds: &[Url]) -> Vec<Url> {
        let mut initial: Vec<Url> = seeds
            .iter()
            .filter(|seed| !is_sitemap_url(seed))
            .cloned()
            .collect();

        let resolution = self.resolver.resolve_all(seeds).await;
        if resolution.all_failed {
            let e = SitemapError::AllSeedsFailed;
            warn!("Sitemap discovery failed: {}", e);
            record
                .progress
                .record_error(format!("Sitemap discovery failed: {}", e));
        }

        initial.extend(resolution.page_seeds);

        let mut resolved: Vec<Url> = resolution.pages.into_iter().collect();
        resolved.sort();
        initial.extend(resolved);

        initial
    }

    fn fail_setup(&self, record: &JobRecord, job_id: JobId, message: &str) -> CrawlError {
        error!("Crawl job {} failed during setup: {}", job_id, message);
        record.progress.record_error(message.to_string());
        record.transition(JobState::Failed);
        CrawlError::Setup {
            job_id,
            message: message.to_string(),
        }
    }

    /// Returns a snapshot of a job's progress
    pub fn get_status(&self, job_id: JobId) -> Option<JobStatus> {
        self.record(job_id).map(|record| record.snapshot())
    }

    /// Snapshots of every known job
    pub fn list_jobs(&self) -> Vec<JobStatus> {
        let records: Vec<Arc<JobRecord>> = self
            .lock_jobs()
            .values()
            .map(|entry| entry.record.clone())
            .collect();
        records.iter().map(|record| record.snapshot()).collect()
    }

    /// Requests cancellation of a job
    ///
    /// Queued tasks are discarded and no new fetch starts; fetches already
    /// in flight finish and are indexed. Returns false if the job is unknown
    /// or already finished.
    pub fn cancel_crawling(&self, job_id: JobId) -> bool {
        let record = match self.record(job_id) {
            Some(record) => record,
            None => return false,
        };

        if record.current_state().is_terminal() {
            return false;
        }

        record.cancel.cancel();
        if let Some(frontier) = record.frontier() {
            let discarded = frontier.close();
            debug!("Discarded {} queued tasks of job {}", discarded, job_id);
        }

        info!("Cancellation requested for crawl job {}", job_id);
        true
    }

    /// Waits until a job reaches a terminal state
    pub async fn wait(&self, job_id: JobId) -> Result<JobStatus> {
        let record = self.record(job_id).ok_or(CrawlError::JobNotFound(job_id))?;

        let mut state = record.state.subscribe();
        loop {
            let done = state.borrow_and_update().is_terminal();
            if done || state.changed().await.is_err() {
                break;
            }
        }

        Ok(record.snapshot())
    }

    /// Removes a finished job from the table
    ///
    /// Returns false if the job is unknown or still active.
    pub fn evict_job(&self, job_id: JobId) -> bool {
        let mut jobs = self.lock_jobs();
        match jobs.get(&job_id) {
            Some(entry) if entry.record.current_state().is_terminal() => {
                jobs.remove(&job_id);
                true
            }
            _ => false,
        }
    }

    /// Evicts the oldest finished jobs, keeping at most `keep` of them
    ///
    /// Active jobs are never touched. Returns the number of jobs removed.
    pub fn evict_finished_jobs(&self, keep: usize) -> usize {
        let mut jobs = self.lock_jobs();

        let mut finished: Vec<(JobId, DateTime<Utc>)> = jobs
            .iter()
            .filter(|(_, entry)| entry.record.current_state().is_terminal())
            .map(|(id, entry)| {
                let status = entry
                    .record
                    .status
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                (*id, status.finished_at.unwrap_or(status.started_at))
            })
            .collect();

        if finished.len() <= keep {
            return 0;
        }

        // Newest first; everything past `keep` goes
        finished.sort_by(|a, b| b.1.cmp(&a.1));
        let evicted = finished.len() - keep;
        for (id, _) in finished.into_iter().skip(keep) {
            jobs.remove(&id);
        }
        evicted
    }

    /// Cancels every active job and waits for their supervisors to exit
    pub async fn shutdown(&self) {
        let supervisors: Vec<(JobId, JoinHandle<()>)> = {
            let mut jobs = self.lock_jobs();
            jobs.iter_mut()
                .filter_map(|(id, entry)| entry.supervisor.take().map(|handle| (*id, handle)))
                .collect()
        };

        let ids: Vec<JobId> = self.lock_jobs().keys().copied().collect();
        for job_id in ids {
            self.cancel_crawling(job_id);
        }

        for (job_id, handle) in supervisors {
            if let Err(e) = handle.await {
                error!("Supervisor of crawl job {} failed: {}", job_id, e);
            }
        }
    }

    /// Runs the recrawl scheduler until `shutdown` fires
    ///
    /// Every check interval (first check immediately) the recrawl source is
    /// asked for due domains and a job is started for each one that has no
    /// active job. A failed check or job start is logged and the loop goes on.
    pub async fn schedule_recrawls(&self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.recrawl.check_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "Recrawl scheduler started (every {:?})",
            self.config.recrawl.check_interval()
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let started = self.run_recrawl_cycle().await;
            debug!("Recrawl cycle started {} jobs", started);
        }

        info!("Recrawl scheduler stopped");
    }

    /// Runs one recrawl check and returns the number of jobs started
    ///
    /// Finished jobs beyond the most recent [`FINISHED_JOB_RETENTION`] are
    /// evicted first, so a long-running scheduler keeps a bounded job table.
    pub async fn run_recrawl_cycle(&self) -> usize {
        let evicted = self.evict_finished_jobs(FINISHED_JOB_RETENTION);
        if evicted > 0 {
            debug!("Evicted {} finished jobs", evicted);
        }

        let domains = match self.recrawl.domains_due_for_recrawl().await {
            Ok(domains) => domains,
            Err(e) => {
                warn!("Recrawl check failed: {}", e);
                return 0;
            }
        };

        let mut started = 0;
        for domain in domains {
            let seed = recrawl_seed(&domain);

            if let Some(origin) = normalize_url(&seed).ok().as_ref().and_then(origin_of) {
                if self.has_active_job_for(&origin) {
                    debug!("Skipping recrawl of {}: job already active", domain);
                    continue;
                }
            }

            match self.start_crawling(&[seed], None).await {
                Ok(job_id) => {
                    info!("Started recrawl job {} for {}", job_id, domain);
                    started += 1;
                }
                Err(e) => warn!("Recrawl of {} failed to start: {}", domain, e),
            }
        }

        started
    }

    fn has_active_job_for(&self, origin: &str) -> bool {
        self.lock_jobs().values().any(|entry| {
            !entry.record.current_state().is_terminal()
                && entry.record.seed_origins.iter().any(|o| o == origin)
        })
    }
}

impl Drop for CrawlManager {
    fn drop(&mut self) {
        for entry in self.lock_jobs().values() {
            entry.record.cancel.cancel();
        }
    }
}

/// Turns a recrawl entry into a seed URL
///
/// Entries are origins with an explicit scheme; a bare domain is crawled
/// over HTTPS.
fn recrawl_seed(domain: &str) -> String {
    if domain.contains("://") {
        domain.to_string()
    } else {
        format!("https://{}/", domain)
    }
}

/// Runs a job's workers to completion and records the outcome
async fn supervise(
    job_id: JobId,
    record: Arc<JobRecord>,
    ctx: Arc<CrawlContext>,
    workers: usize,
    recrawl: Arc<dyn RecrawlSource>,
) {
    let mut pool = JoinSet::new();
    for id in 0..workers {
        pool.spawn(run_worker(id, ctx.clone()));
    }

    while let Some(result) = pool.join_next().await {
        if let Err(e) = result {
            error!("Worker of crawl job {} failed: {}", job_id, e);
            record.progress.record_error(format!("Worker failed: {}", e));
        }
    }

    let discarded = ctx.frontier.close();
    if discarded > 0 {
        debug!("Discarded {} queued tasks of job {}", discarded, job_id);
    }

    let final_state = if ctx.cancel.is_cancelled() {
        JobState::Cancelled
    } else {
        let now = Utc::now();
        for origin in &record.seed_origins {
            if let Err(e) = recrawl.record_crawl_completed(origin, now).await {
                warn!("Failed to record crawl of {}: {}", origin, e);
            }
        }
        JobState::Completed
    };

    record.transition(final_state);

    info!(
        "Crawl job {} {}: {} pages crawled",
        job_id,
        final_state,
        record.progress.pages_crawled()
    );
}
