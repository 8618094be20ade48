//! Crawl workers
//!
//! A worker pops a task, checks robots.txt, waits for the domain's throttle
//! slot, fetches, hands the page to the indexing sink and admits the links it
//! found. Every failure is recorded on the job and the loop moves on; only
//! cancellation, closing the frontier or the drain barrier ends a worker.

use crate::crawler::{CrawlTask, DomainThrottle, Frontier, HttpFetcher};
use crate::prioritizer::{UrlPrioritizer, BASE_SCORE};
use crate::robots::RobotsCache;
use crate::storage::{IndexSink, IndexedPage};
use crate::url::{domain_key, normalized_key};
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

/// Errors kept per job; later ones are counted but dropped
const MAX_RECORDED_ERRORS: usize = 1000;

/// Progress counters a job's workers write to
#[derive(Debug, Default)]
pub(crate) struct JobProgress {
    pages_crawled: AtomicU64,
    errors: Mutex<Vec<String>>,
    dropped_errors: AtomicU64,
}

impl JobProgress {
    pub(crate) fn pages_crawled(&self) -> u64 {
        self.pages_crawled.load(Ordering::SeqCst)
    }

    /// Counts a crawled page and returns the new total
    fn page_crawled(&self) -> u64 {
        self.pages_crawled.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub(crate) fn record_error(&self, error: String) {
        let mut errors = self.errors.lock().unwrap_or_else(PoisonError::into_inner);
        if errors.len() < MAX_RECORDED_ERRORS {
            errors.push(error);
        } else {
            self.dropped_errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn errors(&self) -> Vec<String> {
        let mut errors = self
            .errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let dropped = self.dropped_errors.load(Ordering::Relaxed);
        if dropped > 0 {
            errors.push(format!("... and {} more errors", dropped));
        }
        errors
    }
}

/// Everything a job's workers share
pub(crate) struct CrawlContext {
    pub frontier: Arc<Frontier>,
    pub robots: Arc<RobotsCache>,
    pub throttle: Arc<DomainThrottle>,
    pub prioritizer: Arc<UrlPrioritizer>,
    pub fetcher: HttpFetcher,
    pub sink: Arc<dyn IndexSink>,
    pub progress: Arc<JobProgress>,
    pub cancel: CancellationToken,
    pub max_depth: u32,
    pub max_pages: u64,
}

/// Runs one worker until the frontier yields no more tasks
pub(crate) async fn run_worker(id: usize, ctx: Arc<CrawlContext>) {
    debug!("Worker {} started", id);

    while let Some(task) = ctx.frontier.pop(&ctx.cancel).await {
        let _done = TaskDone(&ctx.frontier);
        process_task(&ctx, &task).await;
    }

    debug!("Worker {} finished", id);
}

/// Reports the popped task as done when dropped, including on panic
struct TaskDone<'a>(&'a Frontier);

impl Drop for TaskDone<'_> {
    fn drop(&mut self) {
        self.0.task_done();
    }
}

async fn process_task(ctx: &CrawlContext, task: &CrawlTask) {
    let url = &task.url;

    if !ctx.robots.can_fetch(url).await {
        debug!("Disallowed by robots.txt: {}", url);
        return;
    }

    let domain = domain_key(url).unwrap_or_default();
    let crawl_delay = ctx.robots.crawl_delay(url).unwrap_or(Duration::ZERO);
    let permit = match ctx.throttle.acquire(&domain, crawl_delay, &ctx.cancel).await {
        Some(permit) => permit,
        None => {
            debug!("Cancelled while waiting to fetch {}", url);
            return;
        }
    };

    debug!("Fetching {} (depth {}, priority {:.2})", url, task.depth, task.priority);

    // Once started, a fetch runs to completion and is indexed even if the
    // job is cancelled meanwhile
    let result = ctx.fetcher.fetch_page(url).await;
    drop(permit);

    let page = match result {
        Ok(page) => page,
        Err(e) => {
            if e.is_transient() {
                debug!("{}", e);
            } else {
                warn!("{}", e);
            }
            ctx.progress.record_error(e.to_string());
            return;
        }
    };

    let redirected = normalized_key(&page.final_url).ok().as_deref() != Some(url.as_str());
    if redirected {
        if !ctx.frontier.mark_visited(&page.final_url) {
            debug!("{} redirected to already seen {}", url, page.final_url);
            return;
        }

        if domain_key(&page.final_url).as_deref() != Some(domain.as_str())
            && !ctx.robots.can_fetch(&page.final_url).await
        {
            debug!(
                "{} redirected to {}, which robots.txt disallows",
                url, page.final_url
            );
            return;
        }
    }

    let links = page.links.clone();
    let indexed = IndexedPage {
        url: page.final_url,
        fetched_at: Utc::now(),
        raw_content: page.body,
        extracted_links: page.links,
        metadata: page.metadata,
    };

    if let Err(e) = ctx.sink.index_page(indexed).await {
        warn!("Indexing {} failed: {}", url, e);
        ctx.progress.record_error(format!("Indexing {} failed: {}", url, e));
    }

    if task.depth < ctx.max_depth && !ctx.cancel.is_cancelled() {
        let admitted = admit_links(ctx, &links, task.depth + 1);
        debug!("Admitted {} of {} links from {}", admitted, links.len(), url);
    }

    let crawled = ctx.progress.page_crawled();
    if crawled >= ctx.max_pages {
        let discarded = ctx.frontier.close();
        info!(
            "Page budget of {} reached, discarding {} queued tasks",
            ctx.max_pages, discarded
        );
    }
}

/// Scores discovered links and offers them to the frontier
fn admit_links(ctx: &CrawlContext, links: &[Url], depth: u32) -> usize {
    if links.is_empty() {
        return 0;
    }

    let scores = ctx.prioritizer.score(links);

    links
        .iter()
        .filter(|link| {
            let priority = normalized_key(link)
                .ok()
                .and_then(|key| scores.get(&key).copied())
                .unwrap_or(BASE_SCORE);
            ctx.frontier
                .push(CrawlTask::new((*link).clone(), depth, priority))
        })
        .count()
}
