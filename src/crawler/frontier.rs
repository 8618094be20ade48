//! Crawl frontier: the prioritized, deduplicating queue of a crawl job
//!
//! Admission, the visited set and the page budget share one mutex so that
//! the dedup check, the budget check and the insert happen as one step.
//! Waiting workers park on a [`Notify`] and are woken by new work, by the
//! drain barrier, or by [`Frontier::close`].

use crate::url::normalize_url;
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use url::Url;

/// A URL waiting to be crawled
#[derive(Debug, Clone)]
pub struct CrawlTask {
    pub url: Url,

    /// Link distance from the job's initial URL set
    pub depth: u32,

    /// Score in `[0.1, 1.0]`; higher is fetched first
    pub priority: f64,

    pub discovered_at: DateTime<Utc>,
}

impl CrawlTask {
    pub fn new(url: Url, depth: u32, priority: f64) -> Self {
        Self {
            url,
            depth,
            priority,
            discovered_at: Utc::now(),
        }
    }
}

/// Heap entry: priority first, then insertion order
#[derive(Debug)]
struct QueuedTask {
    task: CrawlTask,
    seq: u64,
}

// BinaryHeap is a max-heap: higher priority pops first, and among equal
// priorities the lower sequence number (earlier insert) pops first
impl Ord for QueuedTask {
    fn cmp(&self, other: &Self) -> Ordering {
        self.task
            .priority
            .total_cmp(&other.task.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for QueuedTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for QueuedTask {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueuedTask {}

#[derive(Debug, Default)]
struct FrontierState {
    heap: BinaryHeap<QueuedTask>,
    visited: HashSet<String>,
    /// Tasks admitted so far, counted against the page budget
    admitted: u64,
    /// Tasks popped but not yet reported with `task_done`
    in_flight: usize,
    next_seq: u64,
    closed: bool,
}

/// Priority queue of crawl tasks with dedup and admission control
#[derive(Debug)]
pub struct Frontier {
    max_depth: u32,
    max_pages: u64,
    state: Mutex<FrontierState>,
    notify: Notify,
    /// Queue-depth gauge, for observability only
    queue_depth: AtomicUsize,
}

impl Frontier {
    /// Creates an empty frontier
    ///
    /// # Arguments
    ///
    /// * `max_depth` - Tasks deeper than this are refused
    /// * `max_pages` - Total number of tasks the frontier will ever admit
    pub fn new(max_depth: u32, max_pages: u64) -> Self {
        Self {
            max_depth,
            max_pages,
            state: Mutex::new(FrontierState::default()),
            notify: Notify::new(),
            queue_depth: AtomicUsize::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FrontierState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Offers a task for admission
    ///
    /// The task's URL is normalized first. Returns false, without error,
    /// when the URL was already seen, the task is too deep, the page budget
    /// is used up, or the frontier is closed.
    pub fn push(&self, mut task: CrawlTask) -> bool {
        if task.depth > self.max_depth {
            return false;
        }

        task.url = match normalize_url(task.url.as_str()) {
            Ok(url) => url,
            Err(_) => return false,
        };

        {
            let mut state = self.lock();
            if state.closed
                || state.admitted >= self.max_pages
                || state.visited.contains(task.url.as_str())
            {
                return false;
            }

            state.visited.insert(task.url.as_str().to_string());
            state.admitted += 1;

            let seq = state.next_seq;
            state.next_seq += 1;
            state.heap.push(QueuedTask { task, seq });
            self.queue_depth.fetch_add(1, AtomicOrdering::Relaxed);
        }

        self.notify.notify_one();
        true
    }

    /// Marks a URL as seen without queueing it or charging the budget
    ///
    /// Returns false if the URL was already seen. Used for redirect targets
    /// so the same document is not indexed twice.
    pub fn mark_visited(&self, url: &Url) -> bool {
        let key = match normalize_url(url.as_str()) {
            Ok(url) => String::from(url),
            Err(_) => return false,
        };
        self.lock().visited.insert(key)
    }

    /// Waits for the highest-priority task
    ///
    /// Returns `None` when `cancel` fires, when the frontier is closed, or
    /// when the drain barrier is reached: the queue is empty and no popped
    /// task is still in flight. Every `Some` must be matched by a call to
    /// [`Frontier::task_done`].
    pub async fn pop(&self, cancel: &CancellationToken) -> Option<CrawlTask> {
        loop {
            if cancel.is_cancelled() {
                return None;
            }

            // Register interest before inspecting the state so a push or
            // close between the check and the await is not missed
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                if state.closed {
                    return None;
                }

                if let Some(queued) = state.heap.pop() {
                    state.in_flight += 1;
                    self.queue_depth.fetch_sub(1, AtomicOrdering::Relaxed);
                    return Some(queued.task);
                }

                if state.in_flight == 0 {
                    state.closed = true;
                    drop(state);
                    self.notify.notify_waiters();
                    return None;
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => return None,
                _ = &mut notified => {}
            }
        }
    }

    /// Reports that a popped task has been fully processed
    ///
    /// Links discovered by the task must be pushed before this is called,
    /// otherwise the drain barrier may fire early.
    pub fn task_done(&self) {
        let drained = {
            let mut state = self.lock();
            state.in_flight = state.in_flight.saturating_sub(1);
            if state.in_flight == 0 && state.heap.is_empty() && !state.closed {
                state.closed = true;
                true
            } else {
                false
            }
        };

        if drained {
            self.notify.notify_waiters();
        }
    }

    /// Closes the frontier, discarding queued tasks and waking every waiter
    ///
    /// Returns the number of discarded tasks.
    pub fn close(&self) -> usize {
        let discarded = {
            let mut state = self.lock();
            state.closed = true;
            let discarded = state.heap.len();
            state.heap.clear();
            discarded
        };

        self.queue_depth.store(0, AtomicOrdering::Relaxed);
        self.notify.notify_waiters();
        discarded
    }

    /// Number of queued tasks
    pub fn size(&self) -> usize {
        self.lock().heap.len()
    }

    /// Current value of the queue-depth gauge
    pub fn queue_depth(&self) -> usize {
        self.queue_depth.load(AtomicOrdering::Relaxed)
    }

    /// Number of tasks admitted so far
    pub fn admitted(&self) -> u64 {
        self.lock().admitted
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn task(path: &str, depth: u32, priority: f64) -> CrawlTask {
        CrawlTask::new(
            Url::parse(&format!("https://example.com{}", path)).unwrap(),
            depth,
            priority,
        )
    }

    #[tokio::test]
    async fn test_priority_ordering() {
        let frontier = Frontier::new(3, 100);
        let cancel = CancellationToken::new();

        assert!(frontier.push(task("/a", 0, 0.9)));
        assert!(frontier.push(task("/b", 0, 0.5)));
        assert!(frontier.push(task("/c", 0, 0.7)));

        let mut order = Vec::new();
        for _ in 0..3 {
            let t = frontier.pop(&cancel).await.unwrap();
            order.push(t.priority);
            frontier.task_done();
        }
        assert_eq!(order, vec![0.9, 0.7, 0.5]);
    }

    #[tokio::test]
    async fn test_equal_priorities_are_fifo() {
        let frontier = Frontier::new(3, 100);
        let cancel = CancellationToken::new();

        for path in ["/first", "/second", "/third"] {
            frontier.push(task(path, 0, 0.5));
        }

        let first = frontier.pop(&cancel).await.unwrap();
        let second = frontier.pop(&cancel).await.unwrap();
        let third = frontier.pop(&cancel).await.unwrap();
        assert_eq!(first.url.path(), "/first");
        assert_eq!(second.url.path(), "/second");
        assert_eq!(third.url.path(), "/third");
    }

    #[test]
    fn test_duplicate_rejected() {
        let frontier = Frontier::new(3, 100);
        assert!(frontier.push(task("/page", 0, 0.5)));
        assert!(!frontier.push(task("/page", 1, 0.9)));
        assert!(!frontier.push(task("/page/", 1, 0.9)));
        assert!(!frontier.push(task("/page#section", 1, 0.9)));
        assert_eq!(frontier.size(), 1);
    }

    #[test]
    fn test_depth_bound() {
        let frontier = Frontier::new(2, 100);
        assert!(frontier.push(task("/ok", 2, 0.5)));
        assert!(!frontier.push(task("/deep", 3, 0.5)));
        // A refused task does not burn its URL
        assert!(frontier.push(task("/deep", 1, 0.5)));
    }

    #[test]
    fn test_budget() {
        let frontier = Frontier::new(3, 2);
        assert!(frontier.push(task("/a", 0, 0.5)));
        assert!(frontier.push(task("/b", 0, 0.5)));
        assert!(!frontier.push(task("/c", 0, 0.5)));
        assert_eq!(frontier.admitted(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_admission_respects_budget() {
        let frontier = Arc::new(Frontier::new(3, 1));
        let mut handles = Vec::new();
        for i in 0..50 {
            let frontier = frontier.clone();
            handles.push(tokio::spawn(async move {
                frontier.push(task(&format!("/race/{}", i), 0, 0.5))
            }));
        }

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 1);
        assert_eq!(frontier.size(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_duplicate_admitted_once() {
        let frontier = Arc::new(Frontier::new(3, 1000));
        let mut handles = Vec::new();
        for _ in 0..100 {
            let frontier = frontier.clone();
            handles.push(tokio::spawn(async move {
                frontier.push(task("/same", 1, 0.5))
            }));
        }

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 1);
    }

    #[tokio::test]
    async fn test_pop_returns_none_on_cancel() {
        let frontier = Arc::new(Frontier::new(3, 100));
        let cancel = CancellationToken::new();

        // One task in flight keeps the drain barrier from firing
        frontier.push(task("/a", 0, 0.5));
        let _held = frontier.pop(&cancel).await.unwrap();

        let waiter = {
            let frontier = frontier.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { frontier.pop(&cancel).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();

        let result = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_pop_wakes_on_push() {
        let frontier = Arc::new(Frontier::new(3, 100));
        let cancel = CancellationToken::new();

        frontier.push(task("/a", 0, 0.5));
        let _held = frontier.pop(&cancel).await.unwrap();

        let waiter = {
            let frontier = frontier.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { frontier.pop(&cancel).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        frontier.push(task("/b", 1, 0.5));

        let popped = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(popped.url.path(), "/b");
    }

    #[tokio::test]
    async fn test_drain_barrier() {
        let frontier = Arc::new(Frontier::new(3, 100));
        let cancel = CancellationToken::new();

        frontier.push(task("/a", 0, 0.5));
        let _held = frontier.pop(&cancel).await.unwrap();

        let waiter = {
            let frontier = frontier.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { frontier.pop(&cancel).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        // Last in-flight task finishes without discovering anything
        frontier.task_done();

        let result = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_none());
        assert!(frontier.is_closed());
    }

    #[tokio::test]
    async fn test_empty_frontier_drains_immediately() {
        let frontier = Frontier::new(3, 100);
        assert!(frontier.pop(&CancellationToken::new()).await.is_none());
    }

    #[tokio::test]
    async fn test_close_discards_and_refuses() {
        let frontier = Frontier::new(3, 100);
        frontier.push(task("/a", 0, 0.5));
        frontier.push(task("/b", 0, 0.5));

        assert_eq!(frontier.close(), 2);
        assert_eq!(frontier.size(), 0);
        assert_eq!(frontier.queue_depth(), 0);
        assert!(!frontier.push(task("/c", 0, 0.5)));
        assert!(frontier.pop(&CancellationToken::new()).await.is_none());
    }

    #[tokio::test]
    async fn test_queue_depth_gauge() {
        let frontier = Frontier::new(3, 100);
        let cancel = CancellationToken::new();
        frontier.push(task("/a", 0, 0.5));
        frontier.push(task("/b", 0, 0.5));
        assert_eq!(frontier.queue_depth(), 2);

        frontier.pop(&cancel).await.unwrap();
        assert_eq!(frontier.queue_depth(), 1);
    }

    #[test]
    fn test_mark_visited_blocks_later_admission() {
        let frontier = Frontier::new(3, 100);
        let url = Url::parse("https://example.com/target").unwrap();
        assert!(frontier.mark_visited(&url));
        assert!(!frontier.mark_visited(&url));
        assert!(!frontier.push(task("/target", 0, 0.5)));
        assert_eq!(frontier.admitted(), 0);
    }
}
