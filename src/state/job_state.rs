/// Crawl job state definitions
///
/// A job moves `Pending → Running → {Completed | Cancelled | Failed}`, or
/// straight from `Pending` to `Failed` when setup fails.
use chrono::{DateTime, Utc};
use std::fmt;
use uuid::Uuid;

/// Represents the lifecycle state of a crawl job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobState {
    /// Created, resolving sitemaps and seeding the frontier
    Pending,

    /// Workers are draining the frontier
    Running,

    /// Stopped on request before the frontier drained
    Cancelled,

    /// Frontier drained or page budget reached
    Completed,

    /// Setup failed; no worker ever ran
    Failed,
}

impl JobState {
    /// Returns true if the job can no longer change state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Completed | Self::Failed)
    }

    /// Returns true if moving to `next` is a legal transition
    pub fn can_transition_to(&self, next: JobState) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running)
                | (Self::Pending, Self::Failed)
                | (Self::Pending, Self::Cancelled)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Cancelled)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Cancelled => "cancelled",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Snapshot of a crawl job's progress
#[derive(Debug, Clone)]
pub struct JobStatus {
    pub job_id: Uuid,
    pub status: JobState,
    pub seed_urls: Vec<String>,
    pub max_depth: u32,
    pub max_pages: u64,
    pub pages_crawled: u64,
    /// Tasks still waiting in the frontier
    pub queue_size: usize,
    pub errors: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl JobStatus {
    /// Creates the status of a freshly created job
    pub fn pending(job_id: Uuid, seed_urls: Vec<String>, max_depth: u32, max_pages: u64) -> Self {
        Self {
            job_id,
            status: JobState::Pending,
            seed_urls,
            max_depth,
            max_pages,
            pages_crawled: 0,
            queue_size: 0,
            errors: Vec::new(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Moves to `next` if the transition is legal, stamping `finished_at`
    /// on terminal states
    ///
    /// Returns false and leaves the status untouched otherwise.
    pub fn transition(&mut self, next: JobState) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }

        self.status = next;
        if next.is_terminal() {
            self.finished_at = Some(Utc::now());
        }
        true
    }
}
