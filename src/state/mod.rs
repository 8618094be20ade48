//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `JobState` / `JobStatus`: lifecycle and progress of a crawl job
//! - `DomainThrottleState`: per-domain politeness timestamps

mod domain_state;
mod job_state;

// Re-export main types
pub use domain_state::DomainThrottleState;
pub use job_state::{JobState, JobStatus};
