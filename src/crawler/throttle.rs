//! Per-domain politeness throttle
//!
//! Each domain has one fetch permit and its own [`DomainThrottleState`].
//! A worker first takes the domain's permit, so fetches to one domain never
//! overlap. It then reserves the next fetch slot under the state lock,
//! releases that lock and sleeps until the slot arrives. The permit is held
//! until the fetch completes; the state lock only guards the timestamp.

use crate::state::DomainThrottleState;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Idle time after which a domain's entry no longer constrains anything
const IDLE_RETENTION: Duration = Duration::from_secs(300);

/// Map size that triggers the first sweep of idle domains
const PRUNE_THRESHOLD: usize = 1024;

#[derive(Debug)]
struct DomainSlot {
    state: Mutex<DomainThrottleState>,
    permit: Arc<Semaphore>,
}

impl DomainSlot {
    fn is_idle(&self, idle: Duration, now: Instant) -> bool {
        if self.permit.available_permits() == 0 {
            return false;
        }
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state
            .last_fetch_at
            .map(|last| now.saturating_duration_since(last) >= idle)
            .unwrap_or(true)
    }
}

#[derive(Debug)]
struct Domains {
    slots: HashMap<String, Arc<DomainSlot>>,
    next_prune: usize,
}

/// Exclusive right to fetch from a domain; dropping it lets the next fetch in
#[derive(Debug)]
pub struct DomainPermit {
    _permit: OwnedSemaphorePermit,
}

#[derive(Debug)]
pub struct DomainThrottle {
    min_delay: Duration,
    domains: Mutex<Domains>,
}

impl DomainThrottle {
    /// Creates a throttle enforcing `min_delay` between same-domain fetches
    pub fn new(min_delay: Duration) -> Self {
        Self {
            min_delay,
            domains: Mutex::new(Domains {
                slots: HashMap::new(),
                next_prune: PRUNE_THRESHOLD,
            }),
        }
    }

    fn slot_for(&self, domain: &str) -> Arc<DomainSlot> {
        let mut domains = self.domains.lock().unwrap_or_else(PoisonError::into_inner);

        if domains.slots.len() >= domains.next_prune {
            let now = Instant::now();
            domains
                .slots
                .retain(|_, slot| Arc::strong_count(slot) > 1 || !slot.is_idle(IDLE_RETENTION, now));
            domains.next_prune = (domains.slots.len() * 2).max(PRUNE_THRESHOLD);
        }

        let min_delay = self.min_delay;
        domains
            .slots
            .entry(domain.to_string())
            .or_insert_with(|| {
                Arc::new(DomainSlot {
                    state: Mutex::new(DomainThrottleState::new(domain, min_delay)),
                    permit: Arc::new(Semaphore::new(1)),
                })
            })
            .clone()
    }

    /// Waits for the domain's permit and its next fetch slot
    ///
    /// # Arguments
    ///
    /// * `domain` - Domain key of the URL about to be fetched
    /// * `delay` - Extra spacing requested by the site (robots.txt
    ///   `Crawl-delay`); the configured minimum still applies
    /// * `cancel` - Job cancellation; aborts the wait
    ///
    /// # Returns
    ///
    /// * `Some(DomainPermit)` - The fetch may start; hold the permit until
    ///   it completes
    /// * `None` - Cancelled before the slot arrived
    pub async fn acquire(
        &self,
        domain: &str,
        delay: Duration,
        cancel: &CancellationToken,
    ) -> Option<DomainPermit> {
        if cancel.is_cancelled() {
            return None;
        }

        let slot = self.slot_for(domain);

        let permit = tokio::select! {
            permit = slot.permit.clone().acquire_owned() => permit.ok()?,
            _ = cancel.cancelled() => return None,
        };

        let start = {
            let mut state = slot.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.reserve(delay, Instant::now())
        };

        if start > Instant::now() {
            tracing::trace!("Waiting {:?} for {}", start - Instant::now(), domain);
            tokio::select! {
                _ = tokio::time::sleep_until(start) => {}
                _ = cancel.cancelled() => return None,
            }
        }

        if cancel.is_cancelled() {
            return None;
        }

        Some(DomainPermit { _permit: permit })
    }

    /// Drops domains that have been idle for at least `idle`
    ///
    /// Returns the number of entries removed.
    pub fn prune_idle(&self, idle: Duration) -> usize {
        let now = Instant::now();
        let mut domains = self.domains.lock().unwrap_or_else(PoisonError::into_inner);
        let before = domains.slots.len();
        domains
            .slots
            .retain(|_, slot| Arc::strong_count(slot) > 1 || !slot.is_idle(idle, now));
        before - domains.slots.len()
    }

    /// Number of domains with throttle state
    pub fn domain_count(&self) -> usize {
        self.domains
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .slots
            .len()
    }
}
