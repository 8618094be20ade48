use std::time::Duration;
use tokio::time::Instant;

/// Politeness state of one domain
///
/// `last_fetch_at` is the start time of the most recent fetch slot handed
/// out for the domain, which may lie in the future while a worker is
/// sleeping towards it.
#[derive(Debug, Clone)]
pub struct DomainThrottleState {
    pub domain: String,

    /// Start of the most recently reserved fetch slot
    pub last_fetch_at: Option<Instant>,

    /// Minimum spacing between two fetch starts
    pub min_delay: Duration,
}

impl DomainThrottleState {
    pub fn new(domain: &str, min_delay: Duration) -> Self {
        Self {
            domain: domain.to_string(),
            last_fetch_at: None,
            min_delay,
        }
    }

    /// Earliest instant the next fetch may start
    ///
    /// # Arguments
    ///
    /// * `delay` - Spacing to apply; never less than `min_delay`
    /// * `now` - The current time instant
    pub fn next_slot(&self, delay: Duration, now: Instant) -> Instant {
        let delay = delay.max(self.min_delay);
        match self.last_fetch_at {
            Some(last) => (last + delay).max(now),
            None => now,
        }
    }

    /// Reserves the next fetch slot and returns its start
    pub fn reserve(&mut self, delay: Duration, now: Instant) -> Instant {
        let slot = self.next_slot(delay, now);
        self.last_fetch_at = Some(slot);
        slot
    }

    /// Returns how long a caller would have to wait right now
    pub fn time_until_next_fetch(&self, now: Instant) -> Duration {
        self.next_slot(self.min_delay, now).saturating_duration_since(now)
    }
}
