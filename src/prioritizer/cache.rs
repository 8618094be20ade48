use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};

/// Score cache keyed by normalized URL
///
/// Entries expire after the TTL. Every insert sweeps expired entries, so the
/// map only holds scores still usable by `get`.
#[derive(Debug)]
pub struct ScoreCache {
    ttl: Duration,
    entries: RwLock<HashMap<String, (f64, Instant)>>,
}

impl ScoreCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the cached score if it has not expired
    pub fn get(&self, key: &str) -> Option<f64> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .get(key)
            .filter(|(_, stored_at)| stored_at.elapsed() <= self.ttl)
            .map(|(score, _)| *score)
    }

    /// Stores a batch of scores under one write lock, dropping expired ones
    pub fn insert_many<'a>(&self, scores: impl IntoIterator<Item = (&'a String, &'a f64)>) {
        let now = Instant::now();
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.retain(|_, (_, stored_at)| now.duration_since(*stored_at) <= self.ttl);
        for (key, score) in scores {
            entries.insert(key.clone(), (*score, now));
        }
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
