//! URL prioritization module
//!
//! Assigns every candidate URL a score in `[0.1, 1.0]` before it enters the
//! frontier. Scoring is pluggable through [`PriorityScorer`]; the default is
//! the path-pattern [`HeuristicScorer`]. Scores are cached per normalized URL.

mod cache;
mod heuristic;

pub use cache::ScoreCache;
pub use heuristic::{HeuristicScorer, BASE_SCORE, MAX_SCORE, MIN_SCORE};

use crate::config::PrioritizerConfig;
use crate::url::normalized_key;
use crate::ConfigError;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Capability to score a URL
///
/// Implemented by [`HeuristicScorer`] and by any `Fn(&Url) -> f64`, so a
/// model-backed scorer can be plugged in without touching the crawler.
pub trait PriorityScorer: Send + Sync {
    fn score(&self, url: &Url) -> f64;
}

impl<F> PriorityScorer for F
where
    F: Fn(&Url) -> f64 + Send + Sync,
{
    fn score(&self, url: &Url) -> f64 {
        self(url)
    }
}

/// Cached front end over a [`PriorityScorer`]
pub struct UrlPrioritizer {
    scorer: Arc<dyn PriorityScorer>,
    cache: ScoreCache,
}

impl std::fmt::Debug for UrlPrioritizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UrlPrioritizer")
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

impl UrlPrioritizer {
    pub fn new(scorer: Arc<dyn PriorityScorer>, cache_ttl: Duration) -> Self {
        Self {
            scorer,
            cache: ScoreCache::new(cache_ttl),
        }
    }

    /// Builds a prioritizer around the heuristic scorer
    pub fn from_config(config: &PrioritizerConfig) -> Result<Self, ConfigError> {
        let scorer = HeuristicScorer::from_config(config)?;
        Ok(Self::new(Arc::new(scorer), config.cache_ttl()))
    }

    /// Scores a batch of URLs
    ///
    /// Returns a map keyed by normalized URL. Cached scores are reused; only
    /// misses reach the scorer, and their scores are cached before this
    /// returns. URLs that cannot be normalized are left out. Scores from a
    /// custom scorer are clamped to `[0.1, 1.0]`.
    pub fn score(&self, urls: &[Url]) -> HashMap<String, f64> {
        let mut scores = HashMap::with_capacity(urls.len());
        let mut computed = HashMap::new();

        for url in urls {
            let key = match normalized_key(url) {
                Ok(key) => key,
                Err(_) => continue,
            };
            if scores.contains_key(&key) || computed.contains_key(&key) {
                continue;
            }

            match self.cache.get(&key) {
                Some(score) => {
                    scores.insert(key, score);
                }
                None => {
                    let score = self.scorer.score(url);
                    let score = if score.is_nan() {
                        BASE_SCORE
                    } else {
                        score.clamp(MIN_SCORE, MAX_SCORE)
                    };
                    computed.insert(key, score);
                }
            }
        }

        self.cache.insert_many(computed.iter());
        scores.extend(computed);
        scores
    }

    /// Scores a single URL
    pub fn score_one(&self, url: &Url) -> f64 {
        normalized_key(url)
            .ok()
            .and_then(|key| self.score(std::slice::from_ref(url)).get(&key).copied())
            .unwrap_or(BASE_SCORE)
    }

    pub fn cached_scores(&self) -> usize {
        self.cache.len()
    }
}
