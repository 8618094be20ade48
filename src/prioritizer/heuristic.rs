use crate::config::PrioritizerConfig;
use crate::prioritizer::PriorityScorer;
use crate::url::path_segment_count;
use crate::ConfigError;
use regex::Regex;
use url::Url;

/// Score given to URLs that match no pattern
pub const BASE_SCORE: f64 = 0.5;

/// Lowest score a URL can receive
pub const MIN_SCORE: f64 = 0.1;

/// Highest score a URL can receive
pub const MAX_SCORE: f64 = 1.0;

/// Path segments allowed before the depth penalty applies
const FREE_SEGMENTS: usize = 3;

/// Penalty per path segment beyond the free ones
const SEGMENT_PENALTY: f64 = 0.1;

/// Path-pattern heuristic
///
/// Starts from [`BASE_SCORE`], raises it to the highest weight among matching
/// patterns, subtracts 0.1 for every path segment past the third and clamps
/// the result to `[0.1, 1.0]`.
#[derive(Debug, Clone)]
pub struct HeuristicScorer {
    patterns: Vec<(Regex, f64)>,
}

impl HeuristicScorer {
    /// Compiles the configured patterns
    pub fn from_config(config: &PrioritizerConfig) -> Result<Self, ConfigError> {
        let patterns = config
            .patterns
            .iter()
            .map(|entry| {
                Regex::new(&entry.pattern)
                    .map(|regex| (regex, entry.weight))
                    .map_err(|e| {
                        ConfigError::InvalidPattern(format!("{}: {}", entry.pattern, e))
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { patterns })
    }
}

impl PriorityScorer for HeuristicScorer {
    fn score(&self, url: &Url) -> f64 {
        let path = url.path();

        let pattern_score = self
            .patterns
            .iter()
            .filter(|(regex, _)| regex.is_match(path))
            .map(|(_, weight)| *weight)
            .fold(BASE_SCORE, f64::max);

        let extra_segments = path_segment_count(url).saturating_sub(FREE_SEGMENTS);
        let score = pattern_score - SEGMENT_PENALTY * extra_segments as f64;

        score.clamp(MIN_SCORE, MAX_SCORE)
    }
}
