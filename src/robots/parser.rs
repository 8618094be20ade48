//! Robots.txt parser implementation
//!
//! Allow/Disallow matching is delegated to the robotstxt crate. The
//! `Crawl-delay` and `Sitemap` extensions, which that crate does not expose,
//! are read here with a small line scanner.

use robotstxt::DefaultMatcher;

/// Parsed robots.txt data for one domain
#[derive(Debug, Clone, Default)]
pub struct ParsedRobots {
    /// Raw robots.txt content (empty means allow everything)
    content: String,

    /// `Sitemap:` directives in file order
    sitemaps: Vec<String>,
}

impl ParsedRobots {
    /// Creates a new ParsedRobots from raw robots.txt content
    pub fn from_content(content: &str) -> Self {
        Self {
            content: content.to_string(),
            sitemaps: extract_sitemaps(content),
        }
    }

    /// Creates a permissive ParsedRobots that allows everything
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// Checks if a URL is allowed for the given user agent token
    ///
    /// # Arguments
    ///
    /// * `url` - The full URL to check
    /// * `user_agent` - The product token matched against `User-agent` groups
    pub fn is_allowed(&self, url: &str, user_agent: &str) -> bool {
        if self.content.trim().is_empty() {
            return true;
        }

        let mut matcher = DefaultMatcher::default();
        matcher.one_agent_allowed_by_robots(&self.content, user_agent, url)
    }

    /// Returns the sitemap URLs declared in the file
    pub fn sitemaps(&self) -> &[String] {
        &self.sitemaps
    }

    /// Gets the crawl delay for a specific user agent
    ///
    /// A group naming the agent wins over the `*` group.
    ///
    /// # Returns
    ///
    /// * `Some(f64)` - The crawl delay in seconds
    /// * `None` - If no applicable crawl delay is specified
    pub fn crawl_delay(&self, user_agent: &str) -> Option<f64> {
        let agent = user_agent.to_lowercase();

        let mut group_agents: Vec<String> = Vec::new();
        let mut in_agent_lines = false;
        let mut wildcard_delay: Option<f64> = None;
        let mut agent_delay: Option<f64> = None;

        for (key, value) in directives(&self.content) {
            match key.as_str() {
                "user-agent" => {
                    // Consecutive User-agent lines share one group
                    if !in_agent_lines {
                        group_agents.clear();
                    }
                    in_agent_lines = true;
                    group_agents.push(value.to_lowercase());
                }
                "crawl-delay" => {
                    in_agent_lines = false;
                    let delay = match value.parse::<f64>() {
                        Ok(delay) if delay.is_finite() && delay >= 0.0 => delay,
                        _ => continue,
                    };

                    if group_agents.iter().any(|ua| ua != "*" && agent.contains(ua.as_str())) {
                        agent_delay.get_or_insert(delay);
                    } else if group_agents.iter().any(|ua| ua == "*") {
                        wildcard_delay.get_or_insert(delay);
                    }
                }
                _ => in_agent_lines = false,
            }
        }

        agent_delay.or(wildcard_delay)
    }
}

/// Iterates `key: value` directives, lowercasing keys and skipping comments
fn directives(content: &str) -> impl Iterator<Item = (String, String)> + '_ {
    content.lines().filter_map(|line| {
        let line = match line.split_once('#') {
            Some((before, _)) => before,
            None => line,
        };
        let (key, value) = line.trim().split_once(':')?;
        Some((key.trim().to_lowercase(), value.trim().to_string()))
    })
}

fn extract_sitemaps(content: &str) -> Vec<String> {
    directives(content)
        .filter(|(key, value)| key == "sitemap" && !value.is_empty())
        .map(|(_, value)| value)
        .collect()
}
