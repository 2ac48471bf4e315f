//! User-agent rotation.

use rand::seq::SliceRandom;

/// Used when the configured list is empty.
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// A fixed list of user-agent strings, sampled uniformly per request.
#[derive(Debug, Clone, Default)]
pub struct UserAgents {
    agents: Vec<String>,
}

impl UserAgents {
    pub fn new(agents: Vec<String>) -> Self {
        Self { agents }
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Picks a user agent uniformly at random.
    pub fn choose(&self) -> &str {
        self.agents
            .choose(&mut rand::thread_rng())
            .map(String::as_str)
            .unwrap_or(DEFAULT_USER_AGENT)
    }
}
