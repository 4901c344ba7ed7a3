//! Apply engine configuration
//!
//! One explicit value threaded through the engine's call sites; there is
//! no global state and no environment parsing. The declared resource set
//! stays the only configuration surface for the topology itself.

use std::time::Duration;

/// Tuning for a single deployment run
#[derive(Debug, Clone)]
pub struct ApplyConfig {
    /// Upper bound on resources applying concurrently
    pub max_concurrency: usize,

    /// How long a draining target may hold its in-flight connections
    /// before removal is forced
    pub drain_timeout: Duration,
}

impl Default for ApplyConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            drain_timeout: Duration::from_secs(300),
        }
    }
}

impl ApplyConfig {
    /// Override the concurrency bound
    ///
    /// A bound of zero is treated as one: the engine always makes progress.
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    /// Override the drain timeout
    pub fn with_drain_timeout(mut self, drain_timeout: Duration) -> Self {
        self.drain_timeout = drain_timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ApplyConfig::default();
        assert_eq!(config.max_concurrency, 4);
        assert_eq!(config.drain_timeout, Duration::from_secs(300));
    }

    #[test]
    fn test_zero_concurrency_clamped() {
        let config = ApplyConfig::default().with_max_concurrency(0);
        assert_eq!(config.max_concurrency, 1);
    }
}
