//! Registry configuration

use std::time::Duration;

/// Session registry and reaper configuration
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Sessions silent for longer than this are reaped
    pub idle_timeout: Duration,

    /// How often the reaper sweeps
    pub reap_interval: Duration,

    /// How long teardown waits for a worker before aborting it
    pub teardown_grace: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(60),
            reap_interval: Duration::from_secs(30),
            teardown_grace: Duration::from_secs(2),
        }
    }
}

impl RegistryConfig {
    /// Set idle timeout
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Set reaper sweep interval
    pub fn reap_interval(mut self, interval: Duration) -> Self {
        // tokio::time::interval panics on zero
        self.reap_interval = interval.max(Duration::from_millis(1));
        self
    }

    /// Set worker teardown grace period
    pub fn teardown_grace(mut self, grace: Duration) -> Self {
        self.teardown_grace = grace;
        self
    }
}
