//! Failed-login throttling keyed by login identifier

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::AuthConfig;

/// Map size from which lapsed entries are swept on each new failure
const EVICTION_THRESHOLD: usize = 1024;

#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Failures tolerated within `window` before locking
    pub max_failures: u32,
    pub window: Duration,
    pub lockout: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_failures: 5,
            window: Duration::from_secs(300),
            lockout: Duration::from_secs(900),
        }
    }
}

impl From<&AuthConfig> for RateLimiterConfig {
    fn from(config: &AuthConfig) -> Self {
        Self {
            max_failures: config.max_failed_logins,
            window: config.login_failure_window,
            lockout: config.login_lockout,
        }
    }
}

#[derive(Debug)]
struct FailureEntry {
    failures: u32,
    window_start: Instant,
    locked_until: Option<Instant>,
}

/// In-process failure counter shared by every request
#[derive(Debug, Clone)]
pub struct RateLimiter {
    config: RateLimiterConfig,
    entries: Arc<Mutex<HashMap<String, FailureEntry>>>,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            config,
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Whether `key` may attempt a login now
    pub async fn is_allowed(&self, key: &str) -> bool {
        let mut entries = self.entries.lock().await;
        let Some(locked_until) = entries.get(key).map(|entry| entry.locked_until) else {
            return true;
        };

        match locked_until {
            Some(until) if Instant::now() < until => false,
            Some(_) => {
                entries.remove(key);
                true
            }
            None => true,
        }
    }

    /// Count a failed attempt, locking the key once the budget is spent
    pub async fn record_failure(&self, key: &str) {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();

        if entries.len() >= EVICTION_THRESHOLD {
            self.evict_stale(&mut entries, now);
        }

        let entry = entries.entry(key.to_string()).or_insert(FailureEntry {
            failures: 0,
            window_start: now,
            locked_until: None,
        });

        if now.duration_since(entry.window_start) >= self.config.window {
            entry.failures = 0;
            entry.window_start = now;
        }

        entry.failures += 1;
        if entry.failures >= self.config.max_failures && entry.locked_until.is_none() {
            entry.locked_until = Some(now + self.config.lockout);
            warn!(
                failures = entry.failures,
                lockout_secs = self.config.lockout.as_secs(),
                "Login identifier locked after repeated failures"
            );
        }
    }

    pub async fn reset(&self, key: &str) {
        self.entries.lock().await.remove(key);
    }

    /// Drop entries whose window has lapsed and whose lock, if any, is over
    fn evict_stale(&self, entries: &mut HashMap<String, FailureEntry>, now: Instant) {
        let before = entries.len();
        entries.retain(|_, entry| match entry.locked_until {
            Some(until) => now < until,
            None => now.duration_since(entry.window_start) < self.config.window,
        });
        debug!(evicted = before - entries.len(), "Evicted stale login failure entries");
    }

    #[cfg(test)]
    async fn tracked_keys(&self) -> usize {
        self.entries.lock().await.len()
    }
}
