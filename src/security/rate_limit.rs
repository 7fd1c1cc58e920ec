//! Fixed-window request limiter keyed by client address

use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::core::config::RateLimitConfig;
use crate::core::error::{Error, Result};
use crate::system::metrics::Metrics;

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

/// Per-client request counter that resets every `window`
pub struct RateLimiter {
    windows: DashMap<String, Window>,
    window: Duration,
    max_requests: u32,
}

impl RateLimiter {
    /// Build from rate limit configuration
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            windows: DashMap::new(),
            window: config.window,
            max_requests: config.max_requests,
        }
    }

    /// Count one request for `client`
    pub fn check(&self, client: &str) -> Result<()> {
        self.check_at(client, Instant::now())
    }

    /// `check` with an explicit clock
    pub fn check_at(&self, client: &str, now: Instant) -> Result<()> {
        let mut entry = self.windows.entry(client.to_string()).or_insert(Window {
            started: now,
            count: 0,
        });
        let window = entry.value_mut();

        let elapsed = now.saturating_duration_since(window.started);
        if elapsed >= self.window {
            window.started = now;
            window.count = 0;
        }

        if window.count >= self.max_requests {
            let remaining = self.window.saturating_sub(elapsed);
            let retry_after_secs = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
            drop(entry);

            Metrics::global().rate_limited.inc();
            tracing::warn!("Rate limit hit for {}", client);
            return Err(Error::RateLimited {
                retry_after_secs: retry_after_secs.max(1),
            });
        }

        window.count += 1;
        Ok(())
    }

    /// Forget windows that have fully elapsed
    pub fn purge_stale(&self) -> usize {
        let now = Instant::now();
        let before = self.windows.len();
        self.windows
            .retain(|_, w| now.saturating_duration_since(w.started) < self.window);
        before.saturating_sub(self.windows.len())
    }

    /// Number of clients currently tracked
    pub fn tracked_clients(&self) -> usize {
        self.windows.len()
    }
}
