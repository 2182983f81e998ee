//! In-memory rate limiter.
//!
//! Fixed-window counters in a HashMap. Fine for a single server; counters
//! are lost on restart. Expired windows are purged every few minutes on
//! the next check.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::config::RateLimitConfig;
use crate::ports::{
    RateLimitDenied, RateLimitError, RateLimitKey, RateLimitResult, RateLimitScope,
    RateLimitStatus, RateLimiter,
};

const PURGE_EVERY: Duration = Duration::from_secs(300);

/// In-memory fixed-window rate limiter.
#[derive(Debug)]
pub struct InMemoryRateLimiter {
    config: RateLimitConfig,
    state: Mutex<Windows>,
}

#[derive(Debug)]
struct Windows {
    by_key: HashMap<RateLimitKey, WindowState>,
    last_purge: Instant,
}

/// Counter for one key.
#[derive(Debug, Clone)]
struct WindowState {
    count: u32,
    window_start: Instant,
    window: Duration,
}

impl WindowState {
    fn resets_at(&self) -> Instant {
        self.window_start + self.window
    }
}

impl InMemoryRateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            state: Mutex::new(Windows {
                by_key: HashMap::new(),
                last_purge: Instant::now(),
            }),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(RateLimitConfig::default())
    }

    /// Number of keys with a live counter.
    pub async fn tracked_keys(&self) -> usize {
        self.state.lock().await.by_key.len()
    }

    fn limits_for(&self, scope: RateLimitScope) -> (u32, Duration) {
        match scope {
            RateLimitScope::Ip | RateLimitScope::User => {
                (self.config.api_requests_per_window, self.config.api_window())
            }
            RateLimitScope::Connection => {
                (self.config.ws_frames_per_window, self.config.ws_window())
            }
        }
    }
}

#[async_trait]
impl RateLimiter for InMemoryRateLimiter {
    async fn check(&self, key: RateLimitKey) -> Result<RateLimitResult, RateLimitError> {
        let (limit, window) = self.limits_for(key.scope);
        if !self.config.enabled {
            return Ok(RateLimitResult::Allowed(RateLimitStatus {
                limit,
                remaining: limit,
                resets_in: window,
            }));
        }

        let now = Instant::now();
        let mut state = self.state.lock().await;

        if now.duration_since(state.last_purge) >= PURGE_EVERY {
            state.by_key.retain(|_, w| w.resets_at() > now);
            state.last_purge = now;
        }

        let scope = key.scope;
        let entry = state.by_key.entry(key).or_insert_with(|| WindowState {
            count: 0,
            window_start: now,
            window,
        });
        if now >= entry.resets_at() {
            entry.count = 0;
            entry.window_start = now;
        }

        let resets_in = entry.resets_at().saturating_duration_since(now);
        if entry.count >= limit {
            return Ok(RateLimitResult::Denied(RateLimitDenied {
                limit,
                retry_after_secs: resets_in.as_secs_f64().ceil().max(1.0) as u64,
                scope,
            }));
        }

        entry.count += 1;
        Ok(RateLimitResult::Allowed(RateLimitStatus {
            limit,
            remaining: limit - entry.count,
            resets_in,
        }))
    }
}
