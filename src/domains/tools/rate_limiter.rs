//! Fixed-window rate limiting for generated tools.
//!
//! Counters are keyed by `(protocol, endpoint)` and live in memory only.
//! A window opens at the first request after the previous one expired.
//! Check-and-increment happens under one lock, so concurrent callers can
//! never overshoot the limit.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::domains::protocols::RateLimit;

/// Outcome of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    /// Request admitted; `remaining` requests left in this window.
    Allowed { remaining: u32 },
    /// Request refused until the window resets.
    Limited { retry_after: Duration },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allowed { .. })
    }
}

#[derive(Debug, Clone, Copy)]
struct WindowState {
    window_start: Instant,
    count: u32,
}

impl WindowState {
    fn expired(&self, window: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.window_start) >= window
    }

    fn time_until_reset(&self, window: Duration, now: Instant) -> Duration {
        window.saturating_sub(now.saturating_duration_since(self.window_start))
    }
}

/// In-memory limiter shared by every generated tool.
#[derive(Debug, Default)]
pub struct RateLimiter {
    state: Mutex<HashMap<(String, String), WindowState>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one request against `(protocol, endpoint)` if the limit allows it.
    pub fn check(&self, protocol: &str, endpoint: &str, limit: RateLimit) -> RateDecision {
        self.check_at(protocol, endpoint, limit, Instant::now())
    }

    pub(crate) fn check_at(
        &self,
        protocol: &str,
        endpoint: &str,
        limit: RateLimit,
        now: Instant,
    ) -> RateDecision {
        let window = limit.window.duration();
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        let entry = state
            .entry((protocol.to_string(), endpoint.to_string()))
            .or_insert(WindowState {
                window_start: now,
                count: 0,
            });

        if entry.expired(window, now) {
            entry.window_start = now;
            entry.count = 0;
        }

        if entry.count >= limit.requests {
            return RateDecision::Limited {
                retry_after: entry.time_until_reset(window, now),
            };
        }

        entry.count += 1;
        RateDecision::Allowed {
            remaining: limit.requests - entry.count,
        }
    }

    /// Drop every counter belonging to `protocol`.
    pub fn clear_protocol(&self, protocol: &str) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.retain(|(p, _), _| p != protocol);
    }

    /// Number of tracked `(protocol, endpoint)` windows.
    pub fn tracked(&self) -> usize {
        self.state.lock().map(|s| s.len()).unwrap_or_default()
    }
}
