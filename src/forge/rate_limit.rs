//! Forge API rate-limit tracking.
//!
//! Reads `X-RateLimit-Remaining` / `X-RateLimit-Reset` (or the standardised
//! `RateLimit-Remaining` / `RateLimit-Reset`) from listing responses and
//! sleeps before the next page when the budget runs low.

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, info};

/// Rate-limit state updated after every forge API response.
#[derive(Debug)]
pub struct RateLimitState {
    /// Remaining API calls before the rate limit resets.
    remaining: AtomicU64,
    /// Unix timestamp at which the rate limit window resets.
    reset_at: AtomicU64,
}

impl Default for RateLimitState {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimitState {
    pub fn new() -> Self {
        Self {
            remaining: AtomicU64::new(u64::MAX),
            reset_at: AtomicU64::new(0),
        }
    }

    pub fn remaining(&self) -> u64 {
        self.remaining.load(Ordering::Relaxed)
    }

    /// Update state from HTTP response headers.
    pub fn update_from_headers(&self, headers: &reqwest::header::HeaderMap) {
        let read = |primary: &str, fallback: &str| {
            headers
                .get(primary)
                .or_else(|| headers.get(fallback))
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
        };

        if let Some(r) = read("X-RateLimit-Remaining", "RateLimit-Remaining") {
            self.remaining.store(r, Ordering::Relaxed);
        }
        if let Some(r) = read("X-RateLimit-Reset", "RateLimit-Reset") {
            self.reset_at.store(r, Ordering::Relaxed);
        }
    }

    /// Seconds to wait before the next call, or `None` when the budget is
    /// still above `buffer` (or the window has already reset).
    fn wait_secs(&self, buffer: u32, now: u64) -> Option<u64> {
        let remaining = self.remaining.load(Ordering::Relaxed);
        let reset = self.reset_at.load(Ordering::Relaxed);

        if remaining == u64::MAX || remaining >= buffer as u64 || reset <= now {
            return None;
        }
        Some(reset - now)
    }

    /// If the remaining calls are below `buffer`, sleep until the rate-limit
    /// window resets.  Returns `true` if the caller had to wait.
    pub async fn wait_if_needed(&self, buffer: u32) -> bool {
        let now = chrono::Utc::now().timestamp().max(0) as u64;
        match self.wait_secs(buffer, now) {
            Some(wait) => {
                info!(
                    remaining = self.remaining(),
                    reset_in_secs = wait,
                    buffer,
                    "self-throttling: rate limit approaching"
                );
                tokio::time::sleep(std::time::Duration::from_secs(wait)).await;
                true
            }
            None => {
                debug!(remaining = self.remaining(), buffer, "rate limit OK");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&'static str, &str)]) -> reqwest::header::HeaderMap {
        let mut headers = reqwest::header::HeaderMap::new();
        for (k, v) in pairs {
            headers.insert(*k, v.parse().unwrap());
        }
        headers
    }

    #[test]
    fn default_remaining_is_max() {
        assert_eq!(RateLimitState::new().remaining(), u64::MAX);
    }

    #[test]
    fn update_from_github_headers() {
        let state = RateLimitState::new();
        state.update_from_headers(&headers(&[
            ("X-RateLimit-Remaining", "42"),
            ("X-RateLimit-Reset", "1700000000"),
        ]));
        assert_eq!(state.remaining(), 42);
        assert_eq!(state.reset_at.load(Ordering::Relaxed), 1700000000);
    }

    #[test]
    fn update_from_ietf_headers() {
        let state = RateLimitState::new();
        state.update_from_headers(&headers(&[
            ("RateLimit-Remaining", "10"),
            ("RateLimit-Reset", "1800000000"),
        ]));
        assert_eq!(state.remaining(), 10);
    }

    #[test]
    fn no_wait_with_unknown_budget() {
        assert_eq!(RateLimitState::new().wait_secs(10, 1000), None);
    }

    #[test]
    fn waits_until_reset_when_below_buffer() {
        let state = RateLimitState::new();
        state.update_from_headers(&headers(&[
            ("X-RateLimit-Remaining", "3"),
            ("X-RateLimit-Reset", "1030"),
        ]));
        assert_eq!(state.wait_secs(10, 1000), Some(30));
        assert_eq!(state.wait_secs(3, 1000), None);
        assert_eq!(state.wait_secs(10, 1030), None);
    }

    #[tokio::test]
    async fn wait_if_needed_returns_immediately_with_budget() {
        let state = RateLimitState::new();
        assert!(!state.wait_if_needed(10).await);
    }
}
