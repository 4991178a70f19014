//! Request rate limiting
//!
//! `FixedWindowLimiter` counts requests per key in fixed windows and backs
//! the public API and contact/subscribe limits. `LoginRateLimiter` tracks
//! failed logins per username. Both are process-local.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Outcome of a rate-limit check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    /// Requests left in the current window
    pub remaining: u32,
    /// Time until the window resets; zero when allowed
    pub retry_after: Duration,
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started_at: DateTime<Utc>,
    count: u32,
}

#[derive(Debug, Clone)]
pub struct FixedWindowLimiter {
    window: Duration,
    max_requests: u32,
    windows: Arc<RwLock<HashMap<String, Window>>>,
}

impl FixedWindowLimiter {
    pub fn new(window: Duration, max_requests: u32) -> Self {
        Self {
            window,
            max_requests,
            windows: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    fn window_len(&self) -> ChronoDuration {
        ChronoDuration::from_std(self.window).unwrap_or_else(|_| ChronoDuration::days(365))
    }

    pub async fn check(&self, key: &str) -> RateDecision {
        self.check_at(key, Utc::now()).await
    }

    /// Check and count one request for `key` at `now`
    pub async fn check_at(&self, key: &str, now: DateTime<Utc>) -> RateDecision {
        let window_len = self.window_len();
        let mut windows = self.windows.write().await;

        let entry = windows.entry(key.to_string()).or_insert(Window {
            started_at: now,
            count: 0,
        });
        if now >= entry.started_at + window_len {
            *entry = Window {
                started_at: now,
                count: 0,
            };
        }

        if entry.count >= self.max_requests {
            let reset_at = entry.started_at + window_len;
            return RateDecision {
                allowed: false,
                remaining: 0,
                retry_after: (reset_at - now).to_std().unwrap_or(Duration::ZERO),
            };
        }

        entry.count += 1;
        RateDecision {
            allowed: true,
            remaining: self.max_requests - entry.count,
            retry_after: Duration::ZERO,
        }
    }

    /// Drop expired windows, returning how many were removed
    pub async fn sweep(&self) -> usize {
        self.sweep_at(Utc::now()).await
    }

    pub async fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let window_len = self.window_len();
        let mut windows = self.windows.write().await;
        let before = windows.len();
        windows.retain(|_, w| now < w.started_at + window_len);
        before - windows.len()
    }

    pub async fn tracked_keys(&self) -> usize {
        self.windows.read().await.len()
    }
}

const LOGIN_MAX_FAILURES: usize = 5;
pub const LOGIN_WINDOW_MINUTES: i64 = 15;

/// Failed-login tracking, 5 failures per 15 minutes per username
#[derive(Debug, Clone, Default)]
pub struct LoginRateLimiter {
    failures: Arc<RwLock<HashMap<String, Vec<DateTime<Utc>>>>>,
}

impl LoginRateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn is_limited(&self, username: &str) -> bool {
        let cutoff = Utc::now() - ChronoDuration::minutes(LOGIN_WINDOW_MINUTES);
        let mut failures = self.failures.write().await;
        match failures.get_mut(&username.to_lowercase()) {
            Some(times) => {
                times.retain(|t| *t > cutoff);
                times.len() >= LOGIN_MAX_FAILURES
            }
            None => false,
        }
    }

    pub async fn record_failure(&self, username: &str) {
        self.failures
            .write()
            .await
            .entry(username.to_lowercase())
            .or_default()
            .push(Utc::now());
    }

    pub async fn clear(&self, username: &str) {
        self.failures.write().await.remove(&username.to_lowercase());
    }

    pub async fn sweep(&self) -> usize {
        let cutoff = Utc::now() - ChronoDuration::minutes(LOGIN_WINDOW_MINUTES);
        let mut failures = self.failures.write().await;
        let before = failures.len();
        failures.retain(|_, times| {
            times.retain(|t| *t > cutoff);
            !times.is_empty()
        });
        before - failures.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    #[tokio::test]
    async fn test_window_allows_then_denies() {
        let limiter = FixedWindowLimiter::new(Duration::from_secs(60), 3);

        for expected_remaining in [2, 1, 0] {
            let decision = limiter.check_at("1.2.3.4", at(0)).await;
            assert!(decision.allowed);
            assert_eq!(decision.remaining, expected_remaining);
        }

        let denied = limiter.check_at("1.2.3.4", at(20)).await;
        assert!(!denied.allowed);
        assert_eq!(denied.retry_after, Duration::from_secs(40));

        // Other keys are independent
        assert!(limiter.check_at("5.6.7.8", at(20)).await.allowed);
    }

    #[tokio::test]
    async fn test_new_window_after_expiry() {
        let limiter = FixedWindowLimiter::new(Duration::from_secs(60), 1);
        assert!(limiter.check_at("k", at(0)).await.allowed);
        assert!(!limiter.check_at("k", at(59)).await.allowed);
        let fresh = limiter.check_at("k", at(60)).await;
        assert!(fresh.allowed);
        assert_eq!(fresh.remaining, 0);
    }

    #[tokio::test]
    async fn test_sweep_removes_only_expired() {
        let limiter = FixedWindowLimiter::new(Duration::from_secs(60), 5);
        limiter.check_at("old", at(0)).await;
        limiter.check_at("new", at(50)).await;

        assert_eq!(limiter.sweep_at(at(70)).await, 1);
        assert_eq!(limiter.tracked_keys().await, 1);
        assert_eq!(limiter.sweep_at(at(200)).await, 1);
        assert_eq!(limiter.tracked_keys().await, 0);
    }

    #[tokio::test]
    async fn test_login_limiter() {
        let limiter = LoginRateLimiter::new();
        for _ in 0..4 {
            limiter.record_failure("Admin").await;
        }
        assert!(!limiter.is_limited("admin").await);
        limiter.record_failure("ADMIN").await;
        assert!(limiter.is_limited("admin").await);

        limiter.clear("admin").await;
        assert!(!limiter.is_limited("Admin").await);
        assert_eq!(limiter.sweep().await, 0);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(20))]

        #[test]
        fn allowed_requests_never_exceed_limit(
            max in 1u32..20,
            offsets in proptest::collection::vec(0i64..59, 1..60),
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let allowed = rt.block_on(async {
                let limiter = FixedWindowLimiter::new(Duration::from_secs(60), max);
                let mut sorted = offsets.clone();
                sorted.sort_unstable();
                let mut allowed = 0u32;
                for offset in sorted {
                    if limiter.check_at("ip", at(offset)).await.allowed {
                        allowed += 1;
                    }
                }
                allowed
            });
            prop_assert_eq!(allowed, max.min(offsets.len() as u32));
        }
    }
}
