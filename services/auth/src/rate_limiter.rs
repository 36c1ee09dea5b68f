//! In-memory rate limiter for credential endpoints
//!
//! Attempts are counted per `<route>:<subject>` in a fixed window, where the
//! subject is a client address or an account identifier. A key that exceeds
//! the budget is banned for a fixed period.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use common::error::{ApiError, ApiResult};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Table size at which idle entries are swept
const PRUNE_THRESHOLD: usize = 1024;

#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    pub max_attempts: u32,
    pub window: Duration,
    pub ban: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            window: Duration::from_secs(300),
            ban: Duration::from_secs(3600),
        }
    }
}

#[derive(Debug)]
struct Entry {
    attempts: u32,
    window_start: Instant,
    banned_until: Option<Instant>,
}

impl Entry {
    /// Still carries state: an open window or a running ban
    fn is_live(&self, now: Instant, window: Duration) -> bool {
        self.banned_until.is_some_and(|until| now < until)
            || now.duration_since(self.window_start) < window
    }
}

#[derive(Debug, Clone)]
pub struct RateLimiter {
    config: RateLimiterConfig,
    entries: Arc<Mutex<HashMap<String, Entry>>>,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            config,
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Record an attempt and report whether it may proceed
    pub async fn is_allowed(&self, key: &str) -> bool {
        self.is_allowed_at(key, Instant::now()).await
    }

    async fn is_allowed_at(&self, key: &str, now: Instant) -> bool {
        let mut entries = self.entries.lock().await;

        if entries.len() >= PRUNE_THRESHOLD {
            Self::prune(&mut entries, now, self.config.window);
        }

        let entry = entries.entry(key.to_string()).or_insert(Entry {
            attempts: 0,
            window_start: now,
            banned_until: None,
        });

        if let Some(banned_until) = entry.banned_until {
            if now < banned_until {
                return false;
            }
            entry.banned_until = None;
            entry.attempts = 0;
            entry.window_start = now;
        }

        if now.duration_since(entry.window_start) >= self.config.window {
            entry.attempts = 0;
            entry.window_start = now;
        }

        if entry.attempts >= self.config.max_attempts {
            entry.banned_until = Some(now + self.config.ban);
            warn!("Banned {} for {} seconds", key, self.config.ban.as_secs());
            return false;
        }

        entry.attempts += 1;
        true
    }

    fn prune(entries: &mut HashMap<String, Entry>, now: Instant, window: Duration) {
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now, window));
        debug!("Pruned {} idle rate limit entries", before - entries.len());
    }

    /// Reject with 429 when `subject` is over budget for `route`
    pub async fn check(&self, route: &str, subject: &str) -> ApiResult<()> {
        if self.is_allowed(&format!("{route}:{subject}")).await {
            Ok(())
        } else {
            Err(ApiError::TooManyRequests)
        }
    }

    /// Count an attempt against both the client address and the targeted
    /// account. An empty account identifier is only counted per address.
    pub async fn check_attempt(&self, route: &str, ip: &str, account: &str) -> ApiResult<()> {
        self.check(&format!("{route}:ip"), ip).await?;

        let account = account.trim().to_lowercase();
        if !account.is_empty() {
            self.check(&format!("{route}:account"), &account).await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter() -> RateLimiter {
        RateLimiter::new(RateLimiterConfig::default())
    }

    #[tokio::test]
    async fn test_sixth_attempt_in_window_is_rejected() {
        let limiter = limiter();
        let now = Instant::now();

        for _ in 0..5 {
            assert!(limiter.is_allowed_at("login:1.2.3.4", now).await);
        }
        assert!(!limiter.is_allowed_at("login:1.2.3.4", now).await);
    }

    #[tokio::test]
    async fn test_ban_outlasts_window() {
        let limiter = limiter();
        let now = Instant::now();

        for _ in 0..6 {
            limiter.is_allowed_at("login:1.2.3.4", now).await;
        }

        let after_window = now + Duration::from_secs(600);
        assert!(!limiter.is_allowed_at("login:1.2.3.4", after_window).await);

        let after_ban = now + Duration::from_secs(3601);
        assert!(limiter.is_allowed_at("login:1.2.3.4", after_ban).await);
    }

    #[tokio::test]
    async fn test_window_resets_attempts() {
        let limiter = limiter();
        let now = Instant::now();

        for _ in 0..5 {
            limiter.is_allowed_at("otp:1.2.3.4", now).await;
        }

        let later = now + Duration::from_secs(301);
        assert!(limiter.is_allowed_at("otp:1.2.3.4", later).await);
    }

    #[tokio::test]
    async fn test_account_is_limited_across_addresses() {
        let limiter = limiter();

        for i in 0..5 {
            let ip = format!("10.0.0.{i}");
            assert!(limiter.check_attempt("login", &ip, "Ada").await.is_ok());
        }

        assert!(matches!(
            limiter.check_attempt("login", "10.0.0.99", "ada ").await,
            Err(ApiError::TooManyRequests)
        ));
        assert!(limiter.check_attempt("login", "10.0.0.99", "bob").await.is_ok());
    }

    #[tokio::test]
    async fn test_idle_entries_are_pruned() {
        let limiter = limiter();
        let now = Instant::now();

        for i in 0..PRUNE_THRESHOLD {
            limiter.is_allowed_at(&format!("login:ip:{i}"), now).await;
        }
        for _ in 0..6 {
            limiter.is_allowed_at("login:ip:banned", now).await;
        }
        assert_eq!(limiter.entries.lock().await.len(), PRUNE_THRESHOLD + 1);

        let later = now + Duration::from_secs(301);
        assert!(limiter.is_allowed_at("login:ip:fresh", later).await);

        let entries = limiter.entries.lock().await;
        assert_eq!(entries.len(), 2);
        assert!(entries.contains_key("login:ip:banned"));
        assert!(entries.contains_key("login:ip:fresh"));
    }

    #[tokio::test]
    async fn test_routes_and_ips_are_independent() {
        let limiter = limiter();

        for _ in 0..6 {
            let _ = limiter.check("login", "1.2.3.4").await;
        }

        assert!(matches!(
            limiter.check("login", "1.2.3.4").await,
            Err(ApiError::TooManyRequests)
        ));
        assert!(limiter.check("otp", "1.2.3.4").await.is_ok());
        assert!(limiter.check("login", "5.6.7.8").await.is_ok());
    }
}
