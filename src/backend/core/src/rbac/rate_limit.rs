//! Fixed-window request counter keyed by user and path.
//!
//! The counter is read first; a caller already at the threshold is rejected
//! without touching it again. Otherwise it is incremented and its expiry is
//! refreshed to the window length. Exact enforcement under concurrent
//! requests is whatever the counter store's atomic increment provides.

use metrics::counter;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use super::models::UserId;
use super::stores::{CounterStore, StoreResult};

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitSettings {
    /// Enable rate limiting
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Requests allowed per user and path within one window
    #[serde(default = "default_requests_per_window")]
    pub requests_per_window: u64,

    /// Window length in seconds
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// Prefix for counter keys
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            requests_per_window: default_requests_per_window(),
            window_secs: default_window_secs(),
            key_prefix: default_key_prefix(),
        }
    }
}

fn default_enabled() -> bool { true }
fn default_requests_per_window() -> u64 { 100 }
fn default_window_secs() -> u64 { 60 }
fn default_key_prefix() -> String { "rate_limit".to_string() }

/// Outcome of one rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    /// Under the limit; `count` is the value after incrementing.
    Allowed { count: u64 },
    /// At or over the limit; `count` is the value that was read.
    Limited { count: u64 },
    /// Rate limiting is switched off.
    Disabled,
}

impl RateDecision {
    pub fn is_limited(&self) -> bool {
        matches!(self, Self::Limited { .. })
    }
}

/// Per-user, per-path request limiter over a [`CounterStore`].
#[derive(Clone)]
pub struct RequestRateLimiter {
    counters: Arc<dyn CounterStore>,
    settings: RateLimitSettings,
}

impl RequestRateLimiter {
    pub fn new(counters: Arc<dyn CounterStore>, settings: RateLimitSettings) -> Self {
        Self { counters, settings }
    }

    pub fn settings(&self) -> &RateLimitSettings {
        &self.settings
    }

    /// Counter key for a user and request path.
    pub fn key(&self, user_id: &UserId, path: &str) -> String {
        format!("{}:{}:{}", self.settings.key_prefix, user_id, path)
    }

    /// Read the counter; reject at the threshold, otherwise count this request.
    pub async fn check(&self, user_id: &UserId, path: &str) -> StoreResult<RateDecision> {
        if !self.settings.enabled {
            return Ok(RateDecision::Disabled);
        }

        let key = self.key(user_id, path);
        let current = self.counters.get(&key).await?.unwrap_or(0);

        if current >= self.settings.requests_per_window {
            counter!("rate_limit_checks_total", "allowed" => "false").increment(1);
            debug!(key = %key, count = current, "Rate limit reached");
            return Ok(RateDecision::Limited { count: current });
        }

        let count = self
            .counters
            .increment_with_expiry(&key, self.settings.window_secs)
            .await?;

        counter!("rate_limit_checks_total", "allowed" => "true").increment(1);
        Ok(RateDecision::Allowed { count })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rbac::memory::InMemoryCounterStore;

    fn limiter(limit: u64) -> (Arc<InMemoryCounterStore>, RequestRateLimiter) {
        let store = Arc::new(InMemoryCounterStore::new());
        let settings = RateLimitSettings {
            requests_per_window: limit,
            ..Default::default()
        };
        (store.clone(), RequestRateLimiter::new(store, settings))
    }

    #[test]
    fn test_settings_defaults() {
        let settings = RateLimitSettings::default();
        assert!(settings.enabled);
        assert_eq!(settings.requests_per_window, 100);
        assert_eq!(settings.window_secs, 60);
    }

    #[test]
    fn test_key_format() {
        let (_, limiter) = limiter(100);
        assert_eq!(
            limiter.key(&UserId::new("u1"), "/api/v1/matters"),
            "rate_limit:u1:/api/v1/matters"
        );
    }

    #[tokio::test]
    async fn test_allows_until_threshold() {
        let (store, limiter) = limiter(3);
        let user = UserId::new("u1");

        for expected in 1..=3 {
            let decision = limiter.check(&user, "/p").await.unwrap();
            assert_eq!(decision, RateDecision::Allowed { count: expected });
        }

        let decision = limiter.check(&user, "/p").await.unwrap();
        assert_eq!(decision, RateDecision::Limited { count: 3 });
        assert_eq!(store.increment_calls(), 3);
        assert_eq!(store.peek("rate_limit:u1:/p"), Some(3));
    }

    #[tokio::test]
    async fn test_seeded_counter_at_threshold_is_limited() {
        let (store, limiter) = limiter(100);
        store.set("rate_limit:u1:/p", 100);

        let decision = limiter.check(&UserId::new("u1"), "/p").await.unwrap();
        assert!(decision.is_limited());
        assert_eq!(store.increment_calls(), 0);
        assert_eq!(store.expire_calls(), 0);
    }

    #[tokio::test]
    async fn test_paths_and_users_counted_separately() {
        let (store, limiter) = limiter(1);
        limiter.check(&UserId::new("u1"), "/a").await.unwrap();

        assert!(!limiter.check(&UserId::new("u1"), "/b").await.unwrap().is_limited());
        assert!(!limiter.check(&UserId::new("u2"), "/a").await.unwrap().is_limited());
        assert!(limiter.check(&UserId::new("u1"), "/a").await.unwrap().is_limited());
        assert_eq!(store.ttl("rate_limit:u1:/a").map(|d| d.as_secs() <= 60), Some(true));
    }

    #[tokio::test]
    async fn test_disabled_skips_store() {
        let store = Arc::new(InMemoryCounterStore::new());
        let settings = RateLimitSettings {
            enabled: false,
            ..Default::default()
        };
        let limiter = RequestRateLimiter::new(store.clone(), settings);

        let decision = limiter.check(&UserId::new("u1"), "/p").await.unwrap();
        assert_eq!(decision, RateDecision::Disabled);
        assert_eq!(store.get_calls(), 0);
    }
}
