//! Per-client token bucket rate limiting.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::warn;

use super::{Middleware, Next};
use crate::config::Config;
use crate::error::{AppError, HandlerResult};
use crate::http::Request;
use crate::state::AppState;

struct TokenBucket {
    tokens: f64,
    last_update: Instant,
}

impl TokenBucket {
    fn new(capacity: f64) -> Self {
        Self {
            tokens: capacity,
            last_update: Instant::now(),
        }
    }

    fn try_acquire(&mut self, capacity: f64, refill_rate: f64) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_update).as_secs_f64();

        self.tokens = (self.tokens + elapsed * refill_rate).min(capacity);
        self.last_update = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Token buckets keyed by client
pub struct RateLimiter {
    buckets: DashMap<String, TokenBucket>,
    rps: f64,
    burst: f64,
}

impl RateLimiter {
    pub fn new(rps: u32, burst: u32) -> Self {
        Self {
            buckets: DashMap::new(),
            rps: f64::from(rps),
            burst: f64::from(burst.max(1)),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.rate_limit_rps, config.rate_limit_burst)
    }

    /// Take one token from `key`'s bucket
    pub fn check(&self, key: &str) -> bool {
        let mut bucket = self
            .buckets
            .entry(key.to_string())
            .or_insert_with(|| TokenBucket::new(self.burst));
        bucket.try_acquire(self.burst, self.rps)
    }

    /// Drop buckets untouched for `idle`; returns how many
    pub fn prune_idle(&self, idle: Duration) -> usize {
        let before = self.buckets.len();
        self.buckets
            .retain(|_, bucket| bucket.last_update.elapsed() < idle);
        before.saturating_sub(self.buckets.len())
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

/// Client identity used as the bucket key
pub fn client_key(req: &Request) -> String {
    if let Some(ip) = req.client_ip() {
        return ip.to_string();
    }
    req.header("x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or("unknown")
        .to_string()
}

/// Rejects clients that exhausted their bucket with 429
pub struct RateLimitMiddleware;

impl Middleware for RateLimitMiddleware {
    fn name(&self) -> &'static str {
        "RateLimit"
    }

    fn handle(&self, state: &AppState, req: &mut Request, next: Next<'_>) -> HandlerResult {
        let key = client_key(req);
        if state.rate_limiter.check(&key) {
            next.run(state, req)
        } else {
            warn!(client = %key, path = %req.path(), "Rate limit exceeded");
            Err(AppError::TooManyRequests)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Session;

    #[test]
    fn burst_then_reject() {
        let limiter = RateLimiter::new(0, 2);
        assert!(limiter.check("10.0.0.1"));
        assert!(limiter.check("10.0.0.1"));
        assert!(!limiter.check("10.0.0.1"));
        // Other clients have their own bucket
        assert!(limiter.check("10.0.0.2"));
    }

    #[test]
    fn prune_drops_idle_buckets() {
        let limiter = RateLimiter::new(1, 1);
        limiter.check("a");
        assert_eq!(limiter.prune_idle(Duration::from_secs(3600)), 0);
        assert_eq!(limiter.prune_idle(Duration::ZERO), 1);
        assert!(limiter.is_empty());
    }

    #[test]
    fn client_key_prefers_peer_then_forwarded_header() {
        let http = axum::http::Request::builder()
            .uri("/")
            .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
            .body(bytes::Bytes::new())
            .unwrap();
        let req = Request::from_http(http, Session::fresh("s".into()));
        assert_eq!(client_key(&req), "203.0.113.7");

        let req = req.with_client_ip(Some("192.0.2.1".parse().unwrap()));
        assert_eq!(client_key(&req), "192.0.2.1");

        let http = axum::http::Request::builder()
            .uri("/")
            .body(bytes::Bytes::new())
            .unwrap();
        let req = Request::from_http(http, Session::fresh("s".into()));
        assert_eq!(client_key(&req), "unknown");
    }
}
