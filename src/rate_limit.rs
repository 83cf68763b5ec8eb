//! Sliding-window rate limiter guarding sensitive endpoints (login,
//! password reset, messaging). Windows are tracked as raw timestamp
//! sequences and pruned lazily on access, which avoids the burst artifacts
//! of fixed buckets at window boundaries.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use axum::http::HeaderMap;
use uuid::Uuid;

use crate::errors::{AppError, AppResult};

pub const DEFAULT_MAX_REQUESTS: usize = 10;
pub const DEFAULT_WINDOW_SECONDS: u64 = 60;

pub struct RateLimiter {
    windows: Mutex<HashMap<String, Vec<Instant>>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Record an attempt for `identifier` and report whether it is allowed,
    /// plus how many requests remain in the current window.
    pub fn check(&self, identifier: &str, max_requests: usize, window: Duration) -> (bool, usize) {
        self.check_at(identifier, max_requests, window, Instant::now())
    }

    // Pruning and the limit comparison happen under one lock acquisition so
    // concurrent checks cannot both observe a free slot.
    fn check_at(
        &self,
        identifier: &str,
        max_requests: usize,
        window: Duration,
        now: Instant,
    ) -> (bool, usize) {
        let mut windows = self.windows.lock().expect("rate limiter lock poisoned");
        let timestamps = windows.entry(identifier.to_string()).or_default();

        timestamps.retain(|ts| now.duration_since(*ts) < window);

        if timestamps.len() >= max_requests {
            return (false, 0);
        }

        timestamps.push(now);
        let remaining = max_requests - timestamps.len();
        (true, remaining)
    }

    /// Like `check`, but raises a rate-limit error carrying the configured
    /// limit and window on denial.
    pub fn enforce(&self, identifier: &str, max_requests: usize, window: Duration) -> AppResult<usize> {
        let (allowed, remaining) = self.check(identifier, max_requests, window);
        if !allowed {
            tracing::warn!(identifier, max_requests, "rate limit exceeded");
            return Err(AppError::RateLimited {
                limit: max_requests,
                window_seconds: window.as_secs(),
            });
        }
        Ok(remaining)
    }

    #[cfg(test)]
    fn reset(&self) {
        self.windows.lock().expect("rate limiter lock poisoned").clear();
    }
}

/// Identifier for rate limiting: the authenticated principal id when
/// available, otherwise the network origin.
///
/// When falling back to the network origin, the first entry of the
/// X-Forwarded-For chain is treated as the true client. That is only valid
/// behind a trusted reverse proxy that strips or sets the header; in an
/// untrusted multi-hop topology the value is spoofable.
pub fn client_identifier(headers: &HeaderMap, user_id: Option<Uuid>) -> String {
    if let Some(id) = user_id {
        return format!("user:{id}");
    }

    let ip = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(|value| value.trim().to_string())
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|value| value.to_str().ok())
                .map(String::from)
        })
        .unwrap_or_else(|| "unknown".to_string());

    format!("ip:{ip}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn counts_down_then_denies_then_recovers() {
        let limiter = RateLimiter::new();
        let window = Duration::from_secs(60);
        let base = Instant::now();

        for expected_remaining in [4usize, 3, 2, 1, 0] {
            let (allowed, remaining) = limiter.check_at("u1", 5, window, base);
            assert!(allowed);
            assert_eq!(remaining, expected_remaining);
        }

        let (allowed, remaining) = limiter.check_at("u1", 5, window, base);
        assert!(!allowed);
        assert_eq!(remaining, 0);

        // past the window the slate is clean again
        let later = base + Duration::from_secs(61);
        let (allowed, remaining) = limiter.check_at("u1", 5, window, later);
        assert!(allowed);
        assert_eq!(remaining, 4);
    }

    #[test]
    fn identifiers_are_independent() {
        let limiter = RateLimiter::new();
        let window = Duration::from_secs(60);
        let base = Instant::now();

        let (allowed, _) = limiter.check_at("a", 1, window, base);
        assert!(allowed);
        let (allowed, _) = limiter.check_at("a", 1, window, base);
        assert!(!allowed);

        let (allowed, _) = limiter.check_at("b", 1, window, base);
        assert!(allowed);

        limiter.reset();
        let (allowed, _) = limiter.check_at("a", 1, window, base);
        assert!(allowed);
    }

    #[test]
    fn enforce_raises_with_limit_and_window() {
        let limiter = RateLimiter::new();
        let window = Duration::from_secs(30);

        assert!(limiter.enforce("x", 1, window).is_ok());
        match limiter.enforce("x", 1, window) {
            Err(AppError::RateLimited { limit, window_seconds }) => {
                assert_eq!(limit, 1);
                assert_eq!(window_seconds, 30);
            }
            other => panic!("expected rate limit error, got {other:?}"),
        }
    }

    #[test]
    fn identifier_prefers_user_over_forwarded_ip() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.9, 10.0.0.1"),
        );

        let user = Uuid::new_v4();
        assert_eq!(client_identifier(&headers, Some(user)), format!("user:{user}"));
        assert_eq!(client_identifier(&headers, None), "ip:203.0.113.9");

        let empty = HeaderMap::new();
        assert_eq!(client_identifier(&empty, None), "ip:unknown");
    }
}
