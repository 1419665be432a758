//! Sliding-window admission control for the gateway routes.
//!
//! One timestamp sequence per `(client ip, route)` key; each check
//! prunes entries older than the window before counting. Memory is
//! bounded by an opportunistic sweep throttled to once per minute, so
//! no background scheduler is needed.

use std::collections::HashMap;
use std::sync::Mutex;

use axum::http::header::HeaderMap;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use auditor_core::current_unix_timestamp_ms;

const SWEEP_INTERVAL_MS: u64 = 60_000;
/// Generous ceiling past every route window; keys whose timestamps all
/// aged beyond it are dropped by the sweep.
const SWEEP_CEILING_MS: u64 = 5 * 60_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub limit: u32,
    pub window_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// Gateway routes with independent admission budgets. Writes that
/// trigger pipeline work are tight; reads are sized for a dashboard
/// polling every couple of seconds.
pub enum RouteKey {
    Simulate,
    AnalyzePost,
    Seed,
    Actions,
    StripeWebhook,
    AnalyzeGet,
    AnalyzeGetById,
}

impl RouteKey {
    pub fn name(self) -> &'static str {
        match self {
            RouteKey::Simulate => "simulate",
            RouteKey::AnalyzePost => "analyze_post",
            RouteKey::Seed => "seed",
            RouteKey::Actions => "actions",
            RouteKey::StripeWebhook => "stripe_webhook",
            RouteKey::AnalyzeGet => "analyze_get",
            RouteKey::AnalyzeGetById => "analyze_get_by_id",
        }
    }

    pub fn config(self) -> RateLimitConfig {
        match self {
            RouteKey::Simulate | RouteKey::AnalyzePost => RateLimitConfig {
                limit: 5,
                window_ms: 60_000,
            },
            RouteKey::Seed => RateLimitConfig {
                limit: 3,
                window_ms: 60_000,
            },
            RouteKey::Actions => RateLimitConfig {
                limit: 10,
                window_ms: 60_000,
            },
            RouteKey::StripeWebhook => RateLimitConfig {
                limit: 20,
                window_ms: 60_000,
            },
            RouteKey::AnalyzeGet | RouteKey::AnalyzeGetById => RateLimitConfig {
                limit: 60,
                window_ms: 60_000,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Unix seconds at which the window frees a slot.
    pub reset_at_unix: u64,
}

impl RateLimitDecision {
    /// Seconds the caller should wait before retrying, never below 1.
    pub fn retry_after_secs(&self, now_unix_ms: u64) -> u64 {
        self.reset_at_unix.saturating_sub(now_unix_ms / 1_000).max(1)
    }
}

#[derive(Debug, Default)]
struct RateLimiterState {
    entries: HashMap<String, Vec<u64>>,
    last_sweep_unix_ms: u64,
}

#[derive(Debug, Default)]
pub struct RateLimiter {
    state: Mutex<RateLimiterState>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluates one request against the key's sliding window. Takes
    /// `now` as a parameter so tests control time; the caller never
    /// sees an error from this path.
    pub fn check(
        &self,
        key: &str,
        config: RateLimitConfig,
        now_unix_ms: u64,
    ) -> RateLimitDecision {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Self::sweep(&mut state, now_unix_ms);

        let window_start = now_unix_ms.saturating_sub(config.window_ms);
        let timestamps = state.entries.entry(key.to_string()).or_default();
        timestamps.retain(|&stamp| stamp > window_start);

        if timestamps.len() >= config.limit as usize {
            let oldest_in_window = timestamps.first().copied().unwrap_or(now_unix_ms);
            return RateLimitDecision {
                allowed: false,
                limit: config.limit,
                remaining: 0,
                reset_at_unix: unix_seconds_ceil(oldest_in_window + config.window_ms),
            };
        }

        timestamps.push(now_unix_ms);
        RateLimitDecision {
            allowed: true,
            limit: config.limit,
            remaining: config.limit - timestamps.len() as u32,
            reset_at_unix: unix_seconds_ceil(now_unix_ms + config.window_ms),
        }
    }

    /// Throttled sweep: runs inline under the already-held lock at most
    /// once per interval and drops keys with no timestamp newer than
    /// the ceiling.
    fn sweep(state: &mut RateLimiterState, now_unix_ms: u64) {
        if now_unix_ms.saturating_sub(state.last_sweep_unix_ms) < SWEEP_INTERVAL_MS {
            return;
        }
        state.last_sweep_unix_ms = now_unix_ms;

        let cutoff = now_unix_ms.saturating_sub(SWEEP_CEILING_MS);
        state.entries.retain(|_, timestamps| {
            timestamps.retain(|&stamp| stamp > cutoff);
            !timestamps.is_empty()
        });
    }

    #[cfg(test)]
    fn tracked_keys(&self) -> usize {
        self.state
            .lock()
            .map(|state| state.entries.len())
            .unwrap_or(0)
    }
}

fn unix_seconds_ceil(unix_ms: u64) -> u64 {
    unix_ms.div_ceil(1_000)
}

/// First `x-forwarded-for` entry, or the loopback placeholder when the
/// header is absent (direct local callers).
pub fn client_ip(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| "127.0.0.1".to_string())
}

/// Checks the route budget for this caller and builds the 429 response
/// when the window is exhausted. Allowed calls get the decision back so
/// the handler can attach quota headers to its own response.
pub fn enforce_rate_limit(
    limiter: &RateLimiter,
    headers: &HeaderMap,
    route: RouteKey,
) -> Result<RateLimitDecision, Response> {
    let now_unix_ms = current_unix_timestamp_ms();
    let key = format!("{}:{}", client_ip(headers), route.name());
    let decision = limiter.check(&key, route.config(), now_unix_ms);
    if decision.allowed {
        return Ok(decision);
    }

    let retry_after = decision.retry_after_secs(now_unix_ms);
    let mut response = (
        StatusCode::TOO_MANY_REQUESTS,
        Json(json!({
            "error": "Too many requests",
            "retryAfter": retry_after,
        })),
    )
        .into_response();
    apply_rate_limit_headers(response.headers_mut(), &decision, Some(retry_after));
    Err(response)
}

/// Quota headers exposed on every rate-limited route, plus
/// `Retry-After` on rejections.
pub fn apply_rate_limit_headers(
    headers: &mut HeaderMap,
    decision: &RateLimitDecision,
    retry_after: Option<u64>,
) {
    let insert = |headers: &mut HeaderMap, name: &'static str, value: String| {
        if let Ok(value) = value.parse() {
            headers.insert(name, value);
        }
    };
    insert(headers, "x-ratelimit-limit", decision.limit.to_string());
    insert(headers, "x-ratelimit-remaining", decision.remaining.to_string());
    insert(headers, "x-ratelimit-reset", decision.reset_at_unix.to_string());
    if let Some(retry_after) = retry_after {
        insert(headers, "retry-after", retry_after.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: RateLimitConfig = RateLimitConfig {
        limit: 5,
        window_ms: 60_000,
    };

    #[test]
    fn unit_sixth_call_in_window_is_rejected_with_zero_remaining() {
        let limiter = RateLimiter::new();
        let now = 1_000_000;
        for call in 0..5 {
            let decision = limiter.check("10.0.0.1:simulate", WINDOW, now + call);
            assert!(decision.allowed, "call {call} should be admitted");
        }
        let rejected = limiter.check("10.0.0.1:simulate", WINDOW, now + 5);
        assert!(!rejected.allowed);
        assert_eq!(rejected.remaining, 0);
        assert!(rejected.retry_after_secs(now + 5) >= 1);
    }

    #[test]
    fn unit_window_expiry_admits_again() {
        let limiter = RateLimiter::new();
        let now = 1_000_000;
        for _ in 0..5 {
            limiter.check("key", WINDOW, now);
        }
        assert!(!limiter.check("key", WINDOW, now + 1).allowed);
        assert!(limiter.check("key", WINDOW, now + WINDOW.window_ms + 1).allowed);
    }

    #[test]
    fn unit_remaining_counts_down_per_admitted_call() {
        let limiter = RateLimiter::new();
        let first = limiter.check("key", WINDOW, 5_000);
        let second = limiter.check("key", WINDOW, 5_001);
        assert_eq!(first.remaining, 4);
        assert_eq!(second.remaining, 3);
    }

    #[test]
    fn unit_keys_are_independent() {
        let limiter = RateLimiter::new();
        let now = 9_000;
        for _ in 0..5 {
            limiter.check("a:simulate", WINDOW, now);
        }
        assert!(!limiter.check("a:simulate", WINDOW, now).allowed);
        assert!(limiter.check("b:simulate", WINDOW, now).allowed);
        assert!(limiter.check("a:seed", RouteKey::Seed.config(), now).allowed);
    }

    #[test]
    fn unit_reset_at_derives_from_the_oldest_entry_still_in_window() {
        let limiter = RateLimiter::new();
        let config = RateLimitConfig {
            limit: 2,
            window_ms: 10_000,
        };
        limiter.check("key", config, 100_000);
        limiter.check("key", config, 104_000);
        let rejected = limiter.check("key", config, 105_000);
        assert!(!rejected.allowed);
        // Oldest in-window entry (100s) plus the 10s window.
        assert_eq!(rejected.reset_at_unix, 110);
    }

    #[test]
    fn unit_sweep_drops_fully_aged_keys_and_is_throttled() {
        let limiter = RateLimiter::new();
        limiter.check("stale", WINDOW, 1_000_000);
        assert_eq!(limiter.tracked_keys(), 1);

        // Inside the sweep interval: the stale key survives.
        limiter.check("fresh", WINDOW, 1_030_000);
        assert_eq!(limiter.tracked_keys(), 2);

        // Past the interval and the ceiling: the stale key is dropped.
        limiter.check("fresh", WINDOW, 1_000_000 + SWEEP_CEILING_MS + SWEEP_INTERVAL_MS);
        assert_eq!(limiter.tracked_keys(), 1);
    }

    #[test]
    fn unit_client_ip_prefers_first_forwarded_entry() {
        let mut headers = HeaderMap::new();
        assert_eq!(client_ip(&headers), "127.0.0.1");
        headers.insert("x-forwarded-for", "203.0.113.7, 10.0.0.1".parse().expect("header"));
        assert_eq!(client_ip(&headers), "203.0.113.7");
    }

    #[test]
    fn unit_write_routes_are_tighter_than_read_routes() {
        assert!(RouteKey::Simulate.config().limit < RouteKey::AnalyzeGet.config().limit);
        assert!(RouteKey::Seed.config().limit < RouteKey::Actions.config().limit);
    }
}
