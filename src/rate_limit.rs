//! Per-IP rate limiting for the unauthenticated auth endpoints.
//!
//! Uses a token bucket per client IP. This sits in front of, and is
//! independent from, per-username lockout.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{Quota, RateLimiter, clock::DefaultClock, state::keyed::DefaultKeyedStateStore};
use std::{
    num::NonZeroU32,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};
use tracing::{debug, warn};

use crate::auth::extract_client_ip;
use crate::cli::ClientIpSource;

type KeyedLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// Checks between prunes of fully replenished per-IP buckets.
pub const PRUNE_INTERVAL: u64 = 1024;

/// Per-IP token buckets. Buckets that have refilled completely carry no
/// state and are dropped every [`PRUNE_INTERVAL`] checks.
pub struct IpLimiter {
    limiter: KeyedLimiter,
    checks: AtomicU64,
}

impl IpLimiter {
    pub fn new(quota: Quota) -> Self {
        Self {
            limiter: RateLimiter::keyed(quota),
            checks: AtomicU64::new(0),
        }
    }

    /// Take one token for `ip`. Returns false when the bucket is empty.
    pub fn check(&self, ip: &str) -> bool {
        let allowed = self.limiter.check_key(&ip.to_string()).is_ok();
        if (self.checks.fetch_add(1, Ordering::Relaxed) + 1) % PRUNE_INTERVAL == 0 {
            self.prune();
        }
        allowed
    }

    pub fn prune(&self) {
        let before = self.limiter.len();
        self.limiter.retain_recent();
        self.limiter.shrink_to_fit();
        debug!(before, after = self.limiter.len(), "Pruned rate limiter buckets");
    }

    /// Number of IPs currently holding bucket state.
    pub fn tracked_ips(&self) -> usize {
        self.limiter.len()
    }
}

const fn nonzero(n: u32) -> NonZeroU32 {
    match NonZeroU32::new(n) {
        Some(n) => n,
        None => NonZeroU32::MIN,
    }
}

const LOGIN_PER_SEC: NonZeroU32 = nonzero(1);
const LOGIN_BURST: NonZeroU32 = nonzero(5);
const REGISTER_PER_MIN: NonZeroU32 = nonzero(3);
const REFRESH_PER_SEC: NonZeroU32 = nonzero(10);

/// Rate limiting configuration. A `None` limiter lets every request through.
#[derive(Clone)]
pub struct RateLimitConfig {
    /// 1 request per second with a burst of 5
    pub login: Option<Arc<IpLimiter>>,
    /// 3 requests per minute
    pub register: Option<Arc<IpLimiter>>,
    /// 10 requests per second
    pub refresh: Option<Arc<IpLimiter>>,
    pub client_ip_source: ClientIpSource,
}

impl RateLimitConfig {
    pub fn new(client_ip_source: ClientIpSource) -> Self {
        Self {
            login: Some(Arc::new(IpLimiter::new(
                Quota::per_second(LOGIN_PER_SEC).allow_burst(LOGIN_BURST),
            ))),
            register: Some(Arc::new(IpLimiter::new(Quota::per_minute(
                REGISTER_PER_MIN,
            )))),
            refresh: Some(Arc::new(IpLimiter::new(Quota::per_second(
                REFRESH_PER_SEC,
            )))),
            client_ip_source,
        }
    }

    /// No limits at all, for tests that hammer the auth endpoints.
    pub fn unlimited() -> Self {
        Self {
            login: None,
            register: None,
            refresh: None,
            client_ip_source: ClientIpSource::ConnectInfo,
        }
    }
}

async fn check(
    limiter: Option<&IpLimiter>,
    client_ip_source: ClientIpSource,
    request: Request,
    next: Next,
    message: &'static str,
) -> Response {
    let Some(limiter) = limiter else {
        return next.run(request).await;
    };

    let ip = match extract_client_ip(&request, client_ip_source) {
        Ok(ip) => ip,
        Err(reason) => {
            warn!(reason, path = %request.uri().path(), "Rejecting request without client IP");
            return (StatusCode::FORBIDDEN, "Unable to determine client IP.").into_response();
        }
    };

    if limiter.check(&ip) {
        next.run(request).await
    } else {
        warn!(ip = %ip, path = %request.uri().path(), "Rate limit exceeded");
        (StatusCode::TOO_MANY_REQUESTS, message).into_response()
    }
}

pub async fn rate_limit_login(
    State(config): State<RateLimitConfig>,
    request: Request,
    next: Next,
) -> Response {
    check(
        config.login.as_deref(),
        config.client_ip_source,
        request,
        next,
        "Too many login attempts. Please wait before trying again.",
    )
    .await
}

pub async fn rate_limit_register(
    State(config): State<RateLimitConfig>,
    request: Request,
    next: Next,
) -> Response {
    check(
        config.register.as_deref(),
        config.client_ip_source,
        request,
        next,
        "Too many signup attempts. Please wait before trying again.",
    )
    .await
}

pub async fn rate_limit_refresh(
    State(config): State<RateLimitConfig>,
    request: Request,
    next: Next,
) -> Response {
    check(
        config.refresh.as_deref(),
        config.client_ip_source,
        request,
        next,
        "Too many requests. Please try again later.",
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_bucket_empties_per_ip() {
        let limiter = IpLimiter::new(Quota::per_minute(nonzero(2)));

        assert!(limiter.check("203.0.113.1"));
        assert!(limiter.check("203.0.113.1"));
        assert!(!limiter.check("203.0.113.1"));
        assert!(limiter.check("203.0.113.2"));
        assert_eq!(limiter.tracked_ips(), 2);
    }

    #[test]
    fn test_prune_drops_refilled_buckets_only() {
        let fast = IpLimiter::new(Quota::with_period(Duration::from_millis(1)).unwrap());
        for n in 0..10 {
            fast.check(&format!("198.51.100.{n}"));
        }
        assert_eq!(fast.tracked_ips(), 10);

        std::thread::sleep(Duration::from_millis(20));
        fast.prune();
        assert_eq!(fast.tracked_ips(), 0);

        let slow = IpLimiter::new(Quota::per_minute(nonzero(1)));
        slow.check("203.0.113.9");
        slow.prune();
        assert_eq!(slow.tracked_ips(), 1);
    }

    #[test]
    fn test_prune_runs_on_interval() {
        let limiter = IpLimiter::new(Quota::with_period(Duration::from_millis(1)).unwrap());
        for n in 0..PRUNE_INTERVAL - 1 {
            limiter.check(&format!("10.0.{}.{}", n / 256, n % 256));
        }
        assert_eq!(limiter.tracked_ips() as u64, PRUNE_INTERVAL - 1);

        std::thread::sleep(Duration::from_millis(20));
        // This check completes the interval and prunes everything else
        limiter.check("192.0.2.1");
        assert!(limiter.tracked_ips() <= 1);
    }
}
