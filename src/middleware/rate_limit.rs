use std::net::{IpAddr, SocketAddr};
use std::num::NonZeroU32;
use std::time::Duration;

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use governor::clock::{Clock, DefaultClock};
use governor::state::keyed::DashMapStateStore;
use governor::{Quota, RateLimiter};

use crate::error::ApiError;
use crate::state::AppState;

type KeyedLimiter = RateLimiter<IpAddr, DashMapStateStore<IpAddr>, DefaultClock>;

const ONE: NonZeroU32 = match NonZeroU32::new(1) {
    Some(v) => v,
    None => unreachable!(),
};

/// Fixed per-client-IP rate limiter (GCRA, keyed by address).
pub struct ClientRateLimiter {
    limiter: KeyedLimiter,
}

impl ClientRateLimiter {
    pub fn per_minute(requests: u32) -> Self {
        let quota = Quota::per_minute(NonZeroU32::new(requests).unwrap_or(ONE));
        Self {
            limiter: RateLimiter::keyed(quota),
        }
    }

    /// Check whether a request from this address is allowed; on rejection
    /// returns how long the client should wait.
    pub fn check(&self, addr: IpAddr) -> Result<(), Duration> {
        self.limiter
            .check_key(&addr)
            .map_err(|not_until| not_until.wait_time_from(DefaultClock::default().now()))
    }
}

/// Applies the mail rate limit before any business logic runs.
pub async fn mail_rate_limit_middleware(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Err(wait) = state.mail_limiter.check(addr.ip()) {
        return Err(ApiError::too_many_requests(format!(
            "Rate limit exceeded, retry in {} seconds",
            wait.as_secs().max(1)
        )));
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn allows_up_to_the_quota_then_rejects() {
        let limiter = ClientRateLimiter::per_minute(5);
        let addr = IpAddr::V4(Ipv4Addr::new(192, 168, 1, 100));

        for _ in 0..5 {
            assert!(limiter.check(addr).is_ok());
        }
        assert!(limiter.check(addr).is_err());
    }

    #[test]
    fn limits_are_tracked_per_address() {
        let limiter = ClientRateLimiter::per_minute(1);
        let a = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
        let b = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2));

        assert!(limiter.check(a).is_ok());
        assert!(limiter.check(a).is_err());
        assert!(limiter.check(b).is_ok());
    }

    #[test]
    fn zero_quota_falls_back_to_one() {
        let limiter = ClientRateLimiter::per_minute(0);
        let addr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 3));

        assert!(limiter.check(addr).is_ok());
        assert!(limiter.check(addr).is_err());
    }
}
