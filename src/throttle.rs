//! Spacing of outbound detail calls.
//!
//! The upstream publishes no concurrency allowance, so detail calls are made
//! one at a time with a minimum interval between them. The policy sits behind
//! [`Throttle`] so pipeline tests can count acquisitions instead of sleeping.

use std::num::NonZeroU32;
use std::time::Duration;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};

pub trait Throttle {
    /// Waits until the next external call may be made.
    async fn acquire(&self);
}

/// One permit per `interval`, no burst. The first call goes through immediately.
pub struct IntervalThrottle {
    limiter: Option<DefaultDirectRateLimiter>,
}

impl IntervalThrottle {
    pub fn new(interval: Duration) -> Self {
        let limiter = Quota::with_period(interval)
            .map(|quota| RateLimiter::direct(quota.allow_burst(NonZeroU32::MIN)));
        Self { limiter }
    }

    pub fn from_millis(ms: u64) -> Self {
        Self::new(Duration::from_millis(ms))
    }
}

impl Throttle for IntervalThrottle {
    async fn acquire(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
    }
}
