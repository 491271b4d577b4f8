//! Cooldown between outbound provider requests.

use std::num::NonZeroU32;
use std::time::Duration;

use governor::clock::{Clock, DefaultClock};
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use log::debug;

use crate::config::ResolverConfig;

/// Blocks the calling thread so consecutive requests are at least one
/// cooldown apart. The first request never waits.
pub struct RequestPacer {
    limiter: Option<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
    clock: DefaultClock,
}

impl RequestPacer {
    pub fn new(cooldown: Duration) -> Self {
        let limiter = Quota::with_period(cooldown)
            .map(|quota| RateLimiter::direct(quota.allow_burst(NonZeroU32::MIN)));
        Self {
            limiter,
            clock: DefaultClock::default(),
        }
    }

    pub fn disabled() -> Self {
        Self {
            limiter: None,
            clock: DefaultClock::default(),
        }
    }

    pub fn from_config(config: &ResolverConfig) -> Self {
        if config.debug {
            debug!("Request cooldown disabled in debug mode");
            return Self::disabled();
        }
        Self::new(Duration::from_millis(config.cooldown_ms))
    }

    #[cfg(test)]
    pub fn is_enabled(&self) -> bool {
        self.limiter.is_some()
    }

    /// Waits until the next request is allowed, then claims the slot.
    pub fn pace(&self) {
        let Some(limiter) = &self.limiter else {
            return;
        };
        while let Err(not_until) = limiter.check() {
            let wait = not_until.wait_time_from(self.clock.now());
            debug!("Waiting {:?} before the next request", wait);
            std::thread::sleep(wait);
        }
    }

    pub fn run<T>(&self, request: impl FnOnce() -> T) -> T {
        self.pace();
        request()
    }
}
