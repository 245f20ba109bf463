//! Per-client admission control for the request/response surface.
//!
//! Approximate sliding window: one fixed-duration window with a single
//! reset instant per client, not a true sliding log. Bursts at window
//! boundaries are an accepted tradeoff. The persistent channel is not
//! rate-limited by this component.
//!
//! Unlike its predecessor this table does not grow forever: expired
//! windows are reclaimed on next access and by [`RateLimiter::sweep_expired`],
//! which the server runs periodically.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::error::CoreError;

/// Window length and per-window request budget.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub window: Duration,
    pub max_requests: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(15 * 60),
            max_requests: 100,
        }
    }
}

/// Admission state for one client key.
#[derive(Debug, Clone, Copy)]
struct ClientWindow {
    count: u32,
    window_end: Instant,
}

/// Fixed-window rate limiter keyed by network origin.
pub struct RateLimiter {
    config: RateLimitConfig,
    clients: DashMap<String, ClientWindow>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            clients: DashMap::new(),
        }
    }

    /// Admit or reject a request from `client`.
    ///
    /// Rejection carries a retry-after hint equal to the remaining window
    /// time, rounded up to whole seconds.
    pub fn check(&self, client: &str) -> Result<(), CoreError> {
        self.check_at(client, Instant::now())
    }

    /// Clock-injected admission check. `now` is explicit so window-expiry
    /// behavior is testable without sleeping.
    pub fn check_at(&self, client: &str, now: Instant) -> Result<(), CoreError> {
        match self.clients.entry(client.to_owned()) {
            Entry::Vacant(slot) => {
                slot.insert(ClientWindow {
                    count: 1,
                    window_end: now + self.config.window,
                });
                Ok(())
            }
            Entry::Occupied(mut slot) => {
                let window = slot.get_mut();
                if now >= window.window_end {
                    // Stale window: reset in place (lazy reclamation).
                    window.count = 1;
                    window.window_end = now + self.config.window;
                    Ok(())
                } else if window.count >= self.config.max_requests {
                    Err(CoreError::RateLimited {
                        retry_after_secs: retry_after_secs(window.window_end, now),
                    })
                } else {
                    window.count += 1;
                    Ok(())
                }
            }
        }
    }

    /// Drop every client whose window has expired. Returns the number of
    /// entries evicted.
    pub fn sweep_expired(&self) -> usize {
        self.sweep_expired_at(Instant::now())
    }

    pub fn sweep_expired_at(&self, now: Instant) -> usize {
        let before = self.clients.len();
        self.clients.retain(|_, window| window.window_end > now);
        before - self.clients.len()
    }

    /// Number of client keys currently tracked.
    pub fn tracked_clients(&self) -> usize {
        self.clients.len()
    }
}

/// Remaining window time in whole seconds, rounded up, never zero.
fn retry_after_secs(window_end: Instant, now: Instant) -> u64 {
    let remaining = window_end.saturating_duration_since(now);
    let mut secs = remaining.as_secs();
    if remaining.subsec_nanos() > 0 {
        secs += 1;
    }
    secs.max(1)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn small_config() -> RateLimitConfig {
        RateLimitConfig {
            window: Duration::from_secs(60),
            max_requests: 3,
        }
    }

    #[test]
    fn requests_within_budget_are_admitted() {
        let limiter = RateLimiter::new(small_config());
        let now = Instant::now();
        for _ in 0..3 {
            assert!(limiter.check_at("10.0.0.1", now).is_ok());
        }
    }

    #[test]
    fn request_over_budget_is_rejected_with_retry_hint() {
        let limiter = RateLimiter::new(small_config());
        let now = Instant::now();
        for _ in 0..3 {
            limiter.check_at("10.0.0.1", now).unwrap();
        }

        let err = limiter.check_at("10.0.0.1", now).unwrap_err();
        match err {
            CoreError::RateLimited { retry_after_secs } => {
                assert!(retry_after_secs > 0);
                assert!(retry_after_secs <= 60);
            }
            other => panic!("expected RateLimited, got {other:?}"),
        }
    }

    #[test]
    fn full_budget_at_default_config() {
        let limiter = RateLimiter::new(RateLimitConfig::default());
        let now = Instant::now();
        for _ in 0..100 {
            assert!(limiter.check_at("client", now).is_ok());
        }
        // The 101st request within one window is rejected.
        assert!(limiter.check_at("client", now).is_err());
    }

    #[test]
    fn expired_window_resets_counter_to_one() {
        let limiter = RateLimiter::new(small_config());
        let start = Instant::now();
        for _ in 0..3 {
            limiter.check_at("10.0.0.1", start).unwrap();
        }
        assert!(limiter.check_at("10.0.0.1", start).is_err());

        // Past the window: admitted again, counter restarts at 1.
        let later = start + Duration::from_secs(61);
        for _ in 0..3 {
            assert!(limiter.check_at("10.0.0.1", later).is_ok());
        }
        assert!(limiter.check_at("10.0.0.1", later).is_err());
    }

    #[test]
    fn clients_are_tracked_independently() {
        let limiter = RateLimiter::new(small_config());
        let now = Instant::now();
        for _ in 0..3 {
            limiter.check_at("10.0.0.1", now).unwrap();
        }
        assert!(limiter.check_at("10.0.0.1", now).is_err());
        assert!(limiter.check_at("10.0.0.2", now).is_ok());
    }

    #[test]
    fn sweep_evicts_only_expired_windows() {
        let limiter = RateLimiter::new(small_config());
        let start = Instant::now();
        limiter.check_at("stale", start).unwrap();
        limiter.check_at("fresh", start + Duration::from_secs(59)).unwrap();
        assert_eq!(limiter.tracked_clients(), 2);

        let evicted = limiter.sweep_expired_at(start + Duration::from_secs(61));
        assert_eq!(evicted, 1);
        assert_eq!(limiter.tracked_clients(), 1);
    }

    #[test]
    fn retry_after_rounds_up_to_whole_seconds() {
        let now = Instant::now();
        assert_eq!(retry_after_secs(now + Duration::from_millis(1500), now), 2);
        assert_eq!(retry_after_secs(now + Duration::from_secs(30), now), 30);
        assert_eq!(retry_after_secs(now, now), 1);
    }
}
