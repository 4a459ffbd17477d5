//! Dual token/request bucket rate limiting for embedding backend calls (C4).
//!
//! Two independent windows are tracked: tokens-per-minute (TPM) and
//! requests-per-minute (RPM). `acquire` blocks until both buckets have
//! capacity, then debits them; the caller must call `release` exactly once
//! per successful `acquire`, win or lose, so failed calls don't leak quota.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use codetriever_config::RateLimitConfig;

/// Cumulative counters for how much a limiter has throttled its caller.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RateLimitStats {
    pub wait_count: u64,
    pub total_wait_time: Duration,
    pub total_tokens: u64,
}

struct Window {
    capacity: u64,
    used: u64,
    window_start: Instant,
}

impl Window {
    fn new(capacity: u64) -> Self {
        Self {
            capacity,
            used: 0,
            window_start: Instant::now(),
        }
    }

    /// Roll the window forward if a full minute has elapsed since it opened.
    fn maybe_refill(&mut self, now: Instant) {
        if now.duration_since(self.window_start) >= Duration::from_secs(60) {
            self.used = 0;
            self.window_start = now;
        }
    }

    /// Time remaining until this window refills, `None` if it already has.
    fn time_until_refill(&self, now: Instant) -> Option<Duration> {
        let elapsed = now.duration_since(self.window_start);
        let minute = Duration::from_secs(60);
        if elapsed >= minute {
            None
        } else {
            Some(minute - elapsed)
        }
    }

    fn has_room(&self, amount: u64) -> bool {
        self.used + amount <= self.capacity
    }
}

struct State {
    tpm: Window,
    rpm: Window,
    stats: RateLimitStats,
}

/// Dual TPM/RPM token bucket with windowed refill.
///
/// Construct from a [`RateLimitConfig`] (including its named presets, e.g.
/// `RateLimitConfig::preset("tier1")`). `acquire` is fair in the sense that
/// it polls both windows and sleeps for whichever refills first; it does not
/// queue callers in arrival order.
pub struct RateLimiter {
    state: Mutex<State>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            state: Mutex::new(State {
                tpm: Window::new(config.tpm),
                rpm: Window::new(config.rpm),
                stats: RateLimitStats::default(),
            }),
        }
    }

    /// Block until both the token and request buckets admit a call spending
    /// `estimated_tokens`. Debits both buckets before returning.
    ///
    /// # Panics
    /// Never panics in normal operation; the internal mutex is only ever
    /// held briefly and not held across an await point.
    pub async fn acquire(&self, estimated_tokens: u64) {
        loop {
            let wait = {
                #[allow(clippy::unwrap_used)]
                let mut state = self.state.lock().unwrap();
                let now = Instant::now();
                state.tpm.maybe_refill(now);
                state.rpm.maybe_refill(now);

                if state.tpm.has_room(estimated_tokens) && state.rpm.has_room(1) {
                    state.tpm.used += estimated_tokens;
                    state.rpm.used += 1;
                    state.stats.total_tokens += estimated_tokens;
                    None
                } else {
                    let tpm_wait = state.tpm.time_until_refill(now);
                    let rpm_wait = state.rpm.time_until_refill(now);
                    let wait = match (tpm_wait, rpm_wait) {
                        (Some(a), Some(b)) => a.min(b),
                        (Some(a), None) | (None, Some(a)) => a,
                        (None, None) => Duration::from_millis(10),
                    };
                    state.stats.wait_count += 1;
                    state.stats.total_wait_time += wait;
                    Some(wait)
                }
            };

            match wait {
                Some(duration) => tokio::time::sleep(duration).await,
                None => return,
            }
        }
    }

    /// Release the slot acquired for a completed call. A no-op today since
    /// windowed refill reclaims capacity on its own schedule, but kept as a
    /// distinct step so callers that need early release (e.g. a canceled
    /// request) have a symmetric API to call in their cleanup path.
    pub fn release(&self) {}

    /// Snapshot of how much throttling this limiter has imposed so far.
    #[must_use]
    pub fn stats(&self) -> RateLimitStats {
        #[allow(clippy::unwrap_used)]
        let state = self.state.lock().unwrap();
        state.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_config() -> RateLimitConfig {
        RateLimitConfig { tpm: 100, rpm: 2 }
    }

    #[tokio::test]
    async fn acquire_admits_within_capacity_without_waiting() {
        let limiter = RateLimiter::new(&tiny_config());
        limiter.acquire(50).await;
        limiter.release();
        assert_eq!(limiter.stats().wait_count, 0);
        assert_eq!(limiter.stats().total_tokens, 50);
    }

    #[tokio::test]
    async fn acquire_waits_when_request_bucket_is_exhausted() {
        let limiter = RateLimiter::new(&tiny_config());
        limiter.acquire(1).await;
        limiter.acquire(1).await;

        let start = Instant::now();
        let wait_fut = limiter.acquire(1);
        tokio::time::timeout(Duration::from_millis(50), wait_fut)
            .await
            .expect_err("third request should block until the rpm window refills");
        assert!(start.elapsed() >= Duration::from_millis(40));
        assert!(limiter.stats().wait_count >= 1);
    }

    #[tokio::test]
    async fn preset_tiers_produce_distinct_capacities() {
        let tier1 = RateLimiter::new(&RateLimitConfig::preset("tier1"));
        let free = RateLimiter::new(&RateLimitConfig::preset("free"));
        tier1.acquire(500_000).await;
        assert_eq!(tier1.stats().wait_count, 0);
        // Within the free tier's much smaller tpm cap, so it is admitted
        // immediately without needing a real refill wait.
        free.acquire(10_000).await;
        assert_eq!(free.stats().total_tokens, 10_000);
    }
}
