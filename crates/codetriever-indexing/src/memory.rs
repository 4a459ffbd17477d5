//! `MemoryMonitor` and `MemoryAwareQueue` (C2/C3): cooperative backpressure
//! for the Parallel Chunking stage.
//!
//! Rust has no tracking garbage collector to force a collection pass under
//! pressure, so `MemoryMonitor` keeps a self-reported ledger instead: callers
//! declare an estimated byte cost when they admit work and release it when
//! the work completes. `apply_backpressure` yields the task so other workers
//! get a chance to finish and release their share before the caller rechecks.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use codetriever_config::MemoryConfig;

/// Point-in-time view of the self-reported heap ledger.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemoryUsage {
    pub heap_used: u64,
    pub heap_limit: u64,
    pub percent: f64,
}

/// Tracks self-reported heap usage against a configured limit.
pub struct MemoryMonitor {
    heap_used: AtomicU64,
    heap_limit_bytes: u64,
    safe_threshold: f64,
    reserve_bytes: u64,
}

impl MemoryMonitor {
    #[must_use]
    pub fn from_config(config: &MemoryConfig) -> Self {
        Self {
            heap_used: AtomicU64::new(0),
            heap_limit_bytes: config.heap_limit_mb.saturating_mul(1024 * 1024),
            safe_threshold: config.safe_threshold,
            reserve_bytes: config.reserve_mb.saturating_mul(1024 * 1024),
        }
    }

    #[must_use]
    pub fn usage(&self) -> MemoryUsage {
        let heap_used = self.heap_used.load(Ordering::Relaxed);
        #[allow(clippy::cast_precision_loss)]
        let percent = if self.heap_limit_bytes == 0 {
            0.0
        } else {
            heap_used as f64 / self.heap_limit_bytes as f64
        };
        MemoryUsage {
            heap_used,
            heap_limit: self.heap_limit_bytes,
            percent,
        }
    }

    /// The admission ceiling: `safe_threshold × heap_limit - reserve`.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn safe_ceiling(&self) -> u64 {
        let threshold = (self.heap_limit_bytes as f64 * self.safe_threshold) as u64;
        threshold.saturating_sub(self.reserve_bytes)
    }

    /// Whether admitting `estimate` additional bytes would stay under the
    /// safe ceiling.
    #[must_use]
    pub fn has_room(&self, estimate: u64) -> bool {
        let used = self.heap_used.load(Ordering::Relaxed);
        used.saturating_add(estimate) < self.safe_ceiling()
    }

    fn record_allocation(&self, bytes: u64) {
        self.heap_used.fetch_add(bytes, Ordering::Relaxed);
    }

    fn record_release(&self, bytes: u64) {
        self.heap_used.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |used| {
            Some(used.saturating_sub(bytes))
        }).ok();
    }

    /// Cooperatively yield so other in-flight tasks can finish and release
    /// their accounted memory before the caller rechecks admission.
    pub async fn apply_backpressure(&self) {
        tokio::task::yield_now().await;
    }
}

/// RAII admission permit. Releases its accounted memory and concurrency slot
/// on drop, whether the held work succeeded or failed.
pub struct MemoryPermit {
    queue: Arc<MemoryAwareQueueInner>,
    estimate: u64,
}

impl Drop for MemoryPermit {
    fn drop(&mut self) {
        self.queue.monitor.record_release(self.estimate);
        self.queue.active.fetch_sub(1, Ordering::Relaxed);
    }
}

struct MemoryAwareQueueInner {
    monitor: Arc<MemoryMonitor>,
    active: AtomicUsize,
    min_concurrency: usize,
    check_interval: Duration,
}

/// Admits work only when `heap_used + estimate + reserve < safe_threshold ×
/// heap_limit`, but always admits at least `min_concurrency` tasks even
/// under pressure so small jobs keep making forward progress (spec §4.2).
#[derive(Clone)]
pub struct MemoryAwareQueue {
    inner: Arc<MemoryAwareQueueInner>,
}

impl MemoryAwareQueue {
    #[must_use]
    pub fn new(monitor: Arc<MemoryMonitor>, config: &MemoryConfig) -> Self {
        Self {
            inner: Arc::new(MemoryAwareQueueInner {
                monitor,
                active: AtomicUsize::new(0),
                min_concurrency: config.min_concurrency,
                check_interval: Duration::from_millis(config.check_interval_ms),
            }),
        }
    }

    /// Wait until there's headroom for `estimate` bytes of work, then admit
    /// it and return a permit that frees the ledger entry on drop.
    pub async fn admit(&self, estimate: u64) -> MemoryPermit {
        loop {
            let active = self.inner.active.load(Ordering::Relaxed);
            if active < self.inner.min_concurrency || self.inner.monitor.has_room(estimate) {
                self.inner.monitor.record_allocation(estimate);
                self.inner.active.fetch_add(1, Ordering::Relaxed);
                return MemoryPermit {
                    queue: Arc::clone(&self.inner),
                    estimate,
                };
            }
            self.inner.monitor.apply_backpressure().await;
            tokio::time::sleep(self.inner.check_interval).await;
        }
    }

    #[must_use]
    pub fn active_count(&self) -> usize {
        self.inner.active.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_config() -> MemoryConfig {
        MemoryConfig {
            safe_threshold: 0.8,
            reserve_mb: 0,
            heap_limit_mb: 1,
            min_concurrency: 1,
            check_interval_ms: 5,
        }
    }

    #[test]
    fn has_room_respects_safe_threshold_and_reserve() {
        let monitor = MemoryMonitor::from_config(&tiny_config());
        let ceiling = monitor.safe_ceiling();
        assert!(monitor.has_room(ceiling - 1));
        assert!(!monitor.has_room(ceiling));
    }

    #[tokio::test]
    async fn admit_always_allows_min_concurrency_even_under_pressure() {
        let monitor = Arc::new(MemoryMonitor::from_config(&tiny_config()));
        let huge = monitor.safe_ceiling() * 10;
        let queue = MemoryAwareQueue::new(Arc::clone(&monitor), &tiny_config());

        // First task exceeds the safe ceiling on its own, but min_concurrency
        // of 1 means it is still admitted rather than deadlocking.
        let permit = queue.admit(huge).await;
        assert_eq!(queue.active_count(), 1);
        drop(permit);
        assert_eq!(queue.active_count(), 0);
    }

    #[tokio::test]
    async fn permit_drop_releases_accounted_memory() {
        let monitor = Arc::new(MemoryMonitor::from_config(&tiny_config()));
        let queue = MemoryAwareQueue::new(Arc::clone(&monitor), &tiny_config());
        let before = monitor.usage().heap_used;
        let permit = queue.admit(100).await;
        assert_eq!(monitor.usage().heap_used, before + 100);
        drop(permit);
        assert_eq!(monitor.usage().heap_used, before);
    }
}
