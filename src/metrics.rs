// src/metrics.rs
//! Registry metrics tracking
//!
//! Atomic counters for mirror and search synchronization activity,
//! readable as a serializable snapshot.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

#[derive(Default)]
pub struct RegistryMetrics {
    /// Mirror requests answered from the local catalog
    mirror_hits: AtomicU64,
    /// Mirror requests that went to the upstream feed
    upstream_fetches: AtomicU64,
    /// Upstream downloads that found nothing
    upstream_misses: AtomicU64,
    /// Upstream or indexing failures during mirroring
    upstream_errors: AtomicU64,
    /// Packages indexed from the upstream feed
    packages_mirrored: AtomicU64,
    /// Batches sent to the search backend
    search_batches: AtomicU64,
    /// Batches halved after a "too large" rejection
    search_batch_splits: AtomicU64,
    start_time: std::sync::OnceLock<Instant>,
}

impl RegistryMetrics {
    pub fn new() -> Self {
        let metrics = Self::default();
        let _ = metrics.start_time.set(Instant::now());
        metrics
    }

    pub fn record_mirror_hit(&self) {
        self.mirror_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_upstream_fetch(&self) {
        self.upstream_fetches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_upstream_miss(&self) {
        self.upstream_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_upstream_error(&self) {
        self.upstream_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_package_mirrored(&self) {
        self.packages_mirrored.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_search_batch(&self) {
        self.search_batches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_search_batch_split(&self) {
        self.search_batch_splits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let uptime = self
            .start_time
            .get()
            .map(|t| t.elapsed())
            .unwrap_or(Duration::ZERO);

        let hits = self.mirror_hits.load(Ordering::Relaxed);
        let fetches = self.upstream_fetches.load(Ordering::Relaxed);
        let total = hits + fetches;
        let hit_rate = if total > 0 {
            (hits as f64 / total as f64) * 100.0
        } else {
            0.0
        };

        MetricsSnapshot {
            mirror_hits: hits,
            upstream_fetches: fetches,
            mirror_hit_rate: hit_rate,
            upstream_misses: self.upstream_misses.load(Ordering::Relaxed),
            upstream_errors: self.upstream_errors.load(Ordering::Relaxed),
            packages_mirrored: self.packages_mirrored.load(Ordering::Relaxed),
            search_batches: self.search_batches.load(Ordering::Relaxed),
            search_batch_splits: self.search_batch_splits.load(Ordering::Relaxed),
            uptime_secs: uptime.as_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub mirror_hits: u64,
    pub upstream_fetches: u64,
    /// Percentage of mirror requests served locally
    pub mirror_hit_rate: f64,
    pub upstream_misses: u64,
    pub upstream_errors: u64,
    pub packages_mirrored: u64,
    pub search_batches: u64,
    pub search_batch_splits: u64,
    pub uptime_secs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_and_hit_rate() {
        let metrics = RegistryMetrics::new();
        metrics.record_mirror_hit();
        metrics.record_mirror_hit();
        metrics.record_mirror_hit();
        metrics.record_upstream_fetch();
        metrics.record_upstream_miss();
        metrics.record_search_batch();
        metrics.record_search_batch_split();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.mirror_hits, 3);
        assert_eq!(snapshot.upstream_fetches, 1);
        assert_eq!(snapshot.upstream_misses, 1);
        assert_eq!(snapshot.search_batch_splits, 1);
        assert!((snapshot.mirror_hit_rate - 75.0).abs() < 0.01);
    }

    #[test]
    fn test_empty_snapshot() {
        let snapshot = RegistryMetrics::new().snapshot();
        assert_eq!(snapshot.mirror_hit_rate, 0.0);
        assert_eq!(snapshot.packages_mirrored, 0);
    }
}
