//! DashMap Metrics Store
//!
//! Implements MetricsStore using DashMap. Each key's entry is updated while
//! holding that entry's shard guard, so the read-modify-write of count,
//! cumulative duration and average is atomic per key.

use crate::domain::entities::{MetricsKey, RouteMetrics};
use crate::domain::ports::MetricsStore;
use dashmap::DashMap;
use std::time::Duration;

/// Accumulated figures for one (method, route path, upstream path) key.
#[derive(Debug, Default, Clone)]
pub struct RoundTripMetrics {
    /// Completed round-trips
    pub count: u64,
    /// Sum of round-trip durations
    pub total_duration: Duration,
    /// Average round-trip duration, recomputed on every record
    pub average_duration: Duration,
    /// Round-trips that failed after routing
    pub failures: u64,
}

impl RoundTripMetrics {
    fn record(&mut self, elapsed: Duration) {
        self.count += 1;
        self.total_duration += elapsed;
        self.average_duration =
            Duration::from_nanos((self.total_duration.as_nanos() / self.count as u128) as u64);
    }
}

/// DashMap-backed metrics store.
pub struct DashMapMetricsStore {
    metrics: DashMap<MetricsKey, RoundTripMetrics>,
}

impl DashMapMetricsStore {
    /// Create a new metrics store.
    pub fn new() -> Self {
        Self {
            metrics: DashMap::new(),
        }
    }

    /// Number of distinct keys recorded so far.
    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    fn to_route_metrics(key: &MetricsKey, m: &RoundTripMetrics) -> RouteMetrics {
        RouteMetrics {
            key: key.clone(),
            count: m.count,
            total_duration: m.total_duration,
            failures: m.failures,
        }
    }
}

impl Default for DashMapMetricsStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsStore for DashMapMetricsStore {
    fn record_round_trip(&self, key: &MetricsKey, elapsed: Duration) {
        let mut entry = self.metrics.entry(key.clone()).or_default();
        entry.record(elapsed);
        tracing::debug!(
            "metrics {} {} -> {}: count={} avg={:?}",
            key.method,
            key.route_path,
            key.upstream_path,
            entry.count,
            entry.average_duration
        );
    }

    fn record_failure(&self, key: &MetricsKey) {
        self.metrics.entry(key.clone()).or_default().failures += 1;
    }

    fn get(&self, key: &MetricsKey) -> Option<RouteMetrics> {
        self.metrics
            .get(key)
            .map(|m| Self::to_route_metrics(key, m.value()))
    }

    fn snapshot(&self) -> Vec<RouteMetrics> {
        let mut all: Vec<RouteMetrics> = self
            .metrics
            .iter()
            .map(|e| Self::to_route_metrics(e.key(), e.value()))
            .collect();
        all.sort_by(|a, b| {
            (&a.key.route_path, &a.key.upstream_path, &a.key.method).cmp(&(
                &b.key.route_path,
                &b.key.upstream_path,
                &b.key.method,
            ))
        });
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn key(method: &str, upstream: &str) -> MetricsKey {
        MetricsKey::new(method, "/orders/v1", upstream)
    }

    // ===== Recording Tests =====

    #[test]
    fn test_unknown_key_has_no_metrics() {
        let store = DashMapMetricsStore::new();
        assert!(store.get(&key("GET", "/api/items")).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_count_and_average_after_n_round_trips() {
        let store = DashMapMetricsStore::new();
        let k = key("GET", "/api/items");

        let durations = [10u64, 20, 30, 40, 55];
        for ms in durations {
            store.record_round_trip(&k, Duration::from_millis(ms));
        }

        let m = store.get(&k).unwrap();
        let total = Duration::from_millis(durations.iter().sum());
        assert_eq!(m.count, durations.len() as u64);
        assert_eq!(m.total_duration, total);
        assert_eq!(m.average_duration(), total / durations.len() as u32);
        assert_eq!(m.failures, 0);
    }

    #[test]
    fn test_stored_average_matches_derived_average() {
        let store = DashMapMetricsStore::new();
        let k = key("POST", "/api/orders");
        store.record_round_trip(&k, Duration::from_micros(300));
        store.record_round_trip(&k, Duration::from_micros(500));

        let stored = store.metrics.get(&k).unwrap().average_duration;
        assert_eq!(stored, Duration::from_micros(400));
        assert_eq!(store.get(&k).unwrap().average_duration(), stored);
    }

    #[test]
    fn test_failures_do_not_touch_success_figures() {
        let store = DashMapMetricsStore::new();
        let k = key("GET", "/api/items");

        store.record_round_trip(&k, Duration::from_millis(10));
        store.record_failure(&k);
        store.record_failure(&k);

        let m = store.get(&k).unwrap();
        assert_eq!(m.count, 1);
        assert_eq!(m.failures, 2);
        assert_eq!(m.total_duration, Duration::from_millis(10));
    }

    #[test]
    fn test_keys_are_isolated() {
        let store = DashMapMetricsStore::new();

        store.record_round_trip(&key("GET", "/api/items"), Duration::from_millis(1));
        store.record_round_trip(&key("GET", "/api/items"), Duration::from_millis(1));
        store.record_round_trip(&key("POST", "/api/items"), Duration::from_millis(1));
        store.record_round_trip(&key("GET", "/api/other"), Duration::from_millis(1));

        assert_eq!(store.len(), 3);
        assert_eq!(store.get(&key("GET", "/api/items")).unwrap().count, 2);
        assert_eq!(store.get(&key("POST", "/api/items")).unwrap().count, 1);
        assert_eq!(store.get(&key("GET", "/api/other")).unwrap().count, 1);
    }

    #[test]
    fn test_snapshot_is_sorted() {
        let store = DashMapMetricsStore::new();
        store.record_round_trip(&key("GET", "/api/b"), Duration::from_millis(1));
        store.record_round_trip(&key("GET", "/api/a"), Duration::from_millis(1));

        let snapshot = store.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].key.upstream_path, "/api/a");
        assert_eq!(snapshot[1].key.upstream_path, "/api/b");
    }

    // ===== Concurrency Safety Tests =====

    #[test]
    fn test_concurrent_records_same_key() {
        let store = Arc::new(DashMapMetricsStore::new());
        let k = key("GET", "/api/items");
        let mut handles = vec![];

        for _ in 0..10 {
            let store = store.clone();
            let k = k.clone();
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    store.record_round_trip(&k, Duration::from_micros(10));
                }
            }));
        }

        for h in handles {
            h.join().unwrap();
        }

        let m = store.get(&k).unwrap();
        assert_eq!(m.count, 1000);
        assert_eq!(m.total_duration, Duration::from_micros(10_000));
        assert_eq!(m.average_duration(), Duration::from_micros(10));
    }

    #[test]
    fn test_default() {
        let store = DashMapMetricsStore::default();
        assert!(store.snapshot().is_empty());
    }
}
