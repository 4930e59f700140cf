//! Metrics Store Port
//!
//! Defines the interface for recording and reading per-route round-trip metrics.

use crate::domain::entities::{MetricsKey, RouteMetrics};
use std::time::Duration;

/// Store for round-trip metrics keyed by (method, route path, upstream path).
///
/// Shared by every in-flight request, so each update of one key must be
/// atomic with respect to concurrent updates of the same key.
pub trait MetricsStore: Send + Sync {
    /// Record one completed round-trip.
    fn record_round_trip(&self, key: &MetricsKey, elapsed: Duration);

    /// Record one round-trip that failed after the route was matched.
    fn record_failure(&self, key: &MetricsKey);

    /// Read one entry.
    fn get(&self, key: &MetricsKey) -> Option<RouteMetrics>;

    /// Read all entries.
    fn snapshot(&self) -> Vec<RouteMetrics>;
}
