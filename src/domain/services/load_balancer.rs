//! Load Balancer Service
//!
//! The balancer registry and its two strategies. Pure domain logic: no I/O,
//! no async. Each route owns its own balancer instance so routes never
//! contend on shared cursor state.

use crate::domain::errors::GatewayError;
use crate::domain::ports::Balancer;
use crate::domain::value_objects::BalancingStrategy;
use rand::Rng;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Registry of the named balancing strategies.
pub struct LoadBalancer;

impl LoadBalancer {
    /// Resolve a strategy name to a fresh balancer instance.
    ///
    /// # Example
    /// ```
    /// use routegate::domain::services::LoadBalancer;
    ///
    /// let balancer = LoadBalancer::resolve("round-robin").unwrap();
    /// let backends = vec!["10.0.0.1:80".to_string(), "10.0.0.2:80".to_string()];
    /// assert_eq!(balancer.select(&backends).unwrap(), (0, "10.0.0.1:80"));
    /// assert_eq!(balancer.select(&backends).unwrap(), (1, "10.0.0.2:80"));
    /// ```
    pub fn resolve(strategy: &str) -> Result<Arc<dyn Balancer>, GatewayError> {
        BalancingStrategy::parse(strategy).map(Self::for_strategy)
    }

    /// Build a balancer for an already-parsed strategy.
    pub fn for_strategy(strategy: BalancingStrategy) -> Arc<dyn Balancer> {
        match strategy {
            BalancingStrategy::RoundRobin => Arc::new(RoundRobinBalancer::new()),
            BalancingStrategy::Random => Arc::new(RandomBalancer),
        }
    }
}

/// Cycles through the backends in order.
///
/// The cursor is advanced with a single atomic read-modify-write, so two
/// concurrent callers can never observe the same position.
#[derive(Debug, Default)]
pub struct RoundRobinBalancer {
    cursor: AtomicUsize,
}

impl RoundRobinBalancer {
    pub fn new() -> Self {
        Self {
            cursor: AtomicUsize::new(0),
        }
    }
}

/// Clamp a cursor into `[0, len)`; a cursor past the end restarts at 0.
fn clamp(cursor: usize, len: usize) -> usize {
    if cursor >= len {
        0
    } else {
        cursor
    }
}

impl Balancer for RoundRobinBalancer {
    fn select<'a>(&self, endpoints: &'a [String]) -> Result<(usize, &'a str), GatewayError> {
        let len = endpoints.len();
        if len == 0 {
            return Err(GatewayError::EmptyEndpointSet);
        }

        // The closure always returns Some, so both arms carry the previous value.
        let previous = match self
            .cursor
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| {
                Some((clamp(c, len) + 1) % len)
            }) {
            Ok(prev) | Err(prev) => prev,
        };
        let idx = clamp(previous, len);

        tracing::debug!("round-robin balancing to idx: {}, endpoint: {}", idx, endpoints[idx]);
        Ok((idx, endpoints[idx].as_str()))
    }

    fn name(&self) -> &'static str {
        BalancingStrategy::ROUND_ROBIN
    }
}

/// Picks a uniformly random backend. Stateless.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomBalancer;

impl Balancer for RandomBalancer {
    fn select<'a>(&self, endpoints: &'a [String]) -> Result<(usize, &'a str), GatewayError> {
        if endpoints.is_empty() {
            return Err(GatewayError::EmptyEndpointSet);
        }
        let idx = rand::thread_rng().gen_range(0..endpoints.len());

        tracing::debug!("random balancing to idx: {}, endpoint: {}", idx, endpoints[idx]);
        Ok((idx, endpoints[idx].as_str()))
    }

    fn name(&self) -> &'static str {
        BalancingStrategy::RANDOM
    }
}
