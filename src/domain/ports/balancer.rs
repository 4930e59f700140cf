//! Balancer Port
//!
//! Defines the capability every load-balancing strategy provides.

use crate::domain::errors::GatewayError;

/// Selects one backend from an ordered list.
///
/// Implementations are shared by all concurrent requests of one route, so
/// `select` must be safe to call from many tasks at once. A balancer never
/// removes backends from the list; exclusion of failed backends, if any,
/// belongs to the caller.
pub trait Balancer: Send + Sync {
    /// Pick a backend, returning its index and address.
    ///
    /// Fails with [`GatewayError::EmptyEndpointSet`] when `endpoints` is empty.
    fn select<'a>(&self, endpoints: &'a [String]) -> Result<(usize, &'a str), GatewayError>;

    /// Registered strategy name.
    fn name(&self) -> &'static str;
}
