//! Domain Entities - Core business objects
//!
//! These entities represent the core concepts of the gateway domain:
//! the per-route API definition, the per-request context threaded through
//! router → proxy → transport, and the metrics records.

use crate::domain::errors::GatewayError;
use crate::domain::value_objects::{BalancingStrategy, RoutePath};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Static, per-route configuration of one versioned API.
///
/// Built once at startup and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiDefinition {
    /// Logical API name
    pub name: String,
    /// Normalized `/{path}/v{version}` mount of this API
    pub route_path: RoutePath,
    /// Prefix prepended to the forwarded path
    pub upstream_path: String,
    /// Scheme used towards the backends
    pub upstream_scheme: String,
    /// Ordered backend addresses (`host:port`); order matters for round-robin
    pub backends: Arc<[String]>,
    /// Strategy used to pick a backend per dial attempt
    pub strategy: BalancingStrategy,
    /// Dial attempts allowed per backend in one routing attempt
    pub max_retries_per_backend: u32,
}

impl ApiDefinition {
    /// Create a definition, rejecting an empty backend list.
    pub fn new(
        name: impl Into<String>,
        route_path: RoutePath,
        upstream_path: impl Into<String>,
        upstream_scheme: impl Into<String>,
        backends: Vec<String>,
        strategy: BalancingStrategy,
        max_retries_per_backend: u32,
    ) -> Result<Self, GatewayError> {
        let name = name.into();
        if backends.is_empty() {
            return Err(GatewayError::NoBackends(name));
        }
        Ok(Self {
            name,
            route_path,
            upstream_path: normalize_upstream_path(&upstream_path.into()),
            upstream_scheme: upstream_scheme.into().to_lowercase(),
            backends: backends.into(),
            strategy,
            max_retries_per_backend,
        })
    }

    /// Total dial attempts permitted for one routing decision.
    pub fn retry_budget(&self) -> usize {
        self.max_retries_per_backend as usize * self.backends.len()
    }

    /// Path sent upstream for the remaining request path.
    ///
    /// `rest` is expected to start with `/` (or be empty).
    pub fn upstream_target(&self, rest: &str) -> String {
        let joined = format!("{}{}", self.upstream_path, rest);
        if joined.is_empty() {
            "/".to_string()
        } else if joined.starts_with('/') {
            joined
        } else {
            format!("/{}", joined)
        }
    }
}

/// Strip the trailing slash so `upstream_path + rest` never doubles it.
fn normalize_upstream_path(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() || trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

/// Request-scoped data carried explicitly through the proxy pipeline.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Correlation identifier (`X-Request-Id`)
    pub request_id: String,
    /// Route the request was matched to
    pub route_path: RoutePath,
    /// Remote address of the caller, when known
    pub client_addr: Option<SocketAddr>,
    /// Instant after which no further dial attempts are started
    pub deadline: Option<Instant>,
}

impl RequestContext {
    pub fn new(request_id: impl Into<String>, route_path: RoutePath) -> Self {
        Self {
            request_id: request_id.into(),
            route_path,
            client_addr: None,
            deadline: None,
        }
    }

    pub fn with_client_addr(mut self, addr: Option<SocketAddr>) -> Self {
        self.client_addr = addr;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.deadline = timeout.map(|t| Instant::now() + t);
        self
    }

    /// Whether the request deadline has passed.
    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

/// Key of one metrics entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct MetricsKey {
    pub method: String,
    pub route_path: String,
    pub upstream_path: String,
}

impl MetricsKey {
    pub fn new(
        method: impl Into<String>,
        route_path: impl Into<String>,
        upstream_path: impl Into<String>,
    ) -> Self {
        Self {
            method: method.into(),
            route_path: route_path.into(),
            upstream_path: upstream_path.into(),
        }
    }
}

/// Point-in-time view of one metrics entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMetrics {
    pub key: MetricsKey,
    /// Completed round-trips
    pub count: u64,
    /// Sum of round-trip durations
    pub total_duration: Duration,
    /// Round-trips that failed after routing
    pub failures: u64,
}

impl RouteMetrics {
    /// Average round-trip duration, zero when nothing completed yet.
    pub fn average_duration(&self) -> Duration {
        if self.count == 0 {
            Duration::ZERO
        } else {
            Duration::from_nanos((self.total_duration.as_nanos() / self.count as u128) as u64)
        }
    }
}
