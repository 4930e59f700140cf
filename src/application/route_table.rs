//! Route Table
//!
//! Maps `/{api}/v{version}` to the route's [`ApiProxy`]. Built once at
//! startup; every configuration problem is reported here and is fatal.
//! Read-only afterwards, so lookups take no lock.

use crate::application::api_proxy::{ApiProxy, TransportSettings};
use crate::config::ApiEndpointConfig;
use crate::domain::entities::ApiDefinition;
use crate::domain::errors::GatewayError;
use crate::domain::ports::{Connector, MetricsStore};
use crate::domain::services::LoadBalancer;
use crate::domain::value_objects::{BalancingStrategy, RoutePath};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Upstream schemes the transport can speak.
const SUPPORTED_SCHEMES: &[&str] = &["http"];

/// Serializable view of one route, used by `show` and the admin API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteSummary {
    pub name: String,
    pub route_path: RoutePath,
    pub upstream_scheme: String,
    pub upstream_path: String,
    pub backends: Vec<String>,
    pub strategy: BalancingStrategy,
    pub max_retries_per_backend: u32,
    pub retry_budget: usize,
}

pub struct RouteTable {
    routes: HashMap<RoutePath, Arc<ApiProxy>>,
}

impl RouteTable {
    /// Build the table from the configured API endpoints.
    pub fn from_config(
        endpoints: &[ApiEndpointConfig],
        connector: Arc<dyn Connector>,
        transport: TransportSettings,
        metrics: Arc<dyn MetricsStore>,
    ) -> Result<Self, GatewayError> {
        let mut routes = HashMap::with_capacity(endpoints.len());

        for endpoint in endpoints {
            let definition = Self::definition(endpoint)?;
            let route_path = definition.route_path.clone();
            if routes.contains_key(&route_path) {
                return Err(GatewayError::DuplicateRoute(route_path.to_string()));
            }

            if definition.retry_budget() == 0 {
                tracing::warn!(
                    "API {} has max_retries 0: every request to {} will fail with 502",
                    definition.name,
                    route_path
                );
            }

            tracing::info!(
                "registering {} -> {}://{{{}}}{} ({}, {} retries per backend)",
                route_path,
                definition.upstream_scheme,
                definition.backends.join(", "),
                definition.upstream_path,
                definition.strategy,
                definition.max_retries_per_backend
            );

            let balancer = LoadBalancer::for_strategy(definition.strategy);
            let proxy = ApiProxy::new(
                definition,
                balancer,
                connector.clone(),
                transport.clone(),
                metrics.clone(),
            );
            routes.insert(route_path, Arc::new(proxy));
        }

        Ok(Self { routes })
    }

    fn definition(endpoint: &ApiEndpointConfig) -> Result<ApiDefinition, GatewayError> {
        let proxy = &endpoint.proxy;
        let scheme = proxy.scheme.trim().to_lowercase();
        if !SUPPORTED_SCHEMES.contains(&scheme.as_str()) {
            return Err(GatewayError::UnsupportedScheme {
                api: endpoint.name.clone(),
                scheme: proxy.scheme.clone(),
            });
        }

        let strategy = BalancingStrategy::parse(&proxy.balancing.strategy)?;
        ApiDefinition::new(
            endpoint.name.clone(),
            RoutePath::new(&endpoint.path, &endpoint.version),
            proxy.path.clone(),
            scheme,
            proxy.targets.clone(),
            strategy,
            proxy.max_retries,
        )
    }

    /// Look up the proxy for a route path such as `/orders/v1`.
    pub fn get(&self, route_path: &str) -> Option<Arc<ApiProxy>> {
        self.routes.get(route_path).cloned()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Route summaries sorted by route path.
    pub fn summaries(&self) -> Vec<RouteSummary> {
        let mut all: Vec<RouteSummary> = self
            .routes
            .values()
            .map(|proxy| {
                let def = proxy.definition();
                RouteSummary {
                    name: def.name.clone(),
                    route_path: def.route_path.clone(),
                    upstream_scheme: def.upstream_scheme.clone(),
                    upstream_path: def.upstream_path.clone(),
                    backends: def.backends.to_vec(),
                    strategy: def.strategy,
                    max_retries_per_backend: def.max_retries_per_backend,
                    retry_budget: def.retry_budget(),
                }
            })
            .collect();
        all.sort_by(|a, b| a.route_path.as_str().cmp(b.route_path.as_str()));
        all
    }
}
