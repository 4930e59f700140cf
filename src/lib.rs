//! routegate Library
//!
//! Versioned API gateway: routes `/{api}/v{version}` requests to one of a
//! route's backends, chosen by a pluggable balancer, retrying across backends
//! when a dial fails.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

// Re-export commonly used types
pub use application::{ApiProxy, RouteTable};
pub use config::{load_config, Config};
pub use domain::entities::{ApiDefinition, MetricsKey, RequestContext};
pub use domain::errors::GatewayError;
pub use domain::ports::{Balancer, Connector, MetricsStore};
pub use domain::services::LoadBalancer;
