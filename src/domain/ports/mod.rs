mod balancer;
mod connector;
mod metrics_store;

pub use balancer::Balancer;
pub use connector::Connector;
pub use metrics_store::MetricsStore;
