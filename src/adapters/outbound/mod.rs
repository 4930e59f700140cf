mod dashmap_metrics_store;
mod tcp_connector;

pub use dashmap_metrics_store::{DashMapMetricsStore, RoundTripMetrics};
pub use tcp_connector::{DialSettings, TcpConnector};
