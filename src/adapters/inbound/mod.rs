mod admin_server;
mod gateway_server;

pub use admin_server::{AdminServer, AdminState, HealthResponse, MetricsEntry};
pub use gateway_server::{parse_name_and_version, ApiRequestPath, GatewayServer, GatewayState};
