//! Connector Port
//!
//! Defines the single network dial used by the retrying dialer.

use async_trait::async_trait;
use tokio::net::TcpStream;

/// Opens one TCP connection to one backend address.
///
/// Implementations apply the configured dial settings (timeout, keep-alive,
/// address family preference). Retrying across backends is not their concern.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connect to a `host:port` backend address.
    async fn connect(&self, addr: &str) -> std::io::Result<TcpStream>;
}
