//! TCP Connector
//!
//! Implements the Connector port with tokio sockets: resolves the backend
//! address, connects within the dial timeout, then applies TCP keep-alive.

use crate::domain::ports::Connector;
use async_trait::async_trait;
use socket2::{SockRef, TcpKeepalive};
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{lookup_host, TcpStream};
use tokio::time::{timeout_at, Instant};

/// Port assumed when a backend is configured without one.
const DEFAULT_HTTP_PORT: u16 = 80;

/// Dial-level settings applied to every connection attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialSettings {
    /// Upper bound for resolving and connecting to one backend
    pub timeout: Duration,
    /// TCP keep-alive idle time; `None` leaves the OS default
    pub keep_alive: Option<Duration>,
    /// Try every resolved address family instead of only the first one
    pub dual_stack: bool,
}

impl Default for DialSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            keep_alive: Some(Duration::from_secs(30)),
            dual_stack: true,
        }
    }
}

/// Connector dialing plain TCP.
pub struct TcpConnector {
    settings: DialSettings,
}

impl TcpConnector {
    pub fn new(settings: DialSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &DialSettings {
        &self.settings
    }

    /// Addresses to try, in order.
    fn candidates(&self, resolved: Vec<SocketAddr>) -> Vec<SocketAddr> {
        if self.settings.dual_stack {
            return resolved;
        }
        match resolved.first().map(SocketAddr::is_ipv4) {
            Some(first_is_v4) => resolved
                .into_iter()
                .filter(|a| a.is_ipv4() == first_is_v4)
                .collect(),
            None => resolved,
        }
    }

    fn configure(&self, stream: &TcpStream) -> io::Result<()> {
        stream.set_nodelay(true)?;
        if let Some(idle) = self.settings.keep_alive {
            SockRef::from(stream).set_tcp_keepalive(&TcpKeepalive::new().with_time(idle))?;
        }
        Ok(())
    }
}

/// Append the default HTTP port when the backend has none.
fn with_default_port(addr: &str) -> String {
    if addr.contains(':') {
        addr.to_string()
    } else {
        format!("{}:{}", addr, DEFAULT_HTTP_PORT)
    }
}

fn timed_out(addr: &str, timeout: Duration) -> io::Error {
    io::Error::new(
        io::ErrorKind::TimedOut,
        format!("dial {} timed out after {:?}", addr, timeout),
    )
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, addr: &str) -> io::Result<TcpStream> {
        let target = with_default_port(addr);
        let deadline = Instant::now() + self.settings.timeout;

        let resolved: Vec<SocketAddr> = timeout_at(deadline, lookup_host(target.as_str()))
            .await
            .map_err(|_| timed_out(addr, self.settings.timeout))??
            .collect();

        let candidates = self.candidates(resolved);
        if candidates.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no addresses resolved for {}", addr),
            ));
        }

        let mut last_err = None;
        for sock_addr in candidates {
            match timeout_at(deadline, TcpStream::connect(sock_addr)).await {
                Ok(Ok(stream)) => {
                    self.configure(&stream)?;
                    return Ok(stream);
                }
                Ok(Err(e)) => {
                    tracing::debug!("connect {} ({}) failed: {}", addr, sock_addr, e);
                    last_err = Some(e);
                }
                Err(_) => return Err(timed_out(addr, self.settings.timeout)),
            }
        }

        Err(last_err.unwrap_or_else(|| timed_out(addr, self.settings.timeout)))
    }
}
