//! Per-Route API Proxy
//!
//! One `ApiProxy` exists per configured route. It owns the route's
//! definition and retrying dialer and runs every forwarded request through
//! four stages:
//!
//! 1. rewrite: upstream path and query, forwarding headers, hop-by-hop strip
//! 2. dial: [`RetryingDialer::dial`] picks and connects a backend
//! 3. send: one HTTP/1.1 exchange over the dialed connection
//! 4. record: round-trip metrics and a completion log line
//!
//! Exchange failures are never retried at the HTTP layer.

use crate::application::retrying_dialer::{DialedConnection, RetryingDialer};
use crate::domain::entities::{ApiDefinition, MetricsKey, RequestContext};
use crate::domain::errors::GatewayError;
use crate::domain::ports::{Balancer, Connector, MetricsStore};
use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Request, Response, Uri, Version};
use hyper_util::rt::TokioIo;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");
pub const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
pub const X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");
pub const X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");

/// Headers that only describe a single hop and are never forwarded.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// HTTP-level transport tunables shared by every route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportSettings {
    /// Limit for receiving upstream response headers; `None` waits forever
    pub response_header_timeout: Option<Duration>,
    /// Ask upstreams to close the connection after each exchange
    pub disable_keep_alives: bool,
    /// Drop `Accept-Encoding` so upstreams answer uncompressed
    pub disable_compression: bool,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            response_header_timeout: Some(Duration::from_secs(30)),
            disable_keep_alives: false,
            disable_compression: false,
        }
    }
}

/// Reverse proxy for a single API definition.
pub struct ApiProxy {
    definition: ApiDefinition,
    dialer: RetryingDialer,
    transport: TransportSettings,
    metrics: Arc<dyn MetricsStore>,
}

impl ApiProxy {
    pub fn new(
        definition: ApiDefinition,
        balancer: Arc<dyn Balancer>,
        connector: Arc<dyn Connector>,
        transport: TransportSettings,
        metrics: Arc<dyn MetricsStore>,
    ) -> Self {
        let dialer = RetryingDialer::new(&definition, balancer, connector);
        Self {
            definition,
            dialer,
            transport,
            metrics,
        }
    }

    pub fn definition(&self) -> &ApiDefinition {
        &self.definition
    }

    pub fn dialer(&self) -> &RetryingDialer {
        &self.dialer
    }

    /// Forward `req` to one of the route's backends.
    ///
    /// `rest` is the inbound path after the `/{api}/v{version}` segments.
    pub async fn handle(
        &self,
        req: Request<Body>,
        rest: &str,
        ctx: &RequestContext,
    ) -> Result<Response<Body>, GatewayError> {
        let method = req.method().clone();
        let (req, upstream_path) = self.rewrite(req, rest, ctx)?;
        let key = MetricsKey::new(
            method.as_str(),
            self.definition.route_path.as_str(),
            upstream_path.as_str(),
        );

        let started = Instant::now();
        let outcome = match self.dialer.dial(ctx).await {
            Ok(conn) => {
                let backend = conn.backend.clone();
                self.send(conn, req).await.map(|resp| (backend, resp))
            }
            Err(e) => Err(e),
        };

        match outcome {
            Ok((backend, resp)) => {
                let elapsed = started.elapsed();
                self.record(&key, elapsed);
                tracing::info!(
                    "[{}] {} {}://{}{} -> {} in {:?}",
                    ctx.request_id,
                    method,
                    self.definition.upstream_scheme,
                    backend,
                    upstream_path,
                    resp.status().as_u16(),
                    elapsed
                );
                Ok(resp)
            }
            Err(e) => {
                self.metrics.record_failure(&key);
                tracing::error!(
                    "[{}] {} {} via {} failed: {}",
                    ctx.request_id,
                    method,
                    upstream_path,
                    self.definition.name,
                    e
                );
                Err(e)
            }
        }
    }

    /// Rewrite stage. Returns the outbound request and its path without query.
    pub fn rewrite(
        &self,
        req: Request<Body>,
        rest: &str,
        ctx: &RequestContext,
    ) -> Result<(Request<Body>, String), GatewayError> {
        let (mut parts, body) = req.into_parts();

        let upstream_path = self.definition.upstream_target(rest);
        let path_and_query = match parts.uri.query() {
            Some(q) => format!("{}?{}", upstream_path, q),
            None => upstream_path.clone(),
        };
        parts.uri = path_and_query
            .parse::<Uri>()
            .map_err(|e| GatewayError::MalformedPath(format!("{}: {}", path_and_query, e)))?;
        parts.version = Version::HTTP_11;

        let inbound_host = parts.headers.get(header::HOST).cloned();
        let headers = &mut parts.headers;
        strip_hop_by_hop(headers);
        headers.remove(header::HOST);

        if let Some(host) = inbound_host {
            headers.insert(X_FORWARDED_HOST, host);
        }
        if let Some(addr) = ctx.client_addr {
            let ip = addr.ip().to_string();
            let value = match headers.get(&X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
                Some(prior) => format!("{}, {}", prior, ip),
                None => ip,
            };
            if let Ok(v) = HeaderValue::from_str(&value) {
                headers.insert(X_FORWARDED_FOR, v);
            }
        }
        headers.insert(X_FORWARDED_PROTO, HeaderValue::from_static("http"));
        if let Ok(id) = HeaderValue::from_str(&ctx.request_id) {
            headers.insert(X_REQUEST_ID, id);
        }

        if self.transport.disable_compression {
            headers.remove(header::ACCEPT_ENCODING);
        }
        if self.transport.disable_keep_alives {
            headers.insert(header::CONNECTION, HeaderValue::from_static("close"));
        }

        Ok((Request::from_parts(parts, body), upstream_path))
    }

    /// Send stage: one HTTP/1.1 exchange over an already dialed connection.
    async fn send(
        &self,
        conn: DialedConnection,
        mut req: Request<Body>,
    ) -> Result<Response<Body>, GatewayError> {
        let DialedConnection {
            backend, stream, ..
        } = conn;

        let host = HeaderValue::from_str(&backend).map_err(|e| {
            GatewayError::Upstream(format!("invalid backend address {}: {}", backend, e))
        })?;
        req.headers_mut().insert(header::HOST, host);

        let (mut sender, connection) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
            .await
            .map_err(|e| GatewayError::Upstream(format!("{}: {}", backend, e)))?;

        let peer = backend.clone();
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::debug!("upstream connection to {} ended: {}", peer, e);
            }
        });

        let response = match self.transport.response_header_timeout {
            Some(limit) => tokio::time::timeout(limit, sender.send_request(req))
                .await
                .map_err(|_| GatewayError::UpstreamTimeout)?,
            None => sender.send_request(req).await,
        }
        .map_err(|e| GatewayError::Upstream(format!("{}: {}", backend, e)))?;

        let (mut parts, body) = response.into_parts();
        strip_hop_by_hop(&mut parts.headers);
        Ok(Response::from_parts(parts, Body::new(body)))
    }

    fn record(&self, key: &MetricsKey, elapsed: Duration) {
        self.metrics.record_round_trip(key, elapsed);
    }
}

/// Remove hop-by-hop headers, including any named in `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<String> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|name| name.trim().to_ascii_lowercase())
        .filter(|name| !name.is_empty())
        .collect();

    for name in &listed {
        headers.remove(name.as_str());
    }
    for name in HOP_BY_HOP {
        headers.remove(*name);
    }
}
