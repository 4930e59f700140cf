//! Gateway Server
//!
//! The public HTTP front door. Every request under the mount path is shaped
//! `{mount}/{api}/{version}/{rest...}`; the router resolves the route,
//! attaches a correlation id and hands the request to the route's proxy.

use crate::application::{RouteTable, X_REQUEST_ID};
use crate::config::CorsConfig;
use crate::domain::entities::RequestContext;
use crate::domain::errors::GatewayError;
use crate::domain::value_objects::{MountPath, RoutePath};
use crate::infrastructure::{RequestIdGenerator, ShutdownController};
use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderName, HeaderValue, Method, Request, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use http_body_util::BodyExt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = match &self {
            GatewayError::RouteNotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::MalformedPath(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::Cancelled => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::NoBackendAvailable { .. }
            | GatewayError::EmptyEndpointSet
            | GatewayError::Upstream(_)
            | GatewayError::UpstreamTimeout => StatusCode::BAD_GATEWAY,
            GatewayError::UnknownStrategy(_)
            | GatewayError::NoBackends(_)
            | GatewayError::UnsupportedScheme { .. }
            | GatewayError::DuplicateRoute(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}

/// The `{api}/{version}/{rest...}` parts of a mount-relative request path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApiRequestPath<'a> {
    pub api: &'a str,
    /// Second segment exactly as sent, e.g. `v1`
    pub version_segment: &'a str,
    /// Effective path for the upstream; keeps its leading slash, empty when
    /// the path ends at the version segment
    pub rest: &'a str,
}

impl<'a> ApiRequestPath<'a> {
    /// Version without its `v` prefix.
    pub fn version(&self) -> &'a str {
        self.version_segment
            .strip_prefix('v')
            .unwrap_or(self.version_segment)
    }

    /// Route table key built from the segments as sent. `/orders/1/...`
    /// gives `/orders/1`, which no configured route matches.
    pub fn route_path(&self) -> RoutePath {
        RoutePath::from_segments(self.api, self.version_segment)
    }
}

/// Split a mount-relative path into its API, version and remaining parts.
///
/// Only the shape is checked: two non-empty leading segments. Whether the
/// version segment names a configured route is left to the lookup.
///
/// ```
/// use routegate::adapters::inbound::parse_name_and_version;
///
/// let parsed = parse_name_and_version("/orders/v1/items/42").unwrap();
/// assert_eq!((parsed.api, parsed.version(), parsed.rest), ("orders", "1", "/items/42"));
/// assert_eq!(parsed.route_path().as_str(), "/orders/v1");
/// ```
pub fn parse_name_and_version(path: &str) -> Result<ApiRequestPath<'_>, GatewayError> {
    let malformed = || GatewayError::MalformedPath(path.to_string());

    let trimmed = path.strip_prefix('/').unwrap_or(path);
    let (api, after_name) = trimmed.split_once('/').ok_or_else(malformed)?;
    let (version_segment, rest) = match after_name.find('/') {
        Some(idx) => after_name.split_at(idx),
        None => (after_name, ""),
    };

    if api.is_empty() || version_segment.is_empty() {
        return Err(malformed());
    }
    Ok(ApiRequestPath {
        api,
        version_segment,
        rest,
    })
}

#[derive(Clone)]
pub struct GatewayState {
    pub mount: MountPath,
    pub routes: Arc<RouteTable>,
    pub ids: Arc<RequestIdGenerator>,
    /// Per-request deadline; `None` disables it
    pub request_timeout: Option<Duration>,
    pub shutdown: ShutdownController,
}

pub struct GatewayServer {
    listen_addr: SocketAddr,
    state: GatewayState,
    cors: CorsConfig,
}

impl GatewayServer {
    pub fn new(listen_addr: SocketAddr, state: GatewayState, cors: CorsConfig) -> Self {
        Self {
            listen_addr,
            state,
            cors,
        }
    }

    pub fn router(&self) -> Router {
        let router = Router::new()
            .fallback(gateway_handler)
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone());

        match cors_layer(&self.cors) {
            Some(cors) => router.layer(cors),
            None => router,
        }
    }

    pub async fn run(&self) -> anyhow::Result<()> {
        let listener = TcpListener::bind(self.listen_addr).await?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener until the shutdown controller fires.
    pub async fn serve(&self, listener: TcpListener) -> anyhow::Result<()> {
        tracing::info!(
            "gateway listening on {} at {} ({} routes)",
            listener.local_addr()?,
            self.state.mount.endpoint_path(),
            self.state.routes.len()
        );

        let shutdown = self.state.shutdown.clone();
        axum::serve(
            listener,
            self.router()
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move { shutdown.wait().await })
        .await?;

        tracing::info!("gateway stopped accepting requests");
        Ok(())
    }
}

async fn gateway_handler(State(state): State<GatewayState>, req: Request<Body>) -> Response {
    let path = req.uri().path().to_string();

    let Some(relative) = state.mount.strip(&path) else {
        tracing::debug!("{} is outside the gateway mount", path);
        return GatewayError::RouteNotFound(path).into_response();
    };

    let parsed = match parse_name_and_version(relative) {
        Ok(parsed) => parsed,
        Err(e) => {
            tracing::warn!("rejecting {}: {}", path, e);
            return e.into_response();
        }
    };

    let route_path = parsed.route_path();
    let Some(proxy) = state.routes.get(route_path.as_str()) else {
        tracing::info!("no API definition for {}", route_path);
        return GatewayError::RouteNotFound(route_path.to_string()).into_response();
    };
    let rest = parsed.rest.to_string();

    let request_id = req
        .headers()
        .get(&X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| state.ids.generate());
    let client_addr = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);

    tracing::debug!("[{}] serving {} via {}", request_id, path, route_path);

    let ctx = RequestContext::new(request_id, route_path)
        .with_client_addr(client_addr)
        .with_timeout(state.request_timeout);
    let guard = state.shutdown.request_guard();

    let result = match ctx.deadline {
        Some(deadline) => tokio::time::timeout_at(deadline, proxy.handle(req, &rest, &ctx))
            .await
            .unwrap_or_else(|_| {
                tracing::warn!("[{}] request deadline exceeded", ctx.request_id);
                Err(GatewayError::Cancelled)
            }),
        None => proxy.handle(req, &rest, &ctx).await,
    };

    let (mut parts, body) = result.unwrap_or_else(IntoResponse::into_response).into_parts();
    if let Ok(id) = HeaderValue::from_str(&ctx.request_id) {
        parts.headers.insert(X_REQUEST_ID, id);
    }
    // The request stays in flight until the upstream body is fully sent.
    let body = body.map_frame(move |frame| {
        let _in_flight = &guard;
        frame
    });
    Response::from_parts(parts, Body::new(body))
}

/// CORS layer for the configured origins; `None` when CORS is off.
fn cors_layer(cfg: &CorsConfig) -> Option<CorsLayer> {
    if cfg.origins.is_empty() {
        return None;
    }
    let wildcard = |values: &[String]| values.is_empty() || values.iter().any(|v| v == "*");

    let origins = if cfg.origins.iter().any(|o| o == "*") {
        AllowOrigin::from(Any)
    } else {
        AllowOrigin::list(
            cfg.origins
                .iter()
                .filter_map(|o| HeaderValue::from_str(o).ok()),
        )
    };
    let methods = if wildcard(&cfg.methods) {
        AllowMethods::from(Any)
    } else {
        AllowMethods::list(
            cfg.methods
                .iter()
                .filter_map(|m| Method::from_bytes(m.to_uppercase().as_bytes()).ok()),
        )
    };
    let headers = if wildcard(&cfg.headers) {
        AllowHeaders::from(Any)
    } else {
        AllowHeaders::list(
            cfg.headers
                .iter()
                .filter_map(|h| HeaderName::from_bytes(h.as_bytes()).ok()),
        )
    };

    Some(
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(methods)
            .allow_headers(headers),
    )
}
