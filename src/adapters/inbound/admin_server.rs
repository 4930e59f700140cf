//! Admin API Server
//!
//! Read-only monitoring surface: health, the resolved route table and the
//! round-trip metrics snapshot.

use crate::application::{RouteSummary, RouteTable};
use crate::domain::ports::MetricsStore;
use crate::infrastructure::ShutdownController;
use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Health response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub routes: usize,
    pub in_flight_requests: usize,
}

#[derive(Debug, Serialize)]
pub struct RoutesResponse {
    pub routes: Vec<RouteSummary>,
    pub total: usize,
}

/// One metrics entry with durations in microseconds.
#[derive(Debug, Serialize)]
pub struct MetricsEntry {
    pub method: String,
    pub route_path: String,
    pub upstream_path: String,
    pub count: u64,
    pub total_duration_us: u128,
    pub average_duration_us: u128,
    pub failures: u64,
}

#[derive(Debug, Serialize)]
pub struct MetricsResponse {
    pub metrics: Vec<MetricsEntry>,
    pub total: usize,
}

#[derive(Clone)]
pub struct AdminState {
    pub routes: Arc<RouteTable>,
    pub metrics: Arc<dyn MetricsStore>,
    pub shutdown: ShutdownController,
}

impl AdminState {
    pub fn new(
        routes: Arc<RouteTable>,
        metrics: Arc<dyn MetricsStore>,
        shutdown: ShutdownController,
    ) -> Self {
        Self {
            routes,
            metrics,
            shutdown,
        }
    }
}

pub struct AdminServer {
    listen_addr: SocketAddr,
    state: AdminState,
}

impl AdminServer {
    pub fn new(listen_addr: SocketAddr, state: AdminState) -> Self {
        Self { listen_addr, state }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(health_handler))
            .route("/api/v1/routes", get(routes_handler))
            .route("/api/v1/metrics", get(metrics_handler))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Serve until the shutdown controller fires.
    pub async fn run(&self) -> anyhow::Result<()> {
        let listener = TcpListener::bind(self.listen_addr).await?;
        tracing::info!("admin API listening on {}", self.listen_addr);

        let shutdown = self.state.shutdown.clone();
        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move { shutdown.wait().await })
            .await?;

        tracing::info!("admin API stopped");
        Ok(())
    }
}

async fn health_handler(State(state): State<AdminState>) -> impl IntoResponse {
    let status = if state.shutdown.is_shutdown() {
        "draining"
    } else {
        "ok"
    };
    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        routes: state.routes.len(),
        in_flight_requests: state.shutdown.in_flight(),
    })
}

async fn routes_handler(State(state): State<AdminState>) -> impl IntoResponse {
    let routes = state.routes.summaries();
    let total = routes.len();
    Json(RoutesResponse { routes, total })
}

async fn metrics_handler(State(state): State<AdminState>) -> impl IntoResponse {
    let metrics: Vec<MetricsEntry> = state
        .metrics
        .snapshot()
        .into_iter()
        .map(|m| MetricsEntry {
            average_duration_us: m.average_duration().as_micros(),
            total_duration_us: m.total_duration.as_micros(),
            method: m.key.method,
            route_path: m.key.route_path,
            upstream_path: m.key.upstream_path,
            count: m.count,
            failures: m.failures,
        })
        .collect();
    let total = metrics.len();
    Json(MetricsResponse { metrics, total })
}
