//! routegate - Versioned API Gateway
//!
//! This is the composition root that wires together all the components.

use anyhow::Context;
use clap::{Parser, Subcommand};
use routegate::adapters::inbound::{AdminServer, AdminState, GatewayServer, GatewayState};
use routegate::adapters::outbound::{DashMapMetricsStore, TcpConnector};
use routegate::application::RouteTable;
use routegate::config::{load_config, Config, DEFAULT_CONFIG_PATH};
use routegate::domain::ports::MetricsStore;
use routegate::domain::value_objects::MountPath;
use routegate::infrastructure::{shutdown_signal, RequestIdGenerator, ShutdownController};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::fmt::format::FmtSpan;

/// How long in-flight requests may take to finish after the servers stop.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Parser, Debug)]
#[command(
    name = "routegate",
    about = "Versioned API gateway with pluggable load balancing and dial retries",
    version,
    propagate_version = true
)]
struct Cli {
    /// Configuration file path
    #[arg(
        short,
        long,
        global = true,
        env = "ROUTEGATE_CONFIG",
        default_value = DEFAULT_CONFIG_PATH
    )]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Start the gateway (default if no command specified)
    Start,
    /// Print the resolved configuration and route table
    Show,
}

fn init_tracing(debug: bool) {
    let log_level = if debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let cfg = load_config(&cli.config)
        .with_context(|| format!("loading configuration from {}", cli.config.display()))?;
    init_tracing(cfg.debug);

    // ===== COMPOSITION ROOT =====

    // 1. Outbound adapters
    let metrics = Arc::new(DashMapMetricsStore::new());
    let connector = Arc::new(TcpConnector::new(cfg.dial_settings()));

    // 2. Route table: one proxy, dialer and balancer per route
    let routes = Arc::new(
        RouteTable::from_config(
            &cfg.api.endpoints,
            connector,
            cfg.transport_settings(),
            metrics.clone(),
        )
        .context("building route table")?,
    );

    match cli.command.unwrap_or(Command::Start) {
        Command::Show => show(&cfg, &routes),
        Command::Start => start(cfg, routes, metrics).await,
    }
}

fn show(cfg: &Config, routes: &RouteTable) -> anyhow::Result<()> {
    let view = serde_json::json!({
        "api": cfg.api.name,
        "gateway": cfg.gateway,
        "debug": cfg.debug,
        "routes": routes.summaries(),
    });
    println!("{}", serde_json::to_string_pretty(&view)?);
    Ok(())
}

async fn start(
    cfg: Config,
    routes: Arc<RouteTable>,
    metrics: Arc<DashMapMetricsStore>,
) -> anyhow::Result<()> {
    tracing::info!(
        "starting routegate {} for {} ({} routes)",
        env!("CARGO_PKG_VERSION"),
        cfg.api.name,
        routes.len()
    );

    let shutdown = ShutdownController::new();
    tokio::spawn(shutdown_signal(shutdown.clone()));

    // 3. Inbound adapters
    let admin = if cfg.gateway.admin.enabled {
        let server = AdminServer::new(
            cfg.admin_listen_addr()?,
            AdminState::new(routes.clone(), metrics.clone(), shutdown.clone()),
        );
        Some(tokio::spawn(async move { server.run().await }))
    } else {
        None
    };

    let gateway = GatewayServer::new(
        cfg.listen_addr()?,
        GatewayState {
            mount: MountPath::new(&cfg.gateway.endpoint.path),
            routes,
            ids: Arc::new(RequestIdGenerator::new()),
            request_timeout: cfg.request_timeout(),
            shutdown: shutdown.clone(),
        },
        cfg.gateway.cors.clone(),
    );

    let result = gateway.run().await;
    if let Err(e) = &result {
        tracing::error!("gateway server failed: {:#}", e);
        shutdown.shutdown();
    }

    if let Some(handle) = admin {
        match handle.await {
            Ok(Err(e)) => tracing::error!("admin server failed: {:#}", e),
            Err(e) => tracing::error!("admin server task panicked: {}", e),
            Ok(Ok(())) => {}
        }
    }

    if shutdown.wait_for_drain(DRAIN_TIMEOUT).await {
        tracing::info!("all requests drained");
    }

    for m in metrics.snapshot() {
        tracing::debug!(
            "{} {} -> {}: count={} avg={:?} failures={}",
            m.key.method,
            m.key.route_path,
            m.key.upstream_path,
            m.count,
            m.average_duration(),
            m.failures
        );
    }

    result
}
