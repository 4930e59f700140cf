//! Gateway configuration.
//!
//! The route table is a nested list, so the configuration is read from a JSON
//! file. A handful of deployment knobs can be overridden from the environment.

use crate::adapters::outbound::DialSettings;
use crate::application::TransportSettings;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "routegate.json";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub gateway: GatewayConfig,
    pub api: ApiConfig,
    pub debug: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub endpoint: EndpointConfig,
    pub admin: AdminConfig,
    pub cors: CorsConfig,
    pub transport: TransportConfig,
    pub dial: DialConfig,
    /// Per-request deadline; `null` disables it
    pub request_timeout_secs: Option<u64>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            endpoint: EndpointConfig::default(),
            admin: AdminConfig::default(),
            cors: CorsConfig::default(),
            transport: TransportConfig::default(),
            dial: DialConfig::default(),
            request_timeout_secs: Some(60),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// Mount path all APIs are served under
    pub path: String,
    pub listen_addr: String,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            path: "/gw/".to_string(),
            listen_addr: "0.0.0.0:9000".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    pub enabled: bool,
    pub listen_addr: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1:9001".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CorsConfig {
    pub origins: Vec<String>,
    pub methods: Vec<String>,
    pub headers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub response_header_timeout_secs: Option<u64>,
    pub disable_keep_alives: bool,
    pub disable_compression: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            response_header_timeout_secs: Some(30),
            disable_keep_alives: false,
            disable_compression: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DialConfig {
    pub upstream_timeout_secs: u64,
    /// TCP keep-alive idle time; `null` leaves the OS default
    pub keep_alive_secs: Option<u64>,
    pub dual_stack: bool,
}

impl Default for DialConfig {
    fn default() -> Self {
        Self {
            upstream_timeout_secs: 30,
            keep_alive_secs: Some(30),
            dual_stack: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ApiConfig {
    pub name: String,
    pub endpoints: Vec<ApiEndpointConfig>,
}

/// One versioned API exposed by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiEndpointConfig {
    pub name: String,
    pub path: String,
    pub version: String,
    pub proxy: ProxyConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyConfig {
    #[serde(default)]
    pub path: String,
    #[serde(default = "default_scheme")]
    pub scheme: String,
    pub targets: Vec<String>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default)]
    pub balancing: BalancingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BalancingConfig {
    pub strategy: String,
}

impl Default for BalancingConfig {
    fn default() -> Self {
        Self {
            strategy: "round-robin".to_string(),
        }
    }
}

fn default_scheme() -> String {
    "http".to_string()
}

fn default_max_retries() -> u32 {
    1
}

impl Config {
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    /// Apply environment overrides through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = lookup("ROUTEGATE_LISTEN_ADDR") {
            self.gateway.endpoint.listen_addr = addr;
        }
        if let Some(addr) = lookup("ROUTEGATE_ADMIN_LISTEN_ADDR") {
            self.gateway.admin.listen_addr = addr;
        }
        if let Some(v) = lookup("ROUTEGATE_ADMIN_ENABLED") {
            self.gateway.admin.enabled = v == "1" || v.to_lowercase() == "true";
        }
        if lookup("DEBUG").is_some() {
            self.debug = true;
        }
    }

    /// Check the settings that cannot be validated by deserialization alone.
    ///
    /// Route-level problems (strategies, schemes, duplicates) are reported
    /// when the route table is built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        parse_addr("gateway.endpoint.listen_addr", &self.gateway.endpoint.listen_addr)?;
        if self.gateway.admin.enabled {
            parse_addr("gateway.admin.listen_addr", &self.gateway.admin.listen_addr)?;
        }
        if self.gateway.dial.upstream_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "gateway.dial.upstream_timeout_secs must be greater than 0".to_string(),
            ));
        }
        for endpoint in &self.api.endpoints {
            let path = endpoint.path.trim_matches('/');
            if path.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "endpoint {} has an empty path",
                    endpoint.name
                )));
            }
            // Requests are routed on `{api}/{version}` only, so a nested path never matches.
            if path.contains('/') {
                return Err(ConfigError::Invalid(format!(
                    "endpoint {} path {:?} must be a single segment",
                    endpoint.name, endpoint.path
                )));
            }
            let version = endpoint.version.trim_start_matches('v');
            if version.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "endpoint {} has an empty version",
                    endpoint.name
                )));
            }
            if version.contains('/') {
                return Err(ConfigError::Invalid(format!(
                    "endpoint {} version {:?} must be a single segment",
                    endpoint.name, endpoint.version
                )));
            }
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        parse_addr("gateway.endpoint.listen_addr", &self.gateway.endpoint.listen_addr)
    }

    pub fn admin_listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        parse_addr("gateway.admin.listen_addr", &self.gateway.admin.listen_addr)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.gateway.request_timeout_secs.map(Duration::from_secs)
    }

    pub fn dial_settings(&self) -> DialSettings {
        let dial = &self.gateway.dial;
        DialSettings {
            timeout: Duration::from_secs(dial.upstream_timeout_secs),
            keep_alive: dial.keep_alive_secs.map(Duration::from_secs),
            dual_stack: dial.dual_stack,
        }
    }

    pub fn transport_settings(&self) -> TransportSettings {
        let transport = &self.gateway.transport;
        TransportSettings {
            response_header_timeout: transport
                .response_header_timeout_secs
                .map(Duration::from_secs),
            disable_keep_alives: transport.disable_keep_alives,
            disable_compression: transport.disable_compression,
        }
    }
}

fn parse_addr(field: &str, value: &str) -> Result<SocketAddr, ConfigError> {
    value
        .parse()
        .map_err(|e| ConfigError::Invalid(format!("{} {:?}: {}", field, value, e)))
}

/// Load the config file at `path`, then apply environment overrides.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let mut cfg = Config::from_file(path)?;
    cfg.apply_overrides(|key| std::env::var(key).ok());
    cfg.validate()?;
    Ok(cfg)
}
