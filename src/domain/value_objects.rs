//! Value Objects - Immutable domain primitives
//!
//! Value objects are identified by their value rather than identity.
//! They are immutable and can be freely shared.

use crate::domain::errors::GatewayError;
use serde::{Deserialize, Serialize};

/// Load-balancing strategy named in an API definition.
///
/// Resolved once when the route table is built, never per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BalancingStrategy {
    /// Cycle through backends in configured order
    RoundRobin,
    /// Pick a uniformly random backend
    Random,
}

impl BalancingStrategy {
    pub const ROUND_ROBIN: &'static str = "round-robin";
    pub const RANDOM: &'static str = "random";

    /// Parse a strategy name.
    ///
    /// # Examples
    /// ```
    /// use routegate::domain::value_objects::BalancingStrategy;
    ///
    /// assert_eq!(BalancingStrategy::parse("random").unwrap(), BalancingStrategy::Random);
    /// assert!(BalancingStrategy::parse("least-conn").is_err());
    /// ```
    pub fn parse(name: &str) -> Result<Self, GatewayError> {
        match name.trim().to_lowercase().as_str() {
            Self::ROUND_ROBIN => Ok(Self::RoundRobin),
            Self::RANDOM => Ok(Self::Random),
            _ => Err(GatewayError::UnknownStrategy(name.to_string())),
        }
    }

    /// Convert to the configured name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RoundRobin => Self::ROUND_ROBIN,
            Self::Random => Self::RANDOM,
        }
    }
}

impl std::fmt::Display for BalancingStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Normalized `/{api}/v{version}` key of the route table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct RoutePath(String);

impl RoutePath {
    /// Build a route path from an API path segment and a bare version.
    ///
    /// Leading/trailing slashes on `api` are ignored, so both `orders` and
    /// `/orders/` give `/orders/v1` for version `1`.
    pub fn new(api: &str, version: &str) -> Self {
        let api = api.trim_matches('/');
        let version = version.trim_start_matches('v');
        Self(format!("/{}/v{}", api, version))
    }

    /// Build the lookup key for an inbound request from its first two
    /// segments, verbatim. `orders` + `1` gives `/orders/1`, which no
    /// configured route matches.
    pub fn from_segments(api: &str, version_segment: &str) -> Self {
        Self(format!("/{}/{}", api, version_segment))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::borrow::Borrow<str> for RoutePath {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RoutePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The gateway mount prefix, e.g. `/gw/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountPath(String);

impl MountPath {
    /// Normalize a configured mount path. `gw`, `/gw` and `/gw/` are equivalent;
    /// an empty value or `/` mounts at the root.
    pub fn new(path: &str) -> Self {
        Self(path.trim_matches('/').to_string())
    }

    /// The canonical `/{mount}/` form used for logging and display.
    pub fn endpoint_path(&self) -> String {
        if self.0.is_empty() {
            "/".to_string()
        } else {
            format!("/{}/", self.0)
        }
    }

    /// Remove the mount prefix from an inbound request path.
    ///
    /// Returns `None` when the path is not under the mount. Only a whole
    /// leading segment match counts: `/gwx/orders` is not under `/gw/`.
    pub fn strip<'a>(&self, path: &'a str) -> Option<&'a str> {
        if self.0.is_empty() {
            return Some(path);
        }
        let rest = path.strip_prefix('/')?.strip_prefix(self.0.as_str())?;
        if rest.is_empty() || rest.starts_with('/') {
            Some(rest)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ===== BalancingStrategy Tests =====

    #[test]
    fn test_strategy_parse_known_names() {
        assert_eq!(
            BalancingStrategy::parse("round-robin").unwrap(),
            BalancingStrategy::RoundRobin
        );
        assert_eq!(
            BalancingStrategy::parse("random").unwrap(),
            BalancingStrategy::Random
        );
    }

    #[test]
    fn test_strategy_parse_is_case_insensitive() {
        assert_eq!(
            BalancingStrategy::parse("Round-Robin").unwrap(),
            BalancingStrategy::RoundRobin
        );
        assert_eq!(
            BalancingStrategy::parse(" RANDOM ").unwrap(),
            BalancingStrategy::Random
        );
    }

    #[test]
    fn test_strategy_parse_unknown() {
        let err = BalancingStrategy::parse("least-connections").unwrap_err();
        assert_eq!(
            err,
            GatewayError::UnknownStrategy("least-connections".to_string())
        );
    }

    #[test]
    fn test_strategy_display_roundtrip() {
        for strategy in [BalancingStrategy::RoundRobin, BalancingStrategy::Random] {
            assert_eq!(BalancingStrategy::parse(&strategy.to_string()).unwrap(), strategy);
        }
    }

    // ===== RoutePath Tests =====

    #[test]
    fn test_route_path_normalizes_slashes() {
        assert_eq!(RoutePath::new("orders", "1").as_str(), "/orders/v1");
        assert_eq!(RoutePath::new("/orders", "1").as_str(), "/orders/v1");
        assert_eq!(RoutePath::new("/orders/", "2").as_str(), "/orders/v2");
    }

    #[test]
    fn test_route_path_accepts_prefixed_version() {
        assert_eq!(RoutePath::new("orders", "v3"), RoutePath::new("orders", "3"));
    }

    #[test]
    fn test_route_path_from_request_segments() {
        assert_eq!(RoutePath::from_segments("orders", "v1"), RoutePath::new("orders", "1"));
        assert_eq!(RoutePath::from_segments("orders", "1").as_str(), "/orders/1");
        assert_ne!(RoutePath::from_segments("orders", "1"), RoutePath::new("orders", "1"));
    }

    // ===== MountPath Tests =====

    #[test]
    fn test_mount_endpoint_path() {
        assert_eq!(MountPath::new("/gw/").endpoint_path(), "/gw/");
        assert_eq!(MountPath::new("gw").endpoint_path(), "/gw/");
        assert_eq!(MountPath::new("/").endpoint_path(), "/");
        assert_eq!(MountPath::new("").endpoint_path(), "/");
    }

    #[test]
    fn test_mount_strip() {
        let mount = MountPath::new("/gw/");
        assert_eq!(mount.strip("/gw/orders/v1/items"), Some("/orders/v1/items"));
        assert_eq!(mount.strip("/gw"), Some(""));
        assert_eq!(mount.strip("/other/orders/v1"), None);
    }

    #[test]
    fn test_mount_strip_requires_whole_segment() {
        let mount = MountPath::new("/gw/");
        assert_eq!(mount.strip("/gwx/orders/v1"), None);
    }

    #[test]
    fn test_mount_strip_only_removes_leading_prefix() {
        let mount = MountPath::new("/gw/");
        assert_eq!(mount.strip("/gw/gw/v1/gw"), Some("/gw/v1/gw"));
    }

    #[test]
    fn test_root_mount_strips_nothing() {
        let mount = MountPath::new("/");
        assert_eq!(mount.strip("/orders/v1"), Some("/orders/v1"));
    }
}
