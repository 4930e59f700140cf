//! Domain Errors
//!
//! Every failure the routing core can produce. Configuration variants are
//! fatal at startup; the rest are per-request and mapped to HTTP responses
//! by the inbound adapter.

/// Errors raised by the routing, balancing and proxying core.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    // ===== Configuration (fatal at startup) =====
    #[error("unknown balancing strategy: {0}")]
    UnknownStrategy(String),

    #[error("API definition {0} has no backends")]
    NoBackends(String),

    #[error("unsupported upstream scheme {scheme:?} for API {api}")]
    UnsupportedScheme { api: String, scheme: String },

    #[error("duplicate route path {0}")]
    DuplicateRoute(String),

    // ===== Per-request =====
    #[error("empty endpoint set")]
    EmptyEndpointSet,

    #[error("Invalid path: {0}")]
    MalformedPath(String),

    #[error("No API definition for request path")]
    RouteNotFound(String),

    #[error("no backend available for {api} after {attempts} attempts")]
    NoBackendAvailable { api: String, attempts: usize },

    #[error("request deadline exceeded")]
    Cancelled,

    #[error("upstream round-trip failed: {0}")]
    Upstream(String),

    #[error("timed out waiting for upstream response headers")]
    UpstreamTimeout,
}

impl GatewayError {
    /// Whether this error can only happen while building the route table.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::UnknownStrategy(_)
                | Self::NoBackends(_)
                | Self::UnsupportedScheme { .. }
                | Self::DuplicateRoute(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_not_found_message() {
        let err = GatewayError::RouteNotFound("/orders/v9".to_string());
        assert_eq!(err.to_string(), "No API definition for request path");
    }

    #[test]
    fn test_no_backend_available_mentions_api_and_attempts() {
        let err = GatewayError::NoBackendAvailable {
            api: "orders".to_string(),
            attempts: 4,
        };
        let msg = err.to_string();
        assert!(msg.contains("orders"));
        assert!(msg.contains('4'));
    }

    #[test]
    fn test_configuration_classification() {
        assert!(GatewayError::UnknownStrategy("weighted".into()).is_configuration());
        assert!(GatewayError::NoBackends("orders".into()).is_configuration());
        assert!(GatewayError::DuplicateRoute("/orders/v1".into()).is_configuration());
        assert!(!GatewayError::EmptyEndpointSet.is_configuration());
        assert!(!GatewayError::Cancelled.is_configuration());
        assert!(!GatewayError::UpstreamTimeout.is_configuration());
    }
}
