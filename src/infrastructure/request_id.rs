//! Request correlation identifiers.
//!
//! Ids look like `routegate@{hostname}/{instance}-{uuid}`: the prefix is
//! fixed for the process lifetime, the uuid is fresh per request.

use rand::Rng;

const INSTANCE_TAG_LEN: usize = 10;

/// Generates `X-Request-Id` values for requests that arrive without one.
#[derive(Debug, Clone)]
pub struct RequestIdGenerator {
    prefix: String,
}

impl RequestIdGenerator {
    /// Prefix built from the local hostname and a random instance tag.
    pub fn new() -> Self {
        let hostname = hostname::get()
            .ok()
            .map(|h| h.to_string_lossy().into_owned())
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| "localhost".to_string());
        Self::with_hostname(&hostname)
    }

    pub fn with_hostname(hostname: &str) -> Self {
        let tag: String = rand::thread_rng()
            .sample_iter(&rand::distributions::Alphanumeric)
            .take(INSTANCE_TAG_LEN)
            .map(char::from)
            .collect();
        Self {
            prefix: format!("routegate@{}/{}", hostname, tag),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn generate(&self) -> String {
        format!("{}-{}", self.prefix, uuid::Uuid::new_v4())
    }
}

impl Default for RequestIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}
