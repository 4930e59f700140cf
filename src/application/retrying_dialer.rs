//! Retrying Dialer
//!
//! Turns one routing decision into a connected backend: asks the route's
//! balancer for a backend, dials it, and retries on failure until the retry
//! budget (`max_retries_per_backend × backends`) is spent.
//!
//! A backend that refused within this dial is left out of the candidates
//! until every backend has been tried once; then a new round starts over the
//! full list. Each backend is therefore dialed at most
//! `max_retries_per_backend` times per request, independent of how other
//! requests move the shared balancer state.

use crate::domain::entities::{ApiDefinition, RequestContext};
use crate::domain::errors::GatewayError;
use crate::domain::ports::{Balancer, Connector};
use std::sync::Arc;
use tokio::net::TcpStream;

/// A connection produced by a successful dial.
#[derive(Debug)]
pub struct DialedConnection {
    /// Backend address that accepted the connection
    pub backend: String,
    /// Index of that backend in the configured list
    pub index: usize,
    /// 1-based attempt number that succeeded
    pub attempts: usize,
    pub stream: TcpStream,
}

/// Dialer bound to one API definition.
pub struct RetryingDialer {
    api: String,
    backends: Arc<[String]>,
    budget: usize,
    balancer: Arc<dyn Balancer>,
    connector: Arc<dyn Connector>,
}

impl RetryingDialer {
    /// Create a dialer for `definition` using the given strategy instance.
    pub fn new(
        definition: &ApiDefinition,
        balancer: Arc<dyn Balancer>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        Self {
            api: definition.name.clone(),
            backends: definition.backends.clone(),
            budget: definition.retry_budget(),
            balancer,
            connector,
        }
    }

    /// Total attempts this dialer makes before giving up.
    pub fn budget(&self) -> usize {
        self.budget
    }

    pub fn balancer_name(&self) -> &'static str {
        self.balancer.name()
    }

    /// Dial a backend, retrying across the list within the budget.
    ///
    /// Stops early with [`GatewayError::Cancelled`] once the request deadline
    /// has passed; no new attempt is started after that.
    pub async fn dial(&self, ctx: &RequestContext) -> Result<DialedConnection, GatewayError> {
        let mut failed = vec![false; self.backends.len()];

        for attempt in 1..=self.budget {
            if ctx.is_expired() {
                tracing::warn!(
                    "[{}] deadline exceeded before attempt {}/{} for {}",
                    ctx.request_id,
                    attempt,
                    self.budget,
                    self.api
                );
                return Err(GatewayError::Cancelled);
            }

            if failed.iter().all(|f| *f) {
                failed.fill(false);
            }
            let (index, backend) = self.select_untried(&failed)?;

            match self.connector.connect(backend).await {
                Ok(stream) => {
                    tracing::debug!(
                        "[{}] connected to {} (idx {}) for {} on attempt {}/{}",
                        ctx.request_id,
                        backend,
                        index,
                        self.api,
                        attempt,
                        self.budget
                    );
                    return Ok(DialedConnection {
                        backend: backend.to_string(),
                        index,
                        attempts: attempt,
                        stream,
                    });
                }
                Err(e) => {
                    failed[index] = true;
                    tracing::warn!(
                        "[{}] error accessing {} backend {} (attempt {}/{}): {}",
                        ctx.request_id,
                        self.api,
                        backend,
                        attempt,
                        self.budget,
                        e
                    );
                }
            }
        }

        tracing::error!(
            "[{}] no backend available for {} after {} attempts over {} backends",
            ctx.request_id,
            self.api,
            self.budget,
            self.backends.len()
        );
        Err(GatewayError::NoBackendAvailable {
            api: self.api.clone(),
            attempts: self.budget,
        })
    }

    /// Ask the balancer for a backend among those not marked in `failed`.
    /// Returns the index into the full backend list.
    fn select_untried(&self, failed: &[bool]) -> Result<(usize, &str), GatewayError> {
        if !failed.contains(&true) {
            return self.balancer.select(&self.backends);
        }

        let candidates: Vec<usize> = (0..self.backends.len()).filter(|&i| !failed[i]).collect();
        let names: Vec<String> = candidates
            .iter()
            .map(|&i| self.backends[i].clone())
            .collect();
        let (pick, _) = self.balancer.select(&names)?;
        let index = candidates[pick];
        Ok((index, self.backends[index].as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::outbound::{DialSettings, TcpConnector};
    use crate::domain::services::LoadBalancer;
    use crate::domain::value_objects::{BalancingStrategy, RoutePath};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tracing_test::traced_test;

    // ===== Test Helpers =====

    /// Connector that refuses the first `fail_first` dials and records every
    /// address it was asked for. Successful dials go to a real listener.
    struct ScriptedConnector {
        fail_first: usize,
        calls: AtomicUsize,
        dialed: Mutex<Vec<String>>,
        listener_addr: String,
    }

    impl ScriptedConnector {
        async fn new(fail_first: usize) -> (Arc<Self>, TcpListener) {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let connector = Arc::new(Self {
                fail_first,
                calls: AtomicUsize::new(0),
                dialed: Mutex::new(Vec::new()),
                listener_addr: listener.local_addr().unwrap().to_string(),
            });
            (connector, listener)
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn dialed(&self) -> Vec<String> {
            self.dialed.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Connector for ScriptedConnector {
        async fn connect(&self, addr: &str) -> std::io::Result<TcpStream> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            self.dialed.lock().unwrap().push(addr.to_string());
            if n <= self.fail_first {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    "refused",
                ));
            }
            TcpStream::connect(&self.listener_addr).await
        }
    }

    /// Connector keyed by address: only `good` accepts.
    struct OnlyConnector {
        good: String,
        listener_addr: String,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Connector for OnlyConnector {
        async fn connect(&self, addr: &str) -> std::io::Result<TcpStream> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if addr == self.good {
                TcpStream::connect(&self.listener_addr).await
            } else {
                Err(std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    "refused",
                ))
            }
        }
    }

    fn definition(backends: &[&str], retries: u32, strategy: BalancingStrategy) -> ApiDefinition {
        ApiDefinition::new(
            "orders",
            RoutePath::new("orders", "1"),
            "/api",
            "http",
            backends.iter().map(|b| b.to_string()).collect(),
            strategy,
            retries,
        )
        .unwrap()
    }

    fn ctx() -> RequestContext {
        RequestContext::new("req-test", RoutePath::new("orders", "1"))
    }

    fn dialer(def: &ApiDefinition, connector: Arc<dyn Connector>) -> RetryingDialer {
        RetryingDialer::new(def, LoadBalancer::for_strategy(def.strategy), connector)
    }

    // ===== Budget Tests =====

    #[tokio::test]
    async fn test_first_attempt_success_dials_once() {
        let (connector, _listener) = ScriptedConnector::new(0).await;
        let def = definition(&["a:1", "b:1"], 2, BalancingStrategy::RoundRobin);

        let conn = dialer(&def, connector.clone()).dial(&ctx()).await.unwrap();
        assert_eq!(conn.attempts, 1);
        assert_eq!(conn.backend, "a:1");
        assert_eq!(connector.calls(), 1);
    }

    #[tokio::test]
    async fn test_jth_attempt_success_dials_exactly_j_times() {
        // k = 2 retries per backend, m = 3 backends: budget 6.
        for j in 1..=6 {
            let (connector, _listener) = ScriptedConnector::new(j - 1).await;
            let def = definition(&["a:1", "b:1", "c:1"], 2, BalancingStrategy::RoundRobin);

            let conn = dialer(&def, connector.clone()).dial(&ctx()).await.unwrap();
            assert_eq!(conn.attempts, j);
            assert_eq!(connector.calls(), j);
        }
    }

    #[tokio::test]
    async fn test_exhausted_budget_fails_after_k_times_m_dials() {
        let (connector, _listener) = ScriptedConnector::new(usize::MAX).await;
        let def = definition(&["a:1", "b:1", "c:1"], 2, BalancingStrategy::Random);

        let err = dialer(&def, connector.clone()).dial(&ctx()).await.unwrap_err();
        assert_eq!(
            err,
            GatewayError::NoBackendAvailable {
                api: "orders".to_string(),
                attempts: 6
            }
        );
        assert_eq!(connector.calls(), 6);
    }

    #[tokio::test]
    async fn test_zero_retries_never_dials() {
        let (connector, _listener) = ScriptedConnector::new(0).await;
        let def = definition(&["a:1"], 0, BalancingStrategy::RoundRobin);

        let err = dialer(&def, connector.clone()).dial(&ctx()).await.unwrap_err();
        assert!(matches!(err, GatewayError::NoBackendAvailable { attempts: 0, .. }));
        assert_eq!(connector.calls(), 0);
    }

    // ===== Selection Policy Tests =====

    #[tokio::test]
    async fn test_failed_backend_excluded_until_round_completes() {
        let (connector, _listener) = ScriptedConnector::new(usize::MAX).await;
        let def = definition(&["a:1", "b:1", "c:1"], 2, BalancingStrategy::Random);

        let _ = dialer(&def, connector.clone()).dial(&ctx()).await;
        let dialed = connector.dialed();
        assert_eq!(dialed.len(), 6);
        // Every round of three attempts covers each backend exactly once.
        for round in dialed.chunks(3) {
            let mut round = round.to_vec();
            round.sort();
            assert_eq!(round, vec!["a:1", "b:1", "c:1"]);
        }
    }

    #[tokio::test]
    async fn test_round_robin_skips_refused_backend_within_dial() {
        let (connector, _listener) = ScriptedConnector::new(usize::MAX).await;
        let def = definition(&["a:1", "b:1"], 2, BalancingStrategy::RoundRobin);

        let _ = dialer(&def, connector.clone()).dial(&ctx()).await;
        assert_eq!(connector.dialed(), vec!["a:1", "b:1", "a:1", "b:1"]);
    }

    #[tokio::test]
    async fn test_retries_past_refusing_backend() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let connector = Arc::new(OnlyConnector {
            good: "good:1".to_string(),
            listener_addr: listener.local_addr().unwrap().to_string(),
            calls: AtomicUsize::new(0),
        });
        let def = definition(&["bad:1", "good:1"], 1, BalancingStrategy::RoundRobin);
        let dialer = dialer(&def, connector.clone());

        for _ in 0..10 {
            let conn = dialer.dial(&ctx()).await.unwrap();
            assert_eq!(conn.backend, "good:1");
            assert_eq!(conn.index, 1);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_dials_always_reach_accepting_backend() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let good = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let mut accepted = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                accepted.push(stream);
            }
        });

        let closed = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let refused = closed.local_addr().unwrap().to_string();
        drop(closed);

        let def = definition(&[refused.as_str(), good.as_str()], 1, BalancingStrategy::RoundRobin);
        let connector = Arc::new(TcpConnector::new(DialSettings {
            timeout: Duration::from_secs(5),
            ..DialSettings::default()
        }));
        let dialer = Arc::new(dialer(&def, connector));

        let handles: Vec<_> = (0..200)
            .map(|i| {
                let dialer = dialer.clone();
                tokio::spawn(async move {
                    let ctx = RequestContext::new(
                        format!("req-{}", i),
                        RoutePath::new("orders", "1"),
                    );
                    dialer.dial(&ctx).await.map(|conn| conn.index)
                })
            })
            .collect();

        let mut failures = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(index) => assert_eq!(index, 1),
                Err(_) => failures += 1,
            }
        }
        assert_eq!(failures, 0);
    }

    // ===== Cancellation Tests =====

    #[tokio::test]
    async fn test_expired_deadline_stops_before_dialing() {
        let (connector, _listener) = ScriptedConnector::new(0).await;
        let def = definition(&["a:1", "b:1"], 3, BalancingStrategy::RoundRobin);
        let ctx = ctx().with_timeout(Some(Duration::ZERO));

        let err = dialer(&def, connector.clone()).dial(&ctx).await.unwrap_err();
        assert_eq!(err, GatewayError::Cancelled);
        assert_eq!(connector.calls(), 0);
    }

    // ===== Logging Tests =====

    #[traced_test]
    #[tokio::test]
    async fn test_failure_logged_with_backend_identity() {
        let (connector, _listener) = ScriptedConnector::new(1).await;
        let def = definition(&["flaky-backend:9", "b:1"], 1, BalancingStrategy::RoundRobin);

        dialer(&def, connector).dial(&ctx()).await.unwrap();
        assert!(logs_contain("flaky-backend:9"));
    }

    #[test]
    fn test_budget_and_balancer_name() {
        let def = definition(&["a:1", "b:1"], 3, BalancingStrategy::Random);
        let connector = Arc::new(OnlyConnector {
            good: String::new(),
            listener_addr: String::new(),
            calls: AtomicUsize::new(0),
        });
        let dialer = dialer(&def, connector);
        assert_eq!(dialer.budget(), 6);
        assert_eq!(dialer.balancer_name(), "random");
    }
}
