//! Connection supervision for the upstream vendor.
//!
//! The supervisor is the only owner of the live upstream connection. Callers
//! ask it for a connection with [`Supervisor::acquire`] and never observe the
//! reconnect policy directly.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chartfeed_types::Bar;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{BarFeed, FetchRequest, UpstreamError};

/// An established upstream connection.
#[async_trait]
pub trait Connection: Send + Sync + std::fmt::Debug {
    /// Fetches bars over this connection.
    async fn fetch(&self, request: &FetchRequest) -> Result<Vec<Bar>, UpstreamError>;

    /// Returns true if the connection still answers its health probe.
    async fn is_alive(&self) -> bool;
}

/// Establishes upstream connections.
#[async_trait]
pub trait Connector: Send + Sync + std::fmt::Debug {
    /// The connection type produced.
    type Connection: Connection + 'static;

    /// Opens a new connection.
    async fn connect(&self) -> Result<Self::Connection, UpstreamError>;
}

/// Capped exponential backoff with deterministic jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Maximum connect attempts per `acquire` call.
    pub max_attempts: u32,
    /// Base delay for exponential backoff (in milliseconds).
    pub base_delay_ms: u64,
    /// Maximum delay between attempts (in milliseconds).
    pub max_delay_ms: u64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay_ms: 500,
            max_delay_ms: 30_000,
        }
    }
}

impl BackoffPolicy {
    /// Calculates the delay before retry number `attempt` (1-based).
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        // base_delay * 2^attempt
        let exp_delay = self.base_delay_ms.saturating_mul(1u64 << attempt.min(10));
        let capped_delay = exp_delay.min(self.max_delay_ms);

        // ±25% jitter derived from the attempt number
        let jitter_range = capped_delay / 4;
        let jitter = if jitter_range > 0 {
            let offset = (u64::from(attempt) * 17) % (jitter_range * 2);
            offset as i64 - jitter_range as i64
        } else {
            0
        };

        let final_delay = (capped_delay as i64 + jitter).max(100) as u64;
        Duration::from_millis(final_delay)
    }
}

/// Owns the upstream connection and its reconnect policy.
#[derive(Debug)]
pub struct Supervisor<C: Connector> {
    connector: C,
    policy: BackoffPolicy,
    current: Mutex<Option<Arc<C::Connection>>>,
}

impl<C: Connector> Supervisor<C> {
    /// Creates a supervisor. No connection is opened until the first `acquire`.
    #[must_use]
    pub fn new(connector: C, policy: BackoffPolicy) -> Self {
        Self {
            connector,
            policy,
            current: Mutex::new(None),
        }
    }

    /// Returns a healthy connection, reconnecting if needed.
    ///
    /// The health probe runs without holding the supervisor lock; only the
    /// reconnect itself is serialized.
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamError::Unavailable`] once every attempt allowed by the
    /// backoff policy has failed, or [`UpstreamError::Unauthorized`] immediately
    /// if the vendor rejects the credentials.
    pub async fn acquire(&self) -> Result<Arc<C::Connection>, UpstreamError> {
        // Probe outside the lock so concurrent callers do not queue behind it.
        let cached = self.current.lock().await.clone();
        if let Some(conn) = &cached {
            if conn.is_alive().await {
                return Ok(Arc::clone(conn));
            }
            warn!("upstream connection failed health check, reconnecting");
        }

        let mut current = self.current.lock().await;
        match (current.as_ref(), cached.as_ref()) {
            // Another caller reconnected while this one was probing.
            (Some(live), Some(dead)) if !Arc::ptr_eq(live, dead) => return Ok(Arc::clone(live)),
            (Some(live), None) => return Ok(Arc::clone(live)),
            _ => *current = None,
        }

        let mut last_error = String::from("no connect attempt made");
        for attempt in 1..=self.policy.max_attempts.max(1) {
            match self.connector.connect().await {
                Ok(conn) => {
                    info!(attempt, "upstream connection established");
                    let conn = Arc::new(conn);
                    *current = Some(Arc::clone(&conn));
                    return Ok(conn);
                }
                Err(e) if e.is_unauthorized() => return Err(e),
                Err(e) => {
                    warn!(attempt, error = %e, "upstream connect failed");
                    last_error = e.to_string();
                    if attempt < self.policy.max_attempts {
                        let delay = self.policy.delay(attempt);
                        debug!(?delay, "backing off before reconnect");
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Err(UpstreamError::Unavailable(last_error))
    }

    /// Drops the cached connection so the next `acquire` reconnects.
    pub async fn invalidate(&self) {
        *self.current.lock().await = None;
    }
}

#[async_trait]
impl<C: Connector> BarFeed for Supervisor<C> {
    async fn fetch(&self, request: &FetchRequest) -> Result<Vec<Bar>, UpstreamError> {
        let conn = self.acquire().await?;
        let result = conn.fetch(request).await;
        if let Err(e) = &result {
            if e.is_connection_failure() {
                self.invalidate().await;
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    #[derive(Debug)]
    struct FakeConnection {
        alive: Arc<AtomicBool>,
        probe_delay: Duration,
    }

    #[async_trait]
    impl Connection for FakeConnection {
        async fn fetch(&self, request: &FetchRequest) -> Result<Vec<Bar>, UpstreamError> {
            Err(UpstreamError::NoData {
                symbol: request.symbol.clone(),
            })
        }

        async fn is_alive(&self) -> bool {
            tokio::time::sleep(self.probe_delay).await;
            self.alive.load(Ordering::SeqCst)
        }
    }

    #[derive(Debug)]
    struct FakeConnector {
        failures_left: AtomicU32,
        connects: AtomicU32,
        alive: Arc<AtomicBool>,
        probe_delay: Duration,
    }

    impl FakeConnector {
        fn failing(times: u32) -> Self {
            Self {
                failures_left: AtomicU32::new(times),
                connects: AtomicU32::new(0),
                alive: Arc::new(AtomicBool::new(true)),
                probe_delay: Duration::ZERO,
            }
        }

        fn slow_probe(delay: Duration) -> Self {
            Self {
                probe_delay: delay,
                ..Self::failing(0)
            }
        }
    }

    #[async_trait]
    impl Connector for FakeConnector {
        type Connection = FakeConnection;

        async fn connect(&self) -> Result<FakeConnection, UpstreamError> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            if self.failures_left.load(Ordering::SeqCst) > 0 {
                self.failures_left.fetch_sub(1, Ordering::SeqCst);
                return Err(UpstreamError::Unavailable("refused".to_string()));
            }
            Ok(FakeConnection {
                alive: Arc::clone(&self.alive),
                probe_delay: self.probe_delay,
            })
        }
    }

    #[test]
    fn test_backoff_delay_calculation() {
        let policy = BackoffPolicy::default();

        let delay1 = policy.delay(1);
        assert!(delay1.as_millis() >= 750 && delay1.as_millis() <= 1250);

        let delay2 = policy.delay(2);
        assert!(delay2.as_millis() >= 1500 && delay2.as_millis() <= 2500);

        let delay_high = policy.delay(20);
        assert!(delay_high.as_millis() <= 37_500);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_retries_then_reuses() {
        let supervisor = Supervisor::new(FakeConnector::failing(2), BackoffPolicy::default());

        supervisor.acquire().await.unwrap();
        assert_eq!(supervisor.connector.connects.load(Ordering::SeqCst), 3);

        supervisor.acquire().await.unwrap();
        assert_eq!(supervisor.connector.connects.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_gives_up() {
        let policy = BackoffPolicy {
            max_attempts: 2,
            ..BackoffPolicy::default()
        };
        let supervisor = Supervisor::new(FakeConnector::failing(5), policy);

        let err = supervisor.acquire().await.unwrap_err();
        assert!(matches!(err, UpstreamError::Unavailable(_)));
        assert_eq!(supervisor.connector.connects.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dead_connection_is_replaced() {
        let supervisor = Supervisor::new(FakeConnector::failing(0), BackoffPolicy::default());
        supervisor.acquire().await.unwrap();

        supervisor.connector.alive.store(false, Ordering::SeqCst);
        supervisor.acquire().await.unwrap();
        assert_eq!(supervisor.connector.connects.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_health_probes_run_concurrently() {
        let supervisor = Supervisor::new(
            FakeConnector::slow_probe(Duration::from_secs(1)),
            BackoffPolicy::default(),
        );
        supervisor.acquire().await.unwrap();

        let started = tokio::time::Instant::now();
        let (a, b, c, d) = tokio::join!(
            supervisor.acquire(),
            supervisor.acquire(),
            supervisor.acquire(),
            supervisor.acquire()
        );
        assert!(a.is_ok() && b.is_ok() && c.is_ok() && d.is_ok());
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(supervisor.connector.connects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_share_one_reconnect() {
        let supervisor = Supervisor::new(
            FakeConnector::slow_probe(Duration::from_millis(100)),
            BackoffPolicy::default(),
        );
        supervisor.acquire().await.unwrap();

        supervisor.connector.alive.store(false, Ordering::SeqCst);
        let (a, b) = tokio::join!(supervisor.acquire(), supervisor.acquire());
        assert!(Arc::ptr_eq(&a.unwrap(), &b.unwrap()));
        assert_eq!(supervisor.connector.connects.load(Ordering::SeqCst), 2);
    }
}
