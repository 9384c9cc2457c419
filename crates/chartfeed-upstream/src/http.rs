//! HTTP connector for a bar gateway in front of the market-data vendor.

use async_trait::async_trait;
use chartfeed_types::Bar;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{debug, warn};

use crate::{BackoffPolicy, Connection, Connector, FetchRequest, UpstreamError};

/// Configuration for the HTTP upstream client.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ClientConfig {
    /// Gateway base URL (e.g. `http://127.0.0.1:8700`).
    pub base_url: String,
    /// Optional bearer token sent with every request.
    pub api_key: Option<String>,
    /// Maximum idle pooled connections.
    pub pool_size: usize,
    /// Request timeout.
    pub timeout: Duration,
    /// Maximum retry attempts for failed requests.
    pub max_retries: u32,
    /// Base delay for exponential backoff (in milliseconds).
    pub base_delay_ms: u64,
    /// Maximum delay between retries (in milliseconds).
    pub max_delay_ms: u64,
    /// User agent string.
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8700".to_string(),
            api_key: None,
            pool_size: 8,
            timeout: Duration::from_secs(120), // 1s bars over many days are slow to produce
            max_retries: 3,
            base_delay_ms: 500,
            max_delay_ms: 30_000,
            user_agent: format!("chartfeed/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ClientConfig {
    /// Returns the backoff policy implied by this configuration.
    #[must_use]
    pub const fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy {
            max_attempts: self.max_retries.saturating_add(1),
            base_delay_ms: self.base_delay_ms,
            max_delay_ms: self.max_delay_ms,
        }
    }
}

/// Opens [`HttpConnection`]s to the bar gateway.
#[derive(Debug, Clone)]
pub struct HttpConnector {
    config: ClientConfig,
}

impl HttpConnector {
    /// Creates a connector with the given configuration.
    #[must_use]
    pub const fn new(config: ClientConfig) -> Self {
        Self { config }
    }

    /// Returns the client configuration.
    #[must_use]
    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }
}

#[async_trait]
impl Connector for HttpConnector {
    type Connection = HttpConnection;

    async fn connect(&self) -> Result<HttpConnection, UpstreamError> {
        let client = Client::builder()
            .pool_max_idle_per_host(self.config.pool_size)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_nodelay(true)
            .tcp_keepalive(Duration::from_secs(60))
            .timeout(self.config.timeout)
            .connect_timeout(Duration::from_secs(10))
            .user_agent(&self.config.user_agent)
            .gzip(true)
            .build()?;

        let conn = HttpConnection {
            client,
            config: self.config.clone(),
        };

        conn.probe().await?;
        Ok(conn)
    }
}

/// A pooled HTTP client bound to one gateway.
#[derive(Debug, Clone)]
pub struct HttpConnection {
    client: Client,
    config: ClientConfig,
}

impl HttpConnection {
    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.config.base_url.trim_end_matches('/'))
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    async fn probe(&self) -> Result<(), UpstreamError> {
        let response = self
            .authorize(self.client.get(self.url("health")))
            .send()
            .await?;
        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(UpstreamError::Unauthorized(
                format!("gateway refused credentials ({})", response.status()),
            )),
            s if s.is_success() => Ok(()),
            s => Err(UpstreamError::Unavailable(format!(
                "health probe returned {s}"
            ))),
        }
    }

    fn is_retryable(error: &reqwest::Error) -> bool {
        if error.is_builder() {
            return false;
        }
        error.is_timeout() || error.is_connect() || error.is_request()
    }
}

#[async_trait]
impl Connection for HttpConnection {
    async fn fetch(&self, request: &FetchRequest) -> Result<Vec<Bar>, UpstreamError> {
        let params = [
            ("symbol", request.symbol.clone()),
            ("interval_type", request.kind.as_str().to_string()),
            ("interval_len", request.len.to_string()),
            ("start", request.start.to_rfc3339()),
            ("end", request.end.to_rfc3339()),
        ];
        let policy = self.config.backoff();
        let mut attempts = 0;

        loop {
            let sent = self
                .authorize(self.client.get(self.url("bars")).query(&params))
                .send()
                .await;

            match sent {
                Ok(response) => {
                    let status = response.status();
                    if status == StatusCode::NOT_FOUND || status == StatusCode::NO_CONTENT {
                        return Err(UpstreamError::NoData {
                            symbol: request.symbol.clone(),
                        });
                    }
                    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                        return Err(UpstreamError::Unauthorized(format!(
                            "bars request for {} returned {status}",
                            request.symbol
                        )));
                    }

                    // Retry on server errors (5xx) and rate limiting (429)
                    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
                        if attempts < self.config.max_retries {
                            attempts += 1;
                            let delay = policy.delay(attempts);
                            warn!(%status, attempts, ?delay, "upstream server error, retrying");
                            tokio::time::sleep(delay).await;
                            continue;
                        }
                        return Err(UpstreamError::Server {
                            status: status.as_u16(),
                        });
                    }

                    response.error_for_status_ref()?;
                    let bars: Vec<Bar> = response.json().await?;
                    debug!(symbol = %request.symbol, count = bars.len(), "upstream bars received");
                    if bars.is_empty() {
                        return Err(UpstreamError::NoData {
                            symbol: request.symbol.clone(),
                        });
                    }
                    return Ok(bars);
                }
                Err(e) if Self::is_retryable(&e) && attempts < self.config.max_retries => {
                    attempts += 1;
                    let delay = policy.delay(attempts);
                    warn!(error = %e, attempts, ?delay, "upstream request failed, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn is_alive(&self) -> bool {
        self.probe().await.is_ok()
    }
}
