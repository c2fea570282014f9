//! Alpaca REST client with rate limiting.
//!
//! One client talks to two hosts: the trading API (account, positions,
//! orders, option contract listings) and the market-data API (stock trades,
//! option snapshots). Paper and live accounts differ only in the trading
//! host and credentials.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::{Quota, RateLimiter};
use nonzero_ext::nonzero;
use reqwest::{Client, Method, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Serialize;
use wheel_trade_core::{BrokerConfig, BrokerMode, Collaborator, WheelError, WheelResult};

/// Paper trading API base URL.
pub const ALPACA_PAPER_URL: &str = "https://paper-api.alpaca.markets";

/// Live trading API base URL.
pub const ALPACA_LIVE_URL: &str = "https://api.alpaca.markets";

/// Market data API base URL (shared by paper and live).
pub const ALPACA_DATA_URL: &str = "https://data.alpaca.markets";

const KEY_HEADER: &str = "APCA-API-KEY-ID";
const SECRET_HEADER: &str = "APCA-API-SECRET-KEY";

/// Configuration for the Alpaca client.
pub struct AlpacaConfig {
    pub trading_url: String,
    pub data_url: String,
    pub api_key: String,
    pub api_secret: SecretString,
    /// Requests per minute across both hosts.
    pub requests_per_minute: NonZeroU32,
    pub timeout_secs: u64,
}

impl std::fmt::Debug for AlpacaConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlpacaConfig")
            .field("trading_url", &self.trading_url)
            .field("data_url", &self.data_url)
            .field("requests_per_minute", &self.requests_per_minute)
            .field("timeout_secs", &self.timeout_secs)
            .finish_non_exhaustive()
    }
}

impl AlpacaConfig {
    /// Paper trading configuration.
    #[must_use]
    pub fn paper(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            trading_url: ALPACA_PAPER_URL.to_string(),
            data_url: ALPACA_DATA_URL.to_string(),
            api_key: api_key.into(),
            api_secret: SecretString::from(api_secret.into()),
            requests_per_minute: nonzero!(200u32),
            timeout_secs: 30,
        }
    }

    /// Live trading configuration.
    #[must_use]
    pub fn live(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            trading_url: ALPACA_LIVE_URL.to_string(),
            ..Self::paper(api_key, api_secret)
        }
    }

    /// Builds a client configuration from the `[broker]` settings.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for simulated mode or missing credentials.
    pub fn from_settings(settings: &BrokerConfig) -> WheelResult<Self> {
        let key = settings
            .api_key
            .clone()
            .ok_or_else(|| WheelError::config("broker.api_key is not set"))?;
        let secret = settings
            .api_secret
            .clone()
            .ok_or_else(|| WheelError::config("broker.api_secret is not set"))?;

        let mut config = match settings.mode {
            BrokerMode::Paper => Self::paper(key, secret),
            BrokerMode::Live => Self::live(key, secret),
            BrokerMode::Simulated => {
                return Err(WheelError::config("simulated mode does not use the Alpaca client"))
            }
        };
        if let Some(url) = &settings.trading_url {
            config.trading_url = url.trim_end_matches('/').to_string();
        }
        if let Some(url) = &settings.data_url {
            config.data_url = url.trim_end_matches('/').to_string();
        }
        config.timeout_secs = settings.request_timeout_secs;
        Ok(config)
    }

    /// Points both hosts at one base URL (mock servers).
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        let url = url.into();
        self.trading_url.clone_from(&url);
        self.data_url = url;
        self
    }

    #[must_use]
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// True for the live trading host.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.trading_url == ALPACA_LIVE_URL
    }
}

/// Which Alpaca host a request goes to.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Host {
    Trading,
    Data,
}

/// Alpaca REST client implementing `Broker` and `MarketData`.
pub struct AlpacaClient {
    pub(crate) config: AlpacaConfig,
    http: Client,
    rate_limiter: Arc<
        RateLimiter<
            governor::state::NotKeyed,
            governor::state::InMemoryState,
            governor::clock::DefaultClock,
        >,
    >,
}

impl std::fmt::Debug for AlpacaClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlpacaClient")
            .field("trading_url", &self.config.trading_url)
            .field("data_url", &self.config.data_url)
            .finish_non_exhaustive()
    }
}

impl AlpacaClient {
    /// Creates a new client.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the HTTP client cannot be built.
    pub fn new(config: AlpacaConfig) -> WheelResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| WheelError::config(format!("failed to build HTTP client: {e}")))?;

        let rate_limiter = Arc::new(RateLimiter::direct(Quota::per_minute(
            config.requests_per_minute,
        )));

        Ok(Self {
            config,
            http,
            rate_limiter,
        })
    }

    #[must_use]
    pub fn config(&self) -> &AlpacaConfig {
        &self.config
    }

    fn url(&self, host: Host, path: &str) -> String {
        let base = match host {
            Host::Trading => &self.config.trading_url,
            Host::Data => &self.config.data_url,
        };
        format!("{base}{path}")
    }

    fn collaborator(host: Host) -> Collaborator {
        match host {
            Host::Trading => Collaborator::Broker,
            Host::Data => Collaborator::MarketData,
        }
    }

    async fn send(
        &self,
        host: Host,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<serde_json::Value>,
    ) -> WheelResult<reqwest::Response> {
        self.rate_limiter.until_ready().await;

        let url = self.url(host, path);
        tracing::debug!(%method, %url, "alpaca request");

        let mut request = self
            .http
            .request(method, &url)
            .header("Accept", "application/json")
            .header(KEY_HEADER, &self.config.api_key)
            .header(SECRET_HEADER, self.config.api_secret.expose_secret());
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(&body);
        }

        request
            .send()
            .await
            .map_err(|e| self.map_transport(host, &e))
    }

    fn map_transport(&self, host: Host, err: &reqwest::Error) -> WheelError {
        let collaborator = Self::collaborator(host);
        if err.is_timeout() {
            WheelError::timeout(collaborator, self.config.timeout_secs)
        } else {
            WheelError::External {
                collaborator,
                message: format!("request failed: {}", strip_url(err)),
            }
        }
    }

    async fn decode<T: DeserializeOwned>(host: Host, response: reqwest::Response) -> WheelResult<T> {
        let status = response.status();
        if !status.is_success() {
            return Err(Self::status_error(host, status, response).await);
        }
        response.json::<T>().await.map_err(|e| WheelError::External {
            collaborator: Self::collaborator(host),
            message: format!("invalid response body: {}", strip_url(&e)),
        })
    }

    async fn status_error(host: Host, status: StatusCode, response: reqwest::Response) -> WheelError {
        let text = response.text().await.unwrap_or_default();
        let text: String = text.chars().take(200).collect();
        WheelError::External {
            collaborator: Self::collaborator(host),
            message: format!("HTTP {}: {text}", status.as_u16()),
        }
    }

    /// GET and decode JSON.
    pub(crate) async fn get<T: DeserializeOwned>(
        &self,
        host: Host,
        path: &str,
        query: &[(&str, String)],
    ) -> WheelResult<T> {
        let response = self.send(host, Method::GET, path, query, None).await?;
        Self::decode(host, response).await
    }

    /// POST a JSON body and decode the JSON reply.
    pub(crate) async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        host: Host,
        path: &str,
        body: &B,
    ) -> WheelResult<T> {
        let body = serde_json::to_value(body).map_err(|e| WheelError::External {
            collaborator: Self::collaborator(host),
            message: format!("failed to encode request: {e}"),
        })?;
        let response = self.send(host, Method::POST, path, &[], Some(body)).await?;
        Self::decode(host, response).await
    }

    /// DELETE. Returns `None` on 404, the decoded body when there is one.
    pub(crate) async fn delete<T: DeserializeOwned>(
        &self,
        host: Host,
        path: &str,
    ) -> WheelResult<Option<T>> {
        let response = self.send(host, Method::DELETE, path, &[], None).await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(Self::status_error(host, status, response).await);
        }
        if status == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        let bytes = response.bytes().await.map_err(|e| self.map_transport(host, &e))?;
        if bytes.is_empty() {
            return Ok(None);
        }
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| WheelError::External {
                collaborator: Self::collaborator(host),
                message: format!("invalid response body: {e}"),
            })
    }
}

fn strip_url(err: &reqwest::Error) -> String {
    let mut msg = err.to_string();
    if let Some(url) = err.url() {
        msg = msg.replace(url.as_str(), url.path());
    }
    msg
}
