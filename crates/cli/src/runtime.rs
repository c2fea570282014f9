//! Wires configuration into the engine's collaborators.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use wheel_trade_alpaca::{AlpacaClient, AlpacaConfig, SimulatedBroker};
use wheel_trade_core::{BlackScholes, Broker, BrokerMode, ConfigLoader, MarketData, WheelConfig};
use wheel_trade_engine::{NotificationHub, StateStore, StrikeSelector, WheelEngine};

pub struct Runtime {
    pub config: Arc<WheelConfig>,
    pub store: Arc<StateStore>,
}

impl Runtime {
    /// Loads and validates configuration, then opens the state file.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = ConfigLoader::load(path).context("invalid configuration")?;
        Self::from_config(config)
    }

    pub fn from_config(config: WheelConfig) -> Result<Self> {
        let store = StateStore::open(&config.state_file)
            .with_context(|| format!("cannot open state file {}", config.state_file.display()))?;
        Ok(Self {
            config: Arc::new(config),
            store: Arc::new(store),
        })
    }

    fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.config.call_timeout_secs)
    }

    pub fn selector(&self, market: Arc<dyn MarketData>) -> StrikeSelector {
        StrikeSelector::new(
            market,
            Arc::new(BlackScholes),
            self.config.risk_free_rate,
            self.call_timeout(),
        )
    }

    /// Builds the full engine for the configured broker mode.
    pub fn engine(&self) -> Result<Arc<WheelEngine>> {
        let (broker, market) = collaborators(&self.config)?;
        let notifier = NotificationHub::from_config(&self.config.notifications, self.call_timeout())?;
        tracing::info!(
            mode = %self.config.broker.mode,
            broker = broker.name(),
            notifiers = notifier.backend_count(),
            "engine ready"
        );
        let engine = WheelEngine::new(
            self.store.clone(),
            broker,
            self.selector(market),
            Arc::new(notifier),
            self.config.clone(),
        )?;
        Ok(Arc::new(engine))
    }

    /// Market data alone, for read-only commands.
    pub fn market_data(&self) -> Result<Arc<dyn MarketData>> {
        let client: Arc<dyn MarketData> = Arc::new(data_client(&self.config)?);
        Ok(client)
    }
}

/// Broker and market data for the configured mode.
///
/// Simulated mode still quotes from Alpaca; only orders stay in memory.
fn collaborators(config: &WheelConfig) -> Result<(Arc<dyn Broker>, Arc<dyn MarketData>)> {
    match config.broker.mode {
        BrokerMode::Simulated => {
            let market: Arc<dyn MarketData> = Arc::new(data_client(config)?);
            let broker: Arc<dyn Broker> = Arc::new(SimulatedBroker::new(config.broker.simulated_cash));
            Ok((broker, market))
        }
        BrokerMode::Paper | BrokerMode::Live => {
            let client = Arc::new(AlpacaClient::new(AlpacaConfig::from_settings(&config.broker)?)?);
            if client.config().is_live() {
                tracing::warn!("LIVE trading enabled, orders will use real money");
            }
            let broker: Arc<dyn Broker> = client.clone();
            let market: Arc<dyn MarketData> = client;
            Ok((broker, market))
        }
    }
}

fn data_client(config: &WheelConfig) -> Result<AlpacaClient> {
    let settings = &config.broker;
    if settings.mode != BrokerMode::Simulated {
        return Ok(AlpacaClient::new(AlpacaConfig::from_settings(settings)?)?);
    }

    let (Some(key), Some(secret)) = (settings.api_key.as_deref(), settings.api_secret.as_deref()) else {
        return Err(anyhow!(
            "market data requires broker.api_key and broker.api_secret, even in simulated mode"
        ));
    };
    let mut alpaca = AlpacaConfig::paper(key, secret).with_timeout_secs(settings.request_timeout_secs);
    if let Some(url) = &settings.data_url {
        alpaca.data_url = url.trim_end_matches('/').to_string();
    }
    Ok(AlpacaClient::new(alpaca)?)
}
