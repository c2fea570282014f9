//! Shared fixtures for engine integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Days, NaiveDate, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tempfile::TempDir;
use wheel_trade_alpaca::SimulatedBroker;
use wheel_trade_core::{
    occ_symbol, AccountInfo, BlackScholes, Broker, BrokerMode, BrokerPosition, MarketData,
    Notification, Notifier, OptionContract, OptionRight, Order, OrderRequest, SymbolConfig,
    WheelConfig, WheelError, WheelResult,
};
use wheel_trade_engine::{
    NotificationHub, OptionInfo, StateStore, StrikeSelector, Transition, WheelEngine, WheelPosition,
};

// =============================================================================
// Collaborators
// =============================================================================

/// Simulated broker that counts every call made through the trait.
pub struct CountingBroker {
    pub inner: SimulatedBroker,
    pub calls: AtomicUsize,
}

impl CountingBroker {
    pub fn new(cash: Decimal) -> Self {
        Self {
            inner: SimulatedBroker::new(cash),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn hit(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Broker for CountingBroker {
    async fn submit_order(&self, order: &OrderRequest) -> WheelResult<Order> {
        self.hit();
        self.inner.submit_order(order).await
    }

    async fn account(&self) -> WheelResult<AccountInfo> {
        self.hit();
        self.inner.account().await
    }

    async fn positions(&self) -> WheelResult<Vec<BrokerPosition>> {
        self.hit();
        self.inner.positions().await
    }

    async fn cancel_order(&self, order_id: &str) -> WheelResult<()> {
        self.hit();
        self.inner.cancel_order(order_id).await
    }

    async fn close_position(&self, symbol: &str) -> WheelResult<Option<Order>> {
        self.hit();
        self.inner.close_position(symbol).await
    }

    fn name(&self) -> &str {
        "counting"
    }
}

/// Fixed-quote market data keyed by expiration.
#[derive(Default)]
pub struct MockMarket {
    pub spot: Mutex<Decimal>,
    pub chains: Mutex<BTreeMap<NaiveDate, Vec<OptionContract>>>,
    pub calls: AtomicUsize,
    pub fail: AtomicBool,
    /// Underlyings in request order.
    pub requested: Mutex<Vec<String>>,
}

impl MockMarket {
    pub fn new(spot: Decimal) -> Self {
        Self {
            spot: Mutex::new(spot),
            ..Self::default()
        }
    }

    pub fn add(&self, contract: OptionContract) {
        self.chains
            .lock()
            .entry(contract.expiration)
            .or_default()
            .push(contract);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn hit(&self, symbol: &str) -> WheelResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requested.lock().push(symbol.to_string());
        if self.fail.load(Ordering::SeqCst) {
            Err(WheelError::market_data("HTTP 503: service unavailable"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl MarketData for MockMarket {
    async fn spot_price(&self, symbol: &str) -> WheelResult<Decimal> {
        self.hit(symbol)?;
        Ok(*self.spot.lock())
    }

    async fn expirations(&self, symbol: &str) -> WheelResult<Vec<NaiveDate>> {
        self.hit(symbol)?;
        Ok(self.chains.lock().keys().copied().collect())
    }

    async fn options_chain(&self, symbol: &str, expiration: NaiveDate) -> WheelResult<Vec<OptionContract>> {
        self.hit(symbol)?;
        Ok(self.chains.lock().get(&expiration).cloned().unwrap_or_default())
    }
}

/// Notifier that keeps everything it is sent.
#[derive(Default)]
pub struct Recorder {
    pub seen: Mutex<Vec<Notification>>,
}

impl Recorder {
    pub fn titles(&self) -> Vec<String> {
        self.seen
            .lock()
            .iter()
            .filter_map(|n| n.title.clone())
            .collect()
    }
}

#[async_trait]
impl Notifier for Recorder {
    async fn send(&self, n: &Notification) -> WheelResult<()> {
        self.seen.lock().push(n.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "recorder"
    }
}

// =============================================================================
// Fixtures
// =============================================================================

pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

pub fn days_from_today(days: u64) -> NaiveDate {
    today() + Days::new(days)
}

pub fn contract(right: OptionRight, strike: Decimal, bid: Decimal, ask: Decimal, expiration: NaiveDate) -> OptionContract {
    OptionContract {
        contract_symbol: occ_symbol("XYZ", expiration, right, strike),
        underlying: "XYZ".into(),
        right,
        strike,
        expiration,
        bid,
        ask,
        volume: 250,
        open_interest: 1_000,
        implied_volatility: Some(0.35),
    }
}

pub fn option_info(right: OptionRight, strike: Decimal, premium: Decimal, expiration: NaiveDate) -> OptionInfo {
    OptionInfo {
        option_type: right,
        strike,
        expiration,
        premium,
        quantity: -1,
        contract_symbol: occ_symbol("XYZ", expiration, right, strike),
        opened_at: Utc::now(),
    }
}

pub fn config(symbols: &[&str], state_file: PathBuf) -> WheelConfig {
    let mut cfg = WheelConfig::default();
    cfg.symbols = symbols.iter().map(|s| SymbolConfig::new(*s)).collect();
    cfg.broker.mode = BrokerMode::Simulated;
    cfg.state_file = state_file;
    cfg.call_timeout_secs = 5;
    cfg
}

pub struct Harness {
    pub _dir: TempDir,
    pub store: Arc<StateStore>,
    pub broker: Arc<CountingBroker>,
    pub market: Arc<MockMarket>,
    pub recorder: Arc<Recorder>,
    pub engine: Arc<WheelEngine>,
}

impl Harness {
    pub fn new(symbols: &[&str]) -> Self {
        Self::with_config(symbols, |_| {})
    }

    pub fn with_config(symbols: &[&str], tweak: impl FnOnce(&mut WheelConfig)) -> Self {
        let dir = TempDir::new().unwrap();
        let mut cfg = config(symbols, dir.path().join("wheel_state.json"));
        tweak(&mut cfg);

        let store = Arc::new(StateStore::open(&cfg.state_file).unwrap());
        let broker = Arc::new(CountingBroker::new(dec!(100000)));
        let market = Arc::new(MockMarket::new(dec!(53)));
        let recorder = Arc::new(Recorder::default());
        let hub = NotificationHub::new(Duration::from_secs(5)).with_backend(recorder.clone());
        let selector = StrikeSelector::new(
            market.clone(),
            Arc::new(BlackScholes),
            cfg.risk_free_rate,
            Duration::from_secs(cfg.call_timeout_secs),
        );
        let engine = WheelEngine::new(
            store.clone(),
            broker.clone(),
            selector,
            Arc::new(hub),
            Arc::new(cfg),
        )
        .unwrap();

        Self {
            _dir: dir,
            store,
            broker,
            market,
            recorder,
            engine: Arc::new(engine),
        }
    }

    /// Puts XYZ into PUT_OPEN with a 50 strike sold at 1.20.
    pub fn seed_put_open(&self, expiration: NaiveDate) -> WheelPosition {
        let p = self.store.get("XYZ").unwrap();
        self.store
            .transition_to(
                &p,
                Transition::PutSold {
                    option: option_info(OptionRight::Put, dec!(50), dec!(1.20), expiration),
                    note: String::new(),
                },
            )
            .unwrap()
    }

    /// Puts XYZ into CALL_OPEN at a 55 strike over a 48.80 cost basis.
    pub fn seed_call_open(&self, expiration: NaiveDate) -> WheelPosition {
        let p = self.seed_put_open(days_from_today(30));
        let p = self.store.transition_to(&p, Transition::PutAssigned).unwrap();
        self.store
            .transition_to(
                &p,
                Transition::CallSold {
                    option: option_info(OptionRight::Call, dec!(55), dec!(0.90), expiration),
                    note: String::new(),
                },
            )
            .unwrap()
    }
}
