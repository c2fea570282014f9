use crate::error::WheelResult;
use crate::types::{AccountInfo, BrokerPosition, OptionContract, OptionRight, Order, OrderRequest};
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// Order execution and account queries.
///
/// Paper and live accounts implement the same contract; the engine never
/// knows which one it is talking to.
#[async_trait]
pub trait Broker: Send + Sync {
    async fn submit_order(&self, order: &OrderRequest) -> WheelResult<Order>;

    async fn account(&self) -> WheelResult<AccountInfo>;

    async fn positions(&self) -> WheelResult<Vec<BrokerPosition>>;

    async fn cancel_order(&self, order_id: &str) -> WheelResult<()>;

    /// Liquidates the whole position in `symbol`. `None` if nothing was held.
    async fn close_position(&self, symbol: &str) -> WheelResult<Option<Order>>;

    fn name(&self) -> &str;

    /// Shares (or contracts) currently held in `symbol`; zero if none.
    async fn shares_held(&self, symbol: &str) -> WheelResult<i64> {
        let positions = self.positions().await?;
        Ok(positions
            .iter()
            .find(|p| p.symbol.eq_ignore_ascii_case(symbol))
            .map_or(0, |p| p.quantity))
    }
}

/// Underlying quotes and options chains.
#[async_trait]
pub trait MarketData: Send + Sync {
    /// Current spot price of the underlying.
    async fn spot_price(&self, symbol: &str) -> WheelResult<Decimal>;

    /// Listed option expirations, ascending.
    async fn expirations(&self, symbol: &str) -> WheelResult<Vec<NaiveDate>>;

    /// Every listed contract (puts and calls) for one expiration.
    async fn options_chain(&self, symbol: &str, expiration: NaiveDate) -> WheelResult<Vec<OptionContract>>;
}

/// Closed-form option sensitivities.
pub trait PricingModel: Send + Sync {
    fn delta(
        &self,
        spot: f64,
        strike: f64,
        rate: f64,
        iv: f64,
        days_to_expiry: i64,
        right: OptionRight,
    ) -> f64;

    fn price(
        &self,
        spot: f64,
        strike: f64,
        rate: f64,
        iv: f64,
        days_to_expiry: i64,
        right: OptionRight,
    ) -> f64;
}

/// Severity of an operator notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl std::fmt::Display for NotificationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        };
        write!(f, "{s}")
    }
}

/// An outbound operator alert.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub message: String,
    pub level: NotificationLevel,
    pub title: Option<String>,
    /// Ordered key/value details rendered as fields.
    pub data: BTreeMap<String, String>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Delivery backend for notifications (console, chat webhook, ...).
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &Notification) -> WheelResult<()>;

    fn name(&self) -> &str;
}
