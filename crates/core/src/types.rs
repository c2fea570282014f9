//! Domain types shared between the engine and its collaborators.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Shares per standard US equity option contract.
pub const CONTRACT_MULTIPLIER: i64 = 100;

/// Option right (put or call).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionRight {
    Call,
    Put,
}

impl OptionRight {
    /// OCC symbol character.
    #[must_use]
    pub const fn occ_char(self) -> char {
        match self {
            Self::Call => 'C',
            Self::Put => 'P',
        }
    }
}

impl std::fmt::Display for OptionRight {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Call => write!(f, "call"),
            Self::Put => write!(f, "put"),
        }
    }
}

/// Builds an OCC option symbol, e.g. `AAPL240216C00185000`.
#[must_use]
pub fn occ_symbol(underlying: &str, expiration: NaiveDate, right: OptionRight, strike: Decimal) -> String {
    let strike_millis = (strike * Decimal::from(1000)).trunc().to_i64().unwrap_or(0);
    format!(
        "{}{:02}{:02}{:02}{}{:08}",
        underlying.to_uppercase(),
        expiration.year() % 100,
        expiration.month(),
        expiration.day(),
        right.occ_char(),
        strike_millis
    )
}

/// One contract row of an options chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionContract {
    /// Broker contract identifier (OCC symbol).
    pub contract_symbol: String,
    pub underlying: String,
    pub right: OptionRight,
    pub strike: Decimal,
    pub expiration: NaiveDate,
    pub bid: Decimal,
    pub ask: Decimal,
    pub volume: u64,
    pub open_interest: u64,
    /// Quoted implied volatility (decimal), if the provider has one.
    pub implied_volatility: Option<f64>,
}

impl OptionContract {
    /// Mid price between bid and ask.
    #[must_use]
    pub fn mid(&self) -> Decimal {
        (self.bid + self.ask) / Decimal::from(2)
    }
}

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

/// Order type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OrderType {
    Market,
    Limit { price: Decimal },
}

/// Lifecycle status of a submitted order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    New,
    Pending,
    Accepted,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
    Expired,
}

impl OrderStatus {
    /// True if the broker took the order (filled now or working).
    #[must_use]
    pub const fn is_accepted(self) -> bool {
        matches!(
            self,
            Self::New | Self::Pending | Self::Accepted | Self::PartiallyFilled | Self::Filled
        )
    }
}

/// An order to submit to the broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    /// Equity ticker or OCC option symbol.
    pub symbol: String,
    /// Number of contracts or shares.
    pub quantity: u32,
    pub side: OrderSide,
    pub order_type: OrderType,
}

impl OrderRequest {
    /// A limit sell-to-open for short options.
    #[must_use]
    pub fn sell_to_open(symbol: impl Into<String>, quantity: u32, limit_price: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            quantity,
            side: OrderSide::Sell,
            order_type: OrderType::Limit { price: limit_price },
        }
    }

    /// The limit price, if any.
    #[must_use]
    pub fn limit_price(&self) -> Option<Decimal> {
        match self.order_type {
            OrderType::Limit { price } => Some(price),
            OrderType::Market => None,
        }
    }
}

/// Broker acknowledgement for a submitted order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub symbol: String,
    pub status: OrderStatus,
    pub submitted_at: DateTime<Utc>,
}

/// Account balances relevant to cash-secured puts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountInfo {
    pub account_id: String,
    pub cash: Decimal,
    pub buying_power: Decimal,
    pub equity: Decimal,
}

/// A holding reported by the broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerPosition {
    pub symbol: String,
    /// Signed share/contract count (negative = short).
    pub quantity: i64,
    pub avg_entry_price: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn builds_occ_symbols() {
        let exp = NaiveDate::from_ymd_opt(2024, 2, 16).unwrap();
        assert_eq!(occ_symbol("aapl", exp, OptionRight::Call, dec!(185)), "AAPL240216C00185000");
        assert_eq!(occ_symbol("SOFI", exp, OptionRight::Put, dec!(7.5)), "SOFI240216P00007500");
    }

    #[test]
    fn mid_is_average_of_bid_and_ask() {
        let contract = OptionContract {
            contract_symbol: "XYZ".into(),
            underlying: "XYZ".into(),
            right: OptionRight::Put,
            strike: dec!(50),
            expiration: NaiveDate::from_ymd_opt(2030, 1, 18).unwrap(),
            bid: dec!(1.10),
            ask: dec!(1.30),
            volume: 10,
            open_interest: 100,
            implied_volatility: None,
        };
        assert_eq!(contract.mid(), dec!(1.20));
    }

    #[test]
    fn rejected_orders_are_not_accepted() {
        assert!(OrderStatus::Filled.is_accepted());
        assert!(OrderStatus::Pending.is_accepted());
        assert!(!OrderStatus::Rejected.is_accepted());
        assert!(!OrderStatus::Cancelled.is_accepted());
    }
}
