//! Alpaca wire types and conversions into core domain types.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use wheel_trade_core::{
    AccountInfo, BrokerPosition, OptionContract, OptionRight, Order, OrderRequest, OrderSide,
    OrderStatus, OrderType,
};

#[derive(Debug, Deserialize)]
pub(crate) struct RawAccount {
    pub id: String,
    pub cash: Decimal,
    pub buying_power: Decimal,
    pub equity: Decimal,
}

impl From<RawAccount> for AccountInfo {
    fn from(raw: RawAccount) -> Self {
        Self {
            account_id: raw.id,
            cash: raw.cash,
            buying_power: raw.buying_power,
            equity: raw.equity,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawPosition {
    pub symbol: String,
    pub qty: Decimal,
    #[serde(default)]
    pub avg_entry_price: Decimal,
}

impl From<RawPosition> for BrokerPosition {
    fn from(raw: RawPosition) -> Self {
        Self {
            symbol: raw.symbol,
            quantity: raw.qty.trunc().to_i64().unwrap_or(0),
            avg_entry_price: raw.avg_entry_price,
        }
    }
}

/// Body of `POST /v2/orders`.
#[derive(Debug, Serialize)]
pub(crate) struct NewOrder {
    pub symbol: String,
    pub qty: String,
    pub side: &'static str,
    #[serde(rename = "type")]
    pub order_type: &'static str,
    pub time_in_force: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit_price: Option<String>,
}

impl From<&OrderRequest> for NewOrder {
    fn from(req: &OrderRequest) -> Self {
        let (order_type, limit_price) = match &req.order_type {
            OrderType::Market => ("market", None),
            OrderType::Limit { price } => ("limit", Some(price.round_dp(2).to_string())),
        };
        Self {
            symbol: req.symbol.clone(),
            qty: req.quantity.to_string(),
            side: match req.side {
                OrderSide::Buy => "buy",
                OrderSide::Sell => "sell",
            },
            order_type,
            time_in_force: "day",
            limit_price,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawOrder {
    pub id: String,
    pub symbol: String,
    pub status: String,
    #[serde(default)]
    pub submitted_at: Option<DateTime<Utc>>,
}

/// Maps Alpaca order statuses onto the core lifecycle.
pub(crate) fn parse_order_status(status: &str) -> OrderStatus {
    match status {
        "new" | "accepted_for_bidding" => OrderStatus::New,
        "pending_new" | "pending_replace" | "pending_cancel" | "calculated" => OrderStatus::Pending,
        "accepted" | "replaced" | "held" => OrderStatus::Accepted,
        "partially_filled" => OrderStatus::PartiallyFilled,
        "filled" | "done_for_day" => OrderStatus::Filled,
        "canceled" | "stopped" | "suspended" => OrderStatus::Cancelled,
        "expired" => OrderStatus::Expired,
        _ => OrderStatus::Rejected,
    }
}

impl From<RawOrder> for Order {
    fn from(raw: RawOrder) -> Self {
        Self {
            status: parse_order_status(&raw.status),
            id: raw.id,
            symbol: raw.symbol,
            submitted_at: raw.submitted_at.unwrap_or_else(Utc::now),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawLatestTrade {
    pub trade: RawTrade,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawTrade {
    #[serde(rename = "p")]
    pub price: Decimal,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawContractsPage {
    #[serde(default)]
    pub option_contracts: Vec<RawContract>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawContract {
    pub symbol: String,
    pub underlying_symbol: String,
    #[serde(rename = "type")]
    pub right: OptionRight,
    pub strike_price: Decimal,
    pub expiration_date: NaiveDate,
    #[serde(default)]
    pub open_interest: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct RawSnapshotsPage {
    #[serde(default)]
    pub snapshots: HashMap<String, RawSnapshot>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawSnapshot {
    #[serde(default)]
    pub latest_quote: Option<RawQuote>,
    #[serde(default)]
    pub implied_volatility: Option<f64>,
    #[serde(default)]
    pub daily_bar: Option<RawBar>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawQuote {
    #[serde(rename = "bp")]
    pub bid: Decimal,
    #[serde(rename = "ap")]
    pub ask: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawBar {
    #[serde(rename = "v", default)]
    pub volume: u64,
}

/// Joins a listed contract with its market snapshot. Contracts without a
/// quote get a zero bid/ask and are filtered out downstream by the premium
/// floor.
pub(crate) fn to_option_contract(contract: RawContract, snapshot: Option<&RawSnapshot>) -> OptionContract {
    let (bid, ask) = snapshot
        .and_then(|s| s.latest_quote.as_ref())
        .map_or((Decimal::ZERO, Decimal::ZERO), |q| (q.bid, q.ask));

    OptionContract {
        contract_symbol: contract.symbol,
        underlying: contract.underlying_symbol,
        right: contract.right,
        strike: contract.strike_price,
        expiration: contract.expiration_date,
        bid,
        ask,
        volume: snapshot
            .and_then(|s| s.daily_bar.as_ref())
            .map_or(0, |b| b.volume),
        open_interest: contract
            .open_interest
            .as_deref()
            .and_then(|oi| oi.parse::<u64>().ok())
            .unwrap_or(0),
        implied_volatility: snapshot.and_then(|s| s.implied_volatility),
    }
}
