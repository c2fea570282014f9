//! Per-symbol wheel position and its state machine.
//!
//! ```text
//! IDLE ──put sold──> PUT_OPEN ──assigned──> HOLDING_SHARES ──call sold──> CALL_OPEN
//!  ^                   │                       ^      │                      │
//!  └────expired────────┘                       │      └──liquidated──> IDLE  │
//!  ^                                           └────────expired──────────────┤
//!  └──────────────────────────called away (cycle_count += 1)─────────────────┘
//! ```
//!
//! Every [`Transition`] appends exactly one [`Trade`]. A transition from a
//! state that the table does not allow is logged and applied anyway: local
//! state mirrors the broker and must be able to follow it after manual
//! intervention.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use wheel_trade_core::{OptionRight, CONTRACT_MULTIPLIER};

/// Lot size held between assignment and call-away.
pub const LOT_SIZE: i64 = CONTRACT_MULTIPLIER;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WheelState {
    #[default]
    Idle,
    PutOpen,
    HoldingShares,
    CallOpen,
}

impl WheelState {
    /// Whether the table allows `self -> to`.
    #[must_use]
    pub const fn can_transition_to(self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::Idle, Self::PutOpen)
                | (Self::PutOpen, Self::Idle | Self::HoldingShares)
                | (Self::HoldingShares, Self::CallOpen | Self::Idle)
                | (Self::CallOpen, Self::HoldingShares | Self::Idle)
        )
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::PutOpen => "PUT_OPEN",
            Self::HoldingShares => "HOLDING_SHARES",
            Self::CallOpen => "CALL_OPEN",
        }
    }

    pub const ALL: [Self; 4] = [Self::Idle, Self::PutOpen, Self::HoldingShares, Self::CallOpen];
}

impl fmt::Display for WheelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The short option currently open on a position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionInfo {
    pub option_type: OptionRight,
    pub strike: Decimal,
    pub expiration: NaiveDate,
    /// Premium per share received at open.
    pub premium: Decimal,
    /// Signed contracts (negative = short).
    pub quantity: i32,
    /// Broker contract identifier (OCC symbol).
    pub contract_symbol: String,
    pub opened_at: DateTime<Utc>,
}

impl OptionInfo {
    /// Days from `today` to expiration, floored at zero.
    #[must_use]
    pub fn days_to_expiration(&self, today: NaiveDate) -> i64 {
        (self.expiration - today).num_days().max(0)
    }

    /// Total premium in dollars for the whole position.
    #[must_use]
    pub fn total_premium(&self) -> Decimal {
        self.premium * Decimal::from(CONTRACT_MULTIPLIER) * Decimal::from(self.quantity.unsigned_abs())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeAction {
    SellToOpen,
    Expired,
    Assigned,
    CalledAway,
    /// Shares disappeared at the broker while holding.
    Liquidated,
}

impl fmt::Display for TradeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::SellToOpen => "sell_to_open",
            Self::Expired => "expired",
            Self::Assigned => "assigned",
            Self::CalledAway => "called_away",
            Self::Liquidated => "liquidated",
        };
        f.write_str(s)
    }
}

/// One audit-log entry. Never mutated after it is appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trade {
    pub timestamp: DateTime<Utc>,
    pub action: TradeAction,
    /// Contract symbol for option events, underlying for share events.
    pub symbol: String,
    #[serde(default)]
    pub option_type: Option<OptionRight>,
    #[serde(default)]
    pub strike: Option<Decimal>,
    pub quantity: i32,
    /// Per-share price.
    pub price: Decimal,
    /// Premium in dollars attached to the event.
    #[serde(default)]
    pub premium: Option<Decimal>,
    #[serde(default)]
    pub notes: String,
}

/// A state change requested by the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// IDLE -> PUT_OPEN.
    PutSold { option: OptionInfo, note: String },
    /// PUT_OPEN -> IDLE.
    PutExpired,
    /// PUT_OPEN -> HOLDING_SHARES.
    PutAssigned,
    /// HOLDING_SHARES -> CALL_OPEN.
    CallSold { option: OptionInfo, note: String },
    /// CALL_OPEN -> HOLDING_SHARES.
    CallExpired,
    /// CALL_OPEN -> IDLE, completes a cycle.
    CalledAway,
    /// HOLDING_SHARES -> IDLE without selling.
    Liquidated,
}

impl Transition {
    #[must_use]
    pub const fn target(&self) -> WheelState {
        match self {
            Self::PutSold { .. } => WheelState::PutOpen,
            Self::PutExpired | Self::CalledAway | Self::Liquidated => WheelState::Idle,
            Self::PutAssigned | Self::CallExpired => WheelState::HoldingShares,
            Self::CallSold { .. } => WheelState::CallOpen,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WheelPosition {
    pub symbol: String,
    pub state: WheelState,
    pub shares_owned: i64,
    /// Premium-adjusted entry price per share; zero when flat.
    pub cost_basis: Decimal,
    pub active_option: Option<OptionInfo>,
    pub total_premium_collected: Decimal,
    pub cycle_count: u32,
    pub trades: Vec<Trade>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Default for WheelPosition {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            symbol: String::new(),
            state: WheelState::Idle,
            shares_owned: 0,
            cost_basis: Decimal::ZERO,
            active_option: None,
            total_premium_collected: Decimal::ZERO,
            cycle_count: 0,
            trades: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

impl WheelPosition {
    /// A fresh IDLE position.
    #[must_use]
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            ..Self::default()
        }
    }

    /// Cost basis net of every premium collected on this symbol.
    #[must_use]
    pub fn effective_cost_basis(&self) -> Decimal {
        if self.shares_owned == 0 {
            return Decimal::ZERO;
        }
        self.cost_basis - self.total_premium_collected / Decimal::from(self.shares_owned)
    }

    /// Profit realised if the open call is assigned: share gain plus call premium.
    #[must_use]
    pub fn called_away_profit(&self) -> Decimal {
        let Some(option) = &self.active_option else {
            return Decimal::ZERO;
        };
        let lot = Decimal::from(LOT_SIZE);
        (option.strike - self.cost_basis) * lot + option.premium * lot
    }

    /// Structural invariants that hold after any in-table transition.
    /// Returns a description of each one that is broken.
    #[must_use]
    pub fn check_invariants(&self) -> Vec<String> {
        let mut violations = Vec::new();
        let option_expected = matches!(self.state, WheelState::PutOpen | WheelState::CallOpen);
        if option_expected != self.active_option.is_some() {
            violations.push(format!(
                "state {} with active option {}",
                self.state,
                if self.active_option.is_some() { "present" } else { "absent" }
            ));
        }
        match self.active_option.as_ref().map(|o| o.option_type) {
            Some(OptionRight::Call) if self.shares_owned != LOT_SIZE => violations.push(format!(
                "open call with {} shares owned",
                self.shares_owned
            )),
            Some(OptionRight::Put) if self.shares_owned != 0 => violations.push(format!(
                "open put with {} shares owned",
                self.shares_owned
            )),
            _ => {}
        }
        if self.shares_owned != 0 && self.shares_owned != LOT_SIZE {
            violations.push(format!("shares_owned {} is not 0 or a lot", self.shares_owned));
        }
        if self.total_premium_collected < Decimal::ZERO {
            violations.push("negative total premium".to_string());
        }
        violations
    }

    /// Applies `transition` in memory and appends its trade.
    ///
    /// Persisting is the caller's job; see `StateStore::transition_to`.
    pub fn apply(&mut self, transition: Transition, now: DateTime<Utc>) -> &Trade {
        let from = self.state;
        let to = transition.target();
        if !from.can_transition_to(to) {
            warn!(symbol = %self.symbol, %from, %to, "transition outside the state table, applying anyway");
        }

        let lot = Decimal::from(LOT_SIZE);
        let trade = match transition {
            Transition::PutSold { option, note } | Transition::CallSold { option, note } => {
                let premium = option.total_premium().max(Decimal::ZERO);
                self.total_premium_collected += premium;
                let trade = Trade {
                    timestamp: now,
                    action: TradeAction::SellToOpen,
                    symbol: option.contract_symbol.clone(),
                    option_type: Some(option.option_type),
                    strike: Some(option.strike),
                    quantity: option.quantity,
                    price: option.premium,
                    premium: Some(premium),
                    notes: note,
                };
                self.active_option = Some(option);
                trade
            }
            Transition::PutExpired | Transition::CallExpired => {
                let option = self.active_option.take();
                let still_holding = to == WheelState::HoldingShares;
                Trade {
                    timestamp: now,
                    action: TradeAction::Expired,
                    symbol: option
                        .as_ref()
                        .map_or_else(|| self.symbol.clone(), |o| o.contract_symbol.clone()),
                    option_type: option.as_ref().map(|o| o.option_type),
                    strike: option.as_ref().map(|o| o.strike),
                    quantity: option.as_ref().map_or(0, |o| o.quantity.abs()),
                    price: Decimal::ZERO,
                    premium: option.as_ref().map(OptionInfo::total_premium),
                    notes: match (option.is_some(), still_holding) {
                        (false, _) => "No active option recorded; state reset".to_string(),
                        (true, true) => "Expired worthless, premium retained, still holding shares".to_string(),
                        (true, false) => "Expired worthless, premium retained".to_string(),
                    },
                }
            }
            Transition::PutAssigned => {
                let option = self.active_option.take();
                let (strike, premium) = option
                    .as_ref()
                    .map_or((Decimal::ZERO, Decimal::ZERO), |o| (o.strike, o.premium));
                self.shares_owned = LOT_SIZE;
                self.cost_basis = strike - premium;
                Trade {
                    timestamp: now,
                    action: TradeAction::Assigned,
                    symbol: self.symbol.clone(),
                    option_type: Some(OptionRight::Put),
                    strike: Some(strike),
                    quantity: LOT_SIZE as i32,
                    price: strike,
                    premium: Some(premium * lot),
                    notes: format!("Put assigned, effective cost basis ${:.2}", self.cost_basis),
                }
            }
            Transition::CalledAway => {
                let profit = self.called_away_profit();
                let option = self.active_option.take();
                let (strike, premium) = option
                    .as_ref()
                    .map_or((Decimal::ZERO, Decimal::ZERO), |o| (o.strike, o.premium));
                self.shares_owned = 0;
                self.cost_basis = Decimal::ZERO;
                if from == WheelState::CallOpen {
                    self.cycle_count += 1;
                }
                Trade {
                    timestamp: now,
                    action: TradeAction::CalledAway,
                    symbol: self.symbol.clone(),
                    option_type: Some(OptionRight::Call),
                    strike: Some(strike),
                    quantity: -(LOT_SIZE as i32),
                    price: strike,
                    premium: Some(premium * lot),
                    notes: format!("Shares called away, cycle complete, profit ${profit:.2}"),
                }
            }
            Transition::Liquidated => {
                let shares = self.shares_owned;
                self.active_option = None;
                self.shares_owned = 0;
                self.cost_basis = Decimal::ZERO;
                Trade {
                    timestamp: now,
                    action: TradeAction::Liquidated,
                    symbol: self.symbol.clone(),
                    option_type: None,
                    strike: None,
                    quantity: -i32::try_from(shares).unwrap_or(0),
                    price: Decimal::ZERO,
                    premium: None,
                    notes: "Shares no longer held at broker".to_string(),
                }
            }
        };

        info!(symbol = %self.symbol, %from, %to, action = %trade.action, "state transition");
        self.state = to;
        self.updated_at = now;
        self.trades.push(trade);

        let violations = self.check_invariants();
        if !violations.is_empty() {
            warn!(symbol = %self.symbol, ?violations, "position invariants violated");
        }

        // just pushed
        &self.trades[self.trades.len() - 1]
    }
}
