//! The per-symbol decision loop.
//!
//! `check` loads one position, dispatches on its state, calls the broker
//! and selector, and persists at most one transition. Every failure is
//! caught here: it is logged, sent as an error alert, and the stored
//! position is left as it was so the next tick retries the same decision.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;
use rust_decimal::Decimal;
use tracing::{error, info, warn};
use wheel_trade_core::{
    Broker, Collaborator, NotificationLevel, OptionRight, OrderRequest, SymbolConfig, WheelConfig,
    WheelError, WheelResult, CONTRACT_MULTIPLIER,
};

use crate::bounded::bounded;
use crate::notify::NotificationHub;
use crate::position::{OptionInfo, TradeAction, Transition, WheelPosition, WheelState, LOT_SIZE};
use crate::selector::{StrikeCandidate, StrikeSelector};
use crate::store::StateStore;

/// What a single `check` did.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckOutcome {
    /// Symbol not configured or disabled.
    Skipped,
    /// Nothing to do this tick.
    NoAction { state: WheelState, reason: String },
    /// One transition was persisted.
    Transitioned {
        from: WheelState,
        to: WheelState,
        action: TradeAction,
    },
    /// A collaborator or the store failed; state unchanged.
    Failed { state: WheelState, error: String },
}

impl CheckOutcome {
    fn idle(state: WheelState, reason: impl Into<String>) -> Self {
        Self::NoAction {
            state,
            reason: reason.into(),
        }
    }

    fn moved(from: &WheelPosition, to: &WheelPosition) -> Self {
        Self::Transitioned {
            from: from.state,
            to: to.state,
            action: to
                .trades
                .last()
                .map_or(TradeAction::SellToOpen, |t| t.action),
        }
    }

    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

fn money(value: Decimal) -> String {
    format!("${value:.2}")
}

pub struct WheelEngine {
    store: Arc<StateStore>,
    broker: Arc<dyn Broker>,
    selector: StrikeSelector,
    notifier: Arc<NotificationHub>,
    config: Arc<WheelConfig>,
    call_timeout: Duration,
    tz: Tz,
}

impl WheelEngine {
    /// Configured tickers are upper-cased before use.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the schedule timezone is invalid.
    pub fn new(
        store: Arc<StateStore>,
        broker: Arc<dyn Broker>,
        selector: StrikeSelector,
        notifier: Arc<NotificationHub>,
        mut config: Arc<WheelConfig>,
    ) -> WheelResult<Self> {
        if !config.is_normalized() {
            Arc::make_mut(&mut config).normalize();
        }
        let tz = config.schedule.tz()?;
        Ok(Self {
            call_timeout: Duration::from_secs(config.call_timeout_secs),
            store,
            broker,
            selector,
            notifier,
            config,
            tz,
        })
    }

    #[must_use]
    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    #[must_use]
    pub fn notifier(&self) -> &Arc<NotificationHub> {
        &self.notifier
    }

    #[must_use]
    pub fn config(&self) -> &WheelConfig {
        &self.config
    }

    #[must_use]
    pub fn selector(&self) -> &StrikeSelector {
        &self.selector
    }

    /// Today's date on the exchange calendar.
    #[must_use]
    pub fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.tz).date_naive()
    }

    /// Runs one decision for `symbol`.
    pub async fn check(&self, symbol: &str) -> CheckOutcome {
        self.check_on(symbol, self.today()).await
    }

    /// Runs one decision for `symbol` as if the date were `today`.
    pub async fn check_on(&self, symbol: &str, today: NaiveDate) -> CheckOutcome {
        let Some(cfg) = self.config.symbol(symbol).filter(|c| c.enabled) else {
            info!(symbol, "symbol not enabled, skipping");
            return CheckOutcome::Skipped;
        };

        let position = match self.store.get(&cfg.symbol) {
            Ok(p) => p,
            Err(e) => return self.fail(&cfg.symbol, WheelState::Idle, &e).await,
        };
        info!(symbol = %position.symbol, state = %position.state, "checking position");

        let result = match position.state {
            WheelState::Idle => self.handle_idle(cfg, &position, today).await,
            WheelState::PutOpen => self.handle_put_open(&position, today).await,
            WheelState::HoldingShares => self.handle_holding_shares(cfg, &position, today).await,
            WheelState::CallOpen => self.handle_call_open(&position, today).await,
        };

        match result {
            Ok(outcome) => outcome,
            Err(e) => self.fail(&position.symbol, position.state, &e).await,
        }
    }

    async fn fail(&self, symbol: &str, state: WheelState, err: &WheelError) -> CheckOutcome {
        error!(symbol, %state, error = %err, transient = err.is_transient(), "check failed");
        let context = BTreeMap::from([
            ("symbol".to_string(), symbol.to_string()),
            ("state".to_string(), state.to_string()),
        ]);
        self.notifier
            .error_alert(&format!("Error processing {symbol}: {err}"), context)
            .await;
        CheckOutcome::Failed {
            state,
            error: err.to_string(),
        }
    }

    async fn shares_held(&self, symbol: &str) -> WheelResult<i64> {
        bounded(Collaborator::Broker, self.call_timeout, self.broker.shares_held(symbol)).await
    }

    /// Capital tied up by every other open position.
    fn committed_capital(&self, except: &str) -> Decimal {
        let lot = Decimal::from(CONTRACT_MULTIPLIER);
        self.store
            .all()
            .iter()
            .filter(|p| p.symbol != except)
            .map(|p| match p.state {
                WheelState::Idle => Decimal::ZERO,
                WheelState::PutOpen => p.active_option.as_ref().map_or(Decimal::ZERO, |o| o.strike * lot),
                WheelState::HoldingShares | WheelState::CallOpen => {
                    p.cost_basis * Decimal::from(p.shares_owned)
                }
            })
            .sum()
    }

    async fn handle_idle(
        &self,
        cfg: &SymbolConfig,
        position: &WheelPosition,
        today: NaiveDate,
    ) -> WheelResult<CheckOutcome> {
        info!(symbol = %position.symbol, "idle, looking for a put to sell");
        let Some(candidate) = self.selector.find_put(cfg, today).await? else {
            warn!(symbol = %position.symbol, "no suitable put found");
            return Ok(CheckOutcome::idle(position.state, "no suitable put found"));
        };

        let collateral = candidate.contract.strike * Decimal::from(CONTRACT_MULTIPLIER);
        let account = bounded(Collaborator::Broker, self.call_timeout, self.broker.account()).await?;
        let available = account.buying_power - self.config.safety.min_buying_power_reserve;
        if available < collateral {
            warn!(
                symbol = %position.symbol,
                available = %available,
                required = %collateral,
                "insufficient buying power"
            );
            return Ok(CheckOutcome::idle(position.state, "insufficient buying power"));
        }

        let committed = self.committed_capital(&position.symbol);
        if committed + collateral > self.config.safety.max_total_capital {
            warn!(
                symbol = %position.symbol,
                committed = %committed,
                required = %collateral,
                cap = %self.config.safety.max_total_capital,
                "total capital cap reached"
            );
            return Ok(CheckOutcome::idle(position.state, "total capital cap reached"));
        }

        self.sell_to_open(position, &candidate).await
    }

    /// Sells one contract at the bid and records it.
    async fn sell_to_open(
        &self,
        position: &WheelPosition,
        candidate: &StrikeCandidate,
    ) -> WheelResult<CheckOutcome> {
        let contract = &candidate.contract;
        if contract.bid <= Decimal::ZERO {
            warn!(symbol = %position.symbol, contract = %contract.contract_symbol, "no bid, not selling");
            return Ok(CheckOutcome::idle(position.state, "selected contract has no bid"));
        }

        let request = OrderRequest::sell_to_open(&contract.contract_symbol, 1, contract.bid);
        let order = bounded(
            Collaborator::Broker,
            self.call_timeout,
            self.broker.submit_order(&request),
        )
        .await?;
        if !order.status.is_accepted() {
            warn!(
                symbol = %position.symbol,
                order_id = %order.id,
                status = ?order.status,
                "order not filled"
            );
            return Ok(CheckOutcome::idle(position.state, "order not accepted"));
        }

        let option = OptionInfo {
            option_type: contract.right,
            strike: contract.strike,
            expiration: contract.expiration,
            premium: candidate.premium,
            quantity: -1,
            contract_symbol: contract.contract_symbol.clone(),
            opened_at: Utc::now(),
        };
        let note = format!("DTE={}, delta={:.3}, order={}", candidate.dte, candidate.delta, order.id);
        let transition = match contract.right {
            OptionRight::Put => Transition::PutSold { option, note },
            OptionRight::Call => Transition::CallSold { option, note },
        };

        let next = self.store.transition_to(position, transition).map_err(|e| {
            // the order is live at the broker even though nothing was recorded
            error!(symbol = %position.symbol, order_id = %order.id, error = %e, "order placed but state not saved");
            e
        })?;

        let mut details = BTreeMap::from([
            ("Strike".to_string(), money(contract.strike)),
            ("Premium".to_string(), money(candidate.premium)),
            ("Expiration".to_string(), contract.expiration.to_string()),
            ("DTE".to_string(), candidate.dte.to_string()),
            ("Delta".to_string(), format!("{:.3}", candidate.delta)),
        ]);
        let action = match contract.right {
            OptionRight::Put => {
                details.insert("Order ID".to_string(), order.id.clone());
                "SELL PUT"
            }
            OptionRight::Call => {
                details.insert("Cost Basis".to_string(), money(position.cost_basis));
                "SELL CALL"
            }
        };
        info!(
            symbol = %position.symbol,
            contract = %contract.contract_symbol,
            strike = %contract.strike,
            premium = %candidate.premium,
            dte = candidate.dte,
            "sold to open"
        );
        self.notifier.trade_alert(action, &position.symbol, details).await;
        Ok(CheckOutcome::moved(position, &next))
    }

    async fn handle_put_open(
        &self,
        position: &WheelPosition,
        today: NaiveDate,
    ) -> WheelResult<CheckOutcome> {
        let symbol = position.symbol.as_str();
        let Some(option) = position.active_option.clone() else {
            error!(symbol, "PUT_OPEN without an active option, resetting to IDLE");
            let next = self.store.transition_to(position, Transition::PutExpired)?;
            return Ok(CheckOutcome::moved(position, &next));
        };

        let dte = option.days_to_expiration(today);
        info!(symbol, strike = %option.strike, dte, "put open");

        if dte <= 0 {
            let next = self.store.transition_to(position, Transition::PutExpired)?;
            self.notifier
                .notify(
                    format!(
                        "Put expired worthless, {} premium retained",
                        money(option.total_premium())
                    ),
                    NotificationLevel::Info,
                    Some(format!("Put Expired: {symbol}")),
                    BTreeMap::new(),
                )
                .await;
            return Ok(CheckOutcome::moved(position, &next));
        }

        let shares = self.shares_held(symbol).await?;
        if shares >= LOT_SIZE {
            let next = self.store.transition_to(position, Transition::PutAssigned)?;
            info!(symbol, cost_basis = %next.cost_basis, "put assigned");
            self.notifier
                .assignment_alert(symbol, OptionRight::Put, option.strike, LOT_SIZE)
                .await;
            return Ok(CheckOutcome::moved(position, &next));
        }

        if dte <= self.config.safety.roll_dte_threshold {
            info!(symbol, dte, "approaching expiration, consider rolling");
        }
        Ok(CheckOutcome::idle(position.state, "put still open"))
    }

    async fn handle_holding_shares(
        &self,
        cfg: &SymbolConfig,
        position: &WheelPosition,
        today: NaiveDate,
    ) -> WheelResult<CheckOutcome> {
        let symbol = position.symbol.as_str();
        let shares = self.shares_held(symbol).await?;
        if shares < LOT_SIZE {
            warn!(symbol, shares, expected = LOT_SIZE, "broker share count below one lot");
            if shares > 0 {
                return Ok(CheckOutcome::idle(position.state, "partial lot held at broker"));
            }
            let next = self.store.transition_to(position, Transition::Liquidated)?;
            self.notifier
                .notify(
                    format!("{symbol} shares are no longer held at the broker, position reset"),
                    NotificationLevel::Warning,
                    Some(format!("Shares Liquidated: {symbol}")),
                    BTreeMap::new(),
                )
                .await;
            return Ok(CheckOutcome::moved(position, &next));
        }

        info!(symbol, cost_basis = %position.cost_basis, "holding shares, looking for a call to sell");
        let Some(candidate) = self
            .selector
            .find_call(cfg, position.cost_basis, today)
            .await?
        else {
            warn!(symbol, cost_basis = %position.cost_basis, "no suitable call found above cost basis");
            return Ok(CheckOutcome::idle(position.state, "no suitable call found above cost basis"));
        };

        self.sell_to_open(position, &candidate).await
    }

    async fn handle_call_open(
        &self,
        position: &WheelPosition,
        today: NaiveDate,
    ) -> WheelResult<CheckOutcome> {
        let symbol = position.symbol.as_str();
        let Some(option) = position.active_option.clone() else {
            error!(symbol, "CALL_OPEN without an active option, returning to HOLDING_SHARES");
            let next = self.store.transition_to(position, Transition::CallExpired)?;
            return Ok(CheckOutcome::moved(position, &next));
        };

        let dte = option.days_to_expiration(today);
        info!(symbol, strike = %option.strike, dte, "call open");

        if dte <= 0 {
            let next = self.store.transition_to(position, Transition::CallExpired)?;
            self.notifier
                .notify(
                    format!(
                        "Call expired worthless, {} premium retained, still holding shares",
                        money(option.total_premium())
                    ),
                    NotificationLevel::Info,
                    Some(format!("Call Expired: {symbol}")),
                    BTreeMap::new(),
                )
                .await;
            return Ok(CheckOutcome::moved(position, &next));
        }

        let shares = self.shares_held(symbol).await?;
        if shares < LOT_SIZE {
            let profit = position.called_away_profit();
            let next = self.store.transition_to(position, Transition::CalledAway)?;
            info!(symbol, profit = %profit, cycles = next.cycle_count, "shares called away, cycle complete");
            self.notifier
                .assignment_alert(symbol, OptionRight::Call, option.strike, LOT_SIZE)
                .await;
            self.notifier
                .notify(
                    format!("Wheel cycle complete for {symbol}, profit {}", money(profit)),
                    NotificationLevel::Info,
                    Some(format!("Cycle Complete: {symbol}")),
                    BTreeMap::from([
                        ("Cycle Profit".to_string(), money(profit)),
                        ("Cycles Completed".to_string(), next.cycle_count.to_string()),
                        ("Total Premium".to_string(), money(next.total_premium_collected)),
                    ]),
                )
                .await;
            return Ok(CheckOutcome::moved(position, &next));
        }

        Ok(CheckOutcome::idle(position.state, "call still open"))
    }
}
