//! Strike selection for cash-secured puts and covered calls.
//!
//! Candidates pass three gates (DTE window, liquidity, moneyness) and are
//! scored by `10 * |delta - target| - premium_return`; the lowest score
//! wins. Calls are never selected below the cost basis.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info};
use wheel_trade_core::{
    Collaborator, MarketData, OptionContract, OptionRight, PricingModel, SymbolConfig, WheelResult,
    CONTRACT_MULTIPLIER,
};

use crate::bounded::bounded;

/// IV used when the chain has no quoted volatility.
pub const DEFAULT_IV: f64 = 0.30;

/// Contracts deeper than this are in the money.
pub const MAX_ABS_DELTA: f64 = 0.50;

/// Weight of delta distance relative to premium return in the score.
const DELTA_WEIGHT: f64 = 10.0;

/// Selection parameters for one search.
#[derive(Debug, Clone, PartialEq)]
pub struct Targeting {
    pub right: OptionRight,
    /// Signed: negative for puts.
    pub target_delta: f64,
    pub min_dte: i64,
    pub max_dte: i64,
    pub min_premium: Decimal,
    pub min_open_interest: u64,
    /// Lowest acceptable call strike.
    pub strike_floor: Option<Decimal>,
}

impl Targeting {
    #[must_use]
    pub fn put(cfg: &SymbolConfig) -> Self {
        Self {
            right: OptionRight::Put,
            target_delta: -cfg.target_put_delta.abs(),
            min_dte: cfg.min_dte,
            max_dte: cfg.max_dte,
            min_premium: cfg.min_premium,
            min_open_interest: cfg.min_open_interest,
            strike_floor: None,
        }
    }

    #[must_use]
    pub fn call(cfg: &SymbolConfig, cost_basis: Decimal) -> Self {
        Self {
            right: OptionRight::Call,
            target_delta: cfg.target_call_delta.abs(),
            min_dte: cfg.min_dte,
            max_dte: cfg.max_dte,
            min_premium: cfg.min_premium,
            min_open_interest: cfg.min_open_interest,
            strike_floor: Some(cost_basis),
        }
    }
}

/// A contract that passed every gate, with its scoring inputs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrikeCandidate {
    pub contract: OptionContract,
    pub dte: i64,
    pub delta: f64,
    /// Mid price per share.
    pub premium: Decimal,
    /// Premium over collateral, as a fraction.
    pub premium_return: f64,
    pub annualized_return: f64,
    pub score: f64,
    pub theoretical_price: f64,
}

/// Best put and call for a symbol, as a wheel opportunity report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WheelAnalysis {
    pub symbol: String,
    pub spot: Decimal,
    pub put: Option<StrikeCandidate>,
    pub call: Option<StrikeCandidate>,
    /// Put strike less put premium, or spot when no put qualifies.
    pub hypothetical_cost_basis: Decimal,
    /// Mean of the put and call annualized returns.
    pub estimated_wheel_return: Option<f64>,
}

/// Scores one contract. `None` if it fails a gate.
#[must_use]
pub fn evaluate(
    contract: &OptionContract,
    spot: Decimal,
    dte: i64,
    targeting: &Targeting,
    pricing: &dyn PricingModel,
    risk_free_rate: f64,
) -> Option<StrikeCandidate> {
    if contract.right != targeting.right {
        return None;
    }
    if targeting.strike_floor.is_some_and(|floor| contract.strike < floor) {
        return None;
    }
    let premium = contract.mid();
    if contract.open_interest < targeting.min_open_interest || premium < targeting.min_premium {
        return None;
    }

    let spot_f = spot.to_f64()?;
    let strike_f = contract.strike.to_f64()?;
    let iv = contract
        .implied_volatility
        .filter(|v| v.is_finite() && *v > 0.0)
        .unwrap_or(DEFAULT_IV);
    let delta = pricing.delta(spot_f, strike_f, risk_free_rate, iv, dte, contract.right);
    if !delta.is_finite() || delta.abs() > MAX_ABS_DELTA {
        return None;
    }

    let lot = Decimal::from(CONTRACT_MULTIPLIER);
    let collateral = match contract.right {
        OptionRight::Put => contract.strike * lot,
        OptionRight::Call => spot * lot,
    };
    if collateral <= Decimal::ZERO {
        return None;
    }
    let premium_return = (premium * lot / collateral).to_f64()?;
    let annualized_return = if dte > 0 {
        premium_return * 365.0 / dte as f64
    } else {
        0.0
    };
    let score = DELTA_WEIGHT * (delta.abs() - targeting.target_delta.abs()).abs() - premium_return;

    Some(StrikeCandidate {
        contract: contract.clone(),
        dte,
        delta,
        premium,
        premium_return,
        annualized_return,
        score,
        theoretical_price: pricing.price(spot_f, strike_f, risk_free_rate, iv, dte, contract.right),
    })
}

/// Lowest-scoring candidate; the first one wins ties.
#[must_use]
pub fn select_best(candidates: impl IntoIterator<Item = StrikeCandidate>) -> Option<StrikeCandidate> {
    candidates
        .into_iter()
        .min_by(|a, b| a.score.total_cmp(&b.score))
}

pub struct StrikeSelector {
    market: Arc<dyn MarketData>,
    pricing: Arc<dyn PricingModel>,
    risk_free_rate: f64,
    call_timeout: Duration,
}

impl StrikeSelector {
    #[must_use]
    pub fn new(
        market: Arc<dyn MarketData>,
        pricing: Arc<dyn PricingModel>,
        risk_free_rate: f64,
        call_timeout: Duration,
    ) -> Self {
        Self {
            market,
            pricing,
            risk_free_rate,
            call_timeout,
        }
    }

    /// Current spot for `symbol`, bounded by the call timeout.
    ///
    /// # Errors
    ///
    /// Propagates market-data failures and timeouts.
    pub async fn spot(&self, symbol: &str) -> WheelResult<Decimal> {
        bounded(Collaborator::MarketData, self.call_timeout, self.market.spot_price(symbol)).await
    }

    /// Best cash-secured put as of `today`.
    ///
    /// # Errors
    ///
    /// Propagates market-data failures and timeouts.
    pub async fn find_put(
        &self,
        cfg: &SymbolConfig,
        today: NaiveDate,
    ) -> WheelResult<Option<StrikeCandidate>> {
        self.find(&cfg.symbol, &Targeting::put(cfg), today).await
    }

    /// Best covered call with strike at or above `cost_basis`.
    ///
    /// # Errors
    ///
    /// Propagates market-data failures and timeouts.
    pub async fn find_call(
        &self,
        cfg: &SymbolConfig,
        cost_basis: Decimal,
        today: NaiveDate,
    ) -> WheelResult<Option<StrikeCandidate>> {
        self.find(&cfg.symbol, &Targeting::call(cfg, cost_basis), today)
            .await
    }

    /// Searches every expiration in the DTE window as of `today`.
    ///
    /// # Errors
    ///
    /// Propagates market-data failures and timeouts.
    pub async fn find(
        &self,
        symbol: &str,
        targeting: &Targeting,
        today: NaiveDate,
    ) -> WheelResult<Option<StrikeCandidate>> {
        let spot = self.spot(symbol).await?;
        self.find_with_spot(symbol, spot, targeting, today).await
    }

    async fn find_with_spot(
        &self,
        symbol: &str,
        spot: Decimal,
        targeting: &Targeting,
        today: NaiveDate,
    ) -> WheelResult<Option<StrikeCandidate>> {
        let expirations =
            bounded(Collaborator::MarketData, self.call_timeout, self.market.expirations(symbol)).await?;

        let mut candidates = Vec::new();
        for expiration in expirations {
            let dte = (expiration - today).num_days();
            if dte < targeting.min_dte || dte > targeting.max_dte {
                continue;
            }
            let chain = bounded(
                Collaborator::MarketData,
                self.call_timeout,
                self.market.options_chain(symbol, expiration),
            )
            .await?;
            candidates.extend(chain.iter().filter_map(|c| {
                evaluate(c, spot, dte, targeting, self.pricing.as_ref(), self.risk_free_rate)
            }));
        }

        debug!(symbol, right = %targeting.right, candidates = candidates.len(), "strikes evaluated");
        let best = select_best(candidates);
        match &best {
            Some(c) => info!(
                symbol,
                right = %targeting.right,
                strike = %c.contract.strike,
                expiration = %c.contract.expiration,
                dte = c.dte,
                delta = %format!("{:.3}", c.delta),
                premium = %c.premium,
                annualized = %format!("{:.1}%", c.annualized_return * 100.0),
                "strike selected"
            ),
            None => info!(symbol, right = %targeting.right, "no contract passed selection"),
        }
        Ok(best)
    }

    /// Best put, then the best call against the cost basis that put would
    /// leave after assignment.
    ///
    /// # Errors
    ///
    /// Propagates market-data failures and timeouts.
    pub async fn analyze(&self, cfg: &SymbolConfig, today: NaiveDate) -> WheelResult<WheelAnalysis> {
        let spot = self.spot(&cfg.symbol).await?;
        let put = self
            .find_with_spot(&cfg.symbol, spot, &Targeting::put(cfg), today)
            .await?;
        let hypothetical_cost_basis = put
            .as_ref()
            .map_or(spot, |p| p.contract.strike - p.premium);
        let call = self
            .find_with_spot(&cfg.symbol, spot, &Targeting::call(cfg, hypothetical_cost_basis), today)
            .await?;

        let estimated_wheel_return = put.as_ref().map(|p| {
            let call_return = call.as_ref().map_or(0.0, |c| c.annualized_return);
            (p.annualized_return + call_return) / 2.0
        });

        Ok(WheelAnalysis {
            symbol: cfg.symbol.clone(),
            spot,
            put,
            call,
            hypothetical_cost_basis,
            estimated_wheel_return,
        })
    }
}
