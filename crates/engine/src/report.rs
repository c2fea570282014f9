//! Morning briefing and weekly premium report.
//!
//! Both are read-only: they quote market data and read the store, but never
//! create positions or place orders.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use tracing::warn;
use wheel_trade_core::OptionRight;

use crate::engine::WheelEngine;
use crate::position::WheelState;

fn money(value: Decimal) -> String {
    format!("${value:.2}")
}

/// An open option leg as of the briefing.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenLeg {
    pub symbol: String,
    pub price: Decimal,
    pub right: OptionRight,
    pub strike: Decimal,
    pub dte: i64,
}

/// Best put for a symbol with no position.
#[derive(Debug, Clone, PartialEq)]
pub struct Opportunity {
    pub symbol: String,
    pub price: Decimal,
    pub strike: Decimal,
    pub premium: Decimal,
    pub annualized_return: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MorningBriefing {
    pub open: Vec<OpenLeg>,
    pub opportunities: Vec<Opportunity>,
    /// Symbols whose quotes failed.
    pub unavailable: Vec<String>,
    pub active_positions: usize,
    pub total_premium: Decimal,
}

impl MorningBriefing {
    /// Quotes every enabled symbol in configured order. A market-data
    /// failure drops that symbol from the briefing, not the whole briefing.
    pub async fn gather(engine: &WheelEngine, today: NaiveDate) -> Self {
        let store = engine.store();
        let positions: BTreeMap<String, _> = store
            .all()
            .into_iter()
            .map(|p| (p.symbol.clone(), p))
            .collect();
        let summary = store.summary();
        let mut briefing = Self {
            active_positions: summary.active_positions,
            total_premium: summary.total_premium,
            ..Self::default()
        };

        for cfg in engine.config().enabled_symbols() {
            let symbol = cfg.symbol.clone();
            let position = positions.get(&symbol).filter(|p| p.state != WheelState::Idle);

            if let Some(position) = position {
                // HOLDING_SHARES has no leg to report
                let Some(option) = &position.active_option else {
                    continue;
                };
                match engine.selector().spot(&symbol).await {
                    Ok(price) => briefing.open.push(OpenLeg {
                        price,
                        right: option.option_type,
                        strike: option.strike,
                        dte: option.days_to_expiration(today),
                        symbol,
                    }),
                    Err(e) => {
                        warn!(symbol = %symbol, error = %e, "briefing quote failed");
                        briefing.unavailable.push(symbol);
                    }
                }
                continue;
            }

            match engine.selector().analyze(cfg, today).await {
                Ok(analysis) => {
                    if let Some(put) = analysis.put {
                        briefing.opportunities.push(Opportunity {
                            price: analysis.spot,
                            strike: put.contract.strike,
                            premium: put.premium,
                            annualized_return: put.annualized_return,
                            symbol,
                        });
                    }
                }
                Err(e) => {
                    warn!(symbol = %symbol, error = %e, "briefing analysis failed");
                    briefing.unavailable.push(symbol);
                }
            }
        }
        briefing
    }

    /// Message body and data fields for the notification.
    #[must_use]
    pub fn render(&self) -> (String, BTreeMap<String, String>) {
        let mut message = String::from("**Active Positions:**\n");
        if self.open.is_empty() {
            message.push_str("None");
        } else {
            let lines: Vec<String> = self
                .open
                .iter()
                .map(|l| {
                    format!(
                        "**{}**: {} | {} {} | {} DTE",
                        l.symbol,
                        money(l.price),
                        l.right.to_string().to_uppercase(),
                        money(l.strike),
                        l.dte
                    )
                })
                .collect();
            message.push_str(&lines.join("\n"));
        }

        message.push_str("\n\n**Opportunities:**\n");
        if self.opportunities.is_empty() {
            message.push_str("No new opportunities");
        } else {
            let lines: Vec<String> = self
                .opportunities
                .iter()
                .map(|o| {
                    format!(
                        "**{}**: {} | Put {} @ {} ({:.0}% ann.)",
                        o.symbol,
                        money(o.price),
                        money(o.strike),
                        money(o.premium),
                        o.annualized_return * 100.0
                    )
                })
                .collect();
            message.push_str(&lines.join("\n"));
        }

        let mut data = BTreeMap::from([
            ("Active Positions".to_string(), self.active_positions.to_string()),
            ("Total Premium".to_string(), money(self.total_premium)),
        ]);
        if !self.unavailable.is_empty() {
            data.insert("No Data".to_string(), self.unavailable.join(", "));
        }
        (message, data)
    }
}

/// Premium and cycles for one position that has seen any activity.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionLine {
    pub symbol: String,
    pub state: WheelState,
    pub premium: Decimal,
    pub cycles: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WeeklyReport {
    pub positions: Vec<PositionLine>,
    pub total_premium: Decimal,
    pub total_cycles: u32,
    pub active_positions: usize,
    /// Trades stamped within the seven days before the report.
    pub trades_this_week: usize,
}

impl WeeklyReport {
    /// Built from the store alone.
    #[must_use]
    pub fn gather(engine: &WheelEngine, now: DateTime<Utc>) -> Self {
        let store = engine.store();
        let summary = store.summary();
        let since = now - Duration::days(7);
        let positions = store
            .all()
            .into_iter()
            .filter(|p| p.total_premium_collected > Decimal::ZERO || p.state != WheelState::Idle)
            .map(|p| PositionLine {
                symbol: p.symbol,
                state: p.state,
                premium: p.total_premium_collected,
                cycles: p.cycle_count,
            })
            .collect();
        Self {
            positions,
            total_premium: summary.total_premium,
            total_cycles: summary.total_cycles,
            active_positions: summary.active_positions,
            trades_this_week: store
                .export_trades(None)
                .iter()
                .filter(|r| r.trade.timestamp >= since && r.trade.timestamp <= now)
                .count(),
        }
    }

    #[must_use]
    pub fn render(&self) -> (String, BTreeMap<String, String>) {
        let mut message = String::from("**Weekly Performance Summary**\n\n");
        if self.positions.is_empty() {
            message.push_str("No active positions this week");
        } else {
            let lines: Vec<String> = self
                .positions
                .iter()
                .map(|p| {
                    format!(
                        "**{}**: {} collected, {} cycles ({})",
                        p.symbol,
                        money(p.premium),
                        p.cycles,
                        p.state
                    )
                })
                .collect();
            message.push_str(&lines.join("\n"));
        }

        let data = BTreeMap::from([
            ("Total Premium".to_string(), money(self.total_premium)),
            ("Cycles Completed".to_string(), self.total_cycles.to_string()),
            ("Active Positions".to_string(), self.active_positions.to_string()),
            ("Trades This Week".to_string(), self.trades_this_week.to_string()),
        ]);
        (message, data)
    }
}
