//! Read-only wheel opportunity report.

use std::path::Path;

use anyhow::Result;
use chrono::Utc;
use clap::Args;
use wheel_trade_core::SymbolConfig;
use wheel_trade_engine::{StrikeCandidate, WheelAnalysis};

use crate::runtime::Runtime;

/// Arguments for the analyze command.
#[derive(Args, Debug, Clone)]
pub struct AnalyzeArgs {
    /// Underlying symbol; need not be configured
    pub symbol: String,
}

/// Prints the best put, the call it would lead to, and the estimated return.
///
/// # Errors
/// Returns an error if configuration is invalid or market data is unavailable.
pub async fn run_analyze(config: Option<&Path>, args: AnalyzeArgs) -> Result<()> {
    let runtime = Runtime::load(config)?;
    let cfg = runtime
        .config
        .symbol(&args.symbol)
        .cloned()
        .unwrap_or_else(|| SymbolConfig::new(&args.symbol));
    let today = Utc::now()
        .with_timezone(&runtime.config.schedule.tz()?)
        .date_naive();

    let selector = runtime.selector(runtime.market_data()?);
    let analysis = selector.analyze(&cfg, today).await?;
    print!("{}", render(&analysis));
    Ok(())
}

fn candidate_line(label: &str, c: &StrikeCandidate) -> String {
    format!(
        "{label:<5} {} strike {} exp {} ({} DTE)  delta {:+.2}  premium {:.2}  return {:.2}% ({:.1}% annualized)  theo {:.2}\n",
        c.contract.contract_symbol,
        c.contract.strike,
        c.contract.expiration,
        c.dte,
        c.delta,
        c.premium,
        c.premium_return * 100.0,
        c.annualized_return * 100.0,
        c.theoretical_price,
    )
}

fn render(a: &WheelAnalysis) -> String {
    let mut out = format!("{} spot {:.2}\n", a.symbol, a.spot);
    match &a.put {
        Some(put) => out.push_str(&candidate_line("PUT", put)),
        None => out.push_str("PUT   no candidate in the DTE window\n"),
    }
    out.push_str(&format!("Cost basis if assigned: {:.2}\n", a.hypothetical_cost_basis));
    match &a.call {
        Some(call) => out.push_str(&candidate_line("CALL", call)),
        None => out.push_str("CALL  no candidate at or above cost basis\n"),
    }
    if let Some(r) = a.estimated_wheel_return {
        out.push_str(&format!("Estimated wheel return: {:.1}% annualized\n", r * 100.0));
    }
    out
}
