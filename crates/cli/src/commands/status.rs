//! Read-only views of the state file.

use std::path::Path;

use anyhow::Result;
use chrono::{NaiveDate, Utc};
use clap::Args;
use wheel_trade_engine::{StoreSummary, TradeRecord, WheelPosition};

use crate::runtime::Runtime;

/// Arguments for the trades command.
#[derive(Args, Debug, Clone)]
pub struct TradesArgs {
    /// Only trades for this symbol
    #[arg(long)]
    pub symbol: Option<String>,

    /// Most recent N trades
    #[arg(long, default_value_t = 20)]
    pub limit: usize,

    /// Emit JSON lines instead of a table
    #[arg(long)]
    pub json: bool,
}

/// Prints every stored position and the aggregate summary.
///
/// # Errors
/// Returns an error if configuration is invalid or the state file cannot be read.
pub fn run_status(config: Option<&Path>) -> Result<()> {
    let runtime = Runtime::load(config)?;
    let today = Utc::now()
        .with_timezone(&runtime.config.schedule.tz()?)
        .date_naive();

    let positions = runtime.store.all();
    println!("State file: {}", runtime.store.path().display());
    println!("Mode:       {}", runtime.config.broker.mode);
    println!();

    if positions.is_empty() {
        println!("No positions tracked yet.");
        return Ok(());
    }

    println!(
        "{:<8} {:<15} {:>7} {:>10} {:>10} {:>7}  {}",
        "SYMBOL", "STATE", "SHARES", "BASIS", "PREMIUM", "CYCLES", "OPEN OPTION"
    );
    println!("{}", "-".repeat(90));
    for p in &positions {
        println!("{}", position_row(p, today));
    }

    println!();
    print_summary(&runtime.store.summary());
    Ok(())
}

fn position_row(p: &WheelPosition, today: NaiveDate) -> String {
    let option = p.active_option.as_ref().map_or_else(
        || "-".to_string(),
        |o| {
            format!(
                "{} {} @ {:.2} exp {} ({} DTE)",
                o.option_type.to_string().to_uppercase(),
                o.strike,
                o.premium,
                o.expiration,
                o.days_to_expiration(today)
            )
        },
    );
    format!(
        "{:<8} {:<15} {:>7} {:>10} {:>10} {:>7}  {}",
        p.symbol,
        p.state.as_str(),
        p.shares_owned,
        format!("{:.2}", p.cost_basis),
        format!("{:.2}", p.total_premium_collected),
        p.cycle_count,
        option
    )
}

fn print_summary(summary: &StoreSummary) {
    println!(
        "{} positions ({} active), ${:.2} premium collected, {} cycles completed",
        summary.total_positions, summary.active_positions, summary.total_premium, summary.total_cycles
    );
    for (state, count) in &summary.by_state {
        println!("  {:<15} {count}", state.as_str());
    }
}

/// Prints the most recent trades, oldest first.
///
/// # Errors
/// Returns an error if configuration is invalid or a record cannot be serialized.
pub fn run_trades(config: Option<&Path>, args: TradesArgs) -> Result<()> {
    let runtime = Runtime::load(config)?;
    let trades = latest(runtime.store.export_trades(args.symbol.as_deref()), args.limit);

    if args.json {
        for record in &trades {
            println!("{}", serde_json::to_string(record)?);
        }
        return Ok(());
    }

    if trades.is_empty() {
        println!("No trades recorded.");
        return Ok(());
    }
    for record in &trades {
        println!("{}", trade_row(record));
    }
    Ok(())
}

fn latest(mut trades: Vec<TradeRecord>, limit: usize) -> Vec<TradeRecord> {
    let skip = trades.len().saturating_sub(limit);
    trades.drain(..skip);
    trades
}

fn trade_row(record: &TradeRecord) -> String {
    let t = &record.trade;
    let contract = match (t.option_type, t.strike) {
        (Some(right), Some(strike)) => format!("{} {}", right.to_string().to_uppercase(), strike),
        _ => "-".to_string(),
    };
    let mut row = format!(
        "{}  {:<6} {:<13} {:<10} qty {:>3} @ {:.2}",
        t.timestamp.format("%Y-%m-%d %H:%M"),
        record.underlying,
        t.action.to_string(),
        contract,
        t.quantity,
        t.price
    );
    if !t.notes.is_empty() {
        row.push_str("  ");
        row.push_str(&t.notes);
    }
    row
}
