//! Administrative reset of one symbol.

use std::io::{self, BufRead, Write};
use std::path::Path;

use anyhow::Result;
use clap::Args;
use wheel_trade_engine::WheelState;

use crate::runtime::Runtime;

/// Arguments for the reset command.
#[derive(Args, Debug, Clone)]
pub struct ResetArgs {
    /// Underlying symbol to forget
    pub symbol: String,

    /// Skip the confirmation prompt
    #[arg(long)]
    pub yes: bool,
}

/// Removes a symbol's stored position. Broker-side holdings are untouched.
///
/// # Errors
/// Returns an error if configuration is invalid or the state file cannot be written.
pub fn run_reset(config: Option<&Path>, args: ResetArgs) -> Result<()> {
    let runtime = Runtime::load(config)?;
    let symbol = args.symbol.to_uppercase();

    let Some(position) = runtime.store.all().into_iter().find(|p| p.symbol == symbol) else {
        println!("No stored position for {symbol}.");
        return Ok(());
    };

    println!(
        "{symbol}: {} with {} shares, {} trades recorded",
        position.state,
        position.shares_owned,
        position.trades.len()
    );
    if position.state != WheelState::Idle {
        println!("Warning: the broker may still hold an open option or shares for {symbol}.");
    }

    if !args.yes {
        let stdin = io::stdin();
        if !confirm(&mut stdin.lock(), &mut io::stdout(), &symbol)? {
            println!("Aborted.");
            return Ok(());
        }
    }

    runtime.store.remove(&symbol)?;
    println!("{symbol} reset to IDLE; its trade history was removed from the state file.");
    Ok(())
}

fn confirm(input: &mut impl BufRead, output: &mut impl Write, symbol: &str) -> io::Result<bool> {
    write!(output, "Reset {symbol}? [y/N] ")?;
    output.flush()?;
    let mut answer = String::new();
    input.read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}
