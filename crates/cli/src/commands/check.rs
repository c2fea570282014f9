//! Single-shot checks outside the timer.

use std::path::Path;

use anyhow::Result;
use clap::Args;
use wheel_trade_engine::{CheckOutcome, Scheduler, ShutdownHandle, TickReport};

use crate::runtime::Runtime;

/// Arguments for the check command.
#[derive(Args, Debug, Clone)]
pub struct CheckArgs {
    /// Underlying symbol (e.g. "SOFI")
    pub symbol: String,
}

/// Checks one symbol now, regardless of market hours.
///
/// # Errors
/// Returns an error if configuration is invalid.
pub async fn run_check(config: Option<&Path>, args: CheckArgs) -> Result<()> {
    let scheduler = scheduler(config)?;
    let report = scheduler.run_once(Some(&args.symbol)).await;
    print_report(&report);
    Ok(())
}

/// Runs one tick across every enabled symbol. Honours market hours.
///
/// # Errors
/// Returns an error if configuration is invalid.
pub async fn run_check_all(config: Option<&Path>) -> Result<()> {
    let scheduler = scheduler(config)?;
    let report = scheduler.run_once(None).await;
    print_report(&report);
    Ok(())
}

fn scheduler(config: Option<&Path>) -> Result<Scheduler> {
    let runtime = Runtime::load(config)?;
    Ok(Scheduler::new(runtime.engine()?, ShutdownHandle::new())?)
}

fn print_report(report: &TickReport) {
    if report.gated {
        println!("Market closed, nothing checked. Use `wheel check <SYMBOL>` to force a check.");
        return;
    }
    for (symbol, outcome) in &report.outcomes {
        println!("{:<8} {}", symbol, describe(outcome));
    }
    if report.interrupted {
        println!("Interrupted before every symbol was checked.");
    }
    if report.failures() > 0 {
        println!("{} of {} checks failed", report.failures(), report.outcomes.len());
    }
}

pub(crate) fn describe(outcome: &CheckOutcome) -> String {
    match outcome {
        CheckOutcome::Skipped => "skipped (not configured or disabled)".to_string(),
        CheckOutcome::NoAction { state, reason } => format!("{state}: {reason}"),
        CheckOutcome::Transitioned { from, to, action } => format!("{from} -> {to} ({action})"),
        CheckOutcome::Failed { state, error } => format!("FAILED in {state}: {error}"),
    }
}
