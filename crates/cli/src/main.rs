use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;
mod runtime;

use commands::{AnalyzeArgs, CheckArgs, InitArgs, ResetArgs, TradesArgs};

#[derive(Parser)]
#[command(name = "wheel")]
#[command(about = "Wheel strategy automation: sell puts, take assignment, sell calls, repeat", long_about = None)]
struct Cli {
    /// Config file path (defaults to config/Wheel.toml)
    #[arg(short, long, global = true, env = "WHEEL_CONFIG")]
    config: Option<PathBuf>,

    /// Debug-level logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduler until interrupted
    Start,
    /// Print every tracked position
    Status,
    /// Run one check for a single symbol, ignoring market hours
    Check(CheckArgs),
    /// Run one check across all enabled symbols
    CheckAll,
    /// Forget the stored position for a symbol
    Reset(ResetArgs),
    /// Print the trade audit log
    Trades(TradesArgs),
    /// Write a starter configuration file
    Init(InitArgs),
    /// Report the best put and call for a symbol without trading
    Analyze(AnalyzeArgs),
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default)),
        )
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = cli.config.as_deref();
    match cli.command {
        Commands::Start => commands::run_start(config).await?,
        Commands::Status => commands::run_status(config)?,
        Commands::Check(args) => commands::run_check(config, args).await?,
        Commands::CheckAll => commands::run_check_all(config).await?,
        Commands::Reset(args) => commands::run_reset(config, args)?,
        Commands::Trades(args) => commands::run_trades(config, args)?,
        Commands::Init(args) => commands::run_init(args)?,
        Commands::Analyze(args) => commands::run_analyze(config, args).await?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_work_after_the_subcommand() {
        let cli = Cli::try_parse_from(["wheel", "check", "sofi", "-v", "--config", "w.toml"]).unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("w.toml")));
        match cli.command {
            Commands::Check(args) => assert_eq!(args.symbol, "sofi"),
            _ => panic!("expected check"),
        }
    }

    #[test]
    fn trades_limit_defaults_to_twenty() {
        let cli = Cli::try_parse_from(["wheel", "trades"]).unwrap();
        match cli.command {
            Commands::Trades(args) => {
                assert_eq!(args.limit, 20);
                assert!(args.symbol.is_none());
            }
            _ => panic!("expected trades"),
        }
    }

    #[test]
    fn reset_requires_a_symbol() {
        assert!(Cli::try_parse_from(["wheel", "reset"]).is_err());
        let cli = Cli::try_parse_from(["wheel", "reset", "XYZ", "--yes"]).unwrap();
        assert!(matches!(cli.command, Commands::Reset(ResetArgs { yes: true, .. })));
    }
}
