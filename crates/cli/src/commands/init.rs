//! Starter configuration file.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Args;
use wheel_trade_core::{DEFAULT_CONFIG_PATH, DEFAULT_CONFIG_TOML};

/// Arguments for the init command.
#[derive(Args, Debug, Clone)]
pub struct InitArgs {
    /// Where to write the file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    pub path: PathBuf,

    /// Overwrite an existing file
    #[arg(long)]
    pub force: bool,
}

/// Writes the commented default configuration.
///
/// # Errors
/// Returns an error if the file exists without `--force` or cannot be written.
pub fn run_init(args: InitArgs) -> Result<()> {
    write_starter(&args.path, args.force)?;
    println!("Wrote {}", args.path.display());
    println!("Set broker.api_key and broker.api_secret (or WHEEL_BROKER__API_KEY / WHEEL_BROKER__API_SECRET) before `wheel start`.");
    Ok(())
}

fn write_starter(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists, pass --force to overwrite", path.display());
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("cannot create {}", parent.display()))?;
    }
    std::fs::write(path, DEFAULT_CONFIG_TOML)
        .with_context(|| format!("cannot write {}", path.display()))?;
    Ok(())
}
