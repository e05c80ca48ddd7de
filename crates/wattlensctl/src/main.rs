//! Wattlens Control - energy and spot-price analysis of workload windows

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;
use wattlensctl::cli::{Cli, VERSION};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so reports on stdout stay clean
    let default_level = if cli.global.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    tracing::debug!("wattlensctl v{}", VERSION);
    wattlensctl::run(cli)
}
