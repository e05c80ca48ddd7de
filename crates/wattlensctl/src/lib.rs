//! Wattlens Control - CLI for ingestion, analysis and reports

pub mod cli;
pub mod commands;
pub mod output;

use cli::{Cli, Commands};

/// Dispatch a parsed command line.
pub fn run(cli: Cli) -> anyhow::Result<()> {
    let opts = &cli.global;
    match cli.command {
        Commands::Analyze { skip_prices } => commands::analyze(opts, skip_prices),
        Commands::Prices => commands::prices(opts),
        Commands::IngestSample {
            topic,
            received_at,
            file,
        } => commands::ingest_sample(opts, &topic, received_at.as_deref(), &file),
        Commands::IngestPrices { file } => commands::ingest_prices(opts, &file),
        Commands::IngestMeter { device, file } => commands::ingest_meter(opts, &device, &file),
        Commands::CleanupLegacy { dry_run } => commands::cleanup_legacy(opts, dry_run),
        Commands::Config => commands::show_config(opts),
    }
}
