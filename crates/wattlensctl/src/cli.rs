//! Command-line surface

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

// Version is embedded at build time
pub const VERSION: &str = env!("WATTLENS_VERSION");

#[derive(Debug, Parser)]
#[command(name = "wattlensctl")]
#[command(about = "Wattlens - workload energy and spot-price analysis", long_about = None)]
#[command(version = VERSION)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Args)]
pub struct GlobalOpts {
    /// Config file (default: $WATTLENS_CONFIG or ~/.config/wattlens/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// SQLite store, overrides store.path
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Report directory, overrides output.directory
    #[arg(long, global = true)]
    pub out: Option<PathBuf>,

    /// Debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Analyze every configured window and write the reports
    Analyze {
        /// Skip the spot-price analysis
        #[arg(long)]
        skip_prices: bool,
    },

    /// Spot-price analysis of the test day only
    Prices,

    /// Store one Tasmota SENSOR message
    IngestSample {
        /// MQTT topic, e.g. tele/serverpowermeter/SENSOR
        #[arg(long)]
        topic: String,

        /// Ingestion time (epoch ms or ISO-8601), defaults to the message or now
        #[arg(long)]
        received_at: Option<String>,

        /// JSON payload file
        file: PathBuf,
    },

    /// Store the quotes of a spot-price feed document
    IngestPrices {
        /// JSON feed file
        file: PathBuf,
    },

    /// Store the readings of an energyLIVE smart-meter response
    IngestMeter {
        /// Interface UID, e.g. I-10082023-01658401
        #[arg(long)]
        device: String,

        /// JSON response file
        file: PathBuf,
    },

    /// Delete samples whose timestamp lacks the microsecond suffix
    CleanupLegacy {
        /// Only report what would be deleted
        #[arg(long)]
        dry_run: bool,
    },

    /// Print the effective configuration as TOML
    Config,
}
