//! Wattlens configuration
//!
//! Config file: `$WATTLENS_CONFIG` or `~/.config/wattlens/config.toml`.
//! Every section is optional; missing values fall back to the 2025-06-29
//! measurement campaign.

use crate::timestamp::LocalClock;
use crate::window::{default_windows, WindowDefinition};
use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV: &str = "WATTLENS_CONFIG";

/// Spot-price tariff used when none is configured
pub const DEFAULT_TARIFF: &str = "EPEXSPOTAT";

/// Run-level analysis settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSettings {
    /// Calendar day of the measurement campaign
    #[serde(default = "default_test_date")]
    pub test_date: NaiveDate,

    /// Fixed local offset east of UTC, in hours
    #[serde(default = "default_utc_offset")]
    pub utc_offset_hours: i32,

    /// Window used as the comparison reference
    #[serde(default = "default_baseline")]
    pub baseline_window: String,

    /// Metering device; discovered from the store when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,

    /// Spot-price tariff; discovered from the store when absent
    #[serde(default = "default_tariff", skip_serializing_if = "Option::is_none")]
    pub tariff: Option<String>,

    /// Records sampled when discovering identifiers
    #[serde(default = "default_scan_limit")]
    pub discovery_scan_limit: usize,
}

fn default_test_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, 29).unwrap_or_default()
}

fn default_utc_offset() -> i32 {
    2
}

fn default_baseline() -> String {
    "WL5_Idle".to_string()
}

fn default_tariff() -> Option<String> {
    Some(DEFAULT_TARIFF.to_string())
}

fn default_scan_limit() -> usize {
    5
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            test_date: default_test_date(),
            utc_offset_hours: default_utc_offset(),
            baseline_window: default_baseline(),
            device_id: None,
            tariff: default_tariff(),
            discovery_scan_limit: default_scan_limit(),
        }
    }
}

/// Store location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

fn default_store_path() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("wattlens").join("wattlens.db"))
        .unwrap_or_else(|| PathBuf::from("wattlens.db"))
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

/// Report destination
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub directory: PathBuf,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_dir(),
        }
    }
}

/// Main wattlens configuration. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default)]
    pub analysis: AnalysisSettings,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default = "default_windows")]
    pub windows: Vec<WindowDefinition>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            analysis: AnalysisSettings::default(),
            store: StoreConfig::default(),
            output: OutputConfig::default(),
            windows: default_windows(),
        }
    }
}

impl AnalysisConfig {
    /// `~/.config/wattlens/config.toml`
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("wattlens").join("config.toml"))
    }

    /// Load configuration
    ///
    /// Priority:
    /// 1. Explicit path (`--config`)
    /// 2. `$WATTLENS_CONFIG`
    /// 3. User config (~/.config/wattlens/config.toml)
    /// 4. Defaults
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }

        if let Ok(env_path) = std::env::var(CONFIG_ENV) {
            if !env_path.is_empty() {
                return Self::from_file(Path::new(&env_path));
            }
        }

        if let Some(user_path) = Self::user_config_path() {
            if user_path.exists() {
                return Self::from_file(&user_path);
            }
        }

        debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config = Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: AnalysisConfig = toml::from_str(contents)?;
        config.check()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration")
    }

    /// Cross-window checks that a single definition cannot make.
    fn check(&self) -> Result<()> {
        let offset = self.analysis.utc_offset_hours;
        if LocalClock::try_from_hours(offset).is_none() {
            bail!("utc_offset_hours {} is out of range (-23..=23)", offset);
        }

        let mut seen = HashSet::new();
        for window in &self.windows {
            if !seen.insert(window.key()) {
                bail!("duplicate window key '{}'", window.key());
            }
        }
        if !seen.contains(self.analysis.baseline_window.as_str()) {
            warn!(
                "Baseline window '{}' is not configured; comparisons will carry no relative deltas",
                self.analysis.baseline_window
            );
        }
        Ok(())
    }

    pub fn clock(&self) -> LocalClock {
        LocalClock::from_hours(self.analysis.utc_offset_hours)
    }
}
