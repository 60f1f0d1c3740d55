//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.fraudlens.toml` files.

use crate::report::SummaryFormat;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default configuration file name, looked up in the working directory.
pub const CONFIG_FILE: &str = ".fraudlens.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Transaction store settings.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Detection thresholds and windows.
    #[serde(default)]
    pub policy: PolicyConfig,

    /// Report settings.
    #[serde(default)]
    pub report: ReportConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Directory receiving the CSV tables and the run summary.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,

    /// Format of the run summary file.
    #[serde(default)]
    pub summary_format: SummaryFormat,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            verbose: false,
            summary_format: SummaryFormat::default(),
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("Results")
}

/// Transaction store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path of the SQLite database holding the `transactions` table.
    #[serde(default = "default_database_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

fn default_database_path() -> PathBuf {
    PathBuf::from("bankdata.db")
}

/// Detection policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Absolute z-score above which a value is an outlier.
    #[serde(default = "default_z_threshold")]
    pub z_threshold: f64,

    /// `k` in the `mean + k * std` high-risk threshold.
    #[serde(default = "default_risk_std_multiplier")]
    pub risk_std_multiplier: f64,

    /// Trailing window (in steps) of the moving averages.
    #[serde(default = "default_moving_average_window")]
    pub moving_average_window: usize,

    /// Minimum spacing (in steps) between activity peaks.
    #[serde(default = "default_peak_distance")]
    pub peak_distance: usize,

    /// Minimum prominence (in transactions) of an activity peak.
    #[serde(default = "default_peak_prominence")]
    pub peak_prominence: f64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            z_threshold: default_z_threshold(),
            risk_std_multiplier: default_risk_std_multiplier(),
            moving_average_window: default_moving_average_window(),
            peak_distance: default_peak_distance(),
            peak_prominence: default_peak_prominence(),
        }
    }
}

fn default_z_threshold() -> f64 {
    3.0
}

fn default_risk_std_multiplier() -> f64 {
    1.0
}

fn default_moving_average_window() -> usize {
    7
}

fn default_peak_distance() -> usize {
    5
}

fn default_peak_prominence() -> f64 {
    100.0
}

/// Report generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Upper edges of the amount bands used by the amount tables.
    #[serde(default = "default_amount_band_edges")]
    pub amount_band_edges: Vec<f64>,

    /// Fixed date for file stamps. Today's date when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_stamp: Option<NaiveDate>,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            amount_band_edges: default_amount_band_edges(),
            date_stamp: None,
        }
    }
}

fn default_amount_band_edges() -> Vec<f64> {
    vec![100.0, 500.0, 1000.0, 2000.0, 5000.0]
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings.
    /// Only explicitly provided values override.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref database) = args.database {
            self.database.path = database.clone();
        }
        if let Some(ref output_dir) = args.output_dir {
            self.general.output_dir = output_dir.clone();
        }
        if let Some(z) = args.z_threshold {
            self.policy.z_threshold = z;
        }
        if let Some(k) = args.risk_std_multiplier {
            self.policy.risk_std_multiplier = k;
        }
        if let Some(format) = args.summary_format {
            self.general.summary_format = format;
        }

        // Flags always override
        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// Reject policy values no run could use.
    pub fn validate(&self) -> Result<()> {
        if self.policy.z_threshold <= 0.0 || !self.policy.z_threshold.is_finite() {
            anyhow::bail!("z_threshold must be a positive number");
        }
        if self.policy.risk_std_multiplier < 0.0 || !self.policy.risk_std_multiplier.is_finite() {
            anyhow::bail!("risk_std_multiplier must be zero or positive");
        }
        if self.policy.moving_average_window == 0 {
            anyhow::bail!("moving_average_window must be at least 1");
        }
        Ok(())
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
