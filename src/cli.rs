//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use crate::report::SummaryFormat;
use clap::Parser;
use std::path::PathBuf;

/// fraudlens - fraud statistics over a SQLite transaction table
///
/// Computes descriptive, temporal, anomaly and fraud-risk statistics over
/// the `transactions` table and writes one date-stamped CSV per analysis.
///
/// Examples:
///   fraudlens --database bankdata.db
///   fraudlens -d bankdata.db -o Results --summary-format json
///   fraudlens -d bankdata.db --z-threshold 2.5 --risk-std-multiplier 1.5
///   fraudlens --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// SQLite database holding the `transactions` table
    ///
    /// Defaults to the `[database] path` of the config file.
    #[arg(short, long, value_name = "FILE", env = "FRAUDLENS_DB")]
    pub database: Option<PathBuf>,

    /// Directory for the CSV tables and the run summary
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .fraudlens.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Absolute z-score above which a value is reported as an anomaly
    #[arg(long, value_name = "Z")]
    pub z_threshold: Option<f64>,

    /// Multiplier k of the `mean + k * std` high-risk threshold
    #[arg(long, value_name = "K")]
    pub risk_std_multiplier: Option<f64>,

    /// Run summary format (markdown, json)
    #[arg(long, value_name = "FORMAT")]
    pub summary_format: Option<SummaryFormat>,

    /// Generate a default .fraudlens.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if let Some(z) = self.z_threshold {
            if z <= 0.0 || !z.is_finite() {
                return Err("Z threshold must be a positive number".to_string());
            }
        }

        if let Some(k) = self.risk_std_multiplier {
            if k < 0.0 || !k.is_finite() {
                return Err("Risk std multiplier must be zero or positive".to_string());
            }
        }

        if let Some(ref config) = self.config {
            if !config.is_file() {
                return Err(format!("Config file does not exist: {}", config.display()));
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    ///
    /// `verbose_default` comes from the config file; `--quiet` overrides it.
    pub fn log_level(&self, verbose_default: bool) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose || verbose_default {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn make_args() -> Args {
        Args {
            database: None,
            output_dir: None,
            config: None,
            verbose: false,
            quiet: false,
            z_threshold: None,
            risk_std_multiplier: None,
            summary_format: None,
            init_config: false,
        }
    }

    #[test]
    fn test_parse_flags() {
        let args = Args::try_parse_from([
            "fraudlens",
            "-d",
            "bank.db",
            "--z-threshold",
            "2.5",
            "--summary-format",
            "json",
        ])
        .unwrap();

        assert_eq!(args.database, Some(PathBuf::from("bank.db")));
        assert_eq!(args.z_threshold, Some(2.5));
        assert_eq!(args.summary_format, Some(SummaryFormat::Json));
    }

    #[test]
    fn test_validation_conflicting_options() {
        let mut args = make_args();
        args.verbose = true;
        args.quiet = true;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_policy_values() {
        let mut args = make_args();
        args.z_threshold = Some(0.0);
        assert!(args.validate().is_err());

        let mut args = make_args();
        args.risk_std_multiplier = Some(-0.5);
        assert!(args.validate().is_err());

        let mut args = make_args();
        args.risk_std_multiplier = Some(0.0);
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_init_config_skips_validation() {
        let mut args = make_args();
        args.init_config = true;
        args.verbose = true;
        args.quiet = true;
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_log_level() {
        let mut args = make_args();
        assert_eq!(args.log_level(false), tracing::Level::INFO);
        assert_eq!(args.log_level(true), tracing::Level::DEBUG);

        args.verbose = true;
        assert_eq!(args.log_level(false), tracing::Level::DEBUG);

        args.verbose = false;
        args.quiet = true;
        assert_eq!(args.log_level(false), tracing::Level::ERROR);
        assert_eq!(args.log_level(true), tracing::Level::ERROR);
    }
}
