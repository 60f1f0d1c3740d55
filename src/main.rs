//! fraudlens - fraud statistics over a SQLite transaction table
//!
//! A CLI tool that computes descriptive, temporal, anomaly and fraud-risk
//! statistics over a read-only `transactions` table and writes one
//! date-stamped CSV per analysis plus a run summary.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Any error (missing database, schema mismatch, I/O, bad arguments)

mod analysis;
mod cli;
mod config;
mod error;
mod models;
mod pipeline;
mod report;
mod store;

use anyhow::{Context, Result};
use chrono::Local;
use cli::Args;
use config::{Config, CONFIG_FILE};
use report::{RunSummary, SummaryFormat};
use tracing::{debug, error, info, warn};
use std::path::PathBuf;
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Config sets the default verbosity
    let (mut config, origin) = load_config(&args)?;
    config.merge_with_args(&args);

    init_logging(&args, &config);

    info!("fraudlens v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);
    origin.log();

    if let Err(e) = run_analysis(&args, config).await {
        error!("Analysis failed: {:#}", e);
        eprintln!("\n❌ Error: {:#}", e);
        if e
            .downcast_ref::<error::AnalysisError>()
            .is_some_and(|inner| inner.is_input_error())
        {
            eprintln!("   Check --database (or FRAUDLENS_DB) and the `transactions` table.");
        }
        std::process::exit(1);
    }

    Ok(())
}

/// Handle --init-config: generate a default .fraudlens.toml.
fn handle_init_config() -> Result<()> {
    let path = std::path::Path::new(CONFIG_FILE);

    if path.exists() {
        eprintln!("⚠️  {} already exists. Remove it first or edit it manually.", CONFIG_FILE);
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).with_context(|| format!("Failed to write {}", CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE);
    println!("   Edit it to customize the database path, thresholds and output.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args, config: &Config) {
    let level = args.log_level(config.general.verbose);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Run the complete analysis workflow.
async fn run_analysis(args: &Args, config: Config) -> Result<()> {
    config.validate()?;

    let date = config
        .report
        .date_stamp
        .unwrap_or_else(|| Local::now().date_naive());

    if !args.quiet {
        println!("🔎 Analysing transactions: {}", config.database.path.display());
        println!("   Output: {}", config.general.output_dir.display());
        println!(
            "   z threshold: {} | risk multiplier: {}",
            config.policy.z_threshold, config.policy.risk_std_multiplier
        );
    }

    let summary = pipeline::run(&config, date, !args.quiet)
        .await
        .with_context(|| format!("Analysis of {} failed", config.database.path.display()))?;

    let sink = report::CsvSink::new(&config.general.output_dir, date)?;
    let format = config.general.summary_format;
    let summary_path = report::write_summary(&summary, format, &sink)
        .context("Failed to write run summary")?;

    if !args.quiet {
        print_summary(&summary, format);
        println!("\n✅ Analysis complete! Summary saved to: {}", summary_path.display());
    } else {
        info!("Summary saved to {}", summary_path.display());
    }

    Ok(())
}

/// Print the run summary to stdout.
fn print_summary(summary: &RunSummary, format: SummaryFormat) {
    let dataset = &summary.dataset;
    let findings = &summary.findings;

    println!("\n📊 Analysis Summary:");
    println!("   Transactions: {}", dataset.total_transactions);
    println!(
        "   Customers: {} | Merchants: {}",
        dataset.unique_customers, dataset.unique_merchants
    );
    match dataset.fraud_rate() {
        Some(rate) => println!("   Fraudulent: {} ({:.2}%)", dataset.fraud_count, rate),
        None => println!("   Fraudulent: {}", dataset.fraud_count),
    }
    println!(
        "   Anomalies - transactions: {} | customers: {} | merchants: {}",
        findings.transaction_anomalies, findings.customer_anomalies, findings.merchant_anomalies
    );
    println!(
        "   High risk - merchants: {} | categories: {} | periods: {}",
        findings.high_risk_merchants, findings.high_risk_categories, findings.high_risk_periods
    );
    println!("   Tables written: {}", summary.files_written.len());
    println!("   Summary format: {:?}", format);
    println!("   Duration: {:.1}s", summary.duration_seconds);
}

/// Where the effective configuration came from.
enum ConfigOrigin {
    Explicit(PathBuf),
    DefaultFile,
    BuiltIn,
    Fallback(anyhow::Error),
}

impl ConfigOrigin {
    fn log(&self) {
        match self {
            ConfigOrigin::Explicit(path) => info!("Loaded config from: {}", path.display()),
            ConfigOrigin::DefaultFile => info!("Loaded default config from {}", CONFIG_FILE),
            ConfigOrigin::BuiltIn => debug!("No config file found, using defaults"),
            ConfigOrigin::Fallback(e) => warn!("Failed to load config: {:#}", e),
        }
    }
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<(Config, ConfigOrigin)> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        let config = Config::load(config_path)?;
        return Ok((config, ConfigOrigin::Explicit(config_path.clone())));
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => Ok((config, ConfigOrigin::DefaultFile)),
        Ok(None) => Ok((Config::default(), ConfigOrigin::BuiltIn)),
        Err(e) => Ok((Config::default(), ConfigOrigin::Fallback(e))),
    }
}
