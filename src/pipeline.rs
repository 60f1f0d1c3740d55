//! End-to-end analysis run.
//!
//! Opens the store, computes every analysis over one snapshot, closes the
//! store and writes the resulting tables. The run is single-pass and
//! stateless: the same snapshot always yields the same tables.

use crate::analysis::anomaly::{
    detect_customer_anomalies, detect_merchant_anomalies, detect_transaction_anomalies, EntityKind,
};
use crate::analysis::distribution::{
    amount_analysis, amount_correlation, amount_stats, category_kpis, correlation_stats, gender_kpis,
};
use crate::analysis::risk::{category_risk, merchant_risk, RiskClassified};
use crate::analysis::temporal::{
    cycle_stats, daily_patterns, fraud_split, risk_periods, temporal_stats, weekday_cycle,
};
use crate::analysis::{sort_by_fraud_rate, sort_by_transaction_count, AmountBands};
use crate::config::{Config, PolicyConfig};
use crate::error::AnalysisResult;
use crate::models::{Category, DatasetSummary, Demographic, GroupAggregate, Step, Transaction};
use crate::report::catalogue;
use crate::report::{CsvSink, FindingCounts, ReportTable, RunSummary};
use crate::store::TransactionStore;
use chrono::{NaiveDate, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Instant;
use tracing::{debug, info};

/// Inputs shared by every analysis stage.
struct Snapshot {
    dataset: DatasetSummary,
    transactions: Vec<Transaction>,
    categories: Vec<GroupAggregate<Category>>,
    demographics: Vec<GroupAggregate<Demographic>>,
    daily: Vec<GroupAggregate<Step>>,
}

impl Snapshot {
    async fn load(store: &TransactionStore) -> AnalysisResult<Self> {
        let dataset = store.summary().await?;
        let transactions = store.load_snapshot().await?;

        let mut categories = store.aggregate_by::<Category>().await?;
        sort_by_transaction_count(&mut categories);

        Ok(Self {
            dataset,
            transactions,
            categories,
            demographics: store.aggregate_by::<Demographic>().await?,
            daily: store.aggregate_by::<Step>().await?,
        })
    }
}

fn count_high_risk<K>(classified: &[RiskClassified<K>]) -> usize {
    classified.iter().filter(|c| c.is_high_risk).count()
}

fn descriptive_tables(snapshot: &Snapshot, bands: &AmountBands) -> Vec<ReportTable> {
    vec![
        catalogue::aggregate_table("descriptive_category_analysis", &snapshot.categories),
        catalogue::aggregate_table(
            "descriptive_amount_analysis",
            &amount_analysis(&snapshot.transactions, bands),
        ),
        catalogue::aggregate_table("descriptive_demographic_analysis", &snapshot.demographics),
    ]
}

fn temporal_tables(
    snapshot: &Snapshot,
    policy: &PolicyConfig,
    findings: &mut FindingCounts,
) -> Vec<ReportTable> {
    let daily = &snapshot.daily;
    let window = policy.moving_average_window;
    let periods = risk_periods(daily, policy.risk_std_multiplier, window);
    findings.high_risk_periods = periods.iter().filter(|p| p.risk.is_high_risk).count();

    vec![
        catalogue::daily_table("temporal_daily_analysis", &daily_patterns(daily, window)),
        catalogue::fraud_temporal_table("temporal_fraud_temporal", &fraud_split(daily)),
        catalogue::risk_periods_table("temporal_risk_periods", &periods),
        catalogue::weekday_table("temporal_weekday_cycle", &weekday_cycle(daily)),
    ]
}

fn fraud_tables(
    snapshot: &Snapshot,
    policy: &PolicyConfig,
    bands: &AmountBands,
    findings: &mut FindingCounts,
) -> Vec<ReportTable> {
    let rows = &snapshot.transactions;
    let merchants = merchant_risk(rows, policy.risk_std_multiplier);
    let categories = category_risk(rows, policy.risk_std_multiplier);
    findings.high_risk_merchants = count_high_risk(&merchants);
    findings.high_risk_categories = count_high_risk(&categories);

    let mut demographics = snapshot.demographics.clone();
    sort_by_fraud_rate(&mut demographics);

    vec![
        catalogue::aggregate_table("fraud_amount_fraud", &amount_analysis(rows, bands)),
        catalogue::risk_table("fraud_merchant_fraud", &merchants),
        catalogue::risk_table("fraud_category_fraud", &categories),
        catalogue::aggregate_table("fraud_demographic_fraud", &demographics),
        catalogue::band_profile_table("fraud_amount_correlation", &amount_correlation(rows)),
    ]
}

fn anomaly_tables(snapshot: &Snapshot, policy: &PolicyConfig, findings: &mut FindingCounts) -> Vec<ReportTable> {
    let rows = &snapshot.transactions;
    let z = policy.z_threshold;

    let transactions = detect_transaction_anomalies(rows, z);
    let customers = detect_customer_anomalies(rows, z);
    let merchants = detect_merchant_anomalies(rows, z);
    findings.transaction_anomalies = transactions.len();
    findings.customer_anomalies = customers.len();
    findings.merchant_anomalies = merchants.len();

    vec![
        catalogue::transaction_anomaly_table("anomaly_transaction_anomalies", &transactions),
        catalogue::entity_anomaly_table("anomaly_customer_anomalies", &customers, EntityKind::Customer),
        catalogue::entity_anomaly_table("anomaly_merchant_anomalies", &merchants, EntityKind::Merchant),
    ]
}

fn kpi_tables(snapshot: &Snapshot) -> Vec<ReportTable> {
    let rows = &snapshot.transactions;
    vec![
        catalogue::category_kpi_table("kpi_category", &category_kpis(rows)),
        catalogue::gender_kpi_table("kpi_gender", &gender_kpis(rows)),
    ]
}

fn stats_tables(snapshot: &Snapshot, policy: &PolicyConfig) -> Vec<ReportTable> {
    let rows = &snapshot.transactions;
    let profiles = amount_correlation(rows);

    vec![
        catalogue::dataset_stats_table("stats_dataset", &snapshot.dataset),
        catalogue::temporal_stats_table("stats_temporal", &temporal_stats(&snapshot.daily)),
        catalogue::cycle_stats_table(
            "stats_cycle",
            &cycle_stats(&snapshot.daily, policy.peak_distance, policy.peak_prominence),
        ),
        catalogue::amount_stats_table("stats_amount", &amount_stats(rows)),
        catalogue::correlation_stats_table("stats_correlation", &correlation_stats(rows, &profiles)),
    ]
}

/// Compute every report table from one snapshot.
fn build_tables(snapshot: &Snapshot, config: &Config, findings: &mut FindingCounts) -> Vec<ReportTable> {
    let policy = &config.policy;
    let bands = AmountBands::new(&config.report.amount_band_edges);

    let mut tables = descriptive_tables(snapshot, &bands);
    tables.extend(temporal_tables(snapshot, policy, findings));
    tables.extend(fraud_tables(snapshot, policy, &bands, findings));
    tables.extend(anomaly_tables(snapshot, policy, findings));
    tables.extend(kpi_tables(snapshot));
    tables.extend(stats_tables(snapshot, policy));
    tables
}

fn progress_bar(len: usize, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    pb
}

/// Run every analysis and write its table. Returns the run summary; the
/// summary file itself is written by the caller.
pub async fn run(config: &Config, date: NaiveDate, show_progress: bool) -> AnalysisResult<RunSummary> {
    let start_time = Instant::now();

    let store = TransactionStore::open(&config.database.path).await?;
    let database = store.location().to_string();
    let loaded = Snapshot::load(&store).await;
    store.close().await;
    let snapshot = loaded?;

    if snapshot.transactions.is_empty() {
        info!("Snapshot is empty; tables will contain headers only");
    }

    let mut findings = FindingCounts::default();
    let tables = build_tables(&snapshot, config, &mut findings);
    debug!("Built {} tables", tables.len());

    let sink = CsvSink::new(&config.general.output_dir, date)?;
    let progress = progress_bar(tables.len(), show_progress);
    let mut files_written = Vec::with_capacity(tables.len());
    for table in &tables {
        if table.is_empty() {
            debug!("{} has no rows", table.name);
        }
        progress.set_message(table.name.clone());
        files_written.push(sink.write(table)?);
        progress.inc(1);
    }
    progress.finish_and_clear();
    info!(
        "Wrote {} tables to {} (stamp {})",
        files_written.len(),
        sink.dir().display(),
        sink.stamp()
    );

    Ok(RunSummary {
        generated_at: Utc::now(),
        database,
        dataset: snapshot.dataset,
        findings,
        files_written,
        duration_seconds: start_time.elapsed().as_secs_f64(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AnalysisError;
    use crate::store::testing::{fixture_transactions, seed_database};
    use std::path::Path;
    use tempfile::TempDir;

    const TABLE_COUNT: usize = 22;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 9).unwrap()
    }

    fn config_for(database: &Path, output_dir: &Path) -> Config {
        let mut config = Config::default();
        config.database.path = database.to_path_buf();
        config.general.output_dir = output_dir.to_path_buf();
        config
    }

    #[tokio::test]
    async fn test_run_on_fixture() {
        let temp_dir = TempDir::new().unwrap();
        let db = temp_dir.path().join("bank.db");
        seed_database(&db, &fixture_transactions()).await;

        let config = config_for(&db, &temp_dir.path().join("out"));
        let summary = run(&config, date(), false).await.unwrap();

        assert_eq!(summary.files_written.len(), TABLE_COUNT);
        assert_eq!(
            summary.dataset.total_transactions as usize,
            fixture_transactions().len()
        );
        assert!(summary.files_written.iter().all(|p| p.exists()));
        assert!(summary
            .files_written
            .iter()
            .any(|p| p.ends_with("descriptive_category_analysis_20240309.csv")));

        let category = std::fs::read_to_string(
            temp_dir
                .path()
                .join("out/descriptive_category_analysis_20240309.csv"),
        )
        .unwrap();
        assert!(category.starts_with("category,transaction_count,total_amount,avg_amount,fraud_count,fraud_rate\n"));
    }

    #[tokio::test]
    async fn test_runs_are_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let db = temp_dir.path().join("bank.db");
        seed_database(&db, &fixture_transactions()).await;

        let first = run(&config_for(&db, &temp_dir.path().join("a")), date(), false)
            .await
            .unwrap();
        let second = run(&config_for(&db, &temp_dir.path().join("b")), date(), false)
            .await
            .unwrap();

        for (a, b) in first.files_written.iter().zip(&second.files_written) {
            assert_eq!(a.file_name(), b.file_name());
            assert_eq!(
                std::fs::read(a).unwrap(),
                std::fs::read(b).unwrap(),
                "{} differs between runs",
                a.display()
            );
        }
    }

    #[tokio::test]
    async fn test_empty_store_writes_headers_only() {
        let temp_dir = TempDir::new().unwrap();
        let db = temp_dir.path().join("empty.db");
        seed_database(&db, &[]).await;

        let summary = run(&config_for(&db, temp_dir.path()), date(), false)
            .await
            .unwrap();

        assert_eq!(summary.files_written.len(), TABLE_COUNT);
        assert_eq!(summary.findings, FindingCounts::default());
        for path in &summary.files_written {
            let content = std::fs::read_to_string(path).unwrap();
            let name = path.file_name().unwrap().to_string_lossy().into_owned();
            if name.starts_with("stats_") {
                // Metric names stay, values are blank (except zero counts).
                assert!(content.starts_with("metric,value\n"));
            } else {
                assert_eq!(content.lines().count(), 1, "{} should be header-only", name);
            }
        }
    }

    #[tokio::test]
    async fn test_missing_database_fails_before_writing() {
        let temp_dir = TempDir::new().unwrap();
        let out = temp_dir.path().join("out");
        let config = config_for(&temp_dir.path().join("absent.db"), &out);

        let err = run(&config, date(), false).await.unwrap_err();
        assert!(matches!(err, AnalysisError::SourceUnavailable { .. }));
        assert!(!out.exists());
    }
}
