//! Conversion of analysis results into named report tables.
//!
//! One builder per output file. Builders only reshape and label; every
//! number they emit was computed upstream.

use crate::analysis::anomaly::{EntityAnomaly, EntityKind, TransactionAnomaly};
use crate::analysis::distribution::{AmountStats, BandProfile, CorrelationStats};
use crate::analysis::risk::RiskClassified;
use crate::analysis::temporal::{CycleStats, DailyPattern, FraudShare, RiskPeriod, TemporalStats, WeekdayActivity};
use crate::models::{gender_label, DatasetSummary, Gender, GroupAggregate, GroupKey};
use crate::report::table::{Cell, ReportTable};

const AGGREGATE_HEADERS: [&str; 5] = [
    "transaction_count",
    "total_amount",
    "avg_amount",
    "fraud_count",
    "fraud_rate",
];

fn key_cells<K: GroupKey>(key: &K) -> Vec<Cell> {
    key.columns().into_iter().map(Cell::Text).collect()
}

fn aggregate_cells<K>(group: &GroupAggregate<K>) -> Vec<Cell> {
    vec![
        Cell::count(group.transaction_count),
        Cell::Decimal(group.total_amount),
        Cell::Decimal(group.avg_amount()),
        Cell::count(group.fraud_count),
        Cell::Decimal(group.fraud_rate()),
    ]
}

fn headers_with<K: GroupKey>(extra: &[&'static str]) -> Vec<&'static str> {
    let mut headers = K::headers();
    headers.extend_from_slice(extra);
    headers
}

/// Plain group aggregates: key columns followed by the aggregate columns.
pub fn aggregate_table<K: GroupKey>(name: &str, groups: &[GroupAggregate<K>]) -> ReportTable {
    let mut table = ReportTable::new(name, headers_with::<K>(&AGGREGATE_HEADERS));
    for group in groups {
        let mut row = key_cells(&group.key);
        row.extend(aggregate_cells(group));
        table.push(row);
    }
    table
}

/// Group aggregates with risk index and high-risk flag.
pub fn risk_table<K: GroupKey>(name: &str, classified: &[RiskClassified<K>]) -> ReportTable {
    let mut headers = headers_with::<K>(&AGGREGATE_HEADERS);
    headers.extend(["risk_index", "is_high_risk"]);

    let mut table = ReportTable::new(name, headers);
    for item in classified {
        let mut row = key_cells(&item.aggregate.key);
        row.extend(aggregate_cells(&item.aggregate));
        row.push(Cell::decimal(item.risk_index));
        row.push(Cell::Bool(item.is_high_risk));
        table.push(row);
    }
    table
}

pub fn daily_table(name: &str, patterns: &[DailyPattern]) -> ReportTable {
    let mut headers = vec!["step"];
    headers.extend(AGGREGATE_HEADERS);
    headers.extend(["moving_avg_transactions", "moving_avg_fraud_rate"]);

    let mut table = ReportTable::new(name, headers);
    for day in patterns {
        let mut row = key_cells(&day.aggregate.key);
        row.extend(aggregate_cells(&day.aggregate));
        row.push(Cell::decimal(day.moving_avg_transactions));
        row.push(Cell::decimal(day.moving_avg_fraud_rate));
        table.push(row);
    }
    table
}

pub fn fraud_temporal_table(name: &str, split: &[FraudShare]) -> ReportTable {
    let mut table = ReportTable::new(
        name,
        [
            "step",
            "total_transactions",
            "fraud_transactions",
            "normal_transactions",
            "fraud_rate",
            "above_average",
        ],
    );
    for day in split {
        let g = &day.aggregate;
        table.push(vec![
            Cell::Int(g.key.0),
            Cell::count(g.transaction_count),
            Cell::count(g.fraud_count),
            Cell::count(g.normal_count()),
            Cell::Decimal(g.fraud_rate()),
            Cell::Bool(day.above_average),
        ]);
    }
    table
}

pub fn risk_periods_table(name: &str, periods: &[RiskPeriod]) -> ReportTable {
    let mut table = ReportTable::new(
        name,
        [
            "step",
            "total_transactions",
            "fraud_transactions",
            "fraud_rate",
            "moving_avg_fraud_rate",
            "risk_index",
            "is_high_risk",
        ],
    );
    for period in periods {
        let g = &period.risk.aggregate;
        table.push(vec![
            Cell::Int(g.key.0),
            Cell::count(g.transaction_count),
            Cell::count(g.fraud_count),
            Cell::Decimal(g.fraud_rate()),
            Cell::decimal(period.moving_avg_fraud_rate),
            Cell::decimal(period.risk.risk_index),
            Cell::Bool(period.risk.is_high_risk),
        ]);
    }
    table
}

pub fn weekday_table(name: &str, activity: &[WeekdayActivity]) -> ReportTable {
    let mut table = ReportTable::new(
        name,
        ["weekday", "days", "mean_transactions", "std_transactions"],
    );
    for day in activity {
        table.push(vec![
            Cell::text(day.weekday.to_string()),
            Cell::count(day.days as u64),
            Cell::Decimal(day.mean_transactions),
            Cell::decimal(day.std_transactions),
        ]);
    }
    table
}

pub fn band_profile_table(name: &str, profiles: &[BandProfile]) -> ReportTable {
    let mut table = ReportTable::new(
        name,
        [
            "amount_range",
            "total_transactions",
            "fraud_transactions",
            "fraud_rate",
            "avg_amount",
            "min_amount",
            "max_amount",
            "fraud_share",
        ],
    );
    for profile in profiles {
        let g = &profile.aggregate;
        table.push(vec![
            Cell::text(g.key.label.clone()),
            Cell::count(g.transaction_count),
            Cell::count(g.fraud_count),
            Cell::Decimal(g.fraud_rate()),
            Cell::Decimal(g.avg_amount()),
            Cell::Decimal(profile.min_amount),
            Cell::Decimal(profile.max_amount),
            Cell::decimal(profile.fraud_share),
        ]);
    }
    table
}

pub fn transaction_anomaly_table(name: &str, anomalies: &[TransactionAnomaly]) -> ReportTable {
    let mut table = ReportTable::new(
        name,
        [
            "step",
            "customer",
            "age",
            "gender",
            "merchant",
            "category",
            "amount",
            "fraud",
            "amount_zscore",
            "anomaly_type",
        ],
    );
    for anomaly in anomalies {
        let tx = &anomaly.transaction;
        table.push(vec![
            Cell::Int(tx.step),
            Cell::text(tx.customer.clone()),
            Cell::text(tx.age.clone()),
            Cell::text(tx.gender.clone()),
            Cell::text(tx.merchant.clone()),
            Cell::text(tx.category.clone()),
            Cell::Decimal(tx.amount),
            Cell::Int(i64::from(tx.fraud)),
            Cell::Score(anomaly.amount_zscore),
            Cell::text(anomaly.anomaly_type.as_str()),
        ]);
    }
    table
}

/// Entity anomalies. Merchants carry an extra fraud-rate z-score column.
pub fn entity_anomaly_table<K: GroupKey>(
    name: &str,
    anomalies: &[EntityAnomaly<K>],
    kind: EntityKind,
) -> ReportTable {
    let with_rate = kind.monitors_fraud_rate();
    let mut headers = headers_with::<K>(&AGGREGATE_HEADERS);
    headers.extend([
        "transaction_count_zscore",
        "avg_amount_zscore",
        "total_amount_zscore",
    ]);
    if with_rate {
        headers.push("fraud_rate_zscore");
    }
    headers.push("anomaly_type");

    let mut table = ReportTable::new(name, headers);
    for anomaly in anomalies {
        let entity = &anomaly.entity;
        let mut row = key_cells(&entity.aggregate.key);
        row.extend(aggregate_cells(&entity.aggregate));
        row.push(Cell::score(entity.scores.transaction_count_z));
        row.push(Cell::score(entity.scores.avg_amount_z));
        row.push(Cell::score(entity.scores.total_amount_z));
        if with_rate {
            row.push(Cell::score(entity.scores.fraud_rate_z));
        }
        row.push(Cell::text(anomaly.anomaly_type.as_str()));
        table.push(row);
    }
    table
}

pub fn category_kpi_table<K: GroupKey>(name: &str, groups: &[GroupAggregate<K>]) -> ReportTable {
    let mut table = ReportTable::new(
        name,
        headers_with::<K>(&["transactions", "volume", "avg_amount", "fraud_rate"]),
    );
    for group in groups {
        let mut row = key_cells(&group.key);
        row.extend([
            Cell::count(group.transaction_count),
            Cell::Decimal(group.total_amount),
            Cell::Decimal(group.avg_amount()),
            Cell::Decimal(group.fraud_rate()),
        ]);
        table.push(row);
    }
    table
}

pub fn gender_kpi_table(name: &str, groups: &[GroupAggregate<Gender>]) -> ReportTable {
    let mut table = ReportTable::new(
        name,
        ["gender", "label", "transactions", "volume", "avg_amount", "fraud_rate"],
    );
    for group in groups {
        table.push(vec![
            Cell::text(group.key.0.clone()),
            Cell::text(gender_label(&group.key.0)),
            Cell::count(group.transaction_count),
            Cell::Decimal(group.total_amount),
            Cell::Decimal(group.avg_amount()),
            Cell::Decimal(group.fraud_rate()),
        ]);
    }
    table
}

/// Two-column `metric,value` table.
pub fn metric_table(name: &str, metrics: Vec<(&str, Cell)>) -> ReportTable {
    let mut table = ReportTable::new(name, ["metric", "value"]);
    for (metric, value) in metrics {
        table.push(vec![Cell::text(metric), value]);
    }
    table
}

pub fn dataset_stats_table(name: &str, summary: &DatasetSummary) -> ReportTable {
    metric_table(
        name,
        vec![
            ("total_transactions", Cell::count(summary.total_transactions)),
            ("unique_customers", Cell::count(summary.unique_customers)),
            ("unique_merchants", Cell::count(summary.unique_merchants)),
            ("total_amount", Cell::Decimal(summary.total_amount)),
            ("avg_amount", Cell::decimal(summary.avg_amount())),
            ("fraud_count", Cell::count(summary.fraud_count)),
            ("fraud_rate", Cell::decimal(summary.fraud_rate())),
        ],
    )
}

pub fn temporal_stats_table(name: &str, stats: &TemporalStats) -> ReportTable {
    metric_table(
        name,
        vec![
            ("mean_daily_avg_amount", Cell::decimal(stats.mean_daily_avg_amount)),
            ("busiest_step", stats.busiest_step.map_or(Cell::Empty, |s| Cell::Int(s.0))),
            ("max_transactions", stats.max_transactions.map_or(Cell::Empty, Cell::count)),
            ("riskiest_step", stats.riskiest_step.map_or(Cell::Empty, |s| Cell::Int(s.0))),
            ("max_fraud_rate", Cell::decimal(stats.max_fraud_rate)),
            ("count_fraud_correlation", Cell::score(stats.count_fraud_correlation)),
        ],
    )
}

pub fn cycle_stats_table(name: &str, stats: &CycleStats) -> ReportTable {
    metric_table(
        name,
        vec![
            ("mean_peak_distance", Cell::decimal(stats.mean_peak_distance)),
            ("std_peak_distance", Cell::decimal(stats.std_peak_distance)),
            (
                "most_active_weekday",
                Cell::optional_text(stats.most_active_weekday.map(|d| d.to_string())),
            ),
            (
                "least_active_weekday",
                Cell::optional_text(stats.least_active_weekday.map(|d| d.to_string())),
            ),
            ("weekly_variation", Cell::decimal(stats.weekly_variation)),
        ],
    )
}

pub fn amount_stats_table(name: &str, stats: &AmountStats) -> ReportTable {
    metric_table(
        name,
        vec![
            ("minimum", Cell::decimal(stats.min)),
            ("maximum", Cell::decimal(stats.max)),
            ("median", Cell::decimal(stats.median)),
            ("mean", Cell::decimal(stats.mean)),
            ("std", Cell::decimal(stats.std)),
            ("skewness", Cell::score(stats.skewness)),
            ("max_category", Cell::optional_text(stats.max_category.clone())),
            ("pct_at_most_100", Cell::decimal(stats.small_share)),
        ],
    )
}

pub fn correlation_stats_table(name: &str, stats: &CorrelationStats) -> ReportTable {
    metric_table(
        name,
        vec![
            ("pearson", Cell::score(stats.pearson)),
            ("spearman", Cell::score(stats.spearman)),
            ("riskiest_band", Cell::optional_text(stats.riskiest_band.clone())),
            ("max_band_fraud_rate", Cell::decimal(stats.max_band_fraud_rate)),
            ("most_fraud_band", Cell::optional_text(stats.most_fraud_band.clone())),
            ("max_band_frauds", stats.max_band_frauds.map_or(Cell::Empty, Cell::count)),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::anomaly::{EntityScores, ScoredEntity};
    use crate::analysis::aggregate;
    use crate::models::{Category, Merchant};
    use crate::store::testing::tx;

    #[test]
    fn test_aggregate_table_example() {
        let rows = vec![
            tx(0, "C1", "A", 10.0, false),
            tx(0, "C1", "A", 10.0, false),
            tx(0, "C1", "A", 1000.0, true),
        ];
        let table = aggregate_table("descriptive_category_analysis", &aggregate(&rows, Category::of));

        assert_eq!(
            table.headers,
            vec!["category", "transaction_count", "total_amount", "avg_amount", "fraud_count", "fraud_rate"]
        );
        let rendered: Vec<Vec<String>> = table.rendered_rows().collect();
        assert_eq!(rendered[0], vec!["A", "3", "1020.00", "340.00", "1", "33.33"]);
    }

    #[test]
    fn test_empty_aggregate_table_keeps_headers() {
        let table = aggregate_table::<Category>("empty", &[]);
        assert!(table.is_empty());
        assert_eq!(table.headers.len(), 6);
    }

    #[test]
    fn test_gender_kpi_labels() {
        let mut rows = vec![tx(0, "C1", "A", 10.0, false), tx(0, "C2", "A", 20.0, false)];
        rows[1].gender = "E".to_string();
        let table = gender_kpi_table("kpi_gender", &aggregate(&rows, Gender::of));

        let labels: Vec<String> = table.rendered_rows().map(|r| r[1].clone()).collect();
        assert_eq!(labels, vec!["Female", "Enterprise"]);
    }

    #[test]
    fn test_merchant_anomaly_table_has_rate_column() {
        let anomaly = EntityAnomaly {
            entity: ScoredEntity {
                aggregate: GroupAggregate {
                    key: Merchant("M9".to_string()),
                    transaction_count: 4,
                    total_amount: 40.0,
                    fraud_count: 4,
                },
                scores: EntityScores {
                    fraud_count: 4,
                    fraud_rate_z: Some(3.75),
                    ..EntityScores::default()
                },
            },
            anomaly_type: crate::analysis::anomaly::AnomalyType::HighFraudRate,
        };
        let table = entity_anomaly_table("anomaly_merchant_anomalies", &[anomaly], EntityKind::Merchant);

        assert!(table.headers.contains(&"fraud_rate_zscore".to_string()));
        let row: Vec<String> = table.rendered_rows().next().unwrap();
        assert_eq!(row.last().unwrap(), "high_fraud_rate");
        assert!(row.contains(&"3.7500".to_string()));
        assert_eq!(row.len(), table.headers.len());

        let customers = entity_anomaly_table::<Merchant>("c", &[], EntityKind::Customer);
        assert!(!customers.headers.contains(&"fraud_rate_zscore".to_string()));
    }

    #[test]
    fn test_empty_stats_are_blank() {
        let table = amount_stats_table("stats_amount", &AmountStats::default());
        assert_eq!(table.len(), 8);
        assert!(table.rendered_rows().all(|row| row[1].is_empty()));
    }
}
