//! Amount distribution, amount/fraud correlation and KPI tables.

use crate::analysis::aggregator::{aggregate, sort_by_volume, AmountBands};
use crate::analysis::stats::{mean, median, pearson, sample_std, skewness, spearman};
use crate::models::{AmountBand, Category, Gender, GroupAggregate, Transaction};

/// Upper bound of the "small amount" share reported in the amount stats.
pub const SMALL_AMOUNT: f64 = 100.0;

/// Edges of the fine banding used by the amount/fraud correlation table.
pub const FINE_BAND_EDGES: [f64; 7] = [10.0, 20.0, 50.0, 100.0, 200.0, 500.0, 1000.0];

/// Group aggregates per amount band, in band order.
pub fn amount_analysis(transactions: &[Transaction], bands: &AmountBands) -> Vec<GroupAggregate<AmountBand>> {
    aggregate(transactions, |tx| bands.band_of(tx.amount))
}

/// Shape of the amount distribution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AmountStats {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub median: Option<f64>,
    pub mean: Option<f64>,
    pub std: Option<f64>,
    pub skewness: Option<f64>,
    /// Category of the largest transaction.
    pub max_category: Option<String>,
    /// Percentage of transactions at or below `SMALL_AMOUNT`.
    pub small_share: Option<f64>,
}

pub fn amount_stats(transactions: &[Transaction]) -> AmountStats {
    let amounts: Vec<f64> = transactions.iter().map(|t| t.amount).collect();

    // First occurrence of the maximum wins.
    let largest = transactions.iter().fold(None::<&Transaction>, |best, tx| match best {
        Some(b) if b.amount >= tx.amount => Some(b),
        _ => Some(tx),
    });

    let small_share = (!amounts.is_empty()).then(|| {
        let small = amounts.iter().filter(|a| **a <= SMALL_AMOUNT).count();
        small as f64 / amounts.len() as f64 * 100.0
    });

    AmountStats {
        min: amounts.iter().copied().reduce(f64::min),
        max: largest.map(|t| t.amount),
        median: median(&amounts),
        mean: mean(&amounts),
        std: sample_std(&amounts),
        skewness: skewness(&amounts),
        max_category: largest.map(|t| t.category.clone()),
        small_share,
    }
}

/// One fine amount band with its amount range and share of all frauds.
#[derive(Debug, Clone, PartialEq)]
pub struct BandProfile {
    pub aggregate: GroupAggregate<AmountBand>,
    pub min_amount: f64,
    pub max_amount: f64,
    /// Percentage of all fraudulent transactions falling in this band.
    pub fraud_share: Option<f64>,
}

/// Fine-band profile, ordered by smallest observed amount.
pub fn amount_correlation(transactions: &[Transaction]) -> Vec<BandProfile> {
    let bands = AmountBands::with_suffix(&FINE_BAND_EDGES, "€");
    let total_frauds = transactions.iter().filter(|t| t.fraud).count() as u64;

    let mut profiles: Vec<BandProfile> = aggregate(transactions, |tx| bands.band_of(tx.amount))
        .into_iter()
        .map(|group| {
            let amounts = transactions
                .iter()
                .filter(|t| bands.band_of(t.amount).index == group.key.index)
                .map(|t| t.amount);
            let (min_amount, max_amount) = amounts.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), a| {
                (lo.min(a), hi.max(a))
            });
            BandProfile {
                fraud_share: (total_frauds > 0)
                    .then(|| group.fraud_count as f64 / total_frauds as f64 * 100.0),
                aggregate: group,
                min_amount,
                max_amount,
            }
        })
        .collect();

    profiles.sort_by(|a, b| a.min_amount.total_cmp(&b.min_amount));
    profiles
}

/// Amount/fraud relationship summary.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CorrelationStats {
    pub pearson: Option<f64>,
    pub spearman: Option<f64>,
    pub riskiest_band: Option<String>,
    pub max_band_fraud_rate: Option<f64>,
    pub most_fraud_band: Option<String>,
    pub max_band_frauds: Option<u64>,
}

pub fn correlation_stats(transactions: &[Transaction], profiles: &[BandProfile]) -> CorrelationStats {
    let amounts: Vec<f64> = transactions.iter().map(|t| t.amount).collect();
    let flags: Vec<f64> = transactions.iter().map(|t| if t.fraud { 1.0 } else { 0.0 }).collect();

    let riskiest = profiles.iter().fold(None::<&BandProfile>, |best, p| match best {
        Some(b) if b.aggregate.fraud_rate() >= p.aggregate.fraud_rate() => Some(b),
        _ => Some(p),
    });
    let most_frauds = profiles.iter().fold(None::<&BandProfile>, |best, p| match best {
        Some(b) if b.aggregate.fraud_count >= p.aggregate.fraud_count => Some(b),
        _ => Some(p),
    });

    CorrelationStats {
        pearson: pearson(&amounts, &flags),
        spearman: spearman(&amounts, &flags),
        riskiest_band: riskiest.map(|p| p.aggregate.key.label.clone()),
        max_band_fraud_rate: riskiest.map(|p| p.aggregate.fraud_rate()),
        most_fraud_band: most_frauds.map(|p| p.aggregate.key.label.clone()),
        max_band_frauds: most_frauds.map(|p| p.aggregate.fraud_count),
    }
}

/// Category KPIs, largest volume first.
pub fn category_kpis(transactions: &[Transaction]) -> Vec<GroupAggregate<Category>> {
    let mut groups = aggregate(transactions, Category::of);
    sort_by_volume(&mut groups);
    groups
}

/// Gender KPIs in gender-code order.
pub fn gender_kpis(transactions: &[Transaction]) -> Vec<GroupAggregate<Gender>> {
    aggregate(transactions, Gender::of)
}
