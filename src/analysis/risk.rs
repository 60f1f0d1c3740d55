//! Fraud-risk classification of group aggregates.
//!
//! Two independent measures are computed together for every group:
//! `is_high_risk` (fraud rate above mean + k * std of the group rates) and
//! `risk_index` (group fraud rate relative to the raw-row population rate).

use crate::analysis::aggregator::{aggregate, population_fraud_rate, sort_by_fraud_rate};
use crate::analysis::stats::{cmp_desc, mean, sample_std};
use crate::models::{Category, GroupAggregate, Merchant, Transaction};

/// Excursion threshold over a set of group fraud rates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskThreshold {
    pub mean: Option<f64>,
    pub std: Option<f64>,
    pub multiplier: f64,
}

impl RiskThreshold {
    pub fn from_rates(rates: &[f64], multiplier: f64) -> Self {
        Self {
            mean: mean(rates),
            std: sample_std(rates),
            multiplier,
        }
    }

    /// `mean + multiplier * std`, undefined when the spread is undefined.
    pub fn cutoff(&self) -> Option<f64> {
        Some(self.mean? + self.multiplier * self.std?)
    }

    pub fn is_high_risk(&self, rate: f64) -> bool {
        self.cutoff().is_some_and(|cutoff| rate > cutoff)
    }
}

/// A group aggregate with both risk measures attached.
#[derive(Debug, Clone, PartialEq)]
pub struct RiskClassified<K> {
    pub aggregate: GroupAggregate<K>,
    /// Group fraud rate / population fraud rate.
    pub risk_index: Option<f64>,
    pub is_high_risk: bool,
}

/// Attach risk index and high-risk flag to every group. Order is kept.
pub fn classify_risk<K>(
    groups: Vec<GroupAggregate<K>>,
    population_rate: Option<f64>,
    multiplier: f64,
) -> Vec<RiskClassified<K>> {
    let rates: Vec<f64> = groups.iter().map(|g| g.fraud_rate()).collect();
    let threshold = RiskThreshold::from_rates(&rates, multiplier);
    let population_rate = population_rate.filter(|rate| *rate > 0.0);

    groups
        .into_iter()
        .map(|aggregate| {
            let rate = aggregate.fraud_rate();
            RiskClassified {
                risk_index: population_rate.map(|p| rate / p),
                is_high_risk: threshold.is_high_risk(rate),
                aggregate,
            }
        })
        .collect()
}

/// Merchant risk, highest fraud rate first.
pub fn merchant_risk(transactions: &[Transaction], multiplier: f64) -> Vec<RiskClassified<Merchant>> {
    let mut groups = aggregate(transactions, Merchant::of);
    sort_by_fraud_rate(&mut groups);
    classify_risk(groups, population_fraud_rate(transactions), multiplier)
}

/// Category risk, highest risk index first.
pub fn category_risk(transactions: &[Transaction], multiplier: f64) -> Vec<RiskClassified<Category>> {
    let groups = aggregate(transactions, Category::of);
    let mut classified = classify_risk(groups, population_fraud_rate(transactions), multiplier);
    classified.sort_by(|a, b| cmp_desc(a.risk_index, b.risk_index));
    classified
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testing::tx;

    fn category_rows(category: &str, total: usize, frauds: usize) -> Vec<Transaction> {
        (0..total)
            .map(|i| tx(0, "C1", category, 10.0, i < frauds))
            .collect()
    }

    #[test]
    fn test_threshold_example() {
        let threshold = RiskThreshold {
            mean: Some(2.0),
            std: Some(1.0),
            multiplier: 1.0,
        };
        assert_eq!(threshold.cutoff(), Some(3.0));
        assert!(threshold.is_high_risk(3.5));
        assert!(!threshold.is_high_risk(2.9));
        assert!(!threshold.is_high_risk(3.0));
    }

    #[test]
    fn test_threshold_from_rates() {
        let threshold = RiskThreshold::from_rates(&[1.0, 2.0, 3.0], 1.0);
        assert_eq!(threshold.cutoff(), Some(3.0));

        let single = RiskThreshold::from_rates(&[40.0], 1.0);
        assert_eq!(single.cutoff(), None);
        assert!(!single.is_high_risk(100.0));
    }

    #[test]
    fn test_risk_index_independent_of_high_risk() {
        let mut rows = category_rows("A", 10, 0);
        rows.extend(category_rows("B", 10, 1));
        rows.extend(category_rows("C", 10, 5));
        rows.extend(category_rows("D", 10, 3));

        let classified = category_risk(&rows, 1.0);
        let find = |name: &str| {
            classified
                .iter()
                .find(|c| c.aggregate.key.0 == name)
                .unwrap()
                .clone()
        };

        let d = find("D");
        assert!(d.risk_index.unwrap() > 1.0);
        assert!(!d.is_high_risk);

        let c = find("C");
        assert!(c.is_high_risk);
        assert!((c.risk_index.unwrap() - 50.0 / 22.5).abs() < 1e-9);

        let order: Vec<&str> = classified.iter().map(|c| c.aggregate.key.0.as_str()).collect();
        assert_eq!(order, vec!["C", "D", "B", "A"]);
    }

    #[test]
    fn test_no_fraud_population() {
        let rows = category_rows("A", 5, 0);
        let classified = category_risk(&rows, 1.0);

        assert_eq!(classified.len(), 1);
        assert_eq!(classified[0].risk_index, None);
        assert!(!classified[0].is_high_risk);
    }

    #[test]
    fn test_merchant_risk_sorted_by_rate() {
        let mut rows: Vec<Transaction> = Vec::new();
        for (merchant, frauds) in [("M1", 0), ("M2", 2), ("M3", 1)] {
            rows.extend((0..4).map(|i| Transaction {
                merchant: merchant.to_string(),
                ..tx(0, "C1", "A", 10.0, i < frauds)
            }));
        }

        let classified = merchant_risk(&rows, 1.0);
        let order: Vec<&str> = classified.iter().map(|c| c.aggregate.key.0.as_str()).collect();
        assert_eq!(order, vec!["M2", "M3", "M1"]);
    }
}
