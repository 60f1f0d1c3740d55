//! Grouped aggregation over transaction snapshots.
//!
//! This module groups transactions by typed keys and computes counts,
//! volumes and fraud rates per group, plus the amount banding used by the
//! distribution reports.

use crate::models::{AmountBand, GroupAggregate, Transaction};
use std::collections::BTreeMap;

/// Group transactions by `key_fn`, one aggregate per observed key.
///
/// Groups come back in ascending key order.
pub fn aggregate<K, F>(transactions: &[Transaction], key_fn: F) -> Vec<GroupAggregate<K>>
where
    K: Ord + Clone,
    F: Fn(&Transaction) -> K,
{
    let mut grouped: BTreeMap<K, GroupAggregate<K>> = BTreeMap::new();

    for tx in transactions {
        let key = key_fn(tx);
        let group = grouped
            .entry(key.clone())
            .or_insert_with(|| GroupAggregate {
                key,
                transaction_count: 0,
                total_amount: 0.0,
                fraud_count: 0,
            });
        group.transaction_count += 1;
        group.total_amount += tx.amount;
        if tx.fraud {
            group.fraud_count += 1;
        }
    }

    grouped.into_values().collect()
}

/// Sort groups by transaction count (largest first). Stable.
pub fn sort_by_transaction_count<K>(groups: &mut [GroupAggregate<K>]) {
    groups.sort_by_key(|g| std::cmp::Reverse(g.transaction_count));
}

/// Sort groups by fraud rate (highest first). Stable.
pub fn sort_by_fraud_rate<K>(groups: &mut [GroupAggregate<K>]) {
    groups.sort_by(|a, b| b.fraud_rate().total_cmp(&a.fraud_rate()));
}

/// Sort groups by total volume (largest first). Stable.
pub fn sort_by_volume<K>(groups: &mut [GroupAggregate<K>]) {
    groups.sort_by(|a, b| b.total_amount.total_cmp(&a.total_amount));
}

/// Fraud rate over raw rows, as a percentage.
pub fn population_fraud_rate(transactions: &[Transaction]) -> Option<f64> {
    if transactions.is_empty() {
        return None;
    }
    let frauds = transactions.iter().filter(|t| t.fraud).count();
    Some(frauds as f64 / transactions.len() as f64 * 100.0)
}

/// Amount ranges defined by ascending upper edges.
///
/// An amount belongs to the first band whose edge is `>=` the amount; the
/// last band is open-ended.
#[derive(Debug, Clone, PartialEq)]
pub struct AmountBands {
    edges: Vec<f64>,
    labels: Vec<String>,
}

impl AmountBands {
    pub fn new(edges: &[f64]) -> Self {
        Self::with_suffix(edges, "")
    }

    /// Bands whose labels carry a unit suffix (e.g. a currency sign).
    pub fn with_suffix(edges: &[f64], suffix: &str) -> Self {
        let mut edges: Vec<f64> = edges.iter().copied().filter(|e| e.is_finite()).collect();
        edges.sort_by(|a, b| a.total_cmp(b));
        edges.dedup();

        let mut labels = Vec::with_capacity(edges.len() + 1);
        let mut lower = 0.0;
        for edge in &edges {
            labels.push(format!("{}-{}{}", lower, edge, suffix));
            lower = *edge;
        }
        labels.push(format!(">{}{}", lower, suffix));

        Self { edges, labels }
    }

    pub fn band_of(&self, amount: f64) -> AmountBand {
        let index = self
            .edges
            .iter()
            .position(|edge| amount <= *edge)
            .unwrap_or(self.edges.len());
        AmountBand {
            index,
            label: self.labels[index].clone(),
        }
    }

    #[cfg(test)]
    pub fn labels(&self) -> &[String] {
        &self.labels
    }
}

impl Default for AmountBands {
    fn default() -> Self {
        Self::new(&[100.0, 500.0, 1000.0, 2000.0, 5000.0])
    }
}
