//! Z-score outlier detection.
//!
//! Row-level detection scores each transaction against its category's
//! amount distribution. Entity-level detection scores customers and
//! merchants against the cross-entity population and labels each flagged
//! entity with the first matching rule of an ordered rule table.

use crate::analysis::aggregator::aggregate;
use crate::analysis::stats::{cmp_desc, Population};
use crate::models::{Customer, GroupAggregate, Merchant, Transaction};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

/// Kind of anomaly reported for a row or entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyType {
    HighAmount,
    LowAmount,
    FraudDetected,
    HighFraudRate,
    AbnormalTransactionCount,
    AbnormalAverageAmount,
    AbnormalTotalAmount,
}

impl AnomalyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalyType::HighAmount => "high_amount",
            AnomalyType::LowAmount => "low_amount",
            AnomalyType::FraudDetected => "fraud_detected",
            AnomalyType::HighFraudRate => "high_fraud_rate",
            AnomalyType::AbnormalTransactionCount => "abnormal_transaction_count",
            AnomalyType::AbnormalAverageAmount => "abnormal_average_amount",
            AnomalyType::AbnormalTotalAmount => "abnormal_total_amount",
        }
    }
}

impl fmt::Display for AnomalyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

fn abs_exceeds(z: Option<f64>, threshold: f64) -> bool {
    z.is_some_and(|z| z.abs() > threshold)
}

fn exceeds(z: Option<f64>, threshold: f64) -> bool {
    z.is_some_and(|z| z > threshold)
}

// ============================================================================
// Row-level
// ============================================================================

/// A transaction whose amount is an outlier within its category.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionAnomaly {
    pub transaction: Transaction,
    pub amount_zscore: f64,
    pub anomaly_type: AnomalyType,
}

/// Flag transactions with `|z| > threshold` against their category.
///
/// Sorted by z-score, highest first.
pub fn detect_transaction_anomalies(
    transactions: &[Transaction],
    z_threshold: f64,
) -> Vec<TransactionAnomaly> {
    let mut amounts: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for tx in transactions {
        amounts.entry(tx.category.as_str()).or_default().push(tx.amount);
    }
    let populations: BTreeMap<&str, Population> = amounts
        .iter()
        .map(|(category, values)| (*category, Population::of(values)))
        .collect();

    let mut anomalies: Vec<TransactionAnomaly> = transactions
        .iter()
        .filter_map(|tx| {
            let z = populations.get(tx.category.as_str())?.z_score(tx.amount)?;
            if z.abs() <= z_threshold {
                return None;
            }
            let anomaly_type = if z > z_threshold {
                AnomalyType::HighAmount
            } else {
                AnomalyType::LowAmount
            };
            Some(TransactionAnomaly {
                transaction: tx.clone(),
                amount_zscore: z,
                anomaly_type,
            })
        })
        .collect();

    anomalies.sort_by(|a, b| b.amount_zscore.total_cmp(&a.amount_zscore));
    debug!("{} transaction anomalies", anomalies.len());
    anomalies
}

// ============================================================================
// Entity-level
// ============================================================================

/// Per-metric z-scores of one entity. `None` means undefined.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EntityScores {
    pub fraud_count: u64,
    pub transaction_count_z: Option<f64>,
    pub avg_amount_z: Option<f64>,
    pub total_amount_z: Option<f64>,
    pub fraud_rate_z: Option<f64>,
}

/// A group aggregate augmented with its z-scores.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredEntity<K> {
    pub aggregate: GroupAggregate<K>,
    pub scores: EntityScores,
}

/// Score every entity against the cross-entity population.
pub fn score_entities<K>(groups: Vec<GroupAggregate<K>>, with_fraud_rate: bool) -> Vec<ScoredEntity<K>> {
    let counts: Vec<f64> = groups.iter().map(|g| g.transaction_count as f64).collect();
    let averages: Vec<f64> = groups.iter().map(|g| g.avg_amount()).collect();
    let totals: Vec<f64> = groups.iter().map(|g| g.total_amount).collect();
    let rates: Vec<f64> = groups.iter().map(|g| g.fraud_rate()).collect();

    let count_pop = Population::of(&counts);
    let avg_pop = Population::of(&averages);
    let total_pop = Population::of(&totals);
    let rate_pop = Population::of(&rates);

    groups
        .into_iter()
        .map(|aggregate| {
            let scores = EntityScores {
                fraud_count: aggregate.fraud_count,
                transaction_count_z: count_pop.z_score(aggregate.transaction_count as f64),
                avg_amount_z: avg_pop.z_score(aggregate.avg_amount()),
                total_amount_z: total_pop.z_score(aggregate.total_amount),
                fraud_rate_z: if with_fraud_rate {
                    rate_pop.z_score(aggregate.fraud_rate())
                } else {
                    None
                },
            };
            ScoredEntity { aggregate, scores }
        })
        .collect()
}

/// One entry of an ordered anomaly rule table.
#[derive(Clone, Copy)]
pub struct AnomalyRule {
    pub anomaly_type: AnomalyType,
    pub predicate: fn(&EntityScores, f64) -> bool,
}

impl fmt::Debug for AnomalyRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnomalyRule")
            .field("anomaly_type", &self.anomaly_type)
            .finish()
    }
}

fn has_fraud(s: &EntityScores, _: f64) -> bool {
    s.fraud_count > 0
}

fn high_fraud_rate(s: &EntityScores, t: f64) -> bool {
    exceeds(s.fraud_rate_z, t)
}

fn abnormal_count(s: &EntityScores, t: f64) -> bool {
    abs_exceeds(s.transaction_count_z, t)
}

fn abnormal_average(s: &EntityScores, t: f64) -> bool {
    abs_exceeds(s.avg_amount_z, t)
}

fn abnormal_total(s: &EntityScores, t: f64) -> bool {
    abs_exceeds(s.total_amount_z, t)
}

const ABNORMAL_COUNT: AnomalyRule = AnomalyRule {
    anomaly_type: AnomalyType::AbnormalTransactionCount,
    predicate: abnormal_count,
};

const ABNORMAL_AVERAGE: AnomalyRule = AnomalyRule {
    anomaly_type: AnomalyType::AbnormalAverageAmount,
    predicate: abnormal_average,
};

const ABNORMAL_TOTAL: AnomalyRule = AnomalyRule {
    anomaly_type: AnomalyType::AbnormalTotalAmount,
    predicate: abnormal_total,
};

/// Customer rules, in precedence order.
pub static CUSTOMER_RULES: [AnomalyRule; 4] = [
    AnomalyRule {
        anomaly_type: AnomalyType::FraudDetected,
        predicate: has_fraud,
    },
    ABNORMAL_COUNT,
    ABNORMAL_AVERAGE,
    ABNORMAL_TOTAL,
];

/// Merchant rules, in precedence order.
pub static MERCHANT_RULES: [AnomalyRule; 4] = [
    AnomalyRule {
        anomaly_type: AnomalyType::HighFraudRate,
        predicate: high_fraud_rate,
    },
    ABNORMAL_COUNT,
    ABNORMAL_AVERAGE,
    ABNORMAL_TOTAL,
];

/// First matching rule wins; no match means the entity is not anomalous.
pub fn classify(scores: &EntityScores, rules: &[AnomalyRule], z_threshold: f64) -> Option<AnomalyType> {
    rules
        .iter()
        .find(|rule| (rule.predicate)(scores, z_threshold))
        .map(|rule| rule.anomaly_type)
}

/// Which population an entity belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Customer,
    Merchant,
}

impl EntityKind {
    pub fn rules(&self) -> &'static [AnomalyRule] {
        match self {
            EntityKind::Customer => &CUSTOMER_RULES,
            EntityKind::Merchant => &MERCHANT_RULES,
        }
    }

    pub fn monitors_fraud_rate(&self) -> bool {
        matches!(self, EntityKind::Merchant)
    }
}

/// A flagged customer or merchant.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityAnomaly<K> {
    pub entity: ScoredEntity<K>,
    pub anomaly_type: AnomalyType,
}

/// Score, flag and order entity anomalies.
///
/// Ordering: fraud signal, then transaction count z, then total amount z,
/// all descending with undefined scores last.
pub fn detect_entity_anomalies<K>(
    groups: Vec<GroupAggregate<K>>,
    kind: EntityKind,
    z_threshold: f64,
) -> Vec<EntityAnomaly<K>> {
    let rules = kind.rules();
    let mut anomalies: Vec<EntityAnomaly<K>> = score_entities(groups, kind.monitors_fraud_rate())
        .into_iter()
        .filter_map(|entity| {
            let anomaly_type = classify(&entity.scores, rules, z_threshold)?;
            Some(EntityAnomaly {
                entity,
                anomaly_type,
            })
        })
        .collect();

    anomalies.sort_by(|a, b| {
        let (sa, sb) = (&a.entity.scores, &b.entity.scores);
        let primary = match kind {
            EntityKind::Customer => sb.fraud_count.cmp(&sa.fraud_count),
            EntityKind::Merchant => cmp_desc(sa.fraud_rate_z, sb.fraud_rate_z),
        };
        primary
            .then_with(|| cmp_desc(sa.transaction_count_z, sb.transaction_count_z))
            .then_with(|| cmp_desc(sa.total_amount_z, sb.total_amount_z))
    });

    debug!("{} {:?} anomalies", anomalies.len(), kind);
    anomalies
}

pub fn detect_customer_anomalies(
    transactions: &[Transaction],
    z_threshold: f64,
) -> Vec<EntityAnomaly<Customer>> {
    detect_entity_anomalies(
        aggregate(transactions, Customer::of),
        EntityKind::Customer,
        z_threshold,
    )
}

pub fn detect_merchant_anomalies(
    transactions: &[Transaction],
    z_threshold: f64,
) -> Vec<EntityAnomaly<Merchant>> {
    detect_entity_anomalies(
        aggregate(transactions, Merchant::of),
        EntityKind::Merchant,
        z_threshold,
    )
}
