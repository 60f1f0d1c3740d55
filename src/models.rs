//! Data models for the transaction analyses.
//!
//! This module contains the transaction record, the typed grouping keys
//! used by the aggregation engine, and the group aggregate itself.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Columns the `transactions` table must expose.
pub const EXPECTED_COLUMNS: [&str; 8] = [
    "step", "customer", "age", "gender", "merchant", "category", "amount", "fraud",
];

/// A single immutable transaction from the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Time index of the simulation (one step per day).
    pub step: i64,
    pub customer: String,
    /// Age bucket code.
    pub age: String,
    /// Gender code (F, M, E, U).
    pub gender: String,
    pub merchant: String,
    pub category: String,
    /// Non-negative transaction amount.
    pub amount: f64,
    /// Whether the transaction was labelled fraudulent.
    #[serde(deserialize_with = "deserialize_flag")]
    pub fraud: bool,
}

/// Accepts `0`/`1` as well as `true`/`false` for the fraud flag.
fn deserialize_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    match raw.trim() {
        "1" | "true" | "True" => Ok(true),
        "0" | "false" | "False" => Ok(false),
        other => Err(serde::de::Error::custom(format!(
            "invalid fraud flag: {}",
            other
        ))),
    }
}

/// A groupable column of the `transactions` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dimension {
    Step,
    Customer,
    Age,
    Gender,
    Merchant,
    Category,
}

impl Dimension {
    /// Column name in the `transactions` table.
    pub fn column(&self) -> &'static str {
        match self {
            Dimension::Step => "step",
            Dimension::Customer => "customer",
            Dimension::Age => "age",
            Dimension::Gender => "gender",
            Dimension::Merchant => "merchant",
            Dimension::Category => "category",
        }
    }

    /// Whether the column holds integers rather than text.
    pub fn is_integer(&self) -> bool {
        matches!(self, Dimension::Step)
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.column())
    }
}

/// A single grouping value returned by a `GROUP BY` query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DimensionValue {
    Text(String),
    Int(i64),
}

impl DimensionValue {
    fn text(&self) -> Option<String> {
        match self {
            DimensionValue::Text(s) => Some(s.clone()),
            DimensionValue::Int(_) => None,
        }
    }

    fn int(&self) -> Option<i64> {
        match self {
            DimensionValue::Int(v) => Some(*v),
            DimensionValue::Text(_) => None,
        }
    }
}

/// A typed key that can label report rows.
pub trait GroupKey: Ord + Clone {
    /// Column headers for the key part of a report row.
    fn headers() -> Vec<&'static str>;

    /// Key values in header order.
    fn columns(&self) -> Vec<String>;
}

/// A key that maps onto store dimensions, so the store can group for it.
pub trait FromDimensions: GroupKey + Sized {
    const DIMENSIONS: &'static [Dimension];

    /// Rebuild the key from values in `DIMENSIONS` order.
    fn from_values(values: &[DimensionValue]) -> Option<Self>;
}

macro_rules! text_key {
    ($name:ident, $dim:expr, $field:ident, $header:literal) => {
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub String);

        impl $name {
            pub fn of(tx: &Transaction) -> Self {
                Self(tx.$field.clone())
            }
        }

        impl GroupKey for $name {
            fn headers() -> Vec<&'static str> {
                vec![$header]
            }

            fn columns(&self) -> Vec<String> {
                vec![self.0.clone()]
            }
        }

        impl FromDimensions for $name {
            const DIMENSIONS: &'static [Dimension] = &[$dim];

            fn from_values(values: &[DimensionValue]) -> Option<Self> {
                values.first()?.text().map(Self)
            }
        }
    };
}

text_key!(Category, Dimension::Category, category, "category");
text_key!(Merchant, Dimension::Merchant, merchant, "merchant");
text_key!(Customer, Dimension::Customer, customer, "customer");
text_key!(Gender, Dimension::Gender, gender, "gender");

/// Age bucket crossed with gender.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Demographic {
    pub age: String,
    pub gender: String,
}

impl Demographic {
    pub fn of(tx: &Transaction) -> Self {
        Self {
            age: tx.age.clone(),
            gender: tx.gender.clone(),
        }
    }
}

impl GroupKey for Demographic {
    fn headers() -> Vec<&'static str> {
        vec!["age", "gender"]
    }

    fn columns(&self) -> Vec<String> {
        vec![self.age.clone(), self.gender.clone()]
    }
}

impl FromDimensions for Demographic {
    const DIMENSIONS: &'static [Dimension] = &[Dimension::Age, Dimension::Gender];

    fn from_values(values: &[DimensionValue]) -> Option<Self> {
        match values {
            [age, gender] => Some(Self {
                age: age.text()?,
                gender: gender.text()?,
            }),
            _ => None,
        }
    }
}

/// Simulation time step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Step(pub i64);

impl Step {
    pub fn of(tx: &Transaction) -> Self {
        Self(tx.step)
    }

    /// Weekday of the step, with step 0 falling on a Monday.
    pub fn weekday(&self) -> Weekday {
        Weekday::from_index(self.0.rem_euclid(7) as usize)
    }
}

impl GroupKey for Step {
    fn headers() -> Vec<&'static str> {
        vec!["step"]
    }

    fn columns(&self) -> Vec<String> {
        vec![self.0.to_string()]
    }
}

impl FromDimensions for Step {
    const DIMENSIONS: &'static [Dimension] = &[Dimension::Step];

    fn from_values(values: &[DimensionValue]) -> Option<Self> {
        values.first()?.int().map(Self)
    }
}

/// Amount range bucket. Ordered by band index, not by label.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AmountBand {
    pub index: usize,
    pub label: String,
}

impl GroupKey for AmountBand {
    fn headers() -> Vec<&'static str> {
        vec!["amount_category"]
    }

    fn columns(&self) -> Vec<String> {
        vec![self.label.clone()]
    }
}

/// Day of the week derived from a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Weekday {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl Weekday {
    pub const ALL: [Weekday; 7] = [
        Weekday::Monday,
        Weekday::Tuesday,
        Weekday::Wednesday,
        Weekday::Thursday,
        Weekday::Friday,
        Weekday::Saturday,
        Weekday::Sunday,
    ];

    pub fn from_index(index: usize) -> Self {
        Self::ALL[index % 7]
    }
}

impl fmt::Display for Weekday {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Weekday::Monday => "Monday",
            Weekday::Tuesday => "Tuesday",
            Weekday::Wednesday => "Wednesday",
            Weekday::Thursday => "Thursday",
            Weekday::Friday => "Friday",
            Weekday::Saturday => "Saturday",
            Weekday::Sunday => "Sunday",
        };
        write!(f, "{}", name)
    }
}

/// Human-readable label for a gender code.
pub fn gender_label(code: &str) -> &str {
    match code {
        "F" => "Female",
        "M" => "Male",
        "E" => "Enterprise",
        "U" => "Unknown",
        other => other,
    }
}

/// Summary row for one group of transactions.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupAggregate<K> {
    pub key: K,
    pub transaction_count: u64,
    pub total_amount: f64,
    pub fraud_count: u64,
}

impl<K> GroupAggregate<K> {
    pub fn avg_amount(&self) -> f64 {
        if self.transaction_count == 0 {
            0.0
        } else {
            self.total_amount / self.transaction_count as f64
        }
    }

    /// Percentage of fraudulent transactions, unrounded.
    pub fn fraud_rate(&self) -> f64 {
        if self.transaction_count == 0 {
            0.0
        } else {
            self.fraud_count as f64 / self.transaction_count as f64 * 100.0
        }
    }

    pub fn normal_count(&self) -> u64 {
        self.transaction_count - self.fraud_count
    }
}

/// Whole-table statistics computed by the store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub total_transactions: u64,
    pub unique_customers: u64,
    pub unique_merchants: u64,
    pub total_amount: f64,
    pub fraud_count: u64,
}

impl DatasetSummary {
    pub fn avg_amount(&self) -> Option<f64> {
        (self.total_transactions > 0).then(|| self.total_amount / self.total_transactions as f64)
    }

    pub fn fraud_rate(&self) -> Option<f64> {
        (self.total_transactions > 0)
            .then(|| self.fraud_count as f64 / self.total_transactions as f64 * 100.0)
    }
}
