//! Time-based analyses over per-step aggregates.
//!
//! Every function here takes the daily aggregates (one per observed step,
//! ascending) and derives trends, fraud splits, risk periods and weekly
//! cycle statistics.

use crate::analysis::risk::{classify_risk, RiskClassified};
use crate::analysis::stats::{mean, moving_average, pearson, population_std, sample_std};
use crate::models::{GroupAggregate, Step, Weekday};
use tracing::debug;

/// One day with trailing moving averages of activity and fraud rate.
#[derive(Debug, Clone, PartialEq)]
pub struct DailyPattern {
    pub aggregate: GroupAggregate<Step>,
    pub moving_avg_transactions: Option<f64>,
    pub moving_avg_fraud_rate: Option<f64>,
}

pub fn daily_patterns(daily: &[GroupAggregate<Step>], window: usize) -> Vec<DailyPattern> {
    let counts: Vec<f64> = daily.iter().map(|d| d.transaction_count as f64).collect();
    let rates: Vec<f64> = daily.iter().map(|d| d.fraud_rate()).collect();
    let ma_counts = moving_average(&counts, window);
    let ma_rates = moving_average(&rates, window);

    daily
        .iter()
        .zip(ma_counts.into_iter().zip(ma_rates))
        .map(|(aggregate, (ma_count, ma_rate))| DailyPattern {
            aggregate: aggregate.clone(),
            moving_avg_transactions: ma_count,
            moving_avg_fraud_rate: ma_rate,
        })
        .collect()
}

/// Fraud/normal split of one day, flagged when its fraud rate beats the
/// mean daily rate.
#[derive(Debug, Clone, PartialEq)]
pub struct FraudShare {
    pub aggregate: GroupAggregate<Step>,
    pub above_average: bool,
}

pub fn fraud_split(daily: &[GroupAggregate<Step>]) -> Vec<FraudShare> {
    let rates: Vec<f64> = daily.iter().map(|d| d.fraud_rate()).collect();
    let mean_rate = mean(&rates);

    daily
        .iter()
        .map(|aggregate| FraudShare {
            above_average: mean_rate.is_some_and(|m| aggregate.fraud_rate() > m),
            aggregate: aggregate.clone(),
        })
        .collect()
}

/// A day classified against the `mean + k * std` fraud-rate threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct RiskPeriod {
    pub risk: RiskClassified<Step>,
    pub moving_avg_fraud_rate: Option<f64>,
}

pub fn risk_periods(daily: &[GroupAggregate<Step>], multiplier: f64, window: usize) -> Vec<RiskPeriod> {
    let rates: Vec<f64> = daily.iter().map(|d| d.fraud_rate()).collect();
    let moving = moving_average(&rates, window);

    // Daily totals add up to the raw rows, so this is the population rate.
    let total: u64 = daily.iter().map(|d| d.transaction_count).sum();
    let frauds: u64 = daily.iter().map(|d| d.fraud_count).sum();
    let population_rate = (total > 0).then(|| frauds as f64 / total as f64 * 100.0);

    classify_risk(daily.to_vec(), population_rate, multiplier)
        .into_iter()
        .zip(moving)
        .map(|(risk, moving_avg_fraud_rate)| RiskPeriod {
            risk,
            moving_avg_fraud_rate,
        })
        .collect()
}

/// Daily activity statistics for one weekday.
#[derive(Debug, Clone, PartialEq)]
pub struct WeekdayActivity {
    pub weekday: Weekday,
    pub days: usize,
    pub mean_transactions: f64,
    pub std_transactions: Option<f64>,
}

/// Weekday activity, most active weekday first. Only observed weekdays appear.
pub fn weekday_cycle(daily: &[GroupAggregate<Step>]) -> Vec<WeekdayActivity> {
    let mut activity: Vec<WeekdayActivity> = Weekday::ALL
        .iter()
        .filter_map(|&weekday| {
            let counts: Vec<f64> = daily
                .iter()
                .filter(|d| d.key.weekday() == weekday)
                .map(|d| d.transaction_count as f64)
                .collect();
            Some(WeekdayActivity {
                weekday,
                days: counts.len(),
                mean_transactions: mean(&counts)?,
                std_transactions: sample_std(&counts),
            })
        })
        .collect();

    activity.sort_by(|a, b| b.mean_transactions.total_cmp(&a.mean_transactions));
    activity
}

/// Indices of the peaks of `values`.
///
/// A peak is a strict local maximum (plateaus resolve to their midpoint).
/// Peaks closer than `distance` samples to a higher peak are dropped, then
/// peaks whose prominence is below `prominence` are dropped.
pub fn find_peaks(values: &[f64], distance: usize, prominence: f64) -> Vec<usize> {
    let candidates = local_maxima(values);
    let spaced = select_by_distance(values, &candidates, distance.max(1));
    spaced
        .into_iter()
        .filter(|&peak| peak_prominence(values, peak) >= prominence)
        .collect()
}

fn local_maxima(values: &[f64]) -> Vec<usize> {
    let mut peaks = Vec::new();
    if values.len() < 3 {
        return peaks;
    }
    let last = values.len() - 1;
    let mut i = 1;
    while i < last {
        if values[i - 1] < values[i] {
            let mut ahead = i + 1;
            while ahead < last && values[ahead] == values[i] {
                ahead += 1;
            }
            if values[ahead] < values[i] {
                peaks.push((i + ahead - 1) / 2);
                i = ahead;
                continue;
            }
        }
        i += 1;
    }
    peaks
}

fn select_by_distance(values: &[f64], peaks: &[usize], distance: usize) -> Vec<usize> {
    let mut keep = vec![true; peaks.len()];
    let mut order: Vec<usize> = (0..peaks.len()).collect();
    order.sort_by(|&a, &b| values[peaks[a]].total_cmp(&values[peaks[b]]));

    // Highest peaks claim their neighbourhood first.
    for &j in order.iter().rev() {
        if !keep[j] {
            continue;
        }
        for k in (0..j).rev() {
            if peaks[j] - peaks[k] >= distance {
                break;
            }
            keep[k] = false;
        }
        for k in j + 1..peaks.len() {
            if peaks[k] - peaks[j] >= distance {
                break;
            }
            keep[k] = false;
        }
    }

    peaks
        .iter()
        .zip(keep)
        .filter_map(|(&peak, kept)| kept.then_some(peak))
        .collect()
}

fn peak_prominence(values: &[f64], peak: usize) -> f64 {
    let height = values[peak];

    let mut left_min = height;
    for &v in values[..=peak].iter().rev() {
        if v > height {
            break;
        }
        left_min = left_min.min(v);
    }

    let mut right_min = height;
    for &v in &values[peak..] {
        if v > height {
            break;
        }
        right_min = right_min.min(v);
    }

    height - left_min.max(right_min)
}

/// Weekly cycle summary.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleStats {
    pub mean_peak_distance: Option<f64>,
    pub std_peak_distance: Option<f64>,
    pub most_active_weekday: Option<Weekday>,
    pub least_active_weekday: Option<Weekday>,
    /// Spread between the busiest and quietest weekday, in percent of the quietest.
    pub weekly_variation: Option<f64>,
}

pub fn cycle_stats(daily: &[GroupAggregate<Step>], distance: usize, prominence: f64) -> CycleStats {
    let counts: Vec<f64> = daily.iter().map(|d| d.transaction_count as f64).collect();
    let peaks = find_peaks(&counts, distance, prominence);
    debug!("Detected {} activity peaks", peaks.len());

    let gaps: Vec<f64> = peaks.windows(2).map(|w| (w[1] - w[0]) as f64).collect();
    let weekdays = weekday_cycle(daily);

    let weekly_variation = match (weekdays.first(), weekdays.last()) {
        (Some(most), Some(least)) if least.mean_transactions > 0.0 => Some(
            (most.mean_transactions - least.mean_transactions) / least.mean_transactions * 100.0,
        ),
        _ => None,
    };

    CycleStats {
        mean_peak_distance: mean(&gaps),
        std_peak_distance: population_std(&gaps),
        most_active_weekday: weekdays.first().map(|w| w.weekday),
        least_active_weekday: weekdays.last().map(|w| w.weekday),
        weekly_variation,
    }
}

/// Headline figures of the daily series.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TemporalStats {
    pub busiest_step: Option<Step>,
    pub max_transactions: Option<u64>,
    pub riskiest_step: Option<Step>,
    pub max_fraud_rate: Option<f64>,
    pub mean_daily_avg_amount: Option<f64>,
    /// Pearson correlation of daily transaction count vs daily fraud count.
    pub count_fraud_correlation: Option<f64>,
}

pub fn temporal_stats(daily: &[GroupAggregate<Step>]) -> TemporalStats {
    // First occurrence wins on ties.
    let busiest = daily.iter().fold(None::<&GroupAggregate<Step>>, |best, d| match best {
        Some(b) if b.transaction_count >= d.transaction_count => Some(b),
        _ => Some(d),
    });
    let riskiest = daily.iter().fold(None::<&GroupAggregate<Step>>, |best, d| match best {
        Some(b) if b.fraud_rate() >= d.fraud_rate() => Some(b),
        _ => Some(d),
    });

    let avg_amounts: Vec<f64> = daily.iter().map(|d| d.avg_amount()).collect();
    let counts: Vec<f64> = daily.iter().map(|d| d.transaction_count as f64).collect();
    let frauds: Vec<f64> = daily.iter().map(|d| d.fraud_count as f64).collect();

    TemporalStats {
        busiest_step: busiest.map(|d| d.key),
        max_transactions: busiest.map(|d| d.transaction_count),
        riskiest_step: riskiest.map(|d| d.key),
        max_fraud_rate: riskiest.map(|d| d.fraud_rate()),
        mean_daily_avg_amount: mean(&avg_amounts),
        count_fraud_correlation: pearson(&counts, &frauds),
    }
}
