//! Descriptive statistics shared by the analyses.
//!
//! Standard deviations are sample deviations (divisor `n - 1`). Anything
//! that cannot be computed (too few values, zero spread) is `None`.

use std::cmp::Ordering;

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Sample standard deviation. Needs at least two values.
pub fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let ss: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    Some((ss / (values.len() - 1) as f64).sqrt())
}

/// Population standard deviation (divisor `n`).
pub fn population_std(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    let ss: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    Some((ss / values.len() as f64).sqrt())
}

pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Bias-corrected sample skewness (adjusted Fisher-Pearson).
pub fn skewness(values: &[f64]) -> Option<f64> {
    let n = values.len();
    if n < 3 {
        return None;
    }
    let m = mean(values)?;
    let nf = n as f64;
    let m2 = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / nf;
    let m3 = values.iter().map(|v| (v - m).powi(3)).sum::<f64>() / nf;
    if m2 == 0.0 {
        return Some(0.0);
    }
    let g1 = m3 / m2.powf(1.5);
    Some(g1 * (nf * (nf - 1.0)).sqrt() / (nf - 2.0))
}

/// Mean and spread of a population of metric values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Population {
    pub mean: Option<f64>,
    pub std: Option<f64>,
}

impl Population {
    pub fn of(values: &[f64]) -> Self {
        Self {
            mean: mean(values),
            std: sample_std(values),
        }
    }

    /// Standardized deviation of `value`; `None` on a degenerate population.
    pub fn z_score(&self, value: f64) -> Option<f64> {
        let mean = self.mean?;
        let std = self.std?;
        if std == 0.0 || !std.is_finite() {
            return None;
        }
        Some((value - mean) / std)
    }
}

/// Trailing moving average; the first `window - 1` entries are `None`.
pub fn moving_average(values: &[f64], window: usize) -> Vec<Option<f64>> {
    if window == 0 {
        return vec![None; values.len()];
    }
    (0..values.len())
        .map(|i| {
            if i + 1 < window {
                None
            } else {
                mean(&values[i + 1 - window..=i])
            }
        })
        .collect()
}

/// Pearson correlation coefficient.
pub fn pearson(xs: &[f64], ys: &[f64]) -> Option<f64> {
    if xs.len() != ys.len() || xs.len() < 2 {
        return None;
    }
    let mx = mean(xs)?;
    let my = mean(ys)?;
    let mut cov = 0.0;
    let mut vx = 0.0;
    let mut vy = 0.0;
    for (x, y) in xs.iter().zip(ys) {
        cov += (x - mx) * (y - my);
        vx += (x - mx).powi(2);
        vy += (y - my).powi(2);
    }
    if vx == 0.0 || vy == 0.0 {
        return None;
    }
    Some(cov / (vx.sqrt() * vy.sqrt()))
}

/// Spearman rank correlation, ties ranked by their average position.
pub fn spearman(xs: &[f64], ys: &[f64]) -> Option<f64> {
    if xs.len() != ys.len() {
        return None;
    }
    pearson(&average_ranks(xs), &average_ranks(ys))
}

fn average_ranks(values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].partial_cmp(&values[b]).unwrap_or(Ordering::Equal));

    let mut ranks = vec![0.0; values.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && values[order[j + 1]] == values[order[i]] {
            j += 1;
        }
        // Positions i..=j share the average 1-based rank.
        let rank = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            ranks[idx] = rank;
        }
        i = j + 1;
    }
    ranks
}

/// Descending order for optional scores, undefined values last.
pub fn cmp_desc(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => y.partial_cmp(&x).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64, eps: f64) -> bool {
        (a - b).abs() < eps
    }

    #[test]
    fn test_sample_std_and_z_score() {
        let values = [10.0, 10.0, 10.0, 10.0, 1000.0];
        let population = Population::of(&values);

        assert!(close(population.mean.unwrap(), 208.0, 1e-9));
        assert!(close(population.std.unwrap(), 442.74, 0.01));

        let z = population.z_score(1000.0).unwrap();
        assert!(close(z, 1.789, 0.001));
        assert!(z.abs() <= 3.0);
    }

    #[test]
    fn test_degenerate_population() {
        assert_eq!(Population::of(&[5.0, 5.0, 5.0]).z_score(5.0), None);
        assert_eq!(Population::of(&[5.0]).z_score(5.0), None);
        assert_eq!(Population::of(&[]).z_score(1.0), None);
    }

    #[test]
    fn test_median_and_population_std() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 2.0, 3.0]), Some(2.5));
        assert_eq!(population_std(&[2.0, 4.0]), Some(1.0));
    }

    #[test]
    fn test_skewness() {
        assert!(close(skewness(&[1.0, 2.0, 3.0]).unwrap(), 0.0, 1e-12));
        assert!(skewness(&[1.0, 1.0, 1.0, 10.0]).unwrap() > 1.0);
        assert_eq!(skewness(&[1.0, 2.0]), None);
    }

    #[test]
    fn test_moving_average() {
        let ma = moving_average(&[1.0, 2.0, 3.0, 4.0], 2);
        assert_eq!(ma, vec![None, Some(1.5), Some(2.5), Some(3.5)]);
        assert!(moving_average(&[1.0], 7)[0].is_none());
    }

    #[test]
    fn test_correlations() {
        let xs = [1.0, 2.0, 3.0, 4.0];
        let ys = [10.0, 20.0, 30.0, 1000.0];
        assert!(close(spearman(&xs, &ys).unwrap(), 1.0, 1e-12));
        assert!(pearson(&xs, &ys).unwrap() < 1.0);
        assert_eq!(pearson(&xs, &[1.0, 1.0, 1.0, 1.0]), None);
    }

    #[test]
    fn test_average_ranks_with_ties() {
        assert_eq!(average_ranks(&[5.0, 1.0, 5.0]), vec![2.5, 1.0, 2.5]);
    }

    #[test]
    fn test_cmp_desc_puts_undefined_last() {
        let mut scores = vec![None, Some(1.0), Some(3.0)];
        scores.sort_by(|a, b| cmp_desc(*a, *b));
        assert_eq!(scores, vec![Some(3.0), Some(1.0), None]);
    }
}
