//! Aggregate and per-key descriptive statistics over the precision subset
//! (§4.5). All degenerate (empty) cases return zeroed structures rather
//! than erroring — see §7 point 7.

use std::collections::BTreeMap;

use serde::Serialize;
use spmid_match::OffsetAlignmentRecord;

/// Generic five-number-plus summary, reused for both the aggregate
/// `DelayMetrics` and the per-key breakdown.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Default)]
pub struct DescriptiveStats {
    pub count: usize,
    pub mean: f64,
    pub median: f64,
    pub std: f64,
    pub variance: f64,
    pub q25: f64,
    pub q75: f64,
    pub min: f64,
    pub max: f64,
}

/// Population standard deviation: divides by `n`, not `n - 1`.
fn population_std(values: &[f64], mean: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let variance = values.iter().map(|&x| (x - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Linear-interpolation quantile, matching the common default used by
/// most statistics packages.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    if sorted.len() == 1 {
        return sorted[0];
    }
    let pos = q * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    if lower == upper {
        return sorted[lower];
    }
    let frac = pos - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * frac
}

pub fn descriptive_stats(values: &[f64]) -> DescriptiveStats {
    if values.is_empty() {
        return DescriptiveStats::default();
    }

    let count = values.len();
    let mean = values.iter().sum::<f64>() / count as f64;
    let std = population_std(values, mean);

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());

    DescriptiveStats {
        count,
        mean,
        median: quantile(&sorted, 0.5),
        std,
        variance: std * std,
        q25: quantile(&sorted, 0.25),
        q75: quantile(&sorted, 0.75),
        min: sorted[0],
        max: sorted[count - 1],
    }
}

/// Aggregate delay metrics over the precision subset (§3.1, §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Default)]
pub struct DelayMetrics {
    pub mean_error: f64,
    pub mae: f64,
    pub std: f64,
    pub variance: f64,
    pub rmse: f64,
    pub cv: f64,
    pub max: f64,
    pub min: f64,
    pub sample_count: usize,
}

/// Minimum `|mean|` below which coefficient of variation is reported as
/// zero rather than dividing by a near-zero number (§4.5).
const CV_MEAN_EPSILON: f64 = 1e-6;

impl DelayMetrics {
    pub fn from_offsets(offsets_ms: &[f64]) -> Self {
        if offsets_ms.is_empty() {
            return Self::default();
        }

        let sample_count = offsets_ms.len();
        let mean_error = offsets_ms.iter().sum::<f64>() / sample_count as f64;
        let mae = offsets_ms.iter().map(|x| x.abs()).sum::<f64>() / sample_count as f64;
        let std = population_std(offsets_ms, mean_error);
        let variance = std * std;
        let rmse = (offsets_ms.iter().map(|x| x * x).sum::<f64>() / sample_count as f64).sqrt();
        let cv = if mean_error.abs() >= CV_MEAN_EPSILON {
            std / mean_error.abs() * 100.0
        } else {
            0.0
        };
        let max = offsets_ms.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let min = offsets_ms.iter().cloned().fold(f64::INFINITY, f64::min);

        Self {
            mean_error,
            mae,
            std,
            variance,
            rmse,
            cv,
            max,
            min,
            sample_count,
        }
    }
}

/// Per-key descriptive stats of `keyon_offset_ms`, grouped by `key_id`.
pub fn per_key_stats(records: &[&OffsetAlignmentRecord]) -> BTreeMap<u8, DescriptiveStats> {
    let mut grouped: BTreeMap<u8, Vec<f64>> = BTreeMap::new();
    for record in records {
        grouped.entry(record.key_id).or_default().push(record.keyon_offset_ms);
    }
    grouped.into_iter().map(|(key, values)| (key, descriptive_stats(&values))).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_offsets_yield_zeroed_metrics() {
        let metrics = DelayMetrics::from_offsets(&[]);
        assert_eq!(metrics, DelayMetrics::default());
    }

    #[test]
    fn perfect_replay_yields_zero_everything() {
        let metrics = DelayMetrics::from_offsets(&[0.0, 0.0, 0.0]);
        assert_eq!(metrics.mean_error, 0.0);
        assert_eq!(metrics.mae, 0.0);
        assert_eq!(metrics.std, 0.0);
        assert_eq!(metrics.cv, 0.0);
        assert_eq!(metrics.sample_count, 3);
    }

    #[test]
    fn mean_near_zero_forces_cv_to_zero() {
        let metrics = DelayMetrics::from_offsets(&[1e-8, -1e-8]);
        assert_eq!(metrics.cv, 0.0);
    }

    #[test]
    fn known_sample_matches_hand_computed_stats() {
        let metrics = DelayMetrics::from_offsets(&[25.0, 40.0, 105.0]);
        assert!((metrics.mean_error - 56.666666666666664).abs() < 1e-9);
        assert!((metrics.mae - 56.666666666666664).abs() < 1e-9);
        assert_eq!(metrics.max, 105.0);
        assert_eq!(metrics.min, 25.0);
        assert_eq!(metrics.sample_count, 3);
    }

    #[test]
    fn quantiles_of_four_value_sample() {
        let stats = descriptive_stats(&[10.0, 20.0, 30.0, 40.0]);
        assert_eq!(stats.median, 25.0);
        assert_eq!(stats.min, 10.0);
        assert_eq!(stats.max, 40.0);
        assert!((stats.q25 - 17.5).abs() < 1e-9);
        assert!((stats.q75 - 32.5).abs() < 1e-9);
    }

    #[test]
    fn single_value_quantiles_all_equal_the_value() {
        let stats = descriptive_stats(&[42.0]);
        assert_eq!(stats.median, 42.0);
        assert_eq!(stats.q25, 42.0);
        assert_eq!(stats.q75, 42.0);
        assert_eq!(stats.std, 0.0);
    }
}
