//! Inferential add-ons over the precision subset (§1B, §4.5): one-way
//! ANOVA across keys, Tukey HSD post-hoc, linear/quadratic regression of
//! delay on first-hammer velocity, Pearson/Spearman correlation,
//! anomaly-key detection, and a velocity-bucketed breakdown.
//!
//! These are pure functions computed on demand — nothing in the hot
//! matching path calls into this module.

use std::collections::BTreeMap;

use serde::Serialize;
use spmid_match::{MatchedPair, OffsetAlignmentRecord};
use statrs::distribution::{ContinuousCDF, FisherSnedecor};

use crate::descriptive::{descriptive_stats, per_key_stats, DelayMetrics, DescriptiveStats};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AnovaResult {
    pub f_statistic: f64,
    pub p_value: f64,
    pub df_between: usize,
    pub df_within: usize,
}

/// Fixed studentized-range critical value used as the significance
/// threshold for Tukey HSD pairwise comparisons. An exact studentized
/// range distribution isn't available in `statrs`; this conventional
/// alpha=0.05 approximation (valid for moderate k and df) is used
/// instead of vendoring one, per DESIGN.md.
const TUKEY_Q_CRITICAL_APPROX: f64 = 3.5;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TukeyHsdPair {
    pub key_a: u8,
    pub key_b: u8,
    pub mean_diff: f64,
    pub standard_error: f64,
    pub q_statistic: f64,
    pub significant: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct LinearRegression {
    pub intercept: f64,
    pub slope: f64,
    pub r_squared: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct QuadraticRegression {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub r_squared: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrelationStrength {
    Negligible,
    Weak,
    Moderate,
    Strong,
}

fn interpret_strength(r: f64) -> CorrelationStrength {
    let abs_r = r.abs();
    if abs_r < 0.1 {
        CorrelationStrength::Negligible
    } else if abs_r < 0.4 {
        CorrelationStrength::Weak
    } else if abs_r < 0.7 {
        CorrelationStrength::Moderate
    } else {
        CorrelationStrength::Strong
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CorrelationResult {
    pub coefficient: f64,
    pub strength: CorrelationStrength,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AnomalySign {
    Above,
    Below,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AnomalyKey {
    pub key_id: u8,
    pub mean_offset_ms: f64,
    pub sign: AnomalySign,
    pub z_deviation: f64,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InferentialReport {
    pub per_key_stats: BTreeMap<u8, DescriptiveStats>,
    pub anova: Option<AnovaResult>,
    pub tukey_hsd: Vec<TukeyHsdPair>,
    pub linear_regression: Option<LinearRegression>,
    pub quadratic_regression: Option<QuadraticRegression>,
    pub pearson: Option<CorrelationResult>,
    pub spearman: Option<CorrelationResult>,
    pub anomaly_keys: Vec<AnomalyKey>,
    pub velocity_groups: BTreeMap<&'static str, DescriptiveStats>,
}

/// `z_deviation` threshold multiplier for anomaly-key flagging (§4.5).
const ANOMALY_Z_THRESHOLD: f64 = 2.0;

fn one_way_anova(groups: &BTreeMap<u8, Vec<f64>>) -> Option<AnovaResult> {
    let eligible: Vec<&Vec<f64>> = groups.values().filter(|g| !g.is_empty()).collect();
    let k = eligible.len();
    let n: usize = eligible.iter().map(|g| g.len()).sum();
    if k < 2 || n <= k {
        return None;
    }

    let all_values: Vec<f64> = eligible.iter().flat_map(|g| g.iter().cloned()).collect();
    let grand_mean = all_values.iter().sum::<f64>() / all_values.len() as f64;

    let mut ss_between = 0.0;
    let mut ss_within = 0.0;
    for group in &eligible {
        let group_mean = group.iter().sum::<f64>() / group.len() as f64;
        ss_between += group.len() as f64 * (group_mean - grand_mean).powi(2);
        ss_within += group.iter().map(|&x| (x - group_mean).powi(2)).sum::<f64>();
    }

    let df_between = k - 1;
    let df_within = n - k;
    let ms_between = ss_between / df_between as f64;
    let ms_within = ss_within / df_within as f64;

    if ms_within.abs() < f64::EPSILON {
        return Some(AnovaResult { f_statistic: f64::INFINITY, p_value: 0.0, df_between, df_within });
    }

    let f_statistic = ms_between / ms_within;
    let p_value = match FisherSnedecor::new(df_between as f64, df_within as f64) {
        Ok(dist) => 1.0 - dist.cdf(f_statistic),
        Err(_) => 1.0,
    };

    Some(AnovaResult { f_statistic, p_value, df_between, df_within })
}

fn tukey_hsd(groups: &BTreeMap<u8, Vec<f64>>, ms_within: f64, df_within: usize) -> Vec<TukeyHsdPair> {
    if df_within == 0 {
        return Vec::new();
    }
    let keys: Vec<u8> = groups.keys().cloned().filter(|k| !groups[k].is_empty()).collect();
    let mut pairs = Vec::new();

    for i in 0..keys.len() {
        for j in (i + 1)..keys.len() {
            let (key_a, key_b) = (keys[i], keys[j]);
            let group_a = &groups[&key_a];
            let group_b = &groups[&key_b];
            let mean_a = group_a.iter().sum::<f64>() / group_a.len() as f64;
            let mean_b = group_b.iter().sum::<f64>() / group_b.len() as f64;
            let mean_diff = mean_a - mean_b;

            let harmonic_n = 2.0 / (1.0 / group_a.len() as f64 + 1.0 / group_b.len() as f64);
            let standard_error = (ms_within / harmonic_n).sqrt();
            let q_statistic = if standard_error > f64::EPSILON {
                mean_diff.abs() / standard_error * std::f64::consts::SQRT_2
            } else {
                0.0
            };

            pairs.push(TukeyHsdPair {
                key_a,
                key_b,
                mean_diff,
                standard_error,
                q_statistic,
                significant: q_statistic > TUKEY_Q_CRITICAL_APPROX,
            });
        }
    }
    pairs
}

fn linear_regression(xs: &[f64], ys: &[f64]) -> Option<LinearRegression> {
    if xs.len() < 2 {
        return None;
    }
    let n = xs.len() as f64;
    let mean_x = xs.iter().sum::<f64>() / n;
    let mean_y = ys.iter().sum::<f64>() / n;

    let mut sxx = 0.0;
    let mut sxy = 0.0;
    for (&x, &y) in xs.iter().zip(ys) {
        sxx += (x - mean_x).powi(2);
        sxy += (x - mean_x) * (y - mean_y);
    }
    if sxx.abs() < f64::EPSILON {
        return None;
    }

    let slope = sxy / sxx;
    let intercept = mean_y - slope * mean_x;

    let predicted: Vec<f64> = xs.iter().map(|&x| intercept + slope * x).collect();
    let r_squared = r_squared_of(ys, &predicted, mean_y);

    Some(LinearRegression { intercept, slope, r_squared })
}

fn r_squared_of(actual: &[f64], predicted: &[f64], mean_actual: f64) -> f64 {
    let ss_res: f64 = actual.iter().zip(predicted).map(|(&y, &p)| (y - p).powi(2)).sum();
    let ss_tot: f64 = actual.iter().map(|&y| (y - mean_actual).powi(2)).sum();
    if ss_tot.abs() < f64::EPSILON {
        0.0
    } else {
        1.0 - ss_res / ss_tot
    }
}

/// Least-squares fit of `y = a*x^2 + b*x + c` via the normal equations.
fn quadratic_regression(xs: &[f64], ys: &[f64]) -> Option<QuadraticRegression> {
    let n = xs.len();
    if n < 3 {
        return None;
    }

    let (mut s0, mut s1, mut s2, mut s3, mut s4) = (n as f64, 0.0, 0.0, 0.0, 0.0);
    let (mut t0, mut t1, mut t2) = (0.0, 0.0, 0.0);
    for (&x, &y) in xs.iter().zip(ys) {
        let x2 = x * x;
        s1 += x;
        s2 += x2;
        s3 += x2 * x;
        s4 += x2 * x2;
        t0 += y;
        t1 += x * y;
        t2 += x2 * y;
    }

    // Solve the 3x3 normal-equations system [s4 s3 s2; s3 s2 s1; s2 s1 s0] * [a b c]^T = [t2 t1 t0]^T
    // via Cramer's rule.
    let det = determinant3([[s4, s3, s2], [s3, s2, s1], [s2, s1, s0]]);
    if det.abs() < 1e-12 {
        return None;
    }

    let det_a = determinant3([[t2, s3, s2], [t1, s2, s1], [t0, s1, s0]]);
    let det_b = determinant3([[s4, t2, s2], [s3, t1, s1], [s2, t0, s0]]);
    let det_c = determinant3([[s4, s3, t2], [s3, s2, t1], [s2, s1, t0]]);

    let a = det_a / det;
    let b = det_b / det;
    let c = det_c / det;

    let mean_y = t0 / n as f64;
    let predicted: Vec<f64> = xs.iter().map(|&x| a * x * x + b * x + c).collect();
    let r_squared = r_squared_of(ys, &predicted, mean_y);

    Some(QuadraticRegression { a, b, c, r_squared })
}

fn determinant3(m: [[f64; 3]; 3]) -> f64 {
    m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
        - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
        + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
}

fn pearson_correlation(xs: &[f64], ys: &[f64]) -> Option<CorrelationResult> {
    if xs.len() < 2 {
        return None;
    }
    let n = xs.len() as f64;
    let mean_x = xs.iter().sum::<f64>() / n;
    let mean_y = ys.iter().sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (&x, &y) in xs.iter().zip(ys) {
        cov += (x - mean_x) * (y - mean_y);
        var_x += (x - mean_x).powi(2);
        var_y += (y - mean_y).powi(2);
    }

    if var_x.abs() < f64::EPSILON || var_y.abs() < f64::EPSILON {
        return None;
    }

    let coefficient = cov / (var_x.sqrt() * var_y.sqrt());
    Some(CorrelationResult { coefficient, strength: interpret_strength(coefficient) })
}

/// Ranks, averaging ties (standard Spearman tie-handling).
fn rank(values: &[f64]) -> Vec<f64> {
    let mut indexed: Vec<(usize, f64)> = values.iter().cloned().enumerate().collect();
    indexed.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap());

    let mut ranks = vec![0.0; values.len()];
    let mut i = 0;
    while i < indexed.len() {
        let mut j = i;
        while j + 1 < indexed.len() && (indexed[j + 1].1 - indexed[i].1).abs() < f64::EPSILON {
            j += 1;
        }
        let avg_rank = (i + j) as f64 / 2.0 + 1.0;
        for item in indexed.iter().take(j + 1).skip(i) {
            ranks[item.0] = avg_rank;
        }
        i = j + 1;
    }
    ranks
}

fn spearman_correlation(xs: &[f64], ys: &[f64]) -> Option<CorrelationResult> {
    if xs.len() < 2 {
        return None;
    }
    let rank_x = rank(xs);
    let rank_y = rank(ys);
    pearson_correlation(&rank_x, &rank_y)
}

fn velocity_tertile_groups(pairs: &[&MatchedPair]) -> BTreeMap<&'static str, DescriptiveStats> {
    let mut sorted: Vec<&&MatchedPair> = pairs.iter().collect();
    sorted.sort_by_key(|p| p.record.first_hammer_velocity);

    let n = sorted.len();
    let mut groups: BTreeMap<&'static str, DescriptiveStats> = BTreeMap::new();
    if n == 0 {
        groups.insert("low", DescriptiveStats::default());
        groups.insert("mid", DescriptiveStats::default());
        groups.insert("high", DescriptiveStats::default());
        return groups;
    }

    let low_end = n / 3;
    let high_start = n - n / 3;
    let low = &sorted[..low_end];
    let mid = &sorted[low_end..high_start];
    let high = &sorted[high_start..];

    let offsets = |slice: &[&&MatchedPair]| -> Vec<f64> { slice.iter().map(|p| p.keyon_error_ms).collect() };

    groups.insert("low", descriptive_stats(&offsets(low)));
    groups.insert("mid", descriptive_stats(&offsets(mid)));
    groups.insert("high", descriptive_stats(&offsets(high)));
    groups
}

fn anomaly_keys(per_key: &BTreeMap<u8, DescriptiveStats>, overall: &DelayMetrics) -> Vec<AnomalyKey> {
    per_key
        .iter()
        .filter_map(|(&key_id, stats)| {
            if stats.count == 0 {
                return None;
            }
            let deviation = stats.mean - overall.mean_error;
            let z_deviation = if overall.std.abs() > f64::EPSILON { deviation / overall.std } else { 0.0 };
            if deviation.abs() > ANOMALY_Z_THRESHOLD * overall.std {
                Some(AnomalyKey {
                    key_id,
                    mean_offset_ms: stats.mean,
                    sign: if deviation > 0.0 { AnomalySign::Above } else { AnomalySign::Below },
                    z_deviation,
                    count: stats.count,
                })
            } else {
                None
            }
        })
        .collect()
}

/// Compute the full inferential report over a set of matched pairs
/// (normally the precision subset). Never mutates its input.
pub fn compute_inferential_report(pairs: &[&MatchedPair], offset_records: &[&OffsetAlignmentRecord]) -> InferentialReport {
    let per_key = per_key_stats(offset_records);

    let mut groups: BTreeMap<u8, Vec<f64>> = BTreeMap::new();
    for pair in pairs {
        groups.entry(pair.record.id).or_default().push(pair.keyon_error_ms);
    }

    let anova = one_way_anova(&groups);
    let tukey_hsd = match anova {
        Some(result) => {
            let ss_within_ms = groups
                .values()
                .filter(|g| !g.is_empty())
                .map(|g| {
                    let mean = g.iter().sum::<f64>() / g.len() as f64;
                    g.iter().map(|&x| (x - mean).powi(2)).sum::<f64>()
                })
                .sum::<f64>();
            let ms_within = if result.df_within > 0 { ss_within_ms / result.df_within as f64 } else { 0.0 };
            tukey_hsd(&groups, ms_within, result.df_within)
        }
        None => Vec::new(),
    };

    let velocities: Vec<f64> = pairs.iter().map(|p| p.record.first_hammer_velocity as f64).collect();
    let offsets: Vec<f64> = pairs.iter().map(|p| p.keyon_error_ms).collect();

    let overall = DelayMetrics::from_offsets(&offsets);
    let anomaly = anomaly_keys(&per_key, &overall);
    let velocity_groups = velocity_tertile_groups(pairs);

    InferentialReport {
        per_key_stats: per_key,
        anova,
        tukey_hsd,
        linear_regression: linear_regression(&velocities, &offsets),
        quadratic_regression: quadratic_regression(&velocities, &offsets),
        pearson: pearson_correlation(&velocities, &offsets),
        spearman: spearman_correlation(&velocities, &offsets),
        anomaly_keys: anomaly,
        velocity_groups,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rank_handles_ties_by_averaging() {
        let ranks = rank(&[10.0, 20.0, 20.0, 30.0]);
        assert_eq!(ranks, vec![1.0, 2.5, 2.5, 4.0]);
    }

    #[test]
    fn perfect_linear_relationship_has_r_squared_one() {
        let xs = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let ys = vec![2.0, 4.0, 6.0, 8.0, 10.0];
        let fit = linear_regression(&xs, &ys).unwrap();
        assert!((fit.slope - 2.0).abs() < 1e-9);
        assert!((fit.intercept - 0.0).abs() < 1e-9);
        assert!((fit.r_squared - 1.0).abs() < 1e-9);
    }

    #[test]
    fn perfect_positive_correlation_is_strong() {
        let xs = vec![1.0, 2.0, 3.0, 4.0];
        let ys = vec![10.0, 20.0, 30.0, 40.0];
        let result = pearson_correlation(&xs, &ys).unwrap();
        assert!((result.coefficient - 1.0).abs() < 1e-9);
        assert_eq!(result.strength, CorrelationStrength::Strong);
    }

    #[test]
    fn constant_x_has_no_defined_regression_or_correlation() {
        let xs = vec![5.0, 5.0, 5.0];
        let ys = vec![1.0, 2.0, 3.0];
        assert!(linear_regression(&xs, &ys).is_none());
        assert!(pearson_correlation(&xs, &ys).is_none());
    }

    #[test]
    fn anova_needs_at_least_two_nonempty_groups() {
        let mut groups = BTreeMap::new();
        groups.insert(60u8, vec![1.0, 2.0, 3.0]);
        assert!(one_way_anova(&groups).is_none());
    }

    #[test]
    fn anova_detects_group_difference() {
        let mut groups = BTreeMap::new();
        groups.insert(60u8, vec![0.0, 1.0, -1.0, 0.5, -0.5]);
        groups.insert(61u8, vec![100.0, 101.0, 99.0, 100.5, 99.5]);
        let result = one_way_anova(&groups).unwrap();
        assert!(result.f_statistic > 100.0);
        assert!(result.p_value < 0.01);
    }

    #[test]
    fn quadratic_regression_recovers_exact_coefficients() {
        // y = 2x^2 - 3x + 1, sampled exactly (no noise)
        let xs = vec![0.0, 1.0, 2.0, 3.0, 4.0];
        let ys: Vec<f64> = xs.iter().map(|&x| 2.0 * x * x - 3.0 * x + 1.0).collect();
        let fit = quadratic_regression(&xs, &ys).unwrap();
        assert!((fit.a - 2.0).abs() < 1e-6);
        assert!((fit.b - (-3.0)).abs() < 1e-6);
        assert!((fit.c - 1.0).abs() < 1e-6);
        assert!((fit.r_squared - 1.0).abs() < 1e-6);
    }
}
