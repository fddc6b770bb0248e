//! After-touch curve alignment (§4.6): DTW-align two matched notes'
//! key-depth envelopes and resample them onto a common uniform time grid.

use crate::dtw::{dtw, dtw_banded, DistanceMetric, DtwResult};
use spmid_format::Note;

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CurveAlignerConfig {
    pub sampling_rate_ms: f64,
    pub time_range_threshold_ms: f64,
    pub window_size_ratio: f64,
    pub distance_metric: DistanceMetric,
    pub smooth_sigma: f64,
}

impl Default for CurveAlignerConfig {
    fn default() -> Self {
        Self {
            sampling_rate_ms: 1.0,
            time_range_threshold_ms: 1000.0,
            window_size_ratio: 0.5,
            distance_metric: DistanceMetric::Manhattan,
            smooth_sigma: 1.0,
        }
    }
}

const SAKOE_CHIBA_CEILING_MS: f64 = 500.0;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum CurveAlignError {
    #[error("after-touch envelope has fewer than 2 samples on one or both sides")]
    InsufficientSamples,
    #[error("note durations differ by more than the configured threshold")]
    DurationMismatch,
    #[error("non-finite value in after-touch envelope")]
    NonFiniteInput,
    #[error("DTW failed under both unconstrained and banded configurations")]
    DtwLibraryFailure,
}

#[derive(Debug, Clone)]
pub struct CurveAlignmentResult {
    pub time_points: Vec<f64>,
    pub record_curve: Vec<f64>,
    pub replay_curve: Vec<f64>,
    pub alignment_path: Vec<(usize, usize)>,
    pub dtw_distance: f64,
}

fn absolute_times_ms(note: &Note) -> Vec<f64> {
    note.after_touch
        .iter()
        .map(|&(t_rel, _)| (note.offset as u64 + t_rel as u64) as f64 / 10.0)
        .collect()
}

fn depths(note: &Note) -> Vec<f64> {
    note.after_touch.iter().map(|&(_, depth)| depth as f64).collect()
}

fn min_max_normalize(values: &[f64]) -> Vec<f64> {
    let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;
    if range.abs() < f64::EPSILON {
        return values.iter().map(|_| 0.0).collect();
    }
    values.iter().map(|&v| (v - min) / range).collect()
}

fn log1p_transform(values: &[f64]) -> Vec<f64> {
    values.iter().map(|&v| (1.0 + v).ln()).collect()
}

/// Gaussian smoothing with a symmetric kernel of radius `ceil(3*sigma)`.
/// `sigma <= 0` is a no-op, matching "smoothing disabled".
fn gaussian_smooth(values: &[f64], sigma: f64) -> Vec<f64> {
    if sigma <= 0.0 || values.len() < 2 {
        return values.to_vec();
    }
    let radius = (3.0 * sigma).ceil() as isize;
    let mut kernel = Vec::with_capacity((2 * radius + 1) as usize);
    let mut kernel_sum = 0.0;
    for k in -radius..=radius {
        let weight = (-(k as f64 * k as f64) / (2.0 * sigma * sigma)).exp();
        kernel.push(weight);
        kernel_sum += weight;
    }

    let n = values.len() as isize;
    (0..n)
        .map(|i| {
            let mut acc = 0.0;
            for (offset, &weight) in (-radius..=radius).zip(kernel.iter()) {
                let idx = (i + offset).clamp(0, n - 1);
                acc += values[idx as usize] * weight;
            }
            acc / kernel_sum
        })
        .collect()
}

fn has_non_finite(values: &[f64]) -> bool {
    values.iter().any(|v| !v.is_finite())
}

fn preprocess(raw_depths: &[f64], sigma: f64) -> Vec<f64> {
    let normalized = min_max_normalize(raw_depths);
    let logged = log1p_transform(&normalized);
    let renormalized = min_max_normalize(&logged);
    gaussian_smooth(&renormalized, sigma)
}

/// Group DTW path steps by reference index, averaging the query-side
/// values mapped to each reference index (§4.6 resampling).
fn aggregate_by_reference_index(
    path: &[(usize, usize)],
    record_times: &[f64],
    record_curve: &[f64],
    replay_curve: &[f64],
) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
    let mut grouped: Vec<(usize, Vec<usize>)> = Vec::new();
    for &(i, j) in path {
        match grouped.last_mut() {
            Some(last) if last.0 == i => last.1.push(j),
            _ => grouped.push((i, vec![j])),
        }
    }

    let times: Vec<f64> = grouped.iter().map(|(i, _)| record_times[*i]).collect();
    let record_vals: Vec<f64> = grouped.iter().map(|(i, _)| record_curve[*i]).collect();
    let replay_vals: Vec<f64> = grouped
        .iter()
        .map(|(_, js)| js.iter().map(|&j| replay_curve[j]).sum::<f64>() / js.len() as f64)
        .collect();

    (times, record_vals, replay_vals)
}

fn linear_interpolate(xs: &[f64], ys: &[f64], query: f64) -> f64 {
    if query <= xs[0] {
        return ys[0];
    }
    if query >= *xs.last().unwrap() {
        return *ys.last().unwrap();
    }
    let idx = xs.partition_point(|&x| x <= query);
    let (x0, x1) = (xs[idx - 1], xs[idx]);
    let (y0, y1) = (ys[idx - 1], ys[idx]);
    if (x1 - x0).abs() < f64::EPSILON {
        return y0;
    }
    y0 + (y1 - y0) * (query - x0) / (x1 - x0)
}

fn resample_uniform(times: &[f64], values: &[f64], rate_ms: f64) -> (Vec<f64>, Vec<f64>) {
    let start = times[0];
    let end = *times.last().unwrap();
    let mut grid = Vec::new();
    let mut t = start;
    while t < end {
        grid.push(t);
        t += rate_ms;
    }
    grid.push(end);

    let resampled: Vec<f64> = grid.iter().map(|&t| linear_interpolate(times, values, t)).collect();
    (grid, resampled)
}

/// Align the after-touch envelopes of a matched reference/replay pair.
/// Returns `Ok(None)` (not an error) when alignment is infeasible — the
/// matched pair itself is never invalidated by a curve-alignment failure.
pub fn align(
    record: &Note,
    replay: &Note,
    config: &CurveAlignerConfig,
) -> Result<CurveAlignmentResult, CurveAlignError> {
    if record.after_touch.len() < 2 || replay.after_touch.len() < 2 {
        return Err(CurveAlignError::InsufficientSamples);
    }

    let record_times = absolute_times_ms(record);
    let replay_times = absolute_times_ms(replay);

    let record_duration = record_times.last().unwrap() - record_times[0];
    let replay_duration = replay_times.last().unwrap() - replay_times[0];
    let max_duration = record_duration.max(replay_duration);
    let threshold = config.time_range_threshold_ms.max(config.window_size_ratio * max_duration);
    if (record_duration - replay_duration).abs() > threshold {
        return Err(CurveAlignError::DurationMismatch);
    }

    let record_raw = depths(record);
    let replay_raw = depths(replay);
    if has_non_finite(&record_raw) || has_non_finite(&replay_raw) {
        return Err(CurveAlignError::NonFiniteInput);
    }

    let record_curve = preprocess(&record_raw, config.smooth_sigma);
    let replay_curve = preprocess(&replay_raw, config.smooth_sigma);
    if has_non_finite(&record_curve) || has_non_finite(&replay_curve) {
        return Err(CurveAlignError::NonFiniteInput);
    }

    let dtw_result = run_dtw_with_fallback(&record_curve, &replay_curve, config, max_duration)?;

    let (aligned_times, aligned_record, aligned_replay) =
        aggregate_by_reference_index(&dtw_result.path, &record_times, &record_curve, &replay_curve);

    let (time_points, record_resampled) = resample_uniform(&aligned_times, &aligned_record, config.sampling_rate_ms);
    let (_, replay_resampled) = resample_uniform(&aligned_times, &aligned_replay, config.sampling_rate_ms);

    Ok(CurveAlignmentResult {
        time_points,
        record_curve: record_resampled,
        replay_curve: replay_resampled,
        alignment_path: dtw_result.path,
        dtw_distance: dtw_result.distance,
    })
}

fn run_dtw_with_fallback(
    record_curve: &[f64],
    replay_curve: &[f64],
    config: &CurveAlignerConfig,
    max_duration: f64,
) -> Result<DtwResult, CurveAlignError> {
    match dtw(record_curve, replay_curve, config.distance_metric) {
        Ok(result) => Ok(result),
        Err(e) => {
            tracing::warn!(error = %e, "unconstrained DTW failed, retrying with Sakoe-Chiba band");
            let band_ms = (config.window_size_ratio * max_duration).min(SAKOE_CHIBA_CEILING_MS);
            let band_samples = (band_ms / config.sampling_rate_ms).round().max(1.0) as usize;
            dtw_banded(record_curve, replay_curve, config.distance_metric, Some(band_samples))
                .map_err(|e| {
                    tracing::warn!(error = %e, "banded DTW also failed");
                    CurveAlignError::DtwLibraryFailure
                })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note_with_curve(offset: u32, samples: Vec<(u32, u16)>) -> Note {
        Note::from_raw(offset, 60, 1, 80, vec![(0, 150)], samples)
    }

    fn ramp(n: usize, step_0_1ms: u32, max_depth: u16) -> Vec<(u32, u16)> {
        (0..n)
            .map(|i| (i as u32 * step_0_1ms, (i as u16 + 1) * max_depth / n as u16))
            .collect()
    }

    #[test]
    fn identical_curves_align_with_near_zero_distance() {
        let curve = ramp(50, 20, 900);
        let record = note_with_curve(0, curve.clone());
        let replay = note_with_curve(0, curve);
        let result = align(&record, &replay, &CurveAlignerConfig::default()).unwrap();
        assert!(result.dtw_distance < 1e-6);
        assert_eq!(result.record_curve.len(), result.replay_curve.len());
        assert_eq!(result.time_points.len(), result.record_curve.len());
    }

    #[test]
    fn insufficient_samples_is_rejected() {
        let record = note_with_curve(0, vec![(0, 900)]);
        let replay = note_with_curve(0, ramp(10, 20, 900));
        let err = align(&record, &replay, &CurveAlignerConfig::default()).unwrap_err();
        assert_eq!(err, CurveAlignError::InsufficientSamples);
    }

    #[test]
    fn duration_mismatch_exactly_at_threshold_is_accepted() {
        let short = vec![(0, 100), (10000, 900)]; // 1000ms span
        let long = vec![(0, 100), (20000, 900)]; // 2000ms span, diff = 1000ms exactly
        let a = note_with_curve(0, short);
        let b = note_with_curve(0, long);
        let result = align(&a, &b, &CurveAlignerConfig::default());
        assert!(result.is_ok(), "exactly-at-threshold duration mismatch should be accepted");
    }

    #[test]
    fn duration_mismatch_one_ms_over_threshold_is_rejected() {
        let short = vec![(0, 100), (10000, 900)]; // 1000ms span
        let long = vec![(0, 100), (20010, 900)]; // 2001ms span, diff = 1001ms
        let a = note_with_curve(0, short);
        let b = note_with_curve(0, long);
        let err = align(&a, &b, &CurveAlignerConfig::default()).unwrap_err();
        assert_eq!(err, CurveAlignError::DurationMismatch);
    }

    #[test]
    fn gaussian_smooth_is_noop_for_nonpositive_sigma() {
        let values = vec![1.0, 5.0, 1.0, 5.0, 1.0];
        assert_eq!(gaussian_smooth(&values, 0.0), values);
    }

    #[test]
    fn min_max_normalize_handles_constant_input() {
        let values = vec![5.0, 5.0, 5.0];
        assert_eq!(min_max_normalize(&values), vec![0.0, 0.0, 0.0]);
    }
}
