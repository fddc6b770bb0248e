//! Generic dynamic time warping over two `f64` sequences, with an optional
//! Sakoe-Chiba band constraint. Shared by the diagnostic time aligner (C3)
//! and the after-touch curve aligner (C6).

/// Distance metric used between two sample points while building the DTW
/// cost matrix (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    Euclidean,
    Manhattan,
    Chebyshev,
    /// Pre-differentiates both curves (first-order diff, symmetric-padded)
    /// before computing Euclidean distance on the gradients.
    Gradient,
}

fn pointwise(metric: DistanceMetric, a: f64, b: f64) -> f64 {
    match metric {
        DistanceMetric::Euclidean | DistanceMetric::Gradient => (a - b).abs(),
        DistanceMetric::Manhattan => (a - b).abs(),
        DistanceMetric::Chebyshev => (a - b).abs(),
    }
}

/// First-order symmetric-padded difference: `diff[i] = (x[i+1] - x[i-1]) / 2`
/// at interior points, one-sided at the endpoints.
pub fn gradient(series: &[f64]) -> Vec<f64> {
    let n = series.len();
    if n == 0 {
        return Vec::new();
    }
    if n == 1 {
        return vec![0.0];
    }
    let mut out = Vec::with_capacity(n);
    out.push(series[1] - series[0]);
    for i in 1..n - 1 {
        out.push((series[i + 1] - series[i - 1]) / 2.0);
    }
    out.push(series[n - 1] - series[n - 2]);
    out
}

#[derive(Debug, Clone)]
pub struct DtwResult {
    pub distance: f64,
    /// Alignment path as `(reference_index, query_index)` pairs, from
    /// `(0, 0)` to `(n-1, m-1)`.
    pub path: Vec<(usize, usize)>,
}

#[derive(Debug, thiserror::Error)]
pub enum DtwError {
    #[error("one or both input sequences are empty")]
    EmptyInput,
    /// Raised when a Sakoe-Chiba band is narrower than `|n - m|`, making no
    /// path through the band possible.
    #[error("band width {band} too narrow for sequence lengths {n} and {m}")]
    BandTooNarrow { band: usize, n: usize, m: usize },
}

/// Unconstrained DTW between `a` and `b` under `metric`.
pub fn dtw(a: &[f64], b: &[f64], metric: DistanceMetric) -> Result<DtwResult, DtwError> {
    dtw_banded(a, b, metric, None)
}

/// DTW with an optional Sakoe-Chiba band: cell `(i, j)` is only considered
/// when `|i - j| <= band`. `band = None` means unconstrained.
pub fn dtw_banded(
    a: &[f64],
    b: &[f64],
    metric: DistanceMetric,
    band: Option<usize>,
) -> Result<DtwResult, DtwError> {
    if a.is_empty() || b.is_empty() {
        return Err(DtwError::EmptyInput);
    }

    let (a, b) = match metric {
        DistanceMetric::Gradient => (gradient(a), gradient(b)),
        _ => (a.to_vec(), b.to_vec()),
    };

    let n = a.len();
    let m = b.len();

    if let Some(band) = band {
        if n.abs_diff(m) > band {
            return Err(DtwError::BandTooNarrow { band, n, m });
        }
    }

    const INF: f64 = f64::INFINITY;
    let mut cost = vec![vec![INF; m + 1]; n + 1];
    cost[0][0] = 0.0;

    let in_band = |i: usize, j: usize| -> bool {
        match band {
            Some(b) => i.abs_diff(j) <= b,
            None => true,
        }
    };

    for i in 1..=n {
        for j in 1..=m {
            if !in_band(i, j) {
                continue;
            }
            let d = pointwise(metric, a[i - 1], b[j - 1]);
            let best_prev = cost[i - 1][j].min(cost[i][j - 1]).min(cost[i - 1][j - 1]);
            cost[i][j] = d + best_prev;
        }
    }

    if cost[n][m].is_infinite() {
        return Err(DtwError::BandTooNarrow {
            band: band.unwrap_or(usize::MAX),
            n,
            m,
        });
    }

    // Backtrack from (n, m) to (0, 0).
    let mut path = Vec::new();
    let (mut i, mut j) = (n, m);
    while i > 0 || j > 0 {
        path.push((i - 1, j - 1));
        if i == 0 {
            j -= 1;
            continue;
        }
        if j == 0 {
            i -= 1;
            continue;
        }
        let diag = cost[i - 1][j - 1];
        let up = cost[i - 1][j];
        let left = cost[i][j - 1];
        if diag <= up && diag <= left {
            i -= 1;
            j -= 1;
        } else if up <= left {
            i -= 1;
        } else {
            j -= 1;
        }
    }
    path.reverse();

    Ok(DtwResult {
        distance: cost[n][m],
        path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_sequences_have_zero_distance() {
        let a = vec![1.0, 2.0, 3.0, 4.0];
        let result = dtw(&a, &a, DistanceMetric::Euclidean).unwrap();
        assert_eq!(result.distance, 0.0);
        assert_eq!(result.path.first(), Some(&(0, 0)));
        assert_eq!(result.path.last(), Some(&(3, 3)));
    }

    #[test]
    fn path_covers_both_endpoints() {
        let a = vec![0.0, 1.0, 2.0];
        let b = vec![0.0, 0.5, 1.0, 2.0, 2.0];
        let result = dtw(&a, &b, DistanceMetric::Manhattan).unwrap();
        assert_eq!(result.path.first(), Some(&(0, 0)));
        assert_eq!(result.path.last(), Some(&(2, 4)));
    }

    #[test]
    fn empty_input_is_rejected() {
        let empty: Vec<f64> = vec![];
        assert!(matches!(dtw(&empty, &[1.0], DistanceMetric::Euclidean), Err(DtwError::EmptyInput)));
    }

    #[test]
    fn band_too_narrow_is_rejected() {
        let a = vec![0.0; 10];
        let b = vec![0.0; 2];
        let result = dtw_banded(&a, &b, DistanceMetric::Euclidean, Some(1));
        assert!(matches!(result, Err(DtwError::BandTooNarrow { .. })));
    }

    #[test]
    fn gradient_of_linear_series_is_constant() {
        let series = vec![0.0, 2.0, 4.0, 6.0, 8.0];
        let g = gradient(&series);
        assert_eq!(g, vec![2.0, 2.0, 2.0, 2.0, 2.0]);
    }
}
