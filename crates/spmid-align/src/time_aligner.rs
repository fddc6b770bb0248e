//! Diagnostic time alignment (§4.3, §9 design note 2).
//!
//! The global time offset is deliberately hard-coded to 0: the matcher's
//! widening tolerance window absorbs drift, and feeding a median DTW
//! offset back into `keyon_offset` was found to bias per-key errors in
//! the original implementation. The DTW here exists for diagnostics only
//! — nothing downstream consumes it.

use crate::dtw::{dtw, DistanceMetric, DtwError, DtwResult};
use spmid_format::Note;

/// Result of the diagnostic time alignment pass.
#[derive(Debug, Clone)]
pub struct TimeAlignmentDiagnostics {
    /// Always 0.0, in 0.1 ms. See module docs.
    pub global_time_offset: f64,
    /// The diagnostic DTW over hammer onset times, when both sides had at
    /// least one note with a hammer sample. `None` if either side was
    /// empty of onsets.
    pub dtw: Option<DtwResult>,
}

fn extract_hammer_onset_times(notes: &[Note]) -> Vec<f64> {
    notes
        .iter()
        .filter(|n| !n.hammers.is_empty())
        .map(|n| n.first_hammer_time_ms)
        .collect()
}

/// Compute the (always-zero) global time offset between a reference and a
/// replay note sequence, plus the diagnostic DTW over their hammer onset
/// times.
pub fn compute_global_time_offset(reference: &[Note], replay: &[Note]) -> TimeAlignmentDiagnostics {
    let ref_onsets = extract_hammer_onset_times(reference);
    let replay_onsets = extract_hammer_onset_times(replay);

    let dtw_result = match dtw(&ref_onsets, &replay_onsets, DistanceMetric::Euclidean) {
        Ok(result) => Some(result),
        Err(DtwError::EmptyInput) => {
            tracing::warn!("diagnostic DTW skipped: one or both onset sequences were empty");
            None
        }
        Err(e) => {
            tracing::warn!(error = %e, "diagnostic DTW failed");
            None
        }
    };

    TimeAlignmentDiagnostics {
        global_time_offset: 0.0,
        dtw: dtw_result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spmid_format::Note;

    fn note_with_hammer(offset: u32) -> Note {
        Note::from_raw(offset, 60, 1, 80, vec![(0, 150)], vec![(0, 900), (400, 950)])
    }

    #[test]
    fn global_offset_is_always_zero() {
        let reference = vec![note_with_hammer(0), note_with_hammer(1000)];
        let replay = vec![note_with_hammer(50), note_with_hammer(1100)];
        let diagnostics = compute_global_time_offset(&reference, &replay);
        assert_eq!(diagnostics.global_time_offset, 0.0);
        assert!(diagnostics.dtw.is_some());
    }

    #[test]
    fn empty_sides_skip_dtw_without_panicking() {
        let diagnostics = compute_global_time_offset(&[], &[]);
        assert_eq!(diagnostics.global_time_offset, 0.0);
        assert!(diagnostics.dtw.is_none());
    }
}
