//! Algorithm Dataset (C7, §4.7): a value object that owns one algorithm's
//! filtered tracks, matcher output, metrics, and curve-alignment cache.
//! Identity is its `algorithm_name`; once READY its contents are immutable
//! except for `is_active` (§3.3).

use std::collections::HashMap;

use spmid_align::{self as align, CurveAlignerConfig, CurveAlignmentResult};
use spmid_filter::{self as filter, InvalidNotesStatistics, Side};
use spmid_format::Track;
use spmid_match::{self as matcher, MatchResult};
use spmid_metrics::descriptive::{per_key_stats, DelayMetrics, DescriptiveStats};
use uuid::Uuid;

/// Mirrors the Python original's `AlgorithmStatus` (§3.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlgorithmStatus {
    Pending,
    Loading,
    Ready,
    Error,
}

#[derive(Debug, Clone)]
pub struct AlgorithmMetadata {
    /// Internal unique identifier: `"{display_name}_{basename_without_ext(filename)}"`.
    pub algorithm_name: String,
    /// Raw, user-supplied name (need not be unique).
    pub display_name: String,
    pub filename: String,
    pub status: AlgorithmStatus,
    pub error_message: Option<String>,
}

/// Everything C7 promises once an algorithm has finished loading: filtered
/// tracks, matcher output, metrics, and a lazily-populated curve-alignment
/// cache keyed by the matched pair's `(record_uuid, replay_uuid)`.
pub struct AlgorithmDataset {
    pub metadata: AlgorithmMetadata,
    pub is_active: bool,

    match_result: Option<MatchResult>,
    invalid_notes: Option<InvalidNotesStatistics>,
    delay_metrics: Option<DelayMetrics>,
    per_key: Option<std::collections::BTreeMap<u8, DescriptiveStats>>,
    curve_cache: HashMap<(Uuid, Uuid), CurveAlignmentResult>,
}

impl AlgorithmDataset {
    /// Construct a dataset in `PENDING` state. Call `load_data` to run the
    /// pipeline and transition it to `READY`/`ERROR`.
    pub fn new(algorithm_name: String, display_name: String, filename: String) -> Self {
        Self {
            metadata: AlgorithmMetadata {
                algorithm_name,
                display_name,
                filename,
                status: AlgorithmStatus::Pending,
                error_message: None,
            },
            is_active: true,
            match_result: None,
            invalid_notes: None,
            delay_metrics: None,
            per_key: None,
            curve_cache: HashMap::new(),
        }
    }

    /// Run C2 (filter) -> C4 (match) -> C5 (metrics) over a raw
    /// reference/replay pair of decoded tracks, populating this dataset.
    /// Transitions to READY on success, ERROR otherwise. Curve alignment
    /// (C6) is deliberately not run eagerly here — see `curve_alignment`.
    ///
    /// `truncate_reference` opts into dropping reference notes whose
    /// `key_on_ms` falls after the replay's last `key_off_ms`; it
    /// defaults to off at every call site in this crate since the
    /// matcher's drop/multi accounting already handles a dangling tail
    /// correctly without it (§1B).
    pub fn load_data(&mut self, record_track: &Track, replay_track: &Track, truncate_reference: bool) {
        self.metadata.status = AlgorithmStatus::Loading;

        let (valid_record, record_rejects) = filter::filter_track(record_track, Side::Record);
        let (valid_replay, replay_rejects) = filter::filter_track(replay_track, Side::Replay);
        let invalid_notes = InvalidNotesStatistics::new(record_rejects, replay_rejects);

        let truncated_record = if truncate_reference {
            filter::truncate_reference_to_replay_span(&valid_record, &valid_replay)
        } else {
            valid_record
        };

        let _diagnostics = align::compute_global_time_offset(&truncated_record, &valid_replay);

        let result = matcher::match_tracks(&truncated_record, &valid_replay);

        let precision = result.precision_offset_alignment_data();
        let offsets: Vec<f64> = precision.iter().map(|r| r.keyon_offset_ms).collect();
        let delay_metrics = DelayMetrics::from_offsets(&offsets);
        let per_key = per_key_stats(&precision);

        self.invalid_notes = Some(invalid_notes);
        self.delay_metrics = Some(delay_metrics);
        self.per_key = Some(per_key);
        self.match_result = Some(result);
        self.metadata.status = AlgorithmStatus::Ready;

        tracing::info!(algorithm = %self.metadata.algorithm_name, "algorithm dataset loaded");
    }

    pub fn mark_error(&mut self, message: impl Into<String>) {
        self.metadata.status = AlgorithmStatus::Error;
        self.metadata.error_message = Some(message.into());
    }

    pub fn is_ready(&self) -> bool {
        self.metadata.status == AlgorithmStatus::Ready && self.match_result.is_some()
    }

    pub fn match_result(&self) -> Option<&MatchResult> {
        self.match_result.as_ref()
    }

    pub fn invalid_notes(&self) -> Option<&InvalidNotesStatistics> {
        self.invalid_notes.as_ref()
    }

    // --- §6.5 public query surface ---

    pub fn get_global_average_delay(&self) -> f64 {
        self.delay_metrics.map(|m| m.mean_error).unwrap_or(0.0)
    }

    pub fn get_mean_error(&self) -> f64 {
        self.delay_metrics.map(|m| m.mean_error).unwrap_or(0.0)
    }

    pub fn get_mean_absolute_error(&self) -> f64 {
        self.delay_metrics.map(|m| m.mae).unwrap_or(0.0)
    }

    pub fn get_standard_deviation(&self) -> f64 {
        self.delay_metrics.map(|m| m.std).unwrap_or(0.0)
    }

    pub fn get_variance(&self) -> f64 {
        self.delay_metrics.map(|m| m.variance).unwrap_or(0.0)
    }

    pub fn get_root_mean_squared_error(&self) -> f64 {
        self.delay_metrics.map(|m| m.rmse).unwrap_or(0.0)
    }

    pub fn get_coefficient_of_variation(&self) -> f64 {
        self.delay_metrics.map(|m| m.cv).unwrap_or(0.0)
    }

    pub fn get_graded_error_stats(&self) -> std::collections::BTreeMap<&'static str, matcher::GradeStat> {
        self.match_result
            .as_ref()
            .map(|r| r.graded_error_stats())
            .unwrap_or_default()
    }

    pub fn get_matched_pairs(&self) -> &[matcher::MatchedPair] {
        self.match_result.as_ref().map(|r| r.matched_pairs.as_slice()).unwrap_or(&[])
    }

    pub fn get_offset_alignment_data(&self) -> &[matcher::OffsetAlignmentRecord] {
        self.match_result.as_ref().map(|r| r.offset_alignment_data()).unwrap_or(&[])
    }

    pub fn get_precision_offset_alignment_data(&self) -> Vec<&matcher::OffsetAlignmentRecord> {
        self.match_result
            .as_ref()
            .map(|r| r.precision_offset_alignment_data())
            .unwrap_or_default()
    }

    pub fn find_matched_pair_by_uuid(&self, record_uuid: Uuid, replay_uuid: Uuid) -> Option<&matcher::MatchedPair> {
        self.match_result.as_ref().and_then(|r| r.find_matched_pair_by_uuid(record_uuid, replay_uuid))
    }

    pub fn per_key_stats(&self) -> Option<&std::collections::BTreeMap<u8, DescriptiveStats>> {
        self.per_key.as_ref()
    }

    /// Curve-align (C6) one matched pair and cache the result, or return
    /// the cached result on repeat lookups. Curve alignment is opt-in: the
    /// full matched-pair set can be large and most pairs are never
    /// inspected visually.
    pub fn curve_alignment(
        &mut self,
        record_uuid: Uuid,
        replay_uuid: Uuid,
        config: &CurveAlignerConfig,
    ) -> Result<&CurveAlignmentResult, align::CurveAlignError> {
        if !self.curve_cache.contains_key(&(record_uuid, replay_uuid)) {
            let pair = self
                .match_result
                .as_ref()
                .and_then(|r| r.find_matched_pair_by_uuid(record_uuid, replay_uuid))
                .ok_or(align::CurveAlignError::InsufficientSamples)?;
            let result = align::align(&pair.record, &pair.replay, config)?;
            self.curve_cache.insert((record_uuid, replay_uuid), result);
        }
        Ok(self.curve_cache.get(&(record_uuid, replay_uuid)).unwrap())
    }
}

/// Summary statistics exposed by `get_statistics` in the original
/// manager — a flattened snapshot useful for comparison tables.
#[derive(Debug, Clone)]
pub struct AlgorithmStatisticsSnapshot {
    pub algorithm_name: String,
    pub display_name: String,
    pub filename: String,
    pub global_average_delay: f64,
    pub mean_error: f64,
    pub matched_pairs_count: usize,
}

impl AlgorithmDataset {
    pub fn statistics_snapshot(&self) -> AlgorithmStatisticsSnapshot {
        AlgorithmStatisticsSnapshot {
            algorithm_name: self.metadata.algorithm_name.clone(),
            display_name: self.metadata.display_name.clone(),
            filename: self.metadata.filename.clone(),
            global_average_delay: self.get_global_average_delay(),
            mean_error: self.get_mean_error(),
            matched_pairs_count: self.get_matched_pairs().len(),
        }
    }
}

/// Derives the registry-unique `algorithm_name` (§3.2 invariant 6, §4.7):
/// `"{display_name}_{basename_without_ext(filename)}"`.
pub fn generate_algorithm_name(display_name: &str, filename: &str) -> String {
    let basename = filename.rsplit('/').next().unwrap_or(filename);
    let stem = match basename.rfind('.') {
        Some(dot) if dot > 0 => &basename[..dot],
        _ => basename,
    };
    format!("{}_{}", display_name, stem)
}

#[cfg(test)]
mod tests {
    use super::*;
    use spmid_format::Note;

    fn note_at(offset_ms: f64, id: u8, velocity: u16) -> Note {
        let offset_0_1ms = (offset_ms * 10.0).round() as u32;
        Note::from_raw(offset_0_1ms, id, 1, velocity, vec![(0, 600)], vec![(0, 900), (400, 950)])
    }

    #[test]
    fn algorithm_name_strips_extension_and_path() {
        assert_eq!(generate_algorithm_name("PID", "session_01.spmid"), "PID_session_01");
        assert_eq!(generate_algorithm_name("PID", "/uploads/session_01.spmid"), "PID_session_01");
        assert_eq!(generate_algorithm_name("PID", "noext"), "PID_noext");
    }

    #[test]
    fn load_data_transitions_to_ready() {
        let record = Track { notes: vec![note_at(100.0, 60, 80)] };
        let replay = Track { notes: vec![note_at(100.0, 60, 80)] };
        let mut dataset = AlgorithmDataset::new("PID_a".into(), "PID".into(), "a.spmid".into());
        dataset.load_data(&record, &replay, false);
        assert!(dataset.is_ready());
        assert_eq!(dataset.get_matched_pairs().len(), 1);
        assert_eq!(dataset.get_global_average_delay(), 0.0);
    }

    #[test]
    fn find_matched_pair_by_uuid_round_trips() {
        let record = Track { notes: vec![note_at(100.0, 60, 80)] };
        let replay = Track { notes: vec![note_at(100.0, 60, 80)] };
        let mut dataset = AlgorithmDataset::new("PID_a".into(), "PID".into(), "a.spmid".into());
        dataset.load_data(&record, &replay, false);
        let pair = &dataset.get_matched_pairs()[0];
        let (record_uuid, replay_uuid) = (pair.record.uuid, pair.replay.uuid);
        assert!(dataset.find_matched_pair_by_uuid(record_uuid, replay_uuid).is_some());
    }
}
