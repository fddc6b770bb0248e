//! Top-level orchestration of C1 -> C2 -> C3 -> C4 -> C5/C6 over a raw
//! reference/replay byte-buffer pair, plus a thin wiring layer around the
//! registry (C7/C8) and persistence store (C9).
//!
//! This is the "top-level crate" §1A refers to: orchestration code here
//! uses `anyhow::Result` with `.context(...)`, the way the teacher's own
//! `hootenanny` binary crate wraps its `cas`/`hooteproto` library calls,
//! reserving `thiserror` for the leaf libraries.

use anyhow::{Context, Result};
use spmid_align::TimeAlignmentDiagnostics;
use spmid_dataset::{AlgorithmDataset, ComparisonResult};
use spmid_filter::InvalidNotesStatistics;
use spmid_format::Track;
use spmid_match::MatchResult;
use spmid_metrics::descriptive::DelayMetrics;

/// Options controlling one pipeline run. Defaults mirror §1B / §4.9: no
/// reference truncation, decode both sides' first two tracks.
#[derive(Debug, Clone, Copy)]
pub struct PipelineOptions {
    /// §1B: drop trailing reference notes past the replay's last
    /// `key_off_ms`. Off by default.
    pub truncate_reference: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self { truncate_reference: false }
    }
}

/// Everything a single analysis run produces, for callers that want the
/// full pipeline's intermediate artifacts rather than only the final
/// `AlgorithmDataset`.
pub struct AnalysisOutcome {
    pub invalid_notes: InvalidNotesStatistics,
    pub time_alignment: TimeAlignmentDiagnostics,
    pub match_result: MatchResult,
    pub delay_metrics: DelayMetrics,
}

/// Decode a raw SPMID byte buffer into its constituent tracks (C1).
/// Containers with fewer than 2 tracks are rejected by the decoder
/// itself (`TrackCountTooLow`, §4.1).
pub fn decode_tracks(bytes: &[u8]) -> Result<Vec<Track>> {
    spmid_format::decode(bytes).context("failed to decode SPMID container")
}

/// Run the full analysis pipeline (C2 -> C3 -> C4 -> C5) over one
/// already-decoded reference/replay pair, without registering the result
/// anywhere. Useful for one-off comparisons outside the registry.
pub fn analyze(reference: &Track, replay: &Track, options: PipelineOptions) -> AnalysisOutcome {
    let (valid_record, record_rejects) = spmid_filter::filter_track(reference, spmid_filter::Side::Record);
    let (valid_replay, replay_rejects) = spmid_filter::filter_track(replay, spmid_filter::Side::Replay);
    let invalid_notes = InvalidNotesStatistics::new(record_rejects, replay_rejects);

    let truncated_record = if options.truncate_reference {
        spmid_filter::truncate_reference_to_replay_span(&valid_record, &valid_replay)
    } else {
        valid_record
    };

    let time_alignment = spmid_align::compute_global_time_offset(&truncated_record, &valid_replay);

    let match_result = spmid_match::match_tracks(&truncated_record, &valid_replay);

    let precision = match_result.precision_offset_alignment_data();
    let offsets: Vec<f64> = precision.iter().map(|r| r.keyon_offset_ms).collect();
    let delay_metrics = DelayMetrics::from_offsets(&offsets);

    AnalysisOutcome { invalid_notes, time_alignment, match_result, delay_metrics }
}

/// Build a READY `AlgorithmDataset` directly from a raw SPMID byte
/// buffer, chaining C1 (decode) through C5. A container holds at least
/// two tracks (§4.1); by convention track 0 is the reference recording
/// and track 1 is the replay under test. For registry-managed
/// concurrent loads, use `spmid_dataset::AlgorithmRegistry::add_async`
/// instead.
pub fn build_dataset(
    algorithm_name: String,
    display_name: String,
    filename: String,
    container_bytes: &[u8],
    options: PipelineOptions,
) -> Result<AlgorithmDataset> {
    let tracks = decode_tracks(container_bytes)?;
    let reference = tracks.first().context("container has no reference track")?;
    let replay = tracks.get(1).context("container has no replay track")?;

    let mut dataset = AlgorithmDataset::new(algorithm_name, display_name, filename);
    dataset.load_data(reference, replay, options.truncate_reference);
    Ok(dataset)
}

/// Build a worker pool from config loaded by `spmid-config` (§6.4
/// "Registry"). `spmid-config` keeps its own plain-data `RegistryConfig`
/// so the lightweight loader crate never depends on `spmid-dataset`'s
/// heavier `tokio`/`spmid-match` dependency graph; this is the one place
/// the two shapes are reconciled.
pub fn registry_from_config(config: &spmid_config::RegistryConfig) -> spmid_dataset::AlgorithmRegistry {
    spmid_dataset::AlgorithmRegistry::new(spmid_dataset::RegistryConfig {
        max_algorithms: config.max_algorithms,
        worker_pool_size: config.worker_pool_size,
    })
}

/// Compare a non-baseline `AlgorithmDataset` against a baseline one (C10).
/// Both must be READY; the comparator reuses the matched-pair grade
/// classifier but pairs strictly by within-key sequence position rather
/// than by time window (§4.9, §9 design note 3).
pub fn compare_against_baseline(baseline: &AlgorithmDataset, compare: &AlgorithmDataset) -> Option<ComparisonResult> {
    if !baseline.is_ready() || !compare.is_ready() {
        return None;
    }
    Some(spmid_dataset::compare_tracks(&replay_notes(baseline), &replay_notes(compare)))
}

/// Reconstruct a dataset's full valid replay track: the matched-pair
/// replay side plus the multis that never found a reference counterpart
/// (§4.9 compares whole replay tracks, not only the subset that matched
/// against the shared reference).
fn replay_notes(dataset: &AlgorithmDataset) -> Vec<spmid_format::Note> {
    let Some(result) = dataset.match_result() else {
        return Vec::new();
    };
    result
        .matched_pairs
        .iter()
        .map(|p| p.replay.clone())
        .chain(result.multis.iter().cloned())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use spmid_format::Note;

    fn note_at(offset_ms: f64, id: u8) -> Note {
        let offset_0_1ms = (offset_ms * 10.0).round() as u32;
        Note::from_raw(offset_0_1ms, id, 1, 80, vec![(0, 600)], vec![(0, 900), (400, 950)])
    }

    #[test]
    fn analyze_produces_matched_pairs_for_identical_tracks() {
        let reference = Track { notes: vec![note_at(100.0, 60)] };
        let replay = Track { notes: vec![note_at(100.0, 60)] };
        let outcome = analyze(&reference, &replay, PipelineOptions::default());
        assert_eq!(outcome.match_result.matched_pairs.len(), 1);
        assert_eq!(outcome.delay_metrics.mean_error, 0.0);
    }

    #[test]
    fn build_dataset_decodes_and_analyzes_raw_bytes() {
        let reference = Track { notes: vec![note_at(100.0, 60)] };
        let replay = Track { notes: vec![note_at(100.0, 60)] };
        let container_bytes = spmid_format::encode(&[reference, replay]);

        let dataset = build_dataset(
            "PID_a".into(),
            "PID".into(),
            "a.spmid".into(),
            &container_bytes,
            PipelineOptions::default(),
        )
        .unwrap();

        assert!(dataset.is_ready());
        assert_eq!(dataset.get_matched_pairs().len(), 1);
    }

    #[test]
    fn registry_from_config_carries_worker_pool_size() {
        let config = spmid_config::RegistryConfig { max_algorithms: Some(4), worker_pool_size: 4 };
        let registry = registry_from_config(&config);
        assert!(registry.is_empty());
    }

    #[test]
    fn compare_against_baseline_requires_both_ready() {
        let reference = Track { notes: vec![note_at(100.0, 60)] };
        let replay = Track { notes: vec![note_at(100.0, 60)] };
        let mut baseline = AlgorithmDataset::new("base".into(), "base".into(), "b.spmid".into());
        let compare = AlgorithmDataset::new("cmp".into(), "cmp".into(), "c.spmid".into());
        assert!(compare_against_baseline(&baseline, &compare).is_none());

        baseline.load_data(&reference, &replay, false);
        assert!(compare_against_baseline(&baseline, &compare).is_none());
    }

    #[test]
    fn compare_against_baseline_includes_multis_in_replay_track() {
        // The baseline's replay has an extra (unmatched) strike the
        // reference never produced; it must still show up in the C10
        // comparison since C10 compares whole replay tracks.
        let reference = Track { notes: vec![note_at(100.0, 60)] };
        let baseline_replay = Track { notes: vec![note_at(100.0, 60), note_at(900.0, 61)] };
        let compare_replay = Track { notes: vec![note_at(100.0, 60), note_at(900.0, 61)] };

        let mut baseline = AlgorithmDataset::new("base".into(), "base".into(), "b.spmid".into());
        baseline.load_data(&reference, &baseline_replay, false);
        let mut compare = AlgorithmDataset::new("cmp".into(), "cmp".into(), "c.spmid".into());
        compare.load_data(&reference, &compare_replay, false);

        assert_eq!(baseline.get_matched_pairs().len(), 1);
        assert_eq!(baseline.match_result().unwrap().multis.len(), 1);

        let result = compare_against_baseline(&baseline, &compare).unwrap();
        assert_eq!(result.pairs.len(), 2);
        assert!(result.unmatched_baseline.is_empty());
        assert!(result.unmatched_compare.is_empty());
    }
}
