//! Track Comparator (C10, §4.9): given N registered READY datasets and a
//! designated baseline, compares every non-baseline track against it
//! note-by-note.
//!
//! Deliberately a *different* matching strategy than C4's widening-window
//! matcher (§9 design note 3): positions, not time windows, decide the
//! pairing. The two modules share only the grade-bucket classifier
//! (`spmid_match::grade`).

use std::collections::BTreeMap;

use spmid_format::Note;
use spmid_match::{grade, MatchKind};
use uuid::Uuid;

/// One paired row: both sides' UUIDs, timing, velocities, and grade.
#[derive(Debug, Clone)]
pub struct ComparisonPair {
    pub key_id: u8,
    pub sequence_index: usize,
    pub baseline_uuid: Uuid,
    pub compare_uuid: Uuid,
    pub baseline_key_on_ms: f64,
    pub compare_key_on_ms: f64,
    pub baseline_velocity: u16,
    pub compare_velocity: u16,
    pub keyon_diff_ms: f64,
    pub grade: MatchKind,
}

/// A note left unpaired on one side, with its within-group sequence index
/// preserved (§4.9).
#[derive(Debug, Clone)]
pub struct UnmatchedNote {
    pub key_id: u8,
    pub sequence_index: usize,
    pub uuid: Uuid,
    pub key_on_ms: f64,
}

/// Count + percentage per grade bucket, matching `spmid_match::GradeStat`'s
/// shape (§4.4 reused as-is per the shared-classifier design note).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GradeCount {
    pub count: usize,
    pub percent: f64,
}

/// The full result of comparing one non-baseline track against the
/// baseline (§4.9 "Output per compare track").
#[derive(Debug, Clone, Default)]
pub struct ComparisonResult {
    pub pairs: Vec<ComparisonPair>,
    pub unmatched_baseline: Vec<UnmatchedNote>,
    pub unmatched_compare: Vec<UnmatchedNote>,
    pub grade_counts: BTreeMap<&'static str, GradeCount>,
}

/// Pre-serialized row dictionary form of a `ComparisonPair`, per §4.9's
/// note that the comparator is the one place in the core that exposes
/// row dictionaries directly rather than live objects.
#[derive(Debug, Clone)]
pub struct ComparisonRow {
    pub key_id: u8,
    pub baseline_uuid: String,
    pub compare_uuid: String,
    pub baseline_key_on_ms: f64,
    pub compare_key_on_ms: f64,
    pub keyon_diff_ms: f64,
    pub grade: &'static str,
}

fn partition_sorted_by_key(notes: &[Note]) -> BTreeMap<u8, Vec<&Note>> {
    let mut groups: BTreeMap<u8, Vec<&Note>> = BTreeMap::new();
    for note in notes {
        groups.entry(note.id).or_default().push(note);
    }
    for group in groups.values_mut() {
        group.sort_by(|a, b| a.key_on_ms.partial_cmp(&b.key_on_ms).unwrap());
    }
    groups
}

/// Compare `compare` against `baseline`, strict-sequence per key (§4.9).
pub fn compare_tracks(baseline: &[Note], compare: &[Note]) -> ComparisonResult {
    let baseline_groups = partition_sorted_by_key(baseline);
    let compare_groups = partition_sorted_by_key(compare);

    let mut all_keys: Vec<u8> = baseline_groups.keys().chain(compare_groups.keys()).cloned().collect();
    all_keys.sort_unstable();
    all_keys.dedup();

    let mut pairs = Vec::new();
    let mut unmatched_baseline = Vec::new();
    let mut unmatched_compare = Vec::new();

    for key in all_keys {
        let empty: Vec<&Note> = Vec::new();
        let b_group = baseline_groups.get(&key).unwrap_or(&empty);
        let c_group = compare_groups.get(&key).unwrap_or(&empty);

        let paired_len = b_group.len().min(c_group.len());
        for idx in 0..paired_len {
            let b_note = b_group[idx];
            let c_note = c_group[idx];
            let keyon_diff_ms = c_note.key_on_ms - b_note.key_on_ms;
            pairs.push(ComparisonPair {
                key_id: key,
                sequence_index: idx,
                baseline_uuid: b_note.uuid,
                compare_uuid: c_note.uuid,
                baseline_key_on_ms: b_note.key_on_ms,
                compare_key_on_ms: c_note.key_on_ms,
                baseline_velocity: b_note.velocity,
                compare_velocity: c_note.velocity,
                keyon_diff_ms,
                grade: grade(keyon_diff_ms.abs()),
            });
        }

        for (idx, note) in b_group.iter().enumerate().skip(paired_len) {
            unmatched_baseline.push(UnmatchedNote {
                key_id: key,
                sequence_index: idx,
                uuid: note.uuid,
                key_on_ms: note.key_on_ms,
            });
        }
        for (idx, note) in c_group.iter().enumerate().skip(paired_len) {
            unmatched_compare.push(UnmatchedNote {
                key_id: key,
                sequence_index: idx,
                uuid: note.uuid,
                key_on_ms: note.key_on_ms,
            });
        }
    }

    let grade_counts = grade_counts(&pairs);

    ComparisonResult { pairs, unmatched_baseline, unmatched_compare, grade_counts }
}

fn grade_counts(pairs: &[ComparisonPair]) -> BTreeMap<&'static str, GradeCount> {
    let mut counts: BTreeMap<MatchKind, usize> = BTreeMap::new();
    for kind in MatchKind::ALL {
        counts.insert(kind, 0);
    }
    for pair in pairs {
        *counts.get_mut(&pair.grade).unwrap() += 1;
    }

    let total = pairs.len();
    let mut stats = BTreeMap::new();
    for kind in MatchKind::ALL {
        let count = counts[&kind];
        let percent = if total == 0 { 0.0 } else { count as f64 / total as f64 * 100.0 };
        stats.insert(kind.as_str(), GradeCount { count, percent });
    }
    stats
}

impl ComparisonResult {
    /// Flatten matched pairs into pre-serialized rows (§4.9).
    pub fn rows(&self) -> Vec<ComparisonRow> {
        self.pairs
            .iter()
            .map(|pair| ComparisonRow {
                key_id: pair.key_id,
                baseline_uuid: pair.baseline_uuid.to_string(),
                compare_uuid: pair.compare_uuid.to_string(),
                baseline_key_on_ms: pair.baseline_key_on_ms,
                compare_key_on_ms: pair.compare_key_on_ms,
                keyon_diff_ms: pair.keyon_diff_ms,
                grade: pair.grade.as_str(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note_at(offset_ms: f64, id: u8) -> Note {
        let offset_0_1ms = (offset_ms * 10.0).round() as u32;
        Note::from_raw(offset_0_1ms, id, 1, 80, vec![(0, 600)], vec![(0, 900), (400, 950)])
    }

    #[test]
    fn equal_length_groups_pair_by_position() {
        let baseline = vec![note_at(100.0, 60), note_at(200.0, 60)];
        let compare = vec![note_at(110.0, 60), note_at(225.0, 60)];
        let result = compare_tracks(&baseline, &compare);
        assert_eq!(result.pairs.len(), 2);
        assert!(result.unmatched_baseline.is_empty());
        assert!(result.unmatched_compare.is_empty());
        assert_eq!(result.pairs[0].keyon_diff_ms, 10.0);
        assert_eq!(result.pairs[1].keyon_diff_ms, 25.0);
    }

    #[test]
    fn shorter_baseline_group_leaves_compare_tail_unmatched() {
        let baseline = vec![note_at(100.0, 60)];
        let compare = vec![note_at(100.0, 60), note_at(500.0, 60)];
        let result = compare_tracks(&baseline, &compare);
        assert_eq!(result.pairs.len(), 1);
        assert!(result.unmatched_baseline.is_empty());
        assert_eq!(result.unmatched_compare.len(), 1);
        assert_eq!(result.unmatched_compare[0].sequence_index, 1);
    }

    #[test]
    fn shorter_compare_group_leaves_baseline_tail_unmatched() {
        let baseline = vec![note_at(100.0, 60), note_at(500.0, 60)];
        let compare = vec![note_at(100.0, 60)];
        let result = compare_tracks(&baseline, &compare);
        assert_eq!(result.pairs.len(), 1);
        assert_eq!(result.unmatched_baseline.len(), 1);
        assert!(result.unmatched_compare.is_empty());
    }

    #[test]
    fn grade_counts_sum_to_pair_count() {
        let baseline = vec![note_at(100.0, 60), note_at(500.0, 61)];
        let compare = vec![note_at(100.0, 60), note_at(500.0, 61)];
        let result = compare_tracks(&baseline, &compare);
        let total: usize = result.grade_counts.values().map(|g| g.count).sum();
        assert_eq!(total, 2);
    }

    #[test]
    fn rows_preserve_uuid_strings() {
        let baseline = vec![note_at(100.0, 60)];
        let compare = vec![note_at(120.0, 60)];
        let result = compare_tracks(&baseline, &compare);
        let rows = result.rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].keyon_diff_ms, 20.0);
        assert_eq!(rows[0].grade, "EXCELLENT");
    }
}
