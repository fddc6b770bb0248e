//! Per-key, widening-tolerance-window note matching between a reference
//! and a replay track (§4.4). This is the centrepiece of the pipeline.
//!
//! All timing fields here are in milliseconds — `Note`'s derived
//! `key_on_ms` etc. are already converted from the wire format's 0.1 ms
//! units at decode time, so the matcher never has to re-derive the
//! conversion §4.5 describes at its own boundary.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use spmid_format::Note;
use uuid::Uuid;

/// Tolerance windows tried in order, widening on each pass (§4.4 step 2b).
const TOLERANCE_WINDOWS_MS: [f64; 4] = [20.0, 50.0, 200.0, 1000.0];

/// Grade thresholds, applied to `|keyon_error_ms|` (§4.4 step 2c).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MatchKind {
    Excellent,
    Good,
    Fair,
    Poor,
    Severe,
    Failed,
}

impl MatchKind {
    pub const ALL: [MatchKind; 6] = [
        MatchKind::Excellent,
        MatchKind::Good,
        MatchKind::Fair,
        MatchKind::Poor,
        MatchKind::Severe,
        MatchKind::Failed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MatchKind::Excellent => "EXCELLENT",
            MatchKind::Good => "GOOD",
            MatchKind::Fair => "FAIR",
            MatchKind::Poor => "POOR",
            MatchKind::Severe => "SEVERE",
            MatchKind::Failed => "FAILED",
        }
    }
}

/// Pure grade-bucket classifier. Shared with the Track Comparator (C10),
/// which reuses this exact function rather than re-implementing the
/// thresholds (§9 design note 3).
pub fn grade(abs_keyon_error_ms: f64) -> MatchKind {
    if abs_keyon_error_ms <= 20.0 {
        MatchKind::Excellent
    } else if abs_keyon_error_ms <= 30.0 {
        MatchKind::Good
    } else if abs_keyon_error_ms <= 50.0 {
        MatchKind::Fair
    } else if abs_keyon_error_ms <= 100.0 {
        MatchKind::Poor
    } else if abs_keyon_error_ms <= 200.0 {
        MatchKind::Severe
    } else {
        MatchKind::Failed
    }
}

/// A matched reference/replay pair, preserving both UUIDs (§3.1).
#[derive(Debug, Clone)]
pub struct MatchedPair {
    pub record: Note,
    pub replay: Note,
    pub match_kind: MatchKind,
    pub keyon_error_ms: f64,
}

/// One row per `MatchedPair`, flattened for analytics (§3.1).
#[derive(Debug, Clone)]
pub struct OffsetAlignmentRecord {
    pub record_uuid: Uuid,
    pub replay_uuid: Uuid,
    pub key_id: u8,
    pub record_keyon_ms: f64,
    pub replay_keyon_ms: f64,
    pub keyon_offset_ms: f64,
    /// Equal to `keyon_offset_ms`: no global subtraction (§4.3).
    pub corrected_offset_ms: f64,
    pub record_velocity: u16,
    pub replay_velocity: u16,
}

/// The full output of a matcher run over one reference/replay pair of
/// valid note sequences.
#[derive(Debug, Clone)]
pub struct MatchResult {
    pub matched_pairs: Vec<MatchedPair>,
    pub drops: Vec<Note>,
    pub multis: Vec<Note>,
    pub offset_records: Vec<OffsetAlignmentRecord>,
    by_uuid_pair: HashMap<(Uuid, Uuid), usize>,
}

/// Per-grade count-and-percentage breakdown (§4.4 `get_graded_error_stats`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradeStat {
    pub count: usize,
    pub percent: f64,
}

impl MatchResult {
    /// `O(1)` average-case lookup by both sides' UUIDs.
    pub fn find_matched_pair_by_uuid(&self, record_uuid: Uuid, replay_uuid: Uuid) -> Option<&MatchedPair> {
        self.by_uuid_pair
            .get(&(record_uuid, replay_uuid))
            .map(|&idx| &self.matched_pairs[idx])
    }

    pub fn offset_alignment_data(&self) -> &[OffsetAlignmentRecord] {
        &self.offset_records
    }

    /// The precision subset: matched pairs with `|keyon_error_ms| <= 50.0`
    /// (§4.4 step 4, §3.1). A stable filter — preserves full-set order.
    pub fn precision_offset_alignment_data(&self) -> Vec<&OffsetAlignmentRecord> {
        self.offset_records
            .iter()
            .filter(|r| r.keyon_offset_ms.abs() <= 50.0)
            .collect()
    }

    /// Counts and percentages per grade, percentages rounded to 4 decimals
    /// and adjusted so their sum is exactly 100.0 by redistributing the
    /// rounding remainder to the bucket with the largest count (§4.4).
    pub fn graded_error_stats(&self) -> BTreeMap<&'static str, GradeStat> {
        let total = self.matched_pairs.len();
        let mut counts: BTreeMap<MatchKind, usize> = BTreeMap::new();
        for kind in MatchKind::ALL {
            counts.insert(kind, 0);
        }
        for pair in &self.matched_pairs {
            *counts.get_mut(&pair.match_kind).unwrap() += 1;
        }

        let mut stats: BTreeMap<&'static str, GradeStat> = BTreeMap::new();
        if total == 0 {
            for kind in MatchKind::ALL {
                stats.insert(kind.as_str(), GradeStat { count: 0, percent: 0.0 });
            }
            return stats;
        }

        let mut rounded: Vec<(MatchKind, f64)> = MatchKind::ALL
            .iter()
            .map(|&kind| {
                let count = counts[&kind];
                let raw_percent = count as f64 / total as f64 * 100.0;
                let rounded_percent = (raw_percent * 10000.0).round() / 10000.0;
                (kind, rounded_percent)
            })
            .collect();

        let sum: f64 = rounded.iter().map(|(_, p)| *p).sum();
        let diff = ((100.0 - sum) * 10000.0).round() / 10000.0;

        if diff.abs() > f64::EPSILON {
            // First bucket (in enum order) with the largest count wins ties.
            let mut largest_idx = 0;
            let mut largest_count = 0;
            for (idx, (kind, _)) in rounded.iter().enumerate() {
                let count = counts[kind];
                if count > largest_count {
                    largest_count = count;
                    largest_idx = idx;
                }
            }
            rounded[largest_idx].1 = ((rounded[largest_idx].1 + diff) * 10000.0).round() / 10000.0;
        }

        for (kind, percent) in rounded {
            stats.insert(kind.as_str(), GradeStat { count: counts[&kind], percent });
        }
        stats
    }
}

impl MatchKind {
    fn ord_key(self) -> u8 {
        match self {
            MatchKind::Excellent => 0,
            MatchKind::Good => 1,
            MatchKind::Fair => 2,
            MatchKind::Poor => 3,
            MatchKind::Severe => 4,
            MatchKind::Failed => 5,
        }
    }
}

impl PartialOrd for MatchKind {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for MatchKind {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.ord_key().cmp(&other.ord_key())
    }
}
impl Eq for MatchKind {}

/// Per-key note group, sorted by `key_on_ms` ascending (§4.4 step 1).
fn partition_by_key(notes: &[Note]) -> BTreeMap<u8, Vec<Note>> {
    let mut groups: BTreeMap<u8, Vec<Note>> = BTreeMap::new();
    for note in notes {
        groups.entry(note.id).or_default().push(note.clone());
    }
    for group in groups.values_mut() {
        group.sort_by(|a, b| a.key_on_ms.partial_cmp(&b.key_on_ms).unwrap());
    }
    groups
}

/// One widening-window pass over the currently-unmatched indices of a
/// single key group. Returns newly-accepted `(r_index, p_index)` pairs.
fn two_pointer_pass(
    r_group: &[Note],
    p_group: &[Note],
    unmatched_r: &mut Vec<usize>,
    unmatched_p: &mut Vec<usize>,
    window_ms: f64,
) -> Vec<(usize, usize)> {
    let mut accepted = Vec::new();
    let mut i = 0;
    let mut j = 0;
    let mut still_unmatched_r = Vec::new();
    let mut still_unmatched_p = Vec::new();

    while i < unmatched_r.len() && j < unmatched_p.len() {
        let r_idx = unmatched_r[i];
        let p_idx = unmatched_p[j];
        let r_time = r_group[r_idx].key_on_ms;
        let p_time = p_group[p_idx].key_on_ms;

        if (p_time - r_time).abs() <= window_ms {
            accepted.push((r_idx, p_idx));
            i += 1;
            j += 1;
        } else if r_time < p_time {
            still_unmatched_r.push(r_idx);
            i += 1;
        } else {
            still_unmatched_p.push(p_idx);
            j += 1;
        }
    }
    still_unmatched_r.extend_from_slice(&unmatched_r[i..]);
    still_unmatched_p.extend_from_slice(&unmatched_p[j..]);

    *unmatched_r = still_unmatched_r;
    *unmatched_p = still_unmatched_p;
    accepted
}

/// Match two valid note sequences, producing matched pairs, drops, and
/// multis, preserving UUIDs throughout (§4.4).
pub fn match_tracks(reference: &[Note], replay: &[Note]) -> MatchResult {
    let r_groups = partition_by_key(reference);
    let p_groups = partition_by_key(replay);

    let mut matched_pairs = Vec::new();
    let mut drops = Vec::new();
    let mut multis = Vec::new();

    let mut all_keys: Vec<u8> = r_groups.keys().chain(p_groups.keys()).cloned().collect();
    all_keys.sort_unstable();
    all_keys.dedup();

    for key in all_keys {
        let empty = Vec::new();
        let r_group = r_groups.get(&key).unwrap_or(&empty);
        let p_group = p_groups.get(&key).unwrap_or(&empty);

        let mut unmatched_r: Vec<usize> = (0..r_group.len()).collect();
        let mut unmatched_p: Vec<usize> = (0..p_group.len()).collect();
        let mut key_pairs: Vec<(usize, usize)> = Vec::new();

        for &window in TOLERANCE_WINDOWS_MS.iter() {
            let accepted = two_pointer_pass(r_group, p_group, &mut unmatched_r, &mut unmatched_p, window);
            key_pairs.extend(accepted);
        }

        // Order preservation within a key (§5, P4): sort the pairs this
        // key accepted across all passes by the reference note's time.
        key_pairs.sort_by(|a, b| r_group[a.0].key_on_ms.partial_cmp(&r_group[b.0].key_on_ms).unwrap());

        for (r_idx, p_idx) in key_pairs {
            let record = r_group[r_idx].clone();
            let replay_note = p_group[p_idx].clone();
            let error_ms = replay_note.key_on_ms - record.key_on_ms;
            let match_kind = grade(error_ms.abs());

            matched_pairs.push(MatchedPair {
                record: record.clone(),
                replay: replay_note.clone(),
                match_kind,
                keyon_error_ms: error_ms,
            });
        }

        unmatched_r.sort_unstable();
        for idx in unmatched_r {
            drops.push(r_group[idx].clone());
        }
        unmatched_p.sort_unstable();
        for idx in unmatched_p {
            multis.push(p_group[idx].clone());
        }
    }

    let offset_records: Vec<OffsetAlignmentRecord> = matched_pairs
        .iter()
        .map(|pair| OffsetAlignmentRecord {
            record_uuid: pair.record.uuid,
            replay_uuid: pair.replay.uuid,
            key_id: pair.record.id,
            record_keyon_ms: pair.record.key_on_ms,
            replay_keyon_ms: pair.replay.key_on_ms,
            keyon_offset_ms: pair.keyon_error_ms,
            corrected_offset_ms: pair.keyon_error_ms,
            record_velocity: pair.record.velocity,
            replay_velocity: pair.replay.velocity,
        })
        .collect();

    let by_uuid_pair: HashMap<(Uuid, Uuid), usize> = matched_pairs
        .iter()
        .enumerate()
        .map(|(idx, pair)| ((pair.record.uuid, pair.replay.uuid), idx))
        .collect();

    tracing::info!(
        matched = matched_pairs.len(),
        drops = drops.len(),
        multis = multis.len(),
        "note matching complete"
    );

    MatchResult {
        matched_pairs,
        drops,
        multis,
        offset_records,
        by_uuid_pair,
    }
}
