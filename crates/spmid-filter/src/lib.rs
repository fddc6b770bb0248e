//! Note-level quality filtering (§4.2) and invalid-note statistics (§1B).
//!
//! Rejection rules run in a fixed order; the first rule a note fails
//! decides its reason code. Nothing here is fatal — every rejected note
//! is recorded, never dropped silently.

use serde::Serialize;
use spmid_format::{Note, Track};
use std::panic::AssertUnwindSafe;

/// Which side of the pairing a track belongs to. Carried purely for
/// reporting; it does not change the filter rules themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Record,
    Replay,
}

impl Side {
    pub fn as_str(self) -> &'static str {
        match self {
            Side::Record => "record",
            Side::Replay => "replay",
        }
    }
}

/// The enumerated set of rejection reasons (§3.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    EmptyData,
    LowAfterValue,
    ShortDuration,
    SilentNotes,
    OtherErrors,
}

impl RejectReason {
    pub fn as_str(self) -> &'static str {
        match self {
            RejectReason::EmptyData => "empty_data",
            RejectReason::LowAfterValue => "low_after_value",
            RejectReason::ShortDuration => "short_duration",
            RejectReason::SilentNotes => "silent_notes",
            RejectReason::OtherErrors => "other_errors",
        }
    }
}

/// A rejected note plus its reason and originating side.
#[derive(Debug, Clone)]
pub struct FilteredNoteInfo {
    pub note: Note,
    pub reason: RejectReason,
    pub side: Side,
}

const MIN_AFTER_TOUCH_DEPTH: u16 = 500;
const MIN_AFTER_TOUCH_SPAN_0_1MS: u32 = 300;
const MIN_DURATION_MS: f64 = 10.0;

/// Apply the fixed rule order to a single note. `Ok(())` means the note is
/// valid; `Err(reason)` gives the first rule it failed.
fn validate_note(note: &Note) -> Result<(), RejectReason> {
    if note.after_touch.is_empty() || note.hammers.is_empty() {
        return Err(RejectReason::EmptyData);
    }
    if note.first_hammer_velocity == 0 {
        return Err(RejectReason::SilentNotes);
    }
    if note.max_after_touch_depth() < MIN_AFTER_TOUCH_DEPTH {
        return Err(RejectReason::LowAfterValue);
    }
    if note.after_touch_span() < MIN_AFTER_TOUCH_SPAN_0_1MS {
        return Err(RejectReason::ShortDuration);
    }
    if note.duration_ms < MIN_DURATION_MS {
        return Err(RejectReason::ShortDuration);
    }
    Ok(())
}

/// Filter one raw track, returning the valid notes (original order
/// preserved) and a rejection record for every note that fails a rule.
///
/// Rule (6), `other_errors`, exists for defensive completeness: nothing in
/// `validate_note` can panic today, but a future rule addition might, and
/// a filter rejection should never take the whole pipeline down with it.
pub fn filter_track(track: &Track, side: Side) -> (Vec<Note>, Vec<FilteredNoteInfo>) {
    let mut valid = Vec::with_capacity(track.notes.len());
    let mut rejected = Vec::new();

    for note in &track.notes {
        let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| validate_note(note)));
        match outcome {
            Ok(Ok(())) => valid.push(note.clone()),
            Ok(Err(reason)) => rejected.push(FilteredNoteInfo {
                note: note.clone(),
                reason,
                side,
            }),
            Err(_) => {
                tracing::warn!(side = side.as_str(), note_id = note.id, "note validation panicked, recording as other_errors");
                rejected.push(FilteredNoteInfo {
                    note: note.clone(),
                    reason: RejectReason::OtherErrors,
                    side,
                });
            }
        }
    }

    if !rejected.is_empty() {
        tracing::info!(
            side = side.as_str(),
            valid = valid.len(),
            rejected = rejected.len(),
            "note filtering complete"
        );
    }

    (valid, rejected)
}

/// Per-side counts keyed by reason, plus the detail lists (§3.1, §1B).
#[derive(Debug, Default)]
pub struct InvalidNotesStatistics {
    pub record: Vec<FilteredNoteInfo>,
    pub replay: Vec<FilteredNoteInfo>,
}

impl InvalidNotesStatistics {
    pub fn new(record: Vec<FilteredNoteInfo>, replay: Vec<FilteredNoteInfo>) -> Self {
        Self { record, replay }
    }

    /// Count rejections by reason across both sides.
    pub fn reason_counts(&self) -> std::collections::BTreeMap<RejectReason, usize> {
        let mut counts = std::collections::BTreeMap::new();
        for info in self.record.iter().chain(self.replay.iter()) {
            *counts.entry(info.reason).or_insert(0) += 1;
        }
        counts
    }

    /// Total rejected notes on both sides.
    pub fn summary(&self) -> (usize, usize, usize) {
        (self.record.len(), self.replay.len(), self.record.len() + self.replay.len())
    }
}

/// Drop reference notes whose `key_on_ms` falls after the replay track's
/// last `key_off_ms`. Opt-in supplemented feature (§1B), grounded on the
/// original implementation's replay-span truncation; never mutates UUIDs
/// or note contents, only excludes a trailing tail of reference notes.
pub fn truncate_reference_to_replay_span(reference: &[Note], replay: &[Note]) -> Vec<Note> {
    let Some(replay_end) = replay.iter().map(|n| n.key_off_ms).fold(None, |acc, x| {
        Some(acc.map_or(x, |a: f64| a.max(x)))
    }) else {
        return reference.to_vec();
    };

    reference
        .iter()
        .filter(|n| n.key_on_ms <= replay_end)
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use spmid_format::Note;

    fn note(id: u8, hammers: Vec<(u32, u16)>, after: Vec<(u32, u16)>) -> Note {
        Note::from_raw(0, id, 1, 80, hammers, after)
    }

    #[test]
    fn empty_data_takes_priority() {
        let n = note(1, vec![], vec![(0, 900)]);
        assert_eq!(validate_note(&n), Err(RejectReason::EmptyData));
    }

    #[test]
    fn silent_note_detected() {
        let n = note(1, vec![(0, 0)], vec![(0, 100), (400, 900)]);
        assert_eq!(validate_note(&n), Err(RejectReason::SilentNotes));
    }

    #[test]
    fn low_after_value_detected() {
        let n = note(1, vec![(0, 100)], vec![(0, 100), (400, 499)]);
        assert_eq!(validate_note(&n), Err(RejectReason::LowAfterValue));
    }

    #[test]
    fn short_after_touch_span_detected() {
        let n = note(1, vec![(0, 100)], vec![(0, 900), (299, 901)]);
        assert_eq!(validate_note(&n), Err(RejectReason::ShortDuration));
    }

    #[test]
    fn duration_rule_is_moot_once_after_touch_span_passes() {
        // duration_ms is always >= after_touch_span_ms, so rule (5) never
        // fires once rule (4) has already passed.
        let n = note(1, vec![(0, 100), (50, 50)], vec![(0, 900), (300, 901)]);
        assert_eq!(validate_note(&n), Ok(()));
    }

    #[test]
    fn valid_note_passes_all_rules() {
        let n = note(1, vec![(0, 200)], vec![(0, 900), (400, 950)]);
        assert_eq!(validate_note(&n), Ok(()));
    }

    #[test]
    fn filter_track_partitions_valid_and_rejected() {
        let track = Track {
            notes: vec![
                note(1, vec![(0, 200)], vec![(0, 900), (400, 950)]),
                note(2, vec![(0, 0)], vec![(0, 900), (400, 950)]),
            ],
        };
        let (valid, rejected) = filter_track(&track, Side::Record);
        assert_eq!(valid.len(), 1);
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].reason, RejectReason::SilentNotes);
        assert_eq!(rejected[0].side, Side::Record);
    }

    #[test]
    fn invalid_notes_statistics_counts_and_summary() {
        let record = vec![FilteredNoteInfo {
            note: note(1, vec![], vec![]),
            reason: RejectReason::EmptyData,
            side: Side::Record,
        }];
        let replay = vec![FilteredNoteInfo {
            note: note(2, vec![], vec![]),
            reason: RejectReason::EmptyData,
            side: Side::Replay,
        }];
        let stats = InvalidNotesStatistics::new(record, replay);
        assert_eq!(stats.reason_counts()[&RejectReason::EmptyData], 2);
        assert_eq!(stats.summary(), (1, 1, 2));
    }

    #[test]
    fn truncate_reference_drops_trailing_tail() {
        let reference = vec![
            note(1, vec![(0, 100)], vec![(0, 900), (400, 950)]),
            Note::from_raw(2000, 1, 1, 80, vec![(0, 100)], vec![(0, 900), (400, 950)]),
        ];
        let replay = vec![note(1, vec![(0, 100)], vec![(0, 900), (400, 950)])];
        let truncated = truncate_reference_to_replay_span(&reference, &replay);
        assert_eq!(truncated.len(), 1);
    }
}
