//! `StoredRecord`: one row of the `track_data` relational index (§4.8, §6.3).

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::hash::FileMd5;

/// A single row of the `track_data` table plus the path to its columnar
/// sibling file. `id` and `created_at` are `None` until the record has
/// actually been inserted by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: Option<i64>,
    pub filename: String,
    pub file_md5: FileMd5,
    pub motor_type: String,
    pub algorithm: String,
    pub piano_type: String,
    pub file_date: String,
    pub track_data_path: String,
    pub created_at: Option<DateTime<Local>>,
}

impl StoredRecord {
    /// Build a not-yet-persisted record. `track_data_path` and `id` are
    /// filled in by the store once the row is actually inserted.
    pub fn new(
        filename: impl Into<String>,
        file_md5: FileMd5,
        motor_type: impl Into<String>,
        algorithm: impl Into<String>,
        piano_type: impl Into<String>,
        file_date: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            filename: filename.into(),
            file_md5,
            motor_type: motor_type.into(),
            algorithm: algorithm.into(),
            piano_type: piano_type.into(),
            file_date: file_date.into(),
            track_data_path: String::new(),
            created_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_record_has_no_id_or_path_yet() {
        let record = StoredRecord::new(
            "take3.spmid",
            FileMd5::from_data(b"take3"),
            "D3",
            "PID",
            "Grand",
            "2026-01-01 00:00:00",
        );
        assert!(record.id.is_none());
        assert!(record.created_at.is_none());
        assert!(record.track_data_path.is_empty());
    }

    #[test]
    fn record_round_trips_through_json() {
        let record = StoredRecord::new(
            "take3.spmid",
            FileMd5::from_data(b"take3"),
            "D3",
            "PID",
            "Grand",
            "2026-01-01 00:00:00",
        );
        let json = serde_json::to_string(&record).unwrap();
        let restored: StoredRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(record, restored);
    }
}
