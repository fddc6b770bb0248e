//! The persistence store (C9, §4.8): a small relational index over
//! `track_data` rows, each pointing at a sharded columnar file.
//!
//! Connection-per-call rusqlite pattern adapted from `llmchat::db::ConversationDb`
//! (WAL mode, busy timeout, fresh `Connection` per call). Dedup-by-`file_md5`,
//! save/delete semantics adapted from the original's
//! `history_manager.py::SQLiteHistoryManager`.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Local;
use rusqlite::{Connection, OpenFlags};
use spmid_format::Track;

use crate::columnar::{decode_tracks, encode_tracks};
use crate::config::StoreConfig;
use crate::hash::FileMd5;
use crate::metadata::StoredRecord;
use crate::staging::write_atomically;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS track_data (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    filename TEXT NOT NULL,
    file_md5 TEXT NOT NULL UNIQUE,
    motor_type TEXT NOT NULL,
    algorithm TEXT NOT NULL,
    piano_type TEXT NOT NULL,
    file_date TEXT NOT NULL,
    track_data_path TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now', 'localtime'))
);
CREATE INDEX IF NOT EXISTS idx_track_data_filename ON track_data(filename);
"#;

/// A persistence store rooted at a single base directory: `index.sqlite3`
/// plus a `tracks/` tree of sharded columnar files.
pub struct PersistenceStore {
    config: StoreConfig,
}

impl PersistenceStore {
    /// Open (creating if necessary) a store at `config.base_path`.
    pub fn open(config: StoreConfig) -> Result<Self> {
        if !config.read_only {
            fs::create_dir_all(&config.base_path).context("failed to create store base directory")?;
            fs::create_dir_all(config.tracks_dir()).context("failed to create tracks directory")?;
        }
        let store = Self { config };
        store.initialize()?;
        Ok(store)
    }

    fn conn(&self) -> Result<Connection> {
        let flags = if self.config.read_only {
            OpenFlags::SQLITE_OPEN_READ_ONLY
        } else {
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE
        };
        let conn = Connection::open_with_flags(self.config.db_path(), flags | OpenFlags::SQLITE_OPEN_NO_MUTEX)
            .with_context(|| format!("failed to open store index at {:?}", self.config.db_path()))?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA busy_timeout = 5000;")?;
        Ok(conn)
    }

    fn initialize(&self) -> Result<()> {
        if self.config.read_only {
            return Ok(());
        }
        let conn = self.conn()?;
        conn.execute_batch(SCHEMA).context("failed to initialize track_data schema")?;
        Ok(())
    }

    fn track_data_path(&self, hash: &FileMd5) -> PathBuf {
        self.config.tracks_dir().join(hash.prefix()).join(format!("{}.bin", hash.remainder()))
    }

    /// Save decoded tracks, deduped by the MD5 of the raw SPMID bytes.
    ///
    /// If a record with this `file_md5` already exists, its id is returned
    /// without rewriting the columnar file (§4.8 "dedupes by `file_md5`").
    /// Otherwise the columnar file is written first; only on success is the
    /// index row inserted, so a failed file write never leaves a dangling
    /// row (§4.8 "failed file writes roll back the row insert").
    pub fn save_record(
        &self,
        raw_bytes: &[u8],
        tracks: &[Track],
        filename: &str,
        motor_type: &str,
        algorithm: &str,
        piano_type: &str,
    ) -> Result<StoredRecord> {
        anyhow::ensure!(!self.config.read_only, "store is in read-only mode");

        let file_md5 = FileMd5::from_data(raw_bytes);

        if let Some(existing) = self.get_record_by_md5(&file_md5)? {
            tracing::info!(file_md5 = %file_md5, id = ?existing.id, "save_record: dedup hit");
            return Ok(existing);
        }

        let track_data_path = self.track_data_path(&file_md5);
        let columnar_bytes = encode_tracks(tracks);
        write_atomically(&track_data_path, &columnar_bytes).context("failed to write columnar track-data file")?;

        let file_date = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        let conn = self.conn()?;
        let insert_result = conn.execute(
            "INSERT INTO track_data (filename, file_md5, motor_type, algorithm, piano_type, file_date, track_data_path)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                filename,
                file_md5.as_str(),
                motor_type,
                algorithm,
                piano_type,
                file_date,
                track_data_path.to_string_lossy(),
            ],
        );

        if let Err(e) = insert_result {
            let _ = fs::remove_file(&track_data_path);
            return Err(e).context("failed to insert track_data row; columnar file rolled back");
        }

        let id = conn.last_insert_rowid();
        self.get_record_by_id(id)?.context("record vanished immediately after insert")
    }

    pub fn get_record_by_id(&self, id: i64) -> Result<Option<StoredRecord>> {
        let conn = self.conn()?;
        let result = conn.query_row(
            "SELECT id, filename, file_md5, motor_type, algorithm, piano_type, file_date, track_data_path, created_at
             FROM track_data WHERE id = ?1",
            [id],
            row_to_record,
        );
        match result {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e).context("failed to query track_data by id"),
        }
    }

    pub fn get_record_by_md5(&self, file_md5: &FileMd5) -> Result<Option<StoredRecord>> {
        let conn = self.conn()?;
        let result = conn.query_row(
            "SELECT id, filename, file_md5, motor_type, algorithm, piano_type, file_date, track_data_path, created_at
             FROM track_data WHERE file_md5 = ?1",
            [file_md5.as_str()],
            row_to_record,
        );
        match result {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e).context("failed to query track_data by file_md5"),
        }
    }

    pub fn get_records_by_filename(&self, filename: &str) -> Result<Vec<StoredRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, filename, file_md5, motor_type, algorithm, piano_type, file_date, track_data_path, created_at
             FROM track_data WHERE filename = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map([filename], row_to_record)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().context("failed to collect track_data rows")
    }

    pub fn get_all_records(&self) -> Result<Vec<StoredRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, filename, file_md5, motor_type, algorithm, piano_type, file_date, track_data_path, created_at
             FROM track_data ORDER BY id",
        )?;
        let rows = stmt.query_map([], row_to_record)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().context("failed to collect track_data rows")
    }

    /// Load and decode the tracks for a given record, reconstructing Notes
    /// bit-exactly including their original UUIDs.
    pub fn load_tracks(&self, record: &StoredRecord) -> Result<Vec<Track>> {
        let bytes = fs::read(&record.track_data_path)
            .with_context(|| format!("failed to read columnar file at {}", record.track_data_path))?;
        decode_tracks(&bytes).context("failed to decode columnar track-data file")
    }

    /// Delete a record by id: removes the index row, then unlinks the
    /// physical columnar file. A failure to unlink is logged, not fatal —
    /// the index row is already gone (§4.8 "on delete-by-id the physical
    /// file is unlinked").
    pub fn delete_record_by_id(&self, id: i64) -> Result<bool> {
        anyhow::ensure!(!self.config.read_only, "store is in read-only mode");

        let Some(record) = self.get_record_by_id(id)? else {
            return Ok(false);
        };

        let conn = self.conn()?;
        conn.execute("DELETE FROM track_data WHERE id = ?1", [id]).context("failed to delete track_data row")?;

        if let Err(e) = fs::remove_file(&record.track_data_path) {
            tracing::warn!(path = %record.track_data_path, error = %e, "failed to unlink columnar file after delete");
        }

        Ok(true)
    }
}

fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<StoredRecord> {
    let file_md5_str: String = row.get(2)?;
    let file_md5 = FileMd5::from_str_checked(&file_md5_str)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e)))?;
    let created_at_str: String = row.get(8)?;
    let created_at = chrono::NaiveDateTime::parse_from_str(&created_at_str, "%Y-%m-%d %H:%M:%S")
        .ok()
        .and_then(|naive| naive.and_local_timezone(chrono::Local).single());

    Ok(StoredRecord {
        id: Some(row.get(0)?),
        filename: row.get(1)?,
        file_md5,
        motor_type: row.get(3)?,
        algorithm: row.get(4)?,
        piano_type: row.get(5)?,
        file_date: row.get(6)?,
        track_data_path: row.get(7)?,
        created_at,
    })
}
