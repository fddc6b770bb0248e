//! The persistence store (C9, §4.8): content-addressed (MD5-keyed) records
//! of decoded tracks, so a re-analysis does not re-parse the SPMID binary.
//!
//! A small relational index (`track_data`, one row per unique recording)
//! points at per-record columnar files holding the decoded `Note` arrays.
//! Adapted from the teacher's `cas` crate (sharded-directory layout,
//! staging-then-seal atomic writes) with the blob store swapped for a
//! rusqlite-backed index in the style of `llmchat::db::ConversationDb`, and
//! the hashing/dedup/delete semantics matching the original's
//! `history_manager.py`.
//!
//! ```rust,no_run
//! use spmid_store::{PersistenceStore, StoreConfig};
//!
//! let store = PersistenceStore::open(StoreConfig::with_base_path("/tank/spmid")).unwrap();
//! # let raw_bytes: &[u8] = &[];
//! # let tracks: Vec<spmid_format::Track> = vec![];
//! let record = store.save_record(raw_bytes, &tracks, "take1.spmid", "D3", "PID", "Grand").unwrap();
//! let tracks = store.load_tracks(&record).unwrap();
//! ```

pub mod columnar;
pub mod config;
pub mod hash;
pub mod metadata;
pub mod staging;
pub mod store;

pub use columnar::{decode_tracks, encode_tracks, ColumnarError};
pub use config::StoreConfig;
pub use hash::{FileMd5, HashError};
pub use metadata::StoredRecord;
pub use store::PersistenceStore;
