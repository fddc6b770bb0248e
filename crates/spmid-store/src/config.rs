//! Persistence store configuration (§6.4 "Store", ambient expansion).
//!
//! File/env-based loading of this struct's fields lives in `spmid-config`
//! (the cascading loader that discovers `/etc/spmid/config.toml` etc.);
//! this crate only needs the resolved values.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Where the relational index and columnar files live, and whether writes
/// are permitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory holding the `index.sqlite3` file and the sharded
    /// `tracks/` tree of columnar files.
    pub base_path: PathBuf,

    #[serde(default)]
    pub read_only: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("./spmid-store"),
            read_only: false,
        }
    }
}

impl StoreConfig {
    pub fn with_base_path(path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: path.into(),
            read_only: false,
        }
    }

    pub fn read_only(path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: path.into(),
            read_only: true,
        }
    }

    pub fn db_path(&self) -> PathBuf {
        self.base_path.join("index.sqlite3")
    }

    pub fn tracks_dir(&self) -> PathBuf {
        self.base_path.join("tracks")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_writable() {
        let config = StoreConfig::default();
        assert!(!config.read_only);
    }

    #[test]
    fn with_base_path_sets_derived_dirs() {
        let config = StoreConfig::with_base_path("/tank/spmid");
        assert_eq!(config.db_path(), PathBuf::from("/tank/spmid/index.sqlite3"));
        assert_eq!(config.tracks_dir(), PathBuf::from("/tank/spmid/tracks"));
    }

    #[test]
    fn read_only_config_is_marked() {
        let config = StoreConfig::read_only("/tank/spmid");
        assert!(config.read_only);
    }
}
