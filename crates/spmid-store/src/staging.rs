//! Crash-safe atomic writes of columnar track-data files.
//!
//! Adapted from the teacher's staging-then-seal pattern (`cas::staging` +
//! `cas::store::seal_path`): write to a sibling temp file, then rename into
//! place. `file_md5` is already known before the columnar bytes are built
//! here (it is the hash of the raw SPMID container), so there is no need
//! for the teacher's random pre-hash `StagingId` — the final path is known
//! up front.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Write `data` to `final_path` without ever leaving a half-written file
/// at `final_path` itself: write to `{final_path}.staging-{pid}`, then
/// rename. Falls back to copy+delete on cross-filesystem renames.
pub fn write_atomically(final_path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = final_path.parent() {
        fs::create_dir_all(parent).context("failed to create track-data directory")?;
    }

    let staging_path = staging_sibling(final_path);
    fs::write(&staging_path, data).context("failed to write staging track-data file")?;

    match fs::rename(&staging_path, final_path) {
        Ok(()) => Ok(()),
        Err(e) if e.raw_os_error() == Some(libc::EXDEV) => {
            fs::copy(&staging_path, final_path).context("failed to copy staging file across filesystems")?;
            fs::remove_file(&staging_path).context("failed to remove staging file after cross-fs copy")?;
            Ok(())
        }
        Err(e) => {
            let _ = fs::remove_file(&staging_path);
            Err(e).context("failed to rename staging file into place")
        }
    }
}

fn staging_sibling(final_path: &Path) -> PathBuf {
    let file_name = final_path.file_name().and_then(|n| n.to_str()).unwrap_or("record");
    final_path.with_file_name(format!("{file_name}.staging-{}", std::process::id()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn writes_and_renames_into_place() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("ab").join("cdef.bin");
        write_atomically(&target, b"hello").unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"hello");
    }

    #[test]
    fn no_staging_file_left_behind() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("shard").join("file.bin");
        write_atomically(&target, b"payload").unwrap();
        let staging = staging_sibling(&target);
        assert!(!staging.exists());
    }

    #[test]
    fn overwrites_existing_file() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("file.bin");
        write_atomically(&target, b"first").unwrap();
        write_atomically(&target, b"second").unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"second");
    }
}
