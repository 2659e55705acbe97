//! Byte-for-byte copy of the store file into the backup directory.
//!
//! These functions do blocking file I/O and expect the caller to hold the
//! store lock for the whole call.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{BackupError, BackupResult};

/// A snapshot written to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub path: PathBuf,
    pub bytes: u64,
}

/// Create `backup_dir` (and parents) if it does not exist yet.
pub fn ensure_backup_dir(backup_dir: &Path) -> BackupResult<()> {
    if backup_dir.is_dir() {
        return Ok(());
    }
    fs::create_dir_all(backup_dir).map_err(|source| BackupError::BackupDir {
        path: backup_dir.to_path_buf(),
        source,
    })?;
    info!(dir = %backup_dir.display(), "created backup directory");
    Ok(())
}

/// Stream `source` into a new file `backup_dir/file_name`.
///
/// An existing file with the same name is never overwritten. A partially
/// written destination is removed before the error is returned.
pub fn create_snapshot(source: &Path, backup_dir: &Path, file_name: &str) -> BackupResult<Snapshot> {
    ensure_backup_dir(backup_dir)?;

    if !source.is_file() {
        return Err(BackupError::SourceMissing {
            path: source.to_path_buf(),
        });
    }

    let dest = backup_dir.join(file_name);
    let src_file = File::open(source).map_err(|e| io_error(source, e))?;
    let dst_file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&dest)
        .map_err(|e| io_error(&dest, e))?;

    match stream(src_file, dst_file) {
        Ok(bytes) => {
            debug!(source = %source.display(), dest = %dest.display(), bytes, "snapshot written");
            Ok(Snapshot { path: dest, bytes })
        }
        Err(e) => {
            if let Err(rm) = fs::remove_file(&dest) {
                warn!(dest = %dest.display(), error = %rm, "failed to remove partial snapshot");
            }
            Err(io_error(&dest, e))
        }
    }
}

fn stream(src: File, dst: File) -> io::Result<u64> {
    let mut reader = BufReader::new(src);
    let mut writer = BufWriter::new(dst);
    let bytes = io::copy(&mut reader, &mut writer)?;
    writer.flush()?;
    writer.get_ref().sync_all()?;
    Ok(bytes)
}

fn io_error(path: &Path, source: io::Error) -> BackupError {
    BackupError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copies_bytes_exactly() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("live.db");
        let payload: Vec<u8> = (0..=255u8).cycle().take(100_000).collect();
        fs::write(&source, &payload).unwrap();

        let snapshot = create_snapshot(&source, &dir.path().join("backups"), "snap.db").unwrap();

        assert_eq!(snapshot.bytes, payload.len() as u64);
        assert_eq!(fs::read(&snapshot.path).unwrap(), payload);
    }

    #[test]
    fn creates_nested_backup_dir() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("live.db");
        fs::write(&source, b"data").unwrap();
        let nested = dir.path().join("a").join("b");

        create_snapshot(&source, &nested, "snap.db").unwrap();
        assert!(nested.join("snap.db").is_file());
    }

    #[test]
    fn missing_source_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = create_snapshot(&dir.path().join("nope.db"), dir.path(), "snap.db").unwrap_err();
        assert!(matches!(err, BackupError::SourceMissing { .. }));
    }

    #[test]
    fn never_overwrites_existing_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("live.db");
        fs::write(&source, b"new").unwrap();
        fs::write(dir.path().join("snap.db"), b"old").unwrap();

        let err = create_snapshot(&source, dir.path(), "snap.db").unwrap_err();
        assert!(matches!(err, BackupError::Io { .. }));
        assert_eq!(fs::read(dir.path().join("snap.db")).unwrap(), b"old");
    }

    #[test]
    fn backup_dir_blocked_by_file() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, b"x").unwrap();

        let err = ensure_backup_dir(&blocker.join("backups")).unwrap_err();
        assert!(matches!(err, BackupError::BackupDir { .. }));
    }
}
