//! Temp-write-then-rename is the primary integrity mechanism; a `.backup` sibling
//! is kept only as a last-resort recovery copy, never the primary mechanism.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};

/// Writes `contents` to `path` via a same-directory temp file, fsync, then an
/// atomic rename. No partial write is ever observable at `path`.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("creating temp file in {}", dir.display()))?;
    tmp.write_all(contents).context("writing temp file")?;
    tmp.as_file().sync_all().context("fsyncing temp file")?;
    tmp.persist(path)
        .map_err(|e| e.error)
        .with_context(|| format!("renaming temp file onto {}", path.display()))?;
    Ok(())
}

/// Same as [`write_atomic`], but first copies any existing file at `path` to a
/// `.backup` sibling. The backup is taken before the rename so a reader that only
/// ever sees the backup still gets the last good version, never a half-written one.
pub fn write_atomic_with_backup(path: &Path, contents: &[u8]) -> Result<()> {
    if path.exists() {
        let backup = backup_path(path);
        std::fs::copy(path, &backup)
            .with_context(|| format!("backing up {} to {}", path.display(), backup.display()))?;
    }
    write_atomic(path, contents)
}

fn backup_path(primary: &Path) -> std::path::PathBuf {
    let mut name = primary
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".backup");
    primary.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_atomic_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub/dir/file.txt");
        write_atomic(&path, b"hello").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello");
    }

    #[test]
    fn write_atomic_with_backup_preserves_previous_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file.txt");
        write_atomic_with_backup(&path, b"first").unwrap();
        write_atomic_with_backup(&path, b"second").unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "second");
        assert_eq!(
            std::fs::read_to_string(backup_path(&path)).unwrap(),
            "first"
        );
    }

    #[test]
    fn no_backup_written_on_first_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file.txt");
        write_atomic_with_backup(&path, b"first").unwrap();
        assert!(!backup_path(&path).exists());
    }
}
