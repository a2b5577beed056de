//! Atomic replace and durable append.
//!
//! `atomic_write` writes to a temporary file in the target's directory,
//! syncs it, and renames it over the target. Source and destination share a
//! directory, so the rename stays on one filesystem.

use crate::error::{MendError, Result};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::Path;
use tempfile::NamedTempFile;

/// Create `dir` and its parents if missing.
pub fn ensure_dir(dir: &Path) -> Result<()> {
    if dir.as_os_str().is_empty() || dir.exists() {
        return Ok(());
    }
    fs::create_dir_all(dir).map_err(|e| {
        MendError::UserError(format!(
            "failed to create directory '{}': {}",
            dir.display(),
            e
        ))
    })
}

/// Create `dir` (and missing parents) only if it does not exist yet.
///
/// Returns `Ok(false)` when `dir` already exists, so callers can claim a
/// directory exactly once.
pub fn create_new_dir(dir: &Path) -> Result<bool> {
    if let Some(parent) = dir.parent() {
        ensure_dir(parent)?;
    }
    match fs::create_dir(dir) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(MendError::UserError(format!(
            "failed to create directory '{}': {}",
            dir.display(),
            e
        ))),
    }
}

/// Atomically replace `path` with `content`.
pub fn atomic_write<P: AsRef<Path>>(path: P, content: &[u8]) -> Result<()> {
    let path = path.as_ref();
    let parent = path.parent().unwrap_or(Path::new("."));
    ensure_dir(parent)?;
    let parent = if parent.as_os_str().is_empty() {
        Path::new(".")
    } else {
        parent
    };

    let mut temp = NamedTempFile::new_in(parent).map_err(|e| {
        MendError::UserError(format!(
            "failed to create temporary file in '{}': {}",
            parent.display(),
            e
        ))
    })?;

    temp.write_all(content)
        .and_then(|_| temp.as_file().sync_all())
        .map_err(|e| MendError::UserError(format!("failed to write temporary file: {}", e)))?;

    temp.persist(path).map_err(|e| {
        MendError::UserError(format!(
            "failed to atomically replace '{}': {}",
            path.display(),
            e.error
        ))
    })?;

    sync_dir(parent);
    Ok(())
}

/// Persist the directory entry of a rename (no-op where directories cannot
/// be opened).
fn sync_dir(dir: &Path) {
    if cfg!(unix)
        && let Ok(handle) = fs::File::open(dir)
    {
        let _ = handle.sync_all();
    }
}

/// Atomically replace `path` with a string.
pub fn atomic_write_file<P: AsRef<Path>>(path: P, content: &str) -> Result<()> {
    atomic_write(path, content.as_bytes())
}

/// Append `line` plus a newline to `path`, creating the file if needed.
pub fn append_line<P: AsRef<Path>>(path: P, line: &str) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| {
            MendError::UserError(format!("failed to open '{}': {}", path.display(), e))
        })?;

    writeln!(file, "{}", line)
        .and_then(|_| file.sync_all())
        .map_err(|e| {
            MendError::UserError(format!("failed to append to '{}': {}", path.display(), e))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_create_new_dir_claims_once() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("runs").join("r1");

        assert!(create_new_dir(&dir).unwrap());
        assert!(dir.is_dir());
        assert!(!create_new_dir(&dir).unwrap());
    }

    #[test]
    fn test_atomic_write_new_and_replace() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("experiments.json");

        atomic_write_file(&path, "{\"records\": []}").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "{\"records\": []}");

        atomic_write_file(&path, "{}").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "{}");
    }

    #[test]
    fn test_atomic_write_creates_parent_dirs() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("runs").join("r1").join("experiments.json");

        atomic_write(&path, b"[]").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"[]");
    }

    #[test]
    fn test_atomic_write_leaves_no_temp_files() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("snapshot.json");

        atomic_write(&path, b"content").unwrap();
        atomic_write(&path, b"content again").unwrap();

        let names: Vec<_> = fs::read_dir(temp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("snapshot.json")]);
    }

    #[test]
    fn test_append_line_accumulates() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("out").join("attempts.ndjson");

        append_line(&path, "{\"id\":\"a\"}").unwrap();
        append_line(&path, "{\"id\":\"b\"}").unwrap();

        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "{\"id\":\"a\"}\n{\"id\":\"b\"}\n"
        );
    }
}
