//! Atomic file I/O and advisory locking.
//!
//! Writes serialise JSON to a sibling temp file, fsync it, and rename over
//! the target; readers never observe a torn write. Read-modify-write
//! sequences take an exclusive advisory lock on the entity's `.lock` file;
//! the lock releases on drop, covering every exit path.

use crate::error::{Error, Result};
use fs2::FileExt;
use serde_json::Value;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;

/// Serialise `value` to `path` atomically: temp file, fsync, rename.
pub fn atomic_write_json(path: &Path, value: &Value) -> Result<()> {
    let bytes = serde_json::to_vec(value)
        .map_err(|e| Error::Storage(format!("serialising {}: {e}", path.display())))?;
    atomic_write(path, &bytes)
}

/// Write raw bytes atomically: temp file, fsync, rename.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| Error::Storage(format!("no parent directory for {}", path.display())))?;
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::Storage(format!("invalid path {}", path.display())))?;
    let tmp = dir.join(format!(".{file_name}.tmp"));

    let result = (|| -> Result<()> {
        let mut f = File::create(&tmp)
            .map_err(|e| Error::Storage(format!("{}: {e}", tmp.display())))?;
        f.write_all(bytes)
            .map_err(|e| Error::Storage(format!("{}: {e}", tmp.display())))?;
        f.sync_all()
            .map_err(|e| Error::Storage(format!("{}: {e}", tmp.display())))?;
        fs::rename(&tmp, path)
            .map_err(|e| Error::Storage(format!("{} -> {}: {e}", tmp.display(), path.display())))
    })();

    if result.is_err() {
        // Pre-state stays intact; drop the orphaned temp file.
        let _ = fs::remove_file(&tmp);
    }
    result
}

/// Read and parse a JSON file. Missing file maps to `None`.
pub fn read_json_opt(path: &Path) -> Result<Option<Value>> {
    let bytes = match fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(Error::Storage(format!("{}: {e}", path.display()))),
    };
    let value = serde_json::from_slice(&bytes)
        .map_err(|e| Error::Storage(format!("corrupt JSON in {}: {e}", path.display())))?;
    Ok(Some(value))
}

/// Read and parse a JSON file that must exist.
pub fn read_json(path: &Path) -> Result<Value> {
    read_json_opt(path)?
        .ok_or_else(|| Error::Storage(format!("missing file {}", path.display())))
}

/// Exclusive advisory lock on a dedicated lock file.
///
/// Held for the duration of a read-modify-write; released on drop.
#[derive(Debug)]
pub struct FileLock {
    file: File,
}

impl FileLock {
    /// Acquire an exclusive lock, blocking until it is available.
    pub fn acquire(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)
            .map_err(|e| Error::Storage(format!("{}: {e}", path.display())))?;
        file.lock_exclusive()
            .map_err(|e| Error::Storage(format!("locking {}: {e}", path.display())))?;
        Ok(Self { file })
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_atomic_write_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("doc.json");
        atomic_write_json(&path, &json!({"id": 1, "name": "Alice"})).unwrap();
        let read = read_json(&path).unwrap();
        assert_eq!(read["name"], "Alice");
        // No temp file left behind
        assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_read_json_opt_missing() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(read_json_opt(&tmp.path().join("absent.json"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_read_json_corrupt() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("bad.json");
        fs::write(&path, b"{not json").unwrap();
        let err = read_json(&path).unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
    }

    #[test]
    fn test_lock_acquire_release() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join(".lock");
        {
            let _guard = FileLock::acquire(&path).unwrap();
        }
        // Released on drop; a second acquisition succeeds immediately.
        let _guard = FileLock::acquire(&path).unwrap();
    }
}
