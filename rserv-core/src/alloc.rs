//! Per-entity monotonic ID allocation.
//!
//! `_next_id.txt` holds the next id to issue in decimal ASCII. Allocation
//! is a locked read-increment-write; the incremented value is durably
//! written before the id is returned, so a crash can burn an id but never
//! reissue one.

use crate::error::{Error, Result};
use crate::fsio::{atomic_write, FileLock};
use crate::paths::Layout;
use crate::value::DocId;
use std::fs;

/// Allocate the next id for `entity`.
///
/// Acquires the entity lock for the read-modify-write. Gaps caused by a
/// crash between allocation and document creation are acceptable.
pub fn allocate(layout: &Layout, entity: &str) -> Result<DocId> {
    layout.ensure_entity_dir(entity)?;
    let _lock = FileLock::acquire(&layout.lock_path(entity))?;
    let path = layout.next_id_path(entity);

    let current: DocId = match fs::read_to_string(&path) {
        Ok(s) => s
            .trim()
            .parse()
            .map_err(|_| Error::Storage(format!("corrupt allocator state in {}", path.display())))?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => 1,
        Err(e) => return Err(Error::Storage(format!("{}: {e}", path.display()))),
    };

    atomic_write(&path, (current + 1).to_string().as_bytes())?;
    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> (tempfile::TempDir, Layout) {
        let tmp = tempfile::tempdir().unwrap();
        let layout = Layout::new(tmp.path().join("data"), tmp.path().join("schema"), "default");
        (tmp, layout)
    }

    #[test]
    fn test_allocation_is_monotonic() {
        let (_tmp, layout) = layout();
        assert_eq!(allocate(&layout, "users").unwrap(), 1);
        assert_eq!(allocate(&layout, "users").unwrap(), 2);
        assert_eq!(allocate(&layout, "users").unwrap(), 3);
    }

    #[test]
    fn test_sequences_are_per_entity() {
        let (_tmp, layout) = layout();
        assert_eq!(allocate(&layout, "users").unwrap(), 1);
        assert_eq!(allocate(&layout, "posts").unwrap(), 1);
        assert_eq!(allocate(&layout, "users").unwrap(), 2);
    }

    #[test]
    fn test_state_survives_reload() {
        let (_tmp, layout) = layout();
        allocate(&layout, "users").unwrap();
        allocate(&layout, "users").unwrap();
        // Fresh read of the state file picks up where we left off
        let stored = std::fs::read_to_string(layout.next_id_path("users")).unwrap();
        assert_eq!(stored.trim(), "3");
        assert_eq!(allocate(&layout, "users").unwrap(), 3);
    }

    #[test]
    fn test_corrupt_state_is_a_storage_error() {
        let (_tmp, layout) = layout();
        layout.ensure_entity_dir("users").unwrap();
        std::fs::write(layout.next_id_path("users"), "garbage").unwrap();
        assert!(matches!(
            allocate(&layout, "users"),
            Err(Error::Storage(_))
        ));
    }
}
