//! Persisted edge index (`graph.index`).
//!
//! Indexed mode keeps the adjacency and type indexes on disk so a restart
//! can skip the full document scan. The file carries a SHA-256 checksum of
//! the canonical payload; a missing file or a checksum mismatch makes the
//! caller rebuild from documents instead of trusting stale or torn content.

use crate::index::GraphIndex;
use rserv_core::error::{Error, Result};
use rserv_core::fsio::atomic_write;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::warn;

const FORMAT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct IndexEnvelope {
    version: u32,
    checksum: String,
    index: serde_json::Value,
}

/// Handle to the on-disk index file.
#[derive(Debug, Clone)]
pub struct IndexFile {
    path: PathBuf,
}

impl IndexFile {
    /// Handle for `data/<schema>/graph.index`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the index file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush the current index. Called after every write in indexed mode.
    pub fn write(&self, index: &GraphIndex) -> Result<()> {
        let payload = serde_json::to_value(index)
            .map_err(|e| Error::Storage(format!("serialising graph index: {e}")))?;
        let envelope = IndexEnvelope {
            version: FORMAT_VERSION,
            checksum: checksum_of(&payload)?,
            index: payload,
        };
        let bytes = serde_json::to_vec(&envelope)
            .map_err(|e| Error::Storage(format!("serialising graph index: {e}")))?;
        atomic_write(&self.path, &bytes)
    }

    /// Load the persisted index.
    ///
    /// Returns `None` when the file is missing, unreadable, of a different
    /// format version, or checksum-mismatched; the caller then rebuilds
    /// from a document scan.
    pub fn load(&self) -> Result<Option<GraphIndex>> {
        let bytes = match std::fs::read(&self.path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::Storage(format!("{}: {e}", self.path.display()))),
        };
        let envelope: IndexEnvelope = match serde_json::from_slice(&bytes) {
            Ok(env) => env,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "unreadable graph index, rebuilding");
                return Ok(None);
            }
        };
        if envelope.version != FORMAT_VERSION {
            warn!(
                path = %self.path.display(),
                version = envelope.version,
                "graph index format version mismatch, rebuilding"
            );
            return Ok(None);
        }
        if checksum_of(&envelope.index)? != envelope.checksum {
            warn!(path = %self.path.display(), "graph index checksum mismatch, rebuilding");
            return Ok(None);
        }
        match serde_json::from_value(envelope.index) {
            Ok(index) => Ok(Some(index)),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "undecodable graph index, rebuilding");
                Ok(None)
            }
        }
    }
}

fn checksum_of(payload: &serde_json::Value) -> Result<String> {
    let canonical = serde_json::to_vec(payload)
        .map_err(|e| Error::Storage(format!("serialising graph index: {e}")))?;
    let mut hasher = Sha256::new();
    hasher.update(&canonical);
    Ok(hex::encode(hasher.finalize()))
}
