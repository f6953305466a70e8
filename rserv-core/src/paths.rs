//! On-disk layout.
//!
//! ```text
//! data/<schema>/<entity>/<id>.json    documents
//! data/<schema>/<entity>/_next_id.txt allocator state
//! data/<schema>/<entity>/.lock        advisory lock file
//! data/<schema>/graph.index           persisted edge index (indexed mode)
//! schema/<schema>/<entity>.json       field descriptors
//! ```

use crate::error::{Error, Result};
use crate::value::{validate_entity_name, DocId};
use std::fs;
use std::path::{Path, PathBuf};

/// Resolved directory layout for one schema.
#[derive(Debug, Clone)]
pub struct Layout {
    data_root: PathBuf,
    schema_root: PathBuf,
    schema_name: String,
}

impl Layout {
    /// Create a layout rooted at the given data and schema directories.
    pub fn new(
        data_root: impl Into<PathBuf>,
        schema_root: impl Into<PathBuf>,
        schema_name: impl Into<String>,
    ) -> Self {
        Self {
            data_root: data_root.into(),
            schema_root: schema_root.into(),
            schema_name: schema_name.into(),
        }
    }

    /// Active schema name.
    pub fn schema_name(&self) -> &str {
        &self.schema_name
    }

    /// `data/<schema>/`
    pub fn data_dir(&self) -> PathBuf {
        self.data_root.join(&self.schema_name)
    }

    /// `schema/<schema>/`
    pub fn schema_dir(&self) -> PathBuf {
        self.schema_root.join(&self.schema_name)
    }

    /// `data/<schema>/<entity>/`
    pub fn entity_dir(&self, entity: &str) -> PathBuf {
        self.data_dir().join(entity)
    }

    /// Create the entity directory if needed and return it.
    pub fn ensure_entity_dir(&self, entity: &str) -> Result<PathBuf> {
        validate_entity_name(entity)?;
        let dir = self.entity_dir(entity);
        fs::create_dir_all(&dir)
            .map_err(|e| Error::Storage(format!("{}: {e}", dir.display())))?;
        Ok(dir)
    }

    /// `data/<schema>/<entity>/<id>.json`
    pub fn doc_path(&self, entity: &str, id: DocId) -> PathBuf {
        self.entity_dir(entity).join(format!("{id}.json"))
    }

    /// `data/<schema>/<entity>/_next_id.txt`
    pub fn next_id_path(&self, entity: &str) -> PathBuf {
        self.entity_dir(entity).join("_next_id.txt")
    }

    /// `data/<schema>/<entity>/.lock`
    pub fn lock_path(&self, entity: &str) -> PathBuf {
        self.entity_dir(entity).join(".lock")
    }

    /// `data/<schema>/graph.index`
    pub fn graph_index_path(&self) -> PathBuf {
        self.data_dir().join("graph.index")
    }

    /// List entity directories present under the data root.
    pub fn list_entities(&self) -> Result<Vec<String>> {
        let dir = self.data_dir();
        let mut entities = Vec::new();
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(entities),
            Err(e) => return Err(Error::Storage(format!("{}: {e}", dir.display()))),
        };
        for entry in entries {
            let entry = entry.map_err(|e| Error::Storage(e.to_string()))?;
            if entry.path().is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    if validate_entity_name(name).is_ok() {
                        entities.push(name.to_string());
                    }
                }
            }
        }
        entities.sort();
        Ok(entities)
    }

    /// List document ids present in an entity directory, ascending.
    pub fn list_doc_ids(&self, entity: &str) -> Result<Vec<DocId>> {
        let dir = self.entity_dir(entity);
        let mut ids = Vec::new();
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ids),
            Err(e) => return Err(Error::Storage(format!("{}: {e}", dir.display()))),
        };
        for entry in entries {
            let entry = entry.map_err(|e| Error::Storage(e.to_string()))?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(stem) = name.strip_suffix(".json") {
                if let Ok(id) = stem.parse::<DocId>() {
                    ids.push(id);
                }
            }
        }
        ids.sort_unstable();
        Ok(ids)
    }

    /// Does the document file exist?
    pub fn doc_exists(&self, entity: &str, id: DocId) -> bool {
        self.doc_path(entity, id).exists()
    }
}

/// List schema descriptor files (`<entity>.json`) in a schema directory.
pub fn list_schema_files(schema_dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut files = Vec::new();
    let entries = match fs::read_dir(schema_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(files),
        Err(e) => return Err(Error::Storage(format!("{}: {e}", schema_dir.display()))),
    };
    for entry in entries {
        let entry = entry.map_err(|e| Error::Storage(e.to_string()))?;
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if let Some(entity) = name.strip_suffix(".json") {
            if validate_entity_name(entity).is_ok() {
                files.push((entity.to_string(), path));
            }
        }
    }
    files.sort();
    Ok(files)
}
