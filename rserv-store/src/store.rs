//! The document store.
//!
//! Writes are linearised per entity by an advisory file lock; the edge
//! index is updated under that same lock, so readers in this process never
//! observe an index that lags a committed write. Reads go through the
//! document cache; every write invalidates the touched entities and
//! broadcasts a [`WriteEvent`].

use crate::events::{self, WriteEvent, WriteKind};
use crate::list::{self, Page, SortKey};
use parking_lot::RwLock;
use rserv_core::alloc;
use rserv_core::cache::{DocCache, MemoryTtlCache, NoCache};
use rserv_core::config::{CacheKind, GraphMode, Settings};
use rserv_core::error::{Error, Result};
use rserv_core::fsio::{atomic_write_json, read_json_opt, FileLock};
use rserv_core::paths::Layout;
use rserv_core::schema::{SchemaRegistry, StoreProbe, ValidateMode};
use rserv_core::value::{validate_entity_name, DocId, JsonMap, NodeRef};
use rserv_core::PatchNull;
use rserv_graph::{GraphIndex, IndexFile};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// File-backed document store with a graph overlay.
pub struct DocumentStore {
    layout: Layout,
    registry: SchemaRegistry,
    patch_null: PatchNull,
    cascading_delete: bool,
    ref_embed_depth: usize,
    graph: Arc<RwLock<GraphIndex>>,
    index_file: Option<IndexFile>,
    cache: Arc<dyn DocCache>,
    events: broadcast::Sender<WriteEvent>,
}

impl DocumentStore {
    /// Open the store: load schemas and build (or reload) the edge index.
    pub fn open(settings: &Settings) -> Result<Self> {
        let cache: Arc<dyn DocCache> = match settings.cache_type {
            CacheKind::TtlCache => Arc::new(MemoryTtlCache::new(
                1024,
                Duration::from_secs(settings.cache_ttl),
            )),
            CacheKind::Redis => {
                // The remote driver is an external collaborator; without it
                // reads simply skip the cache.
                warn!("redis cache driver not available, reads are uncached");
                Arc::new(NoCache)
            }
        };
        Self::open_with_cache(settings, cache)
    }

    /// Open the store with a caller-supplied read cache.
    pub fn open_with_cache(settings: &Settings, cache: Arc<dyn DocCache>) -> Result<Self> {
        let layout = Layout::new(
            settings.data_root.clone(),
            settings.schema_root.clone(),
            settings.schema.clone(),
        );
        let registry = SchemaRegistry::load(&layout)?;

        let index_file = match settings.rserv_graph {
            GraphMode::Indexed => Some(IndexFile::new(layout.graph_index_path())),
            GraphMode::Memory => None,
        };

        let store = Self {
            layout,
            registry,
            patch_null: settings.patch_null,
            cascading_delete: settings.cascading_delete,
            ref_embed_depth: settings.ref_embed_depth,
            graph: Arc::new(RwLock::new(GraphIndex::new())),
            index_file,
            cache,
            events: events::channel(),
        };
        store.init_graph()?;
        Ok(store)
    }

    /// Load the persisted index or rebuild it from a document scan.
    fn init_graph(&self) -> Result<()> {
        if let Some(file) = &self.index_file {
            if let Some(index) = file.load()? {
                info!(
                    nodes = index.node_count(),
                    edges = index.edge_count(),
                    "loaded persisted graph index"
                );
                *self.graph.write() = index;
                return Ok(());
            }
        }

        let mut index = GraphIndex::new();
        for entity in self.layout.list_entities()? {
            for id in self.layout.list_doc_ids(&entity)? {
                let Some(doc) = read_json_opt(&self.layout.doc_path(&entity, id))? else {
                    continue;
                };
                let Some(doc) = doc.as_object() else { continue };
                let refs = self.registry.references_of(&entity, doc);
                index.upsert_document(&NodeRef::new(&entity, id), doc, &refs);
            }
        }
        info!(
            nodes = index.node_count(),
            edges = index.edge_count(),
            "built graph index from document scan"
        );
        if let Some(file) = &self.index_file {
            file.write(&index)?;
        }
        *self.graph.write() = index;
        Ok(())
    }

    /// Shared handle to the edge index for graph reads.
    pub fn graph(&self) -> Arc<RwLock<GraphIndex>> {
        Arc::clone(&self.graph)
    }

    /// The loaded schema registry.
    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// The store's path layout.
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Default depth for reference embedding on read.
    pub fn ref_embed_depth(&self) -> usize {
        self.ref_embed_depth
    }

    /// Subscribe to write events.
    pub fn subscribe(&self) -> broadcast::Receiver<WriteEvent> {
        self.events.subscribe()
    }

    // =========================================================================
    // CRUD
    // =========================================================================

    /// Create a document with an allocated id. Returns the id.
    pub fn create(&self, entity: &str, mut body: JsonMap) -> Result<DocId> {
        validate_entity_name(entity)?;
        let id = alloc::allocate(&self.layout, entity)?;
        body.insert("id".to_string(), Value::from(id));
        let doc = self.registry.validate(entity, &body, ValidateMode::Create, self)?;

        self.commit_write(entity, id, doc, WriteKind::Create)?;
        debug!(entity, id, "created document");
        Ok(id)
    }

    /// Create a document with a caller-supplied id. Fails with `Conflict`
    /// when the id is taken.
    pub fn save(&self, entity: &str, id: DocId, mut body: JsonMap) -> Result<()> {
        validate_entity_name(entity)?;
        check_id(id)?;
        self.layout.ensure_entity_dir(entity)?;
        if self.layout.doc_exists(entity, id) {
            return Err(Error::Conflict(format!(
                "Resource of entity {entity} with id {id} already exists"
            )));
        }
        body.insert("id".to_string(), Value::from(id));
        let doc = self.registry.validate(entity, &body, ValidateMode::Create, self)?;

        self.commit_write(entity, id, doc, WriteKind::Create)?;
        debug!(entity, id, "saved document");
        Ok(())
    }

    /// Fetch a document.
    pub fn get(&self, entity: &str, id: DocId) -> Result<Value> {
        validate_entity_name(entity)?;
        check_id(id)?;
        if let Some(doc) = self.cache.get(entity, id) {
            return Ok(doc);
        }
        let doc = read_json_opt(&self.layout.doc_path(entity, id))?
            .ok_or_else(|| Error::document_not_found(entity, id))?;
        self.cache.put(entity, id, doc.clone());
        Ok(doc)
    }

    /// Fetch a document and embed the referenced documents of the listed
    /// fields, to `depth` levels.
    pub fn get_with_lookup(
        &self,
        entity: &str,
        id: DocId,
        lookup: &[String],
        depth: usize,
    ) -> Result<Value> {
        let doc = self.get(entity, id)?;
        self.populate(entity, doc, lookup, depth)
    }

    fn populate(&self, entity: &str, doc: Value, lookup: &[String], depth: usize) -> Result<Value> {
        if depth == 0 {
            return Ok(doc);
        }
        let Value::Object(mut obj) = doc else {
            return Ok(doc);
        };
        let refs = self.registry.references_of(entity, &obj);
        for field in lookup {
            let targets: Vec<NodeRef> = refs
                .iter()
                .filter(|(f, _)| f == field)
                .map(|(_, t)| t.clone())
                .collect();
            if targets.is_empty() {
                continue;
            }
            let mut embedded = Vec::with_capacity(targets.len());
            for target in &targets {
                match self.get(&target.entity, target.id) {
                    Ok(ref_doc) => embedded.push(self.populate(
                        &target.entity,
                        ref_doc,
                        lookup,
                        depth - 1,
                    )?),
                    // Dangling refs stay as stored
                    Err(Error::NotFound(_)) => {}
                    Err(e) => return Err(e),
                }
            }
            match (embedded.len(), obj.get(field).map(Value::is_array)) {
                (0, _) => {}
                (1, Some(false)) => {
                    obj.insert(field.clone(), embedded.remove(0));
                }
                _ => {
                    obj.insert(field.clone(), Value::Array(embedded));
                }
            }
        }
        Ok(Value::Object(obj))
    }

    /// Replace a document wholesale.
    pub fn replace(&self, entity: &str, id: DocId, mut body: JsonMap) -> Result<()> {
        validate_entity_name(entity)?;
        check_id(id)?;
        if !self.layout.doc_exists(entity, id) {
            return Err(Error::document_not_found(entity, id));
        }
        body.insert("id".to_string(), Value::from(id));
        let doc = self
            .registry
            .validate(entity, &body, ValidateMode::Replace, self)?;

        self.commit_write(entity, id, doc, WriteKind::Update)?;
        debug!(entity, id, "replaced document");
        Ok(())
    }

    /// Merge a partial document per the patch-null policy and rewrite.
    /// Returns the names of the patched fields.
    pub fn patch(&self, entity: &str, id: DocId, mut partial: JsonMap) -> Result<Vec<String>> {
        validate_entity_name(entity)?;
        check_id(id)?;

        let _lock = FileLock::acquire(&self.layout.lock_path(entity))?;
        let existing = read_json_opt(&self.layout.doc_path(entity, id))?
            .ok_or_else(|| Error::document_not_found(entity, id))?;
        let Value::Object(mut merged) = existing else {
            return Err(Error::Storage(format!(
                "document {entity}/{id} is not a JSON object"
            )));
        };

        // `id` is immutable
        partial.remove("id");
        let patched_fields: Vec<String> = partial.keys().cloned().collect();

        // Check the provided fields before merging
        let mut to_check = partial.clone();
        to_check.insert("id".to_string(), Value::from(id));
        self.registry
            .validate(entity, &to_check, ValidateMode::Patch, self)?;

        for (field, value) in partial {
            if value.is_null() && self.patch_null == PatchNull::Delete {
                merged.remove(&field);
            } else {
                merged.insert(field, value);
            }
        }

        // The merged document must still validate in full
        let doc = self
            .registry
            .validate(entity, &merged, ValidateMode::Replace, self)?;

        self.write_locked(entity, id, doc)?;
        drop(_lock);

        self.after_write(entity, WriteKind::Update);
        debug!(entity, id, fields = ?patched_fields, "patched document");
        Ok(patched_fields)
    }

    /// Delete a document. With cascading enabled, transitively deletes the
    /// documents referencing it; returns the deleted `entity:id` refs in
    /// deletion order.
    pub fn delete(&self, entity: &str, id: DocId) -> Result<Vec<String>> {
        validate_entity_name(entity)?;
        check_id(id)?;
        if !self.layout.doc_exists(entity, id) {
            return Err(Error::document_not_found(entity, id));
        }

        let target = NodeRef::new(entity, id);
        let _lock = FileLock::acquire(&self.layout.lock_path(entity))?;
        let deleted = if self.cascading_delete {
            self.cascade_delete(&target)?
        } else {
            let referenced = self.graph.read().in_edges(&target).next().is_some();
            if referenced {
                return Err(Error::Integrity(format!(
                    "Cannot delete {entity} with id {id}: it is referenced by other documents"
                )));
            }
            std::fs::remove_file(self.layout.doc_path(entity, id))
                .map_err(|e| Error::Storage(e.to_string()))?;
            vec![target.clone()]
        };

        // Edges come out of the index last, after the files are gone
        {
            let mut graph = self.graph.write();
            for node in &deleted {
                graph.remove_document(node);
            }
            self.flush_index(&graph)?;
        }

        let mut touched: Vec<&str> = deleted.iter().map(|n| n.entity.as_str()).collect();
        touched.sort_unstable();
        touched.dedup();
        for entity in touched {
            self.cache.invalidate_entity(entity);
        }
        let _ = self.events.send(WriteEvent {
            entity: entity.to_string(),
            kind: WriteKind::Delete,
        });

        debug!(entity, id, count = deleted.len(), "deleted documents");
        Ok(deleted.iter().map(NodeRef::to_string).collect())
    }

    /// Breadth-first cascade over the referrers, guarded by a seen-set so
    /// cyclic reference graphs terminate and nothing is deleted twice.
    fn cascade_delete(&self, target: &NodeRef) -> Result<Vec<NodeRef>> {
        let mut deleted = Vec::new();
        let mut seen: HashSet<NodeRef> = HashSet::from([target.clone()]);
        let mut worklist = vec![target.clone()];

        while let Some(current) = worklist.pop() {
            if !self.layout.doc_exists(&current.entity, current.id) {
                continue;
            }

            for (src_entity, src_id, _) in self.referencing_documents(&current)? {
                let node = NodeRef::new(src_entity, src_id);
                if seen.insert(node.clone()) {
                    worklist.push(node);
                }
            }

            std::fs::remove_file(self.layout.doc_path(&current.entity, current.id))
                .map_err(|e| Error::Storage(e.to_string()))?;
            deleted.push(current);
        }
        Ok(deleted)
    }

    /// Documents whose reference fields point at `target`:
    /// `(entity, id, field)` triples.
    ///
    /// Schema referrers come from `referrers_of`; schema-less entities are
    /// scanned for inline references.
    fn referencing_documents(&self, target: &NodeRef) -> Result<Vec<(String, DocId, String)>> {
        let mut referrer_entities: Vec<String> = self
            .registry
            .referrers_of(&target.entity)
            .into_iter()
            .map(|(entity, _)| entity)
            .collect();
        for entity in self.layout.list_entities()? {
            if self.registry.get(&entity).is_none() {
                referrer_entities.push(entity);
            }
        }
        referrer_entities.sort();
        referrer_entities.dedup();

        let mut found = Vec::new();
        for entity in referrer_entities {
            for id in self.layout.list_doc_ids(&entity)? {
                let Some(doc) = read_json_opt(&self.layout.doc_path(&entity, id))? else {
                    continue;
                };
                let Some(doc) = doc.as_object() else { continue };
                for (field, referenced) in self.registry.references_of(&entity, doc) {
                    if referenced == *target {
                        found.push((entity.clone(), id, field));
                    }
                }
            }
        }
        Ok(found)
    }

    // =========================================================================
    // Listing and search
    // =========================================================================

    /// All documents of an entity, id ascending.
    pub fn all_documents(&self, entity: &str) -> Result<Vec<Value>> {
        validate_entity_name(entity)?;
        let mut docs = Vec::new();
        for id in self.layout.list_doc_ids(entity)? {
            if let Some(doc) = read_json_opt(&self.layout.doc_path(entity, id))? {
                docs.push(doc);
            }
        }
        Ok(docs)
    }

    /// Paginated, sorted listing.
    pub fn list(
        &self,
        entity: &str,
        page: usize,
        per_page: usize,
        sort: &[SortKey],
    ) -> Result<Page> {
        let mut docs = self.all_documents(entity)?;
        list::sort_documents(&mut docs, sort);
        Ok(list::paginate(docs, page, per_page))
    }

    /// Paginated substring search over one field or all string fields.
    pub fn search(
        &self,
        entity: &str,
        query: &str,
        field: Option<&str>,
        page: usize,
        per_page: usize,
    ) -> Result<Page> {
        let docs = self
            .all_documents(entity)?
            .into_iter()
            .filter(|doc| list::matches_query(doc, query, field))
            .collect();
        Ok(list::paginate(docs, page, per_page))
    }

    /// Documents across all entities (graph statistics).
    pub fn count_documents(&self) -> Result<usize> {
        let mut count = 0;
        for entity in self.layout.list_entities()? {
            count += self.layout.list_doc_ids(&entity)?.len();
        }
        Ok(count)
    }

    /// The node payload: document fields minus its reference fields.
    pub fn node_properties(&self, node: &NodeRef) -> Result<JsonMap> {
        let doc = self.get(&node.entity, node.id)?;
        let Value::Object(obj) = doc else {
            return Ok(JsonMap::new());
        };
        let ref_fields: HashSet<String> = self
            .registry
            .references_of(&node.entity, &obj)
            .into_iter()
            .map(|(field, _)| field)
            .collect();
        Ok(obj
            .into_iter()
            .filter(|(field, _)| !ref_fields.contains(field))
            .collect())
    }

    // =========================================================================
    // Write plumbing
    // =========================================================================

    /// Write the document and update the edge index under the entity lock,
    /// then invalidate and broadcast.
    fn commit_write(&self, entity: &str, id: DocId, doc: JsonMap, kind: WriteKind) -> Result<()> {
        self.layout.ensure_entity_dir(entity)?;
        let lock = FileLock::acquire(&self.layout.lock_path(entity))?;
        self.write_locked(entity, id, doc)?;
        drop(lock);
        self.after_write(entity, kind);
        Ok(())
    }

    /// Document write plus index maintenance; the caller holds the entity
    /// lock.
    fn write_locked(&self, entity: &str, id: DocId, doc: JsonMap) -> Result<()> {
        atomic_write_json(&self.layout.doc_path(entity, id), &Value::Object(doc.clone()))?;
        let refs = self.registry.references_of(entity, &doc);
        let mut graph = self.graph.write();
        graph.upsert_document(&NodeRef::new(entity, id), &doc, &refs);
        self.flush_index(&graph)
    }

    fn flush_index(&self, graph: &GraphIndex) -> Result<()> {
        match &self.index_file {
            Some(file) => file.write(graph),
            None => Ok(()),
        }
    }

    fn after_write(&self, entity: &str, kind: WriteKind) {
        self.cache.invalidate_entity(entity);
        let _ = self.events.send(WriteEvent {
            entity: entity.to_string(),
            kind,
        });
    }
}

impl StoreProbe for DocumentStore {
    fn document_exists(&self, entity: &str, id: DocId) -> Result<bool> {
        Ok(self.layout.doc_exists(entity, id))
    }

    fn field_value_taken(
        &self,
        entity: &str,
        field: &str,
        value: &Value,
        excluding_id: DocId,
    ) -> Result<bool> {
        for id in self.layout.list_doc_ids(entity)? {
            if id == excluding_id {
                continue;
            }
            let Some(doc) = read_json_opt(&self.layout.doc_path(entity, id))? else {
                continue;
            };
            if doc.get(field) == Some(value) {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

fn check_id(id: DocId) -> Result<()> {
    if id == 0 {
        return Err(Error::validation("Invalid ID"));
    }
    Ok(())
}
