//! Read-through document cache.
//!
//! The store consults a `DocCache` before hitting disk and invalidates the
//! written entity's keys after every write. The in-process TTL driver lives
//! here; the remote key-value driver is an external collaborator behind the
//! same trait.

use crate::value::DocId;
use lru::LruCache;
use parking_lot::Mutex;
use serde_json::Value;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

/// Per-document read cache.
pub trait DocCache: Send + Sync {
    /// Cached document, if fresh.
    fn get(&self, entity: &str, id: DocId) -> Option<Value>;

    /// Cache a document after a disk read or write.
    fn put(&self, entity: &str, id: DocId, doc: Value);

    /// Drop every key belonging to an entity.
    fn invalidate_entity(&self, entity: &str);

    /// Drop everything.
    fn clear(&self);
}

/// Cache that caches nothing.
#[derive(Debug, Default)]
pub struct NoCache;

impl DocCache for NoCache {
    fn get(&self, _entity: &str, _id: DocId) -> Option<Value> {
        None
    }
    fn put(&self, _entity: &str, _id: DocId, _doc: Value) {}
    fn invalidate_entity(&self, _entity: &str) {}
    fn clear(&self) {}
}

/// In-process LRU cache with a per-entry TTL.
#[derive(Debug)]
pub struct MemoryTtlCache {
    entries: Mutex<LruCache<String, (Value, Instant)>>,
    ttl: Duration,
}

impl MemoryTtlCache {
    /// Create a cache holding up to `capacity` documents for `ttl` each.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN),
            )),
            ttl,
        }
    }

    fn key(entity: &str, id: DocId) -> String {
        format!("{entity}:{id}")
    }
}

impl DocCache for MemoryTtlCache {
    fn get(&self, entity: &str, id: DocId) -> Option<Value> {
        let mut entries = self.entries.lock();
        let key = Self::key(entity, id);
        match entries.get(&key) {
            Some((doc, stored_at)) if stored_at.elapsed() < self.ttl => Some(doc.clone()),
            Some(_) => {
                entries.pop(&key);
                None
            }
            None => None,
        }
    }

    fn put(&self, entity: &str, id: DocId, doc: Value) {
        self.entries
            .lock()
            .put(Self::key(entity, id), (doc, Instant::now()));
    }

    fn invalidate_entity(&self, entity: &str) {
        let mut entries = self.entries.lock();
        let prefix = format!("{entity}:");
        let stale: Vec<String> = entries
            .iter()
            .filter(|(k, _)| k.starts_with(&prefix))
            .map(|(k, _)| k.clone())
            .collect();
        for key in stale {
            entries.pop(&key);
        }
    }

    fn clear(&self) {
        self.entries.lock().clear();
    }
}
