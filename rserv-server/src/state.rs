//! Application state shared across handlers.

use crate::jobs::JobManager;
use rserv_core::config::Settings;
use rserv_core::error::Result;
use rserv_core::value::NodeRef;
use rserv_store::DocumentStore;
use std::sync::Arc;

/// Full-text search indexer used by `/search`.
///
/// The indexer itself is an external collaborator; the server only needs
/// ranked node references back.
pub trait FulltextIndex: Send + Sync {
    /// Ranked references for a free-text query.
    fn search(&self, query: &str, limit: usize) -> Vec<NodeRef>;
}

/// Process-wide state handed to every handler.
pub struct AppState {
    /// Resolved configuration
    pub settings: Settings,
    /// The document store with its graph overlay
    pub store: Arc<DocumentStore>,
    /// Async query job manager
    pub jobs: JobManager,
    /// Optional full-text indexer
    pub fulltext: Option<Arc<dyn FulltextIndex>>,
}

impl AppState {
    /// Open the store and start the job workers. Must run inside a tokio
    /// runtime.
    pub fn new(settings: Settings) -> Result<Self> {
        let store = Arc::new(DocumentStore::open(&settings)?);
        let jobs = JobManager::start(Arc::clone(&store), &settings);
        Ok(Self {
            settings,
            store,
            jobs,
            fulltext: None,
        })
    }

    /// Attach a full-text indexer.
    pub fn with_fulltext(mut self, index: Arc<dyn FulltextIndex>) -> Self {
        self.fulltext = Some(index);
        self
    }
}
