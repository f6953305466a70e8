//! Async query job manager.
//!
//! Submissions enter a bounded queue consumed by a fixed pool of worker
//! tasks. Completed results live in an LRU cache with a per-entry TTL,
//! keyed by the canonicalised query string; any write event through the
//! store evicts the whole cache (conservative and correct at prototyping
//! scale). Finished job records are swept after their own TTL.

use crate::view::StoreGraphView;
use chrono::{DateTime, Utc};
use lru::LruCache;
use parking_lot::{Mutex, RwLock};
use rserv_core::config::{GraphMode, Settings};
use rserv_core::value::JsonMap;
use rserv_query::exec::{execute, ExecOptions};
use rserv_query::{canonicalize, parse_query};
use rserv_store::DocumentStore;
use serde::Serialize;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};
use uuid::Uuid;

const QUEUE_CAPACITY: usize = 256;
const RESULT_CACHE_CAPACITY: usize = 256;
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Lifecycle of a graph query job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Queued, no worker has picked it up
    Pending,
    /// A worker is executing it
    Running,
    /// Terminal: results available
    Completed,
    /// Terminal: error available
    Failed,
}

impl JobStatus {
    /// Completed or failed.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// Execution counters surfaced with status and results.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct JobStats {
    /// Binding expansions performed
    pub nodes_traversed: u64,
}

/// A failed job's stored error.
#[derive(Debug, Clone)]
pub struct JobError {
    /// HTTP status the error maps to
    pub status_code: u16,
    /// Error message
    pub message: String,
}

/// One submitted query.
#[derive(Debug, Clone)]
pub struct Job {
    /// Job id
    pub id: Uuid,
    /// Query string as submitted
    pub query: String,
    /// Canonicalised cache key
    pub canonical: String,
    /// Depth bound for this run
    pub max_depth: usize,
    /// Current lifecycle state
    pub status: JobStatus,
    /// Submission time
    pub submitted_at: DateTime<Utc>,
    /// Terminal transition time
    pub finished_at: Option<DateTime<Utc>>,
    /// Result rows when completed
    pub results: Option<Vec<JsonMap>>,
    /// Error when failed
    pub error: Option<JobError>,
    /// Execution counters
    pub stats: JobStats,
}

/// Outcome of a submission.
pub enum Submission {
    /// The canonical query hit the result cache
    Cached {
        /// Cached result rows
        results: Vec<JsonMap>,
        /// Stats recorded at execution time
        stats: JobStats,
    },
    /// A new job was queued
    Accepted {
        /// Its id, for polling
        query_id: Uuid,
    },
}

struct CachedResult {
    results: Vec<JsonMap>,
    stats: JobStats,
    expires_at: Instant,
}

struct Inner {
    jobs: RwLock<HashMap<Uuid, Job>>,
    results: Mutex<LruCache<String, CachedResult>>,
    store: Arc<DocumentStore>,
    indexed: bool,
    timeout: Duration,
    result_ttl: Duration,
    job_ttl: Duration,
}

/// Handle to the job table, worker pool, and result cache.
#[derive(Clone)]
pub struct JobManager {
    inner: Arc<Inner>,
    tx: mpsc::Sender<Uuid>,
}

impl JobManager {
    /// Start the worker pool and maintenance tasks. Must run inside a
    /// tokio runtime.
    pub fn start(store: Arc<DocumentStore>, settings: &Settings) -> Self {
        let (tx, rx) = mpsc::channel::<Uuid>(QUEUE_CAPACITY);
        let inner = Arc::new(Inner {
            jobs: RwLock::new(HashMap::new()),
            results: Mutex::new(LruCache::new(
                NonZeroUsize::new(RESULT_CACHE_CAPACITY).unwrap_or(NonZeroUsize::MIN),
            )),
            store: Arc::clone(&store),
            indexed: settings.rserv_graph == GraphMode::Indexed,
            timeout: settings.query_timeout_duration(),
            result_ttl: Duration::from_secs(settings.graph_result_ttl),
            job_ttl: Duration::from_secs(settings.graph_query_ttl),
        });

        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        for worker in 0..settings.query_worker_count.max(1) {
            let inner = Arc::clone(&inner);
            let rx = Arc::clone(&rx);
            tokio::spawn(async move {
                loop {
                    let next = { rx.lock().await.recv().await };
                    match next {
                        Some(id) => run_job(&inner, id).await,
                        None => break,
                    }
                }
                debug!(worker, "query worker stopped");
            });
        }

        // Evict all cached results on any write
        let invalidation = Arc::clone(&inner);
        let mut events = store.subscribe();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {
                        invalidation.results.lock().clear();
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        // Sweep finished job records past their TTL
        let sweeper = Arc::clone(&inner);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(SWEEP_INTERVAL);
            loop {
                tick.tick().await;
                let cutoff = Utc::now()
                    - chrono::Duration::from_std(sweeper.job_ttl)
                        .unwrap_or_else(|_| chrono::Duration::seconds(86_400));
                sweeper.jobs.write().retain(|_, job| {
                    !(job.status.is_terminal()
                        && job.finished_at.map_or(false, |t| t < cutoff))
                });
            }
        });

        Self { inner, tx }
    }

    /// Submit a query: a cache hit returns the stored result, otherwise a
    /// new pending job is queued.
    pub async fn submit(&self, query: String, max_depth: usize) -> Submission {
        let canonical = canonicalize(&query);

        {
            let mut results = self.inner.results.lock();
            if let Some(hit) = results.get(&canonical) {
                if hit.expires_at > Instant::now() {
                    return Submission::Cached {
                        results: hit.results.clone(),
                        stats: hit.stats,
                    };
                }
                results.pop(&canonical);
            }
        }

        let job = Job {
            id: Uuid::new_v4(),
            query,
            canonical,
            max_depth,
            status: JobStatus::Pending,
            submitted_at: Utc::now(),
            finished_at: None,
            results: None,
            error: None,
            stats: JobStats::default(),
        };
        let id = job.id;
        self.inner.jobs.write().insert(id, job);

        if self.tx.send(id).await.is_err() {
            warn!(%id, "query queue closed, failing job");
            let mut jobs = self.inner.jobs.write();
            if let Some(job) = jobs.get_mut(&id) {
                job.status = JobStatus::Failed;
                job.finished_at = Some(Utc::now());
                job.error = Some(JobError {
                    status_code: 500,
                    message: "query queue unavailable".to_string(),
                });
            }
        }
        Submission::Accepted { query_id: id }
    }

    /// Snapshot one job.
    pub fn job(&self, id: Uuid) -> Option<Job> {
        self.inner.jobs.read().get(&id).cloned()
    }
}

/// Execute one job on a blocking thread and record the outcome.
async fn run_job(inner: &Arc<Inner>, id: Uuid) {
    let Some((query, max_depth)) = ({
        let mut jobs = inner.jobs.write();
        jobs.get_mut(&id).map(|job| {
            job.status = JobStatus::Running;
            (job.query.clone(), job.max_depth)
        })
    }) else {
        return;
    };

    let view = StoreGraphView::snapshot(Arc::clone(&inner.store), inner.indexed);
    let opts = ExecOptions {
        max_depth,
        deadline: Some(Instant::now() + inner.timeout),
    };
    let outcome = tokio::task::spawn_blocking(move || {
        let parsed = parse_query(&query)?;
        execute(&parsed, &view, &opts)
    })
    .await;

    let mut jobs = inner.jobs.write();
    let Some(job) = jobs.get_mut(&id) else { return };
    job.finished_at = Some(Utc::now());

    match outcome {
        Ok(Ok((rows, exec_stats))) => {
            job.status = JobStatus::Completed;
            job.stats = JobStats {
                nodes_traversed: exec_stats.nodes_traversed,
            };
            job.results = Some(rows.clone());
            inner.results.lock().put(
                job.canonical.clone(),
                CachedResult {
                    results: rows,
                    stats: job.stats,
                    expires_at: Instant::now() + inner.result_ttl,
                },
            );
            debug!(%id, nodes = job.stats.nodes_traversed, "query completed");
        }
        Ok(Err(err)) => {
            job.status = JobStatus::Failed;
            job.error = Some(JobError {
                status_code: err.status_code(),
                message: err.to_string(),
            });
            debug!(%id, error = %err, "query failed");
        }
        Err(join_err) => {
            job.status = JobStatus::Failed;
            job.error = Some(JobError {
                status_code: 500,
                message: format!("query execution aborted: {join_err}"),
            });
        }
    }
}
