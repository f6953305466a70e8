//! CLI flag layer over the recognized options.
//!
//! Resolution order: defaults, then the `.env`-style config file, then the
//! process environment, then explicit flags.

use clap::Parser;
use rserv_core::config::Settings;
use rserv_core::error::Result;
use std::path::PathBuf;

/// rserv server configuration flags.
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "rserv", version, about = "A lightweight REST prototyping server")]
pub struct ServerConfig {
    /// Listen host
    #[arg(long)]
    pub host: Option<String>,

    /// Listen port
    #[arg(long)]
    pub port: Option<u16>,

    /// Null handling for PATCH bodies: store | delete
    #[arg(long)]
    pub patch_null: Option<String>,

    /// Read-cache TTL in seconds
    #[arg(long)]
    pub cache_ttl: Option<u64>,

    /// Default page size for list/search
    #[arg(long)]
    pub default_page_size: Option<usize>,

    /// Active schema name
    #[arg(long)]
    pub schema: Option<String>,

    /// Transitively delete referencing documents
    #[arg(long)]
    pub cascading_delete: Option<bool>,

    /// Enable the graph overlay and query endpoints
    #[arg(long)]
    pub graph_enabled: Option<bool>,

    /// Graph overlay mode: memory | indexed
    #[arg(long)]
    pub rserv_graph: Option<String>,

    /// Enable the full-text search endpoint
    #[arg(long)]
    pub fulltext_enabled: Option<bool>,

    /// Read cache driver: ttlcache | redis
    #[arg(long)]
    pub cache_type: Option<String>,

    /// Redis host when cache_type = redis
    #[arg(long)]
    pub redis_host: Option<String>,

    /// Redis port when cache_type = redis
    #[arg(long)]
    pub redis_port: Option<u16>,

    /// Default traversal depth bound for graph queries
    #[arg(long)]
    pub max_query_depth: Option<usize>,

    /// Worker tasks executing graph queries
    #[arg(long)]
    pub query_worker_count: Option<usize>,

    /// Per-query wall clock in seconds
    #[arg(long)]
    pub query_timeout: Option<u64>,

    /// Default depth for reference embedding on read
    #[arg(long)]
    pub ref_embed_depth: Option<usize>,

    /// Seconds a finished job record is kept
    #[arg(long)]
    pub graph_query_ttl: Option<u64>,

    /// Seconds a cached query result stays valid
    #[arg(long)]
    pub graph_result_ttl: Option<u64>,

    /// Root directory for documents
    #[arg(long)]
    pub data_root: Option<PathBuf>,

    /// Root directory for schema files
    #[arg(long)]
    pub schema_root: Option<PathBuf>,

    /// `.env`-style config file
    #[arg(long, default_value = ".env")]
    pub config_file: PathBuf,
}

impl ServerConfig {
    /// Merge all four layers into the final settings.
    pub fn resolve(&self) -> Result<Settings> {
        let mut settings = Settings::default();
        settings.apply_env_file(&self.config_file)?;
        settings.apply_process_env()?;

        if let Some(v) = &self.host {
            settings.host = v.clone();
        }
        if let Some(v) = self.port {
            settings.port = v;
        }
        if let Some(v) = &self.patch_null {
            settings.apply("patch_null", v)?;
        }
        if let Some(v) = self.cache_ttl {
            settings.cache_ttl = v;
        }
        if let Some(v) = self.default_page_size {
            settings.default_page_size = v;
        }
        if let Some(v) = &self.schema {
            settings.schema = v.clone();
        }
        if let Some(v) = self.cascading_delete {
            settings.cascading_delete = v;
        }
        if let Some(v) = self.graph_enabled {
            settings.graph_enabled = v;
        }
        if let Some(v) = &self.rserv_graph {
            settings.apply("rserv_graph", v)?;
        }
        if let Some(v) = self.fulltext_enabled {
            settings.fulltext_enabled = v;
        }
        if let Some(v) = &self.cache_type {
            settings.apply("cache_type", v)?;
        }
        if let Some(v) = &self.redis_host {
            settings.redis_host = v.clone();
        }
        if let Some(v) = self.redis_port {
            settings.redis_port = v;
        }
        if let Some(v) = self.max_query_depth {
            settings.max_query_depth = v;
        }
        if let Some(v) = self.query_worker_count {
            settings.query_worker_count = v;
        }
        if let Some(v) = self.query_timeout {
            settings.query_timeout = v;
        }
        if let Some(v) = self.ref_embed_depth {
            settings.ref_embed_depth = v;
        }
        if let Some(v) = self.graph_query_ttl {
            settings.graph_query_ttl = v;
        }
        if let Some(v) = self.graph_result_ttl {
            settings.graph_result_ttl = v;
        }
        if let Some(v) = &self.data_root {
            settings.data_root = v.clone();
        }
        if let Some(v) = &self.schema_root {
            settings.schema_root = v.clone();
        }

        Ok(settings)
    }
}
