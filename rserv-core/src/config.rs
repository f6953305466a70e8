//! Recognized configuration options.
//!
//! Values come from four layers with the precedence
//! flag > process env > `.env`-style file > default. This module holds the
//! merged settings and the file/env layers; the CLI flag layer lives in the
//! server crate.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How a `null` in a PATCH body is applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchNull {
    /// Store the field as an explicit null
    #[default]
    Store,
    /// Remove the field from the stored document
    Delete,
}

/// Graph overlay mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GraphMode {
    /// In-memory edge index, rebuilt from a document scan at boot
    #[default]
    Memory,
    /// In-memory index plus the persisted `graph.index` file
    Indexed,
}

/// Per-document read cache driver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheKind {
    /// In-process TTL cache
    #[default]
    TtlCache,
    /// Remote key-value cache (external collaborator)
    Redis,
}

/// The full set of recognized options with their defaults.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Listen host
    pub host: String,
    /// Listen port
    pub port: u16,
    /// Null handling for PATCH bodies
    pub patch_null: PatchNull,
    /// Read-cache TTL in seconds
    pub cache_ttl: u64,
    /// Default page size for list/search
    pub default_page_size: usize,
    /// Active schema name (subdirectory of the schema root)
    pub schema: String,
    /// Enable transitive deletion of referencing documents
    pub cascading_delete: bool,
    /// Enable the graph overlay and query endpoints
    pub graph_enabled: bool,
    /// Graph overlay mode
    pub rserv_graph: GraphMode,
    /// Enable the full-text search endpoint
    pub fulltext_enabled: bool,
    /// Read cache driver
    pub cache_type: CacheKind,
    /// Redis host when `cache_type = redis`
    pub redis_host: String,
    /// Redis port when `cache_type = redis`
    pub redis_port: u16,
    /// Default traversal depth bound for graph queries
    pub max_query_depth: usize,
    /// Worker tasks executing graph queries
    pub query_worker_count: usize,
    /// Per-query wall clock in seconds
    pub query_timeout: u64,
    /// Default depth for reference embedding on read
    pub ref_embed_depth: usize,
    /// Seconds a finished job record is kept before eviction
    pub graph_query_ttl: u64,
    /// Seconds a cached query result stays valid
    pub graph_result_ttl: u64,
    /// Root directory for documents
    pub data_root: PathBuf,
    /// Root directory for schema files
    pub schema_root: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 9090,
            patch_null: PatchNull::Store,
            cache_ttl: 300,
            default_page_size: 10,
            schema: "default".to_string(),
            cascading_delete: false,
            graph_enabled: true,
            rserv_graph: GraphMode::Memory,
            fulltext_enabled: false,
            cache_type: CacheKind::TtlCache,
            redis_host: "localhost".to_string(),
            redis_port: 6379,
            max_query_depth: 10,
            query_worker_count: 4,
            query_timeout: 30,
            ref_embed_depth: 3,
            graph_query_ttl: 86_400,
            graph_result_ttl: 3_600,
            data_root: PathBuf::from("data"),
            schema_root: PathBuf::from("schema"),
        }
    }
}

impl Settings {
    /// Per-query wall clock as a `Duration`.
    pub fn query_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.query_timeout)
    }

    /// Apply one named option from its string form. Unknown keys are
    /// ignored so `.env` files and the process environment can carry
    /// unrelated variables.
    pub fn apply(&mut self, key: &str, raw: &str) -> Result<()> {
        let key = key.to_lowercase();
        match key.as_str() {
            "host" => self.host = raw.to_string(),
            "port" => self.port = parse(&key, raw)?,
            "patch_null" => {
                self.patch_null = match raw.to_lowercase().as_str() {
                    "store" => PatchNull::Store,
                    "delete" => PatchNull::Delete,
                    _ => return Err(bad_value(&key, raw)),
                }
            }
            "cache_ttl" => self.cache_ttl = parse(&key, raw)?,
            "default_page_size" => self.default_page_size = parse(&key, raw)?,
            "schema" | "schema_name" => self.schema = raw.to_string(),
            "cascading_delete" => self.cascading_delete = parse_bool(&key, raw)?,
            "graph_enabled" => self.graph_enabled = parse_bool(&key, raw)?,
            "rserv_graph" => {
                self.rserv_graph = match raw.to_lowercase().as_str() {
                    "memory" => GraphMode::Memory,
                    "indexed" => GraphMode::Indexed,
                    _ => return Err(bad_value(&key, raw)),
                }
            }
            "fulltext_enabled" => self.fulltext_enabled = parse_bool(&key, raw)?,
            "cache_type" => {
                self.cache_type = match raw.to_lowercase().as_str() {
                    "ttlcache" => CacheKind::TtlCache,
                    "redis" => CacheKind::Redis,
                    _ => return Err(bad_value(&key, raw)),
                }
            }
            "redis_host" => self.redis_host = raw.to_string(),
            "redis_port" => self.redis_port = parse(&key, raw)?,
            "max_query_depth" => self.max_query_depth = parse(&key, raw)?,
            "query_worker_count" => self.query_worker_count = parse(&key, raw)?,
            "query_timeout" => self.query_timeout = parse(&key, raw)?,
            "ref_embed_depth" => self.ref_embed_depth = parse(&key, raw)?,
            "graph_query_ttl" => self.graph_query_ttl = parse(&key, raw)?,
            "graph_result_ttl" => self.graph_result_ttl = parse(&key, raw)?,
            "data_root" => self.data_root = PathBuf::from(raw),
            "schema_root" => self.schema_root = PathBuf::from(raw),
            _ => {}
        }
        Ok(())
    }

    /// Layer an `.env`-style file over the current values.
    ///
    /// Lines are `KEY=VALUE`; blank lines and `#` comments are skipped.
    /// A missing file is not an error.
    pub fn apply_env_file(&mut self, path: &Path) -> Result<()> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(Error::Storage(format!("{}: {e}", path.display()))),
        };
        for (key, value) in parse_env_file(&content) {
            self.apply(&key, &value)?;
        }
        Ok(())
    }

    /// Layer the process environment over the current values.
    pub fn apply_process_env(&mut self) -> Result<()> {
        for (key, value) in std::env::vars() {
            self.apply(&key, &value)?;
        }
        Ok(())
    }
}

/// Parse `KEY=VALUE` lines into ordered pairs.
fn parse_env_file(content: &str) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            let value = value.trim().trim_matches('"').trim_matches('\'');
            out.insert(key.trim().to_string(), value.to_string());
        }
    }
    out
}

fn parse<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim().parse().map_err(|_| bad_value(key, raw))
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(bad_value(key, raw)),
    }
}

fn bad_value(key: &str, raw: &str) -> Error {
    Error::validation(format!("Invalid value for option {key}: {raw}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let s = Settings::default();
        assert_eq!(s.port, 9090);
        assert_eq!(s.patch_null, PatchNull::Store);
        assert_eq!(s.rserv_graph, GraphMode::Memory);
        assert!(!s.cascading_delete);
        assert_eq!(s.max_query_depth, 10);
    }

    #[test]
    fn test_apply_options() {
        let mut s = Settings::default();
        s.apply("PORT", "8080").unwrap();
        s.apply("patch_null", "delete").unwrap();
        s.apply("rserv_graph", "indexed").unwrap();
        s.apply("cascading_delete", "yes").unwrap();
        s.apply("SOME_UNRELATED_VAR", "x").unwrap();
        assert_eq!(s.port, 8080);
        assert_eq!(s.patch_null, PatchNull::Delete);
        assert_eq!(s.rserv_graph, GraphMode::Indexed);
        assert!(s.cascading_delete);
    }

    #[test]
    fn test_apply_rejects_bad_values() {
        let mut s = Settings::default();
        assert!(s.apply("port", "not-a-port").is_err());
        assert!(s.apply("patch_null", "maybe").is_err());
    }

    #[test]
    fn test_env_file_parsing() {
        let parsed = parse_env_file("# comment\nPORT=7070\n\nschema = test\nhost=\"127.0.0.1\"\n");
        assert_eq!(parsed.get("PORT").unwrap(), "7070");
        assert_eq!(parsed.get("schema").unwrap(), "test");
        assert_eq!(parsed.get("host").unwrap(), "127.0.0.1");
    }
}
