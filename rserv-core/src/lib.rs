//! Core types and storage primitives for rserv.
//!
//! This crate holds everything the higher layers share: the JSON value and
//! reference model, the error taxonomy, recognized configuration options,
//! the on-disk path layout, atomic file I/O with advisory locking, the
//! per-entity ID allocator, the schema registry and validator, and the
//! read-through document cache trait.

pub mod alloc;
pub mod cache;
pub mod config;
pub mod error;
pub mod fsio;
pub mod paths;
pub mod schema;
pub mod value;

pub use cache::{DocCache, MemoryTtlCache, NoCache};
pub use config::{CacheKind, GraphMode, PatchNull, Settings};
pub use error::{Error, Result};
pub use paths::Layout;
pub use schema::{FieldSpec, FieldType, Schema, SchemaRegistry, StoreProbe, ValidateMode};
pub use value::{DocId, JsonMap, NodeRef, RefValue};
