//! Graph overlay for rserv.
//!
//! Documents become nodes, reference-typed fields become directed labelled
//! edges. This crate maintains the bidirectional adjacency index (optionally
//! persisted to `graph.index`) and implements the specialised algorithms
//! behind the graph REST endpoints.

pub mod algo;
pub mod index;
pub mod persist;

pub use algo::{aggregate_values, Aggregation, Direction};
pub use index::{label_for_field, Edge, GraphIndex};
pub use persist::IndexFile;
