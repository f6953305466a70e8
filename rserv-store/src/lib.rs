//! Document store for rserv.
//!
//! CRUD over per-document JSON files with schema validation, the patch-null
//! policy, cascade deletion, list/search with pagination, and incremental
//! maintenance of the graph overlay. Every write invalidates the read cache
//! for the touched entities and broadcasts a [`WriteEvent`] so the async
//! query result cache can evict.

pub mod events;
pub mod list;
pub mod store;

pub use events::{WriteEvent, WriteKind};
pub use list::{Page, SortKey};
pub use store::DocumentStore;
