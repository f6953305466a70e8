//! Graph view over the live store.
//!
//! Snapshots the edge index at construction (queries see the adjacency as
//! of execution start) and reads node properties through the store's
//! cached document reads.

use rserv_core::value::{entity_matches_type, JsonMap, NodeRef};
use rserv_graph::GraphIndex;
use rserv_query::GraphView;
use rserv_store::DocumentStore;
use serde_json::Value;
use std::sync::Arc;

/// Adjacency snapshot plus store-backed property access.
pub struct StoreGraphView {
    store: Arc<DocumentStore>,
    index: GraphIndex,
    indexed: bool,
}

impl StoreGraphView {
    /// Snapshot the current edge index. `indexed` exposes the property
    /// index to the planner (indexed graph mode).
    pub fn snapshot(store: Arc<DocumentStore>, indexed: bool) -> Self {
        let index = store.graph().read().clone();
        Self {
            store,
            index,
            indexed,
        }
    }
}

impl GraphView for StoreGraphView {
    fn all_nodes(&self) -> Vec<NodeRef> {
        self.index.all_nodes().cloned().collect()
    }

    fn nodes_of_type(&self, type_name: &str) -> Vec<NodeRef> {
        self.index
            .nodes_of_type(type_name)
            .into_iter()
            .cloned()
            .collect()
    }

    fn nodes_with_property(
        &self,
        type_name: Option<&str>,
        field: &str,
        value: &Value,
    ) -> Option<Vec<NodeRef>> {
        if !self.indexed {
            return None;
        }
        let mut nodes = Vec::new();
        for (entity, _) in self.index.entities() {
            if type_name.map_or(true, |t| entity_matches_type(entity, t)) {
                nodes.extend(
                    self.index
                        .nodes_with_property(entity, field, value)
                        .into_iter()
                        .cloned(),
                );
            }
        }
        Some(nodes)
    }

    fn node_property(&self, node: &NodeRef, field: &str) -> Option<Value> {
        self.store
            .node_properties(node)
            .ok()?
            .get(field)
            .cloned()
    }

    fn node_properties(&self, node: &NodeRef) -> JsonMap {
        self.store.node_properties(node).unwrap_or_default()
    }

    fn out_edges(&self, node: &NodeRef) -> Vec<(String, NodeRef)> {
        self.index
            .out_edges(node)
            .map(|e| (e.label.clone(), e.peer.clone()))
            .collect()
    }

    fn in_edges(&self, node: &NodeRef) -> Vec<(String, NodeRef)> {
        self.index
            .in_edges(node)
            .map(|e| (e.label.clone(), e.peer.clone()))
            .collect()
    }
}
