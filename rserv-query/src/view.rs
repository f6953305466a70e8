//! The executor's window onto the graph.
//!
//! A [`GraphView`] joins adjacency (from the edge index) with node
//! properties (from the document store). The executor sees nothing else, so
//! the server can hand it a snapshot and tests can hand it a fixture.

use rserv_core::value::{entity_matches_type, JsonMap, NodeRef};
use rserv_graph::GraphIndex;
use serde_json::Value;
use std::collections::BTreeMap;

/// Read access to nodes, properties, and adjacency.
pub trait GraphView: Send + Sync {
    /// Every node, in deterministic order.
    fn all_nodes(&self) -> Vec<NodeRef>;

    /// Nodes whose entity matches a Sulpher type name.
    fn nodes_of_type(&self, type_name: &str) -> Vec<NodeRef>;

    /// Property-indexed seed lookup: nodes holding `value` in `field`.
    ///
    /// Returns `None` when no property index is available (memory mode);
    /// the planner then falls back to a scan.
    fn nodes_with_property(
        &self,
        type_name: Option<&str>,
        field: &str,
        value: &Value,
    ) -> Option<Vec<NodeRef>>;

    /// One property of a node. Reference fields are not properties.
    fn node_property(&self, node: &NodeRef, field: &str) -> Option<Value>;

    /// The node payload: document fields excluding reference fields.
    fn node_properties(&self, node: &NodeRef) -> JsonMap;

    /// Outbound `(label, target)` pairs, label then target ascending.
    fn out_edges(&self, node: &NodeRef) -> Vec<(String, NodeRef)>;

    /// Inbound `(label, source)` pairs, label then source ascending.
    fn in_edges(&self, node: &NodeRef) -> Vec<(String, NodeRef)>;
}

/// Self-contained view over an in-memory index and document set.
///
/// Used by executor tests and anywhere a snapshot has already been
/// materialised.
#[derive(Debug, Default)]
pub struct MemoryGraphView {
    index: GraphIndex,
    docs: BTreeMap<NodeRef, JsonMap>,
    ref_fields: BTreeMap<NodeRef, Vec<String>>,
    /// Expose the property index to the planner
    indexed: bool,
}

impl MemoryGraphView {
    /// Empty view; `indexed` controls whether property lookups are offered
    /// to the planner.
    pub fn new(indexed: bool) -> Self {
        Self {
            indexed,
            ..Self::default()
        }
    }

    /// Insert a document with its reference fields
    /// (`field name -> target`).
    pub fn insert(&mut self, node: NodeRef, doc: JsonMap, refs: Vec<(String, NodeRef)>) {
        self.index.upsert_document(&node, &doc, &refs);
        self.ref_fields
            .insert(node.clone(), refs.iter().map(|(f, _)| f.clone()).collect());
        self.docs.insert(node, doc);
    }

    /// The underlying index.
    pub fn index(&self) -> &GraphIndex {
        &self.index
    }
}

impl GraphView for MemoryGraphView {
    fn all_nodes(&self) -> Vec<NodeRef> {
        self.docs.keys().cloned().collect()
    }

    fn nodes_of_type(&self, type_name: &str) -> Vec<NodeRef> {
        self.docs
            .keys()
            .filter(|n| entity_matches_type(&n.entity, type_name))
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
        if self
            .ref_fields
            .get(node)
            .is_some_and(|fields| fields.iter().any(|f| f == field))
        {
            return None;
        }
        self.docs.get(node)?.get(field).cloned()
    }

    fn node_properties(&self, node: &NodeRef) -> JsonMap {
        let Some(doc) = self.docs.get(node) else {
            return JsonMap::new();
        };
        let refs = self.ref_fields.get(node);
        doc.iter()
            .filter(|(field, _)| {
                !refs.is_some_and(|fields| fields.iter().any(|f| &f == field))
            })
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
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
