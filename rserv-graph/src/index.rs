//! Bidirectional adjacency over all current reference values.
//!
//! For each node the index holds ordered sets of outbound `(label, target)`
//! and inbound `(label, source)` pairs, plus two type indexes used for seed
//! lookup in indexed mode: `nodes_by_type` and
//! `properties_by_type_field_value`. Ordered sets make adjacency iteration
//! deterministic: label ascending, then target id ascending.
//!
//! The index holds no locks of its own; the owner wraps it in a
//! reader-writer lock and updates it under the same lock that serialises
//! the document write.

use rserv_core::value::{json_cmp, JsonMap, NodeRef};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Edge label for a reference field: the upper-cased field name.
pub fn label_for_field(field: &str) -> String {
    field.to_uppercase()
}

/// One directed, labelled arc endpoint as stored in an adjacency set.
///
/// In the `out` map `peer` is the target; in the `in` map it is the source.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Edge {
    /// Upper-cased field name
    pub label: String,
    /// The node on the other end
    pub peer: NodeRef,
}

impl Edge {
    /// Create an edge entry.
    pub fn new(label: impl Into<String>, peer: NodeRef) -> Self {
        Self {
            label: label.into(),
            peer,
        }
    }
}

/// Separator for property index keys; never appears in entity or field names.
const PROP_KEY_SEP: char = '\u{1f}';

/// The process-wide edge index.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct GraphIndex {
    /// node -> ordered outbound (label, target)
    out: BTreeMap<NodeRef, BTreeSet<Edge>>,
    /// node -> ordered inbound (label, source)
    #[serde(rename = "in")]
    inbound: BTreeMap<NodeRef, BTreeSet<Edge>>,
    /// entity -> nodes of that entity
    nodes_by_type: BTreeMap<String, BTreeSet<NodeRef>>,
    /// `entity<US>field<US>value-json` -> nodes holding that value
    properties_by_type_field_value: BTreeMap<String, BTreeSet<NodeRef>>,
    /// node -> property index keys it occupies (for removal)
    prop_keys: BTreeMap<NodeRef, Vec<String>>,
}

impl GraphIndex {
    /// Empty index.
    pub fn new() -> Self {
        Self::default()
    }

    fn prop_key(entity: &str, field: &str, value: &Value) -> String {
        format!("{entity}{PROP_KEY_SEP}{field}{PROP_KEY_SEP}{value}")
    }

    /// Register or refresh a document: its node entry, its property index
    /// entries, and the edges derived from `refs` (field name, target).
    ///
    /// Existing outbound edges and property entries for the node are
    /// replaced wholesale, so a rewrite adds new edges and removes missing
    /// ones in one call.
    pub fn upsert_document(&mut self, node: &NodeRef, doc: &JsonMap, refs: &[(String, NodeRef)]) {
        self.remove_outbound(node);
        self.remove_props(node);

        self.nodes_by_type
            .entry(node.entity.clone())
            .or_default()
            .insert(node.clone());

        // Property index covers scalar non-reference fields only
        let mut keys = Vec::new();
        for (field, value) in doc {
            if refs.iter().any(|(f, _)| f == field) {
                continue;
            }
            if value.is_array() || value.is_object() {
                continue;
            }
            let key = Self::prop_key(&node.entity, field, value);
            self.properties_by_type_field_value
                .entry(key.clone())
                .or_default()
                .insert(node.clone());
            keys.push(key);
        }
        if !keys.is_empty() {
            self.prop_keys.insert(node.clone(), keys);
        }

        for (field, target) in refs {
            let label = label_for_field(field);
            self.out
                .entry(node.clone())
                .or_default()
                .insert(Edge::new(label.clone(), target.clone()));
            self.inbound
                .entry(target.clone())
                .or_default()
                .insert(Edge::new(label, node.clone()));
        }
    }

    /// Remove a document and every edge touching it.
    pub fn remove_document(&mut self, node: &NodeRef) {
        self.remove_outbound(node);
        self.remove_props(node);

        // Drop inbound edges and their mirror entries in the sources
        if let Some(incoming) = self.inbound.remove(node) {
            for edge in incoming {
                if let Some(src_out) = self.out.get_mut(&edge.peer) {
                    src_out.retain(|e| !(e.peer == *node && e.label == edge.label));
                    if src_out.is_empty() {
                        self.out.remove(&edge.peer);
                    }
                }
            }
        }

        if let Some(nodes) = self.nodes_by_type.get_mut(&node.entity) {
            nodes.remove(node);
            if nodes.is_empty() {
                self.nodes_by_type.remove(&node.entity);
            }
        }
    }

    fn remove_outbound(&mut self, node: &NodeRef) {
        if let Some(outgoing) = self.out.remove(node) {
            for edge in outgoing {
                if let Some(tgt_in) = self.inbound.get_mut(&edge.peer) {
                    tgt_in.retain(|e| !(e.peer == *node && e.label == edge.label));
                    if tgt_in.is_empty() {
                        self.inbound.remove(&edge.peer);
                    }
                }
            }
        }
    }

    fn remove_props(&mut self, node: &NodeRef) {
        if let Some(keys) = self.prop_keys.remove(node) {
            for key in keys {
                if let Some(nodes) = self.properties_by_type_field_value.get_mut(&key) {
                    nodes.remove(node);
                    if nodes.is_empty() {
                        self.properties_by_type_field_value.remove(&key);
                    }
                }
            }
        }
    }

    /// Outbound `(label, target)` pairs in deterministic order.
    pub fn out_edges(&self, node: &NodeRef) -> impl Iterator<Item = &Edge> {
        self.out.get(node).into_iter().flatten()
    }

    /// Inbound `(label, source)` pairs in deterministic order.
    pub fn in_edges(&self, node: &NodeRef) -> impl Iterator<Item = &Edge> {
        self.inbound.get(node).into_iter().flatten()
    }

    /// Distinct neighbours over the undirected union of in and out edges.
    pub fn undirected_neighbors(&self, node: &NodeRef) -> BTreeSet<&NodeRef> {
        self.out_edges(node)
            .chain(self.in_edges(node))
            .map(|e| &e.peer)
            .collect()
    }

    /// Nodes whose entity matches a Sulpher type name
    /// (`User` ↔ entity `users`).
    pub fn nodes_of_type<'a>(&'a self, type_name: &str) -> Vec<&'a NodeRef> {
        let mut nodes = Vec::new();
        for (entity, set) in &self.nodes_by_type {
            if rserv_core::value::entity_matches_type(entity, type_name) {
                nodes.extend(set.iter());
            }
        }
        nodes
    }

    /// Nodes of an entity holding `value` in a scalar `field`.
    pub fn nodes_with_property<'a>(
        &'a self,
        entity: &str,
        field: &str,
        value: &Value,
    ) -> Vec<&'a NodeRef> {
        self.properties_by_type_field_value
            .get(&Self::prop_key(entity, field, value))
            .into_iter()
            .flatten()
            .collect()
    }

    /// Entities present in the index, with their nodes.
    pub fn entities(&self) -> impl Iterator<Item = (&String, &BTreeSet<NodeRef>)> {
        self.nodes_by_type.iter()
    }

    /// All indexed nodes in deterministic order.
    pub fn all_nodes(&self) -> impl Iterator<Item = &NodeRef> {
        self.nodes_by_type.values().flatten()
    }

    /// Is this node known to the index?
    pub fn contains(&self, node: &NodeRef) -> bool {
        self.nodes_by_type
            .get(&node.entity)
            .is_some_and(|set| set.contains(node))
    }

    /// Number of indexed nodes.
    pub fn node_count(&self) -> usize {
        self.nodes_by_type.values().map(BTreeSet::len).sum()
    }

    /// Number of reference entries (directed edges).
    pub fn edge_count(&self) -> usize {
        self.out.values().map(BTreeSet::len).sum()
    }

    /// Compare two scalar property values the way the property index does.
    pub fn property_values_equal(a: &Value, b: &Value) -> bool {
        json_cmp(a, b) == std::cmp::Ordering::Equal
    }
}
