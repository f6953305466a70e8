//! Specialised graph algorithms behind the REST endpoints.
//!
//! Path algorithms run on the undirected union of in and out edges; degree
//! and neighbour listings respect direction. All traversal is bounded by a
//! caller-supplied depth.

use crate::index::GraphIndex;
use rserv_core::error::{Error, Result};
use rserv_core::value::NodeRef;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::str::FromStr;

/// Edge direction selector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Direction {
    /// Inbound edges only
    In,
    /// Outbound edges only
    Out,
    /// Both directions
    #[default]
    All,
}

impl FromStr for Direction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "in" => Ok(Direction::In),
            "out" => Ok(Direction::Out),
            "all" => Ok(Direction::All),
            other => Err(Error::validation(format!("Invalid direction: {other}"))),
        }
    }
}

/// Aggregation over neighbourhood property values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregation {
    /// Number of present values
    Count,
    /// Numeric sum
    Sum,
    /// Numeric mean
    Avg,
}

impl FromStr for Aggregation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "count" => Ok(Aggregation::Count),
            "sum" => Ok(Aggregation::Sum),
            "avg" => Ok(Aggregation::Avg),
            other => Err(Error::validation(format!(
                "Invalid aggregation function: {other}"
            ))),
        }
    }
}

/// BFS shortest path on the undirected edge union.
///
/// Returns the node sequence from `start` to `end`, or `None` when no path
/// exists within `max_depth` hops. Depth 0 succeeds only for
/// `start == end`.
pub fn shortest_path(
    index: &GraphIndex,
    start: &NodeRef,
    end: &NodeRef,
    max_depth: usize,
) -> Option<Vec<NodeRef>> {
    if start == end {
        return Some(vec![start.clone()]);
    }
    let mut parents: BTreeMap<NodeRef, NodeRef> = BTreeMap::new();
    let mut queue = VecDeque::from([(start.clone(), 0usize)]);

    while let Some((node, depth)) = queue.pop_front() {
        if depth == max_depth {
            continue;
        }
        for neighbor in index.undirected_neighbors(&node) {
            if neighbor == start || parents.contains_key(neighbor) {
                continue;
            }
            parents.insert(neighbor.clone(), node.clone());
            if neighbor == end {
                let mut path = vec![end.clone()];
                let mut cursor = end;
                while let Some(parent) = parents.get(cursor) {
                    path.push(parent.clone());
                    cursor = parent;
                }
                path.reverse();
                return Some(path);
            }
            queue.push_back((neighbor.clone(), depth + 1));
        }
    }
    None
}

/// Does any path of length `<= max_depth` connect the two nodes?
///
/// Same traversal as [`shortest_path`] but exits on first discovery.
pub fn path_exists(
    index: &GraphIndex,
    start: &NodeRef,
    end: &NodeRef,
    max_depth: usize,
) -> bool {
    if start == end {
        return true;
    }
    let mut seen: BTreeSet<NodeRef> = BTreeSet::from([start.clone()]);
    let mut queue = VecDeque::from([(start.clone(), 0usize)]);

    while let Some((node, depth)) = queue.pop_front() {
        if depth == max_depth {
            continue;
        }
        for neighbor in index.undirected_neighbors(&node) {
            if neighbor == end {
                return true;
            }
            if seen.insert(neighbor.clone()) {
                queue.push_back((neighbor.clone(), depth + 1));
            }
        }
    }
    false
}

/// Intersection of the outbound neighbour sets of `a` and `b`.
pub fn common_neighbors(index: &GraphIndex, a: &NodeRef, b: &NodeRef) -> Vec<NodeRef> {
    let of_a: BTreeSet<&NodeRef> = index.out_edges(a).map(|e| &e.peer).collect();
    let of_b: BTreeSet<&NodeRef> = index.out_edges(b).map(|e| &e.peer).collect();
    of_a.intersection(&of_b).map(|n| (*n).clone()).collect()
}

/// Edge count from the index for one direction.
///
/// `degree(n, All) = degree(n, In) + degree(n, Out)`.
pub fn degree(index: &GraphIndex, node: &NodeRef, direction: Direction) -> usize {
    match direction {
        Direction::In => index.in_edges(node).count(),
        Direction::Out => index.out_edges(node).count(),
        Direction::All => index.in_edges(node).count() + index.out_edges(node).count(),
    }
}

/// Distinct edge labels incident to a node in the given direction.
pub fn relationship_labels(
    index: &GraphIndex,
    node: &NodeRef,
    direction: Direction,
) -> Vec<String> {
    let labels: BTreeSet<&str> = match direction {
        Direction::In => index.in_edges(node).map(|e| e.label.as_str()).collect(),
        Direction::Out => index.out_edges(node).map(|e| e.label.as_str()).collect(),
        Direction::All => index
            .in_edges(node)
            .chain(index.out_edges(node))
            .map(|e| e.label.as_str())
            .collect(),
    };
    labels.into_iter().map(String::from).collect()
}

/// Distinct nodes within `depth` undirected hops of `seed`, excluding the
/// seed itself. Depth 0 yields nothing.
pub fn neighborhood(index: &GraphIndex, seed: &NodeRef, depth: usize) -> Vec<NodeRef> {
    let mut seen: BTreeSet<NodeRef> = BTreeSet::from([seed.clone()]);
    let mut queue = VecDeque::from([(seed.clone(), 0usize)]);
    let mut visited = Vec::new();

    while let Some((node, d)) = queue.pop_front() {
        if d == depth {
            continue;
        }
        for neighbor in index.undirected_neighbors(&node) {
            if seen.insert(neighbor.clone()) {
                visited.push(neighbor.clone());
                queue.push_back((neighbor.clone(), d + 1));
            }
        }
    }
    visited
}

/// Apply an aggregation to collected property values.
///
/// Missing values are skipped by the caller; `sum`/`avg` require every
/// remaining value to be numeric.
pub fn aggregate_values(aggregation: Aggregation, values: &[Value]) -> Result<Value> {
    match aggregation {
        Aggregation::Count => Ok(Value::from(values.len())),
        Aggregation::Sum | Aggregation::Avg => {
            let mut sum = 0f64;
            for value in values {
                let n = value.as_f64().ok_or_else(|| {
                    Error::validation(format!("Aggregation requires numeric values, got {value}"))
                })?;
                sum += n;
            }
            match aggregation {
                Aggregation::Sum => Ok(Value::from(sum)),
                _ if values.is_empty() => Ok(Value::Null),
                _ => Ok(Value::from(sum / values.len() as f64)),
            }
        }
    }
}
