//! Seed selection.
//!
//! Before traversal, the planner picks the pattern element to enumerate
//! first. In order of preference: a variable already bound by an earlier
//! clause, a variable constrained by a WHERE equality that the view can
//! answer from its property index, an element with both a literal type and
//! property constraints, and finally the first element.

use crate::ast::{CmpOp, Expr, MatchClause};
use crate::view::GraphView;
use serde_json::Value;
use std::collections::HashSet;

/// The chosen seed for one MATCH clause.
#[derive(Debug, Clone, PartialEq)]
pub struct SeedPlan {
    /// Index of the seed element within the pattern
    pub element: usize,
    /// Equality `(field, value)` answerable from the property index
    pub indexed_eq: Option<(String, Value)>,
}

/// Choose the seed element for a clause.
pub fn choose_seed(
    clause: &MatchClause,
    view: &dyn GraphView,
    prebound: &HashSet<String>,
) -> SeedPlan {
    let elements: Vec<_> = clause.pattern.elements().collect();

    // A variable bound by a previous clause pins the join point
    if let Some(idx) = elements.iter().position(|e| prebound.contains(&e.var)) {
        return SeedPlan {
            element: idx,
            indexed_eq: None,
        };
    }

    // WHERE equality the property index can answer
    let equalities = equality_conjuncts(clause);
    for (idx, element) in elements.iter().enumerate() {
        for (var, field, value) in &equalities {
            if *var != element.var {
                continue;
            }
            let indexed = view
                .nodes_with_property(element.label.as_deref(), field, value)
                .is_some();
            if indexed {
                return SeedPlan {
                    element: idx,
                    indexed_eq: Some((field.to_string(), (*value).clone())),
                };
            }
        }
    }

    // Literal type plus property constraint
    if let Some(idx) = elements
        .iter()
        .position(|e| e.label.is_some() && !e.props.is_empty())
    {
        return SeedPlan {
            element: idx,
            indexed_eq: None,
        };
    }

    SeedPlan {
        element: 0,
        indexed_eq: None,
    }
}

/// Top-level `var.field = literal` conjuncts of the clause filter.
fn equality_conjuncts(clause: &MatchClause) -> Vec<(&str, &str, &Value)> {
    let Some(filter) = &clause.filter else {
        return Vec::new();
    };
    filter
        .conjuncts()
        .into_iter()
        .filter_map(|conjunct| match conjunct {
            Expr::Cmp {
                var,
                field,
                op: CmpOp::Eq,
                value,
            } => Some((var.as_str(), field.as_str(), value)),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse_query;
    use crate::view::MemoryGraphView;
    use rserv_core::value::NodeRef;
    use serde_json::json;

    fn view(indexed: bool) -> MemoryGraphView {
        let mut v = MemoryGraphView::new(indexed);
        v.insert(
            NodeRef::new("users", 1),
            json!({"id": 1, "name": "Alice"}).as_object().unwrap().clone(),
            vec![("friends".into(), NodeRef::new("users", 2))],
        );
        v.insert(
            NodeRef::new("users", 2),
            json!({"id": 2, "name": "Bob"}).as_object().unwrap().clone(),
            vec![],
        );
        v
    }

    #[test]
    fn test_prebound_var_wins() {
        let q = parse_query("MATCH (a)-[:FRIENDS]->(u:User) WHERE u.name = 'Bob' RETURN u")
            .unwrap();
        let prebound: HashSet<String> = ["u".to_string()].into();
        let plan = choose_seed(&q.clauses[0], &view(true), &prebound);
        assert_eq!(plan.element, 1);
        assert_eq!(plan.indexed_eq, None);
    }

    #[test]
    fn test_indexed_equality_preferred() {
        let q = parse_query(
            "MATCH (a:User)-[:FRIENDS]->(b) WHERE b.name = 'Bob' RETURN b",
        )
        .unwrap();
        let plan = choose_seed(&q.clauses[0], &view(true), &HashSet::new());
        assert_eq!(plan.element, 1);
        assert_eq!(
            plan.indexed_eq,
            Some(("name".to_string(), json!("Bob")))
        );
    }

    #[test]
    fn test_memory_mode_falls_back_to_type_and_props() {
        let q = parse_query(
            "MATCH (a)-[:FRIENDS]->(b:User {name: 'Bob'}) WHERE b.age = 3 RETURN b",
        )
        .unwrap();
        let plan = choose_seed(&q.clauses[0], &view(false), &HashSet::new());
        assert_eq!(plan.element, 1);
        assert_eq!(plan.indexed_eq, None);
    }

    #[test]
    fn test_default_is_first_element() {
        let q = parse_query("MATCH (a)-[:FRIENDS]->(b:User) RETURN a").unwrap();
        let plan = choose_seed(&q.clauses[0], &view(false), &HashSet::new());
        assert_eq!(plan.element, 0);
    }
}
