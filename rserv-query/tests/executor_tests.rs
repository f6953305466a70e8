//! End-to-end executor tests: parse a Sulpher string, run it against an
//! in-memory graph view, check the result rows.

use rserv_core::error::Error;
use rserv_core::value::NodeRef;
use rserv_query::exec::{execute, ExecOptions};
use rserv_query::parse_query;
use rserv_query::view::MemoryGraphView;
use serde_json::{json, Map, Value};
use std::time::Instant;

fn user(id: u64) -> NodeRef {
    NodeRef::new("users", id)
}

fn obj(v: Value) -> Map<String, Value> {
    v.as_object().unwrap().clone()
}

/// Alice -> Bob -> Carol via `friends`, plus cities and ages.
fn social_graph(indexed: bool) -> MemoryGraphView {
    let mut view = MemoryGraphView::new(indexed);
    view.insert(
        user(1),
        obj(json!({"id": 1, "name": "Alice", "city": "Berlin", "age": 30})),
        vec![("friends".into(), user(2))],
    );
    view.insert(
        user(2),
        obj(json!({"id": 2, "name": "Bob", "city": "Berlin", "age": 35})),
        vec![("friends".into(), user(3))],
    );
    view.insert(
        user(3),
        obj(json!({"id": 3, "name": "Carol", "city": "Paris", "age": 28})),
        vec![],
    );
    view
}

/// 1 -> 2 -> 3 -> 4 chain via `next`.
fn chain(len: u64) -> MemoryGraphView {
    let mut view = MemoryGraphView::new(false);
    for id in 1..=len {
        let refs = if id < len {
            vec![("next".to_string(), NodeRef::new("nodes", id + 1))]
        } else {
            vec![]
        };
        view.insert(
            NodeRef::new("nodes", id),
            obj(json!({"id": id})),
            refs,
        );
    }
    view
}

fn run(query: &str, view: &MemoryGraphView) -> Vec<Map<String, Value>> {
    let parsed = parse_query(query).expect("query should parse");
    let (rows, _) = execute(&parsed, view, &ExecOptions::default()).expect("query should run");
    rows
}

#[test]
fn friends_of_friends() {
    let view = social_graph(false);
    let rows = run(
        "MATCH (u:User)-[:FRIENDS]->(f)-[:FRIENDS]->(g) WHERE u.name='Alice' RETURN g.name",
        &view,
    );
    assert_eq!(rows, vec![obj(json!({"g.name": "Carol"}))]);
}

#[test]
fn friends_of_friends_indexed_seed() {
    let view = social_graph(true);
    let rows = run(
        "MATCH (u:User)-[:FRIENDS]->(f)-[:FRIENDS]->(g) WHERE u.name='Alice' RETURN g.name",
        &view,
    );
    assert_eq!(rows, vec![obj(json!({"g.name": "Carol"}))]);
}

#[test]
fn bfs_and_dfs_agree_on_the_result_set() {
    let view = social_graph(false);
    let q = "MATCH (u:User)-[:FRIENDS]->(f) RETURN u.name, f.name";
    let mut bfs = run(q, &view);
    let mut dfs = run(&format!("DFS {q}"), &view);
    fn row_key(m: &Map<String, Value>) -> String {
        serde_json::to_string(m).unwrap()
    }
    bfs.sort_by_key(row_key);
    dfs.sort_by_key(row_key);
    assert_eq!(bfs, dfs);
    assert_eq!(bfs.len(), 2);
}

#[test]
fn whole_node_projection_excludes_reference_fields() {
    let view = social_graph(false);
    let rows = run("MATCH (u:User {name: 'Alice'}) RETURN u", &view);
    assert_eq!(rows.len(), 1);
    let node = rows[0]["u"].as_object().unwrap();
    assert_eq!(node["name"], "Alice");
    assert_eq!(node["id"], 1);
    assert!(!node.contains_key("friends"));
}

#[test]
fn variable_length_zero_yields_the_seed_alone() {
    let view = chain(4);
    let rows = run(
        "MATCH (a {id: 1})-[:NEXT*0..0]->(b) RETURN b.id",
        &view,
    );
    assert_eq!(rows, vec![obj(json!({"b.id": 1}))]);
}

#[test]
fn variable_length_at_diameter_reaches_all_nodes() {
    let view = chain(4);
    let rows = run(
        "MATCH (a {id: 1})-[:NEXT*0..3]->(b) RETURN b.id",
        &view,
    );
    let ids: Vec<i64> = rows
        .iter()
        .map(|r| r["b.id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, vec![1, 2, 3, 4]);
}

#[test]
fn variable_length_lower_bound_prunes_short_walks() {
    let view = chain(4);
    let rows = run(
        "MATCH (a {id: 1})-[:NEXT*2..3]->(b) RETURN b.id",
        &view,
    );
    let ids: Vec<i64> = rows
        .iter()
        .map(|r| r["b.id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, vec![3, 4]);
}

#[test]
fn variable_length_respects_max_depth() {
    let view = chain(8);
    let parsed = parse_query("MATCH (a {id: 1})-[:NEXT*]->(b) RETURN b.id").unwrap();
    let opts = ExecOptions {
        max_depth: 2,
        deadline: None,
    };
    let (rows, _) = execute(&parsed, &view, &opts).unwrap();
    assert_eq!(rows.len(), 2);
}

#[test]
fn unlabelled_edge_matches_any_label() {
    let view = social_graph(false);
    let rows = run("MATCH (u {name: 'Alice'})-[]->(f) RETURN f.name", &view);
    assert_eq!(rows, vec![obj(json!({"f.name": "Bob"}))]);
}

#[test]
fn label_disjunction() {
    let mut view = MemoryGraphView::new(false);
    view.insert(
        user(1),
        obj(json!({"id": 1})),
        vec![
            ("likes".into(), user(2)),
            ("follows".into(), user(3)),
            ("blocks".into(), user(4)),
        ],
    );
    for id in 2..=4 {
        view.insert(user(id), obj(json!({"id": id})), vec![]);
    }
    let rows = run("MATCH (a {id: 1})-[:LIKES|FOLLOWS]->(b) RETURN b.id", &view);
    let ids: Vec<i64> = rows.iter().map(|r| r["b.id"].as_i64().unwrap()).collect();
    assert_eq!(ids, vec![3, 2]); // FOLLOWS sorts before LIKES
}

#[test]
fn edge_property_spec_matches_nothing() {
    let view = social_graph(false);
    let rows = run(
        "MATCH (u)-[:FRIENDS {since: 2020}]->(f) RETURN f.name",
        &view,
    );
    assert!(rows.is_empty());
}

#[test]
fn not_edge_predicate_finds_sinks() {
    let view = social_graph(false);
    let rows = run(
        "MATCH (u:User) WHERE NOT (u)-[:FRIENDS]->() RETURN u.name",
        &view,
    );
    assert_eq!(rows, vec![obj(json!({"u.name": "Carol"}))]);
}

#[test]
fn where_ordering_and_boolean_operators() {
    let view = social_graph(false);
    let rows = run(
        "MATCH (u:User) WHERE u.age >= 30 AND u.city = 'Berlin' RETURN u.name",
        &view,
    );
    assert_eq!(rows.len(), 2);

    let rows = run(
        "MATCH (u:User) WHERE u.city = 'Paris' OR u.age > 34 RETURN u.name",
        &view,
    );
    assert_eq!(rows.len(), 2);
}

#[test]
fn property_exists_predicate() {
    let mut view = social_graph(false);
    view.insert(user(4), obj(json!({"id": 4, "name": "Dan"})), vec![]);
    let rows = run("MATCH (u:User) WHERE u.city RETURN u.name", &view);
    assert_eq!(rows.len(), 3);
}

#[test]
fn aggregation_groups_by_non_aggregate_columns() {
    let view = social_graph(false);
    let rows = run("MATCH (u:User) RETURN u.city, COUNT(u)", &view);
    assert_eq!(
        rows,
        vec![
            obj(json!({"u.city": "Berlin", "COUNT(u)": 2})),
            obj(json!({"u.city": "Paris", "COUNT(u)": 1})),
        ]
    );
}

#[test]
fn aggregation_without_group_columns_is_one_row() {
    let view = social_graph(false);
    let rows = run("MATCH (u:User) RETURN COUNT(u), AVG(u.age), MIN(u.name)", &view);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["COUNT(u)"], json!(3));
    assert_eq!(rows[0]["AVG(u.age)"], json!(31.0));
    assert_eq!(rows[0]["MIN(u.name)"], json!("Alice"));
}

#[test]
fn count_over_empty_match_is_zero() {
    let view = social_graph(false);
    let rows = run("MATCH (p:Post) RETURN COUNT(p)", &view);
    assert_eq!(rows, vec![obj(json!({"COUNT(p)": 0}))]);
}

#[test]
fn distinct_dedupes_rows() {
    let view = social_graph(false);
    let rows = run("MATCH (u:User) RETURN DISTINCT(u.city)", &view);
    assert_eq!(rows.len(), 2);
}

#[test]
fn order_by_and_limit() {
    let view = social_graph(false);
    let rows = run(
        "MATCH (u:User) RETURN u.name ORDER BY u.age DESC LIMIT 2",
        &view,
    );
    assert_eq!(
        rows,
        vec![
            obj(json!({"u.name": "Bob"})),
            obj(json!({"u.name": "Alice"})),
        ]
    );
}

#[test]
fn with_narrows_visible_variables() {
    let view = social_graph(false);
    let rows = run(
        "MATCH (u:User)-[:FRIENDS]->(f) WHERE u.name = 'Alice' WITH f RETURN f.name",
        &view,
    );
    assert_eq!(rows, vec![obj(json!({"f.name": "Bob"}))]);

    let parsed =
        parse_query("MATCH (u:User)-[:FRIENDS]->(f) WITH f RETURN u.name").unwrap();
    let err = execute(&parsed, &view, &ExecOptions::default()).unwrap_err();
    assert!(matches!(err, Error::QueryRuntime(_)));
}

#[test]
fn multiple_clauses_join_on_shared_variables() {
    let view = social_graph(false);
    let rows = run(
        "MATCH (u:User) WHERE u.name = 'Alice' MATCH (u)-[:FRIENDS]->(f) RETURN f.name",
        &view,
    );
    assert_eq!(rows, vec![obj(json!({"f.name": "Bob"}))]);
}

#[test]
fn unresolvable_variable_is_a_runtime_error() {
    let view = social_graph(false);
    let parsed = parse_query("MATCH (u:User) RETURN ghost.name").unwrap();
    let err = execute(&parsed, &view, &ExecOptions::default()).unwrap_err();
    assert!(matches!(err, Error::QueryRuntime(_)));
    assert!(err.to_string().contains("ghost"));
}

#[test]
fn expired_deadline_fails_with_timeout() {
    let view = chain(4);
    let parsed = parse_query("MATCH (a)-[:NEXT*]->(b) RETURN b.id").unwrap();
    let opts = ExecOptions {
        max_depth: 10,
        deadline: Some(Instant::now() - std::time::Duration::from_millis(1)),
    };
    let err = execute(&parsed, &view, &opts).unwrap_err();
    assert!(matches!(err, Error::Timeout(_)));
}

#[test]
fn repeated_variable_asserts_node_equality() {
    // 1 -> 2 -> 1 cycle: (a)-[:NEXT]->(b)-[:NEXT]->(a) closes the loop
    let mut view = MemoryGraphView::new(false);
    view.insert(
        NodeRef::new("nodes", 1),
        obj(json!({"id": 1})),
        vec![("next".into(), NodeRef::new("nodes", 2))],
    );
    view.insert(
        NodeRef::new("nodes", 2),
        obj(json!({"id": 2})),
        vec![("next".into(), NodeRef::new("nodes", 1))],
    );
    let rows = run(
        "MATCH (a {id: 1})-[:NEXT]->(b)-[:NEXT]->(a) RETURN b.id",
        &view,
    );
    assert_eq!(rows, vec![obj(json!({"b.id": 2}))]);

    let rows = run(
        "MATCH (a {id: 1})-[:MISSING]->(b)-[:NEXT]->(a) RETURN b.id",
        &view,
    );
    assert!(rows.is_empty());
}

#[test]
fn seed_can_sit_mid_pattern() {
    // Seeding on the most constrained element requires extending leftwards
    let view = social_graph(true);
    let rows = run(
        "MATCH (u:User)-[:FRIENDS]->(f) WHERE f.name = 'Carol' RETURN u.name",
        &view,
    );
    assert_eq!(rows, vec![obj(json!({"u.name": "Bob"}))]);
}

#[test]
fn deterministic_enumeration_order_without_order_by() {
    let view = chain(4);
    let first = run("MATCH (a)-[:NEXT]->(b) RETURN a.id, b.id", &view);
    let second = run("MATCH (a)-[:NEXT]->(b) RETURN a.id, b.id", &view);
    assert_eq!(first, second);
}
