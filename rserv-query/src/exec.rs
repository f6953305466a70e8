//! Query execution: BFS/DFS pattern matching with predicate pushdown.
//!
//! Bindings extend along the pattern edge by edge from the planned seed.
//! WHERE conjuncts run as soon as their variables are bound, variable-length
//! edges expand breadth-first inside a single step, and traversal depth is
//! bounded by `max_depth`. A deadline check between expansions enforces the
//! per-query wall clock.

use crate::aggregate::aggregate;
use crate::ast::*;
use crate::plan::choose_seed;
use crate::view::GraphView;
use rserv_core::error::{Error, Result};
use rserv_core::value::{entity_matches_type, json_cmp, JsonMap, NodeRef};
use rustc_hash::FxHashMap;
use serde_json::Value;
use std::collections::{HashSet, VecDeque};
use std::time::Instant;

/// Execution limits.
#[derive(Debug, Clone, Copy)]
pub struct ExecOptions {
    /// Maximum traversal depth for variable-length edges
    pub max_depth: usize,
    /// Wall-clock deadline; exceeding it fails the query
    pub deadline: Option<Instant>,
}

impl Default for ExecOptions {
    fn default() -> Self {
        Self {
            max_depth: 10,
            deadline: None,
        }
    }
}

/// Counters reported with each result.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecStats {
    /// Binding expansions performed
    pub nodes_traversed: u64,
}

type Binding = FxHashMap<String, NodeRef>;

/// One partial or complete match: variable bindings plus any value columns
/// produced by WITH.
#[derive(Debug, Clone, Default)]
struct Row {
    binding: Binding,
    extra: JsonMap,
}

/// Execute a parsed query against a graph view.
///
/// Returns the result rows (objects keyed by projection spelling) and the
/// traversal stats.
pub fn execute(
    query: &Query,
    view: &dyn GraphView,
    opts: &ExecOptions,
) -> Result<(Vec<JsonMap>, ExecStats)> {
    validate_variables(query)?;

    let mut stats = ExecStats::default();
    let mut rows = vec![Row::default()];
    let mut bound: HashSet<String> = HashSet::new();

    for clause in &query.clauses {
        rows = execute_clause(query.algorithm, clause, rows, &bound, view, opts, &mut stats)?;
        for element in clause.pattern.elements() {
            bound.insert(element.var.clone());
        }
    }

    if let Some(with) = &query.with {
        rows = apply_with(with, rows, view);
    }

    let projected = project(&query.returns, rows, view)?;
    let ordered = apply_order(query.order_by.as_ref(), projected, view);
    let mut out: Vec<JsonMap> = ordered.into_iter().map(|(map, _)| map).collect();
    if let Some(limit) = query.limit {
        out.truncate(limit);
    }
    Ok((out, stats))
}

// =============================================================================
// Variable validation
// =============================================================================

/// Every referenced variable must be bound by a pattern (or projected by
/// WITH) before use. Edge variables carry no payload and are not bindable.
fn validate_variables(query: &Query) -> Result<()> {
    let mut bound: HashSet<&str> = HashSet::new();

    for clause in &query.clauses {
        let mut visible = bound.clone();
        visible.extend(clause.pattern.elements().map(|e| e.var.as_str()));
        if let Some(filter) = &clause.filter {
            for var in filter.variables() {
                if !visible.contains(var) {
                    return Err(unresolved(var));
                }
            }
        }
        bound = visible;
    }

    let (vars, cols): (HashSet<String>, HashSet<String>) = match &query.with {
        Some(with) => {
            let mut vars = HashSet::new();
            let mut cols = HashSet::new();
            for projection in with {
                if !bound.contains(projection.variable()) {
                    return Err(unresolved(projection.variable()));
                }
                match projection {
                    Projection::Var(v) => {
                        vars.insert(v.clone());
                    }
                    _ => {
                        cols.insert(projection.column_name());
                    }
                }
            }
            (vars, cols)
        }
        None => (bound.iter().map(|s| s.to_string()).collect(), HashSet::new()),
    };

    let check = |projection: &Projection| -> Result<()> {
        if vars.contains(projection.variable()) {
            return Ok(());
        }
        let as_col = match projection {
            Projection::Agg { arg, .. } => arg.to_string(),
            other => other.column_name(),
        };
        if cols.contains(&as_col) {
            Ok(())
        } else {
            Err(unresolved(projection.variable()))
        }
    };

    for projection in &query.returns {
        check(projection)?;
    }
    if let Some(order) = &query.order_by {
        // The key may instead name a returned column
        let names_result_col = query
            .returns
            .iter()
            .any(|p| p.column_name() == order.key.column_name());
        if !names_result_col {
            check(&order.key)?;
        }
    }
    Ok(())
}

fn unresolved(var: &str) -> Error {
    Error::QueryRuntime(format!("Variable not found: {var}"))
}

// =============================================================================
// Clause execution
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dir {
    Out,
    In,
}

struct Step<'a> {
    edge: &'a EdgePattern,
    from_var: &'a str,
    target: &'a NodePattern,
    dir: Dir,
}

fn execute_clause(
    algorithm: Algorithm,
    clause: &MatchClause,
    in_rows: Vec<Row>,
    prebound: &HashSet<String>,
    view: &dyn GraphView,
    opts: &ExecOptions,
    stats: &mut ExecStats,
) -> Result<Vec<Row>> {
    let elements: Vec<&NodePattern> = clause.pattern.elements().collect();
    let plan = choose_seed(clause, view, prebound);
    let seed_elem = elements[plan.element];

    // Extension steps: rightwards along out-edges from the seed, then
    // leftwards along in-edges back to the pattern start.
    let mut steps: Vec<Step<'_>> = Vec::new();
    for i in plan.element..elements.len().saturating_sub(1) {
        steps.push(Step {
            edge: &clause.pattern.steps[i].0,
            from_var: &elements[i].var,
            target: elements[i + 1],
            dir: Dir::Out,
        });
    }
    for i in (1..=plan.element).rev() {
        steps.push(Step {
            edge: &clause.pattern.steps[i - 1].0,
            from_var: &elements[i].var,
            target: elements[i - 1],
            dir: Dir::In,
        });
    }

    // Binding order for predicate pushdown: prebound, seed, then targets
    let mut bind_order: Vec<&str> = prebound.iter().map(String::as_str).collect();
    let seed_pos = bind_order.len();
    bind_order.push(&seed_elem.var);
    for step in &steps {
        bind_order.push(&step.target.var);
    }

    // Attach each conjunct to the last variable it needs
    let conjuncts: Vec<&Expr> = clause
        .filter
        .as_ref()
        .map(|f| f.conjuncts())
        .unwrap_or_default();
    let mut by_trigger: FxHashMap<&str, Vec<&Expr>> = FxHashMap::default();
    for conjunct in conjuncts {
        let max_pos = conjunct
            .variables()
            .iter()
            .filter_map(|v| bind_order.iter().position(|b| b == v))
            .max()
            .unwrap_or(seed_pos);
        let trigger = bind_order[max_pos.max(seed_pos)];
        by_trigger.entry(trigger).or_default().push(conjunct);
    }

    let passes = |var: &str, row: &Row| -> Result<bool> {
        for conjunct in by_trigger.get(var).into_iter().flatten() {
            if !eval_expr(conjunct, row, view)? {
                return Ok(false);
            }
        }
        Ok(true)
    };

    // Seed the frontier
    let mut frontier: VecDeque<(Row, usize)> = VecDeque::new();
    for in_row in &in_rows {
        let candidates: Vec<NodeRef> = if let Some(node) = in_row.binding.get(&seed_elem.var) {
            vec![node.clone()]
        } else if let Some((field, value)) = &plan.indexed_eq {
            view.nodes_with_property(seed_elem.label.as_deref(), field, value)
                .unwrap_or_default()
        } else if let Some(label) = &seed_elem.label {
            view.nodes_of_type(label)
        } else {
            view.all_nodes()
        };

        for node in candidates {
            stats.nodes_traversed += 1;
            if !node_matches(view, &node, seed_elem) {
                continue;
            }
            let mut row = in_row.clone();
            row.binding.insert(seed_elem.var.clone(), node);
            if passes(&seed_elem.var, &row)? {
                frontier.push_back((row, 0));
            }
        }
    }

    // Drive the frontier: queue for BFS, stack for DFS
    let mut results = Vec::new();
    while let Some((row, step_idx)) = match algorithm {
        Algorithm::Bfs => frontier.pop_front(),
        Algorithm::Dfs => frontier.pop_back(),
    } {
        check_deadline(opts)?;
        let Some(step) = steps.get(step_idx) else {
            results.push(row);
            continue;
        };
        stats.nodes_traversed += 1;

        for target in step_candidates(step, &row, view, opts, stats) {
            let Some(next) = try_bind(&row, step.target, target, view) else {
                continue;
            };
            if passes(&step.target.var, &next)? {
                frontier.push_back((next, step_idx + 1));
            }
        }
    }
    Ok(results)
}

/// Nodes reachable from the row's current position through one step.
fn step_candidates(
    step: &Step<'_>,
    row: &Row,
    view: &dyn GraphView,
    opts: &ExecOptions,
    stats: &mut ExecStats,
) -> Vec<NodeRef> {
    let Some(from) = row.binding.get(step.from_var) else {
        return Vec::new();
    };
    let adjacency = |node: &NodeRef| match step.dir {
        Dir::Out => view.out_edges(node),
        Dir::In => view.in_edges(node),
    };

    match step.edge.range {
        None => adjacency(from)
            .into_iter()
            .filter(|(label, _)| label_ok(label, &step.edge.labels))
            // Edges carry no properties; a non-empty spec matches nothing
            .filter(|_| step.edge.props.is_empty())
            .map(|(_, peer)| peer)
            .collect(),
        Some(range) => {
            // Variable-length: breadth-first walk with a per-walk visited
            // set, pruned at the upper bound, emitting at or past the lower
            let cap = range.max.unwrap_or(opts.max_depth).min(opts.max_depth);
            let mut targets = Vec::new();
            let mut visited: HashSet<NodeRef> = HashSet::from([from.clone()]);
            let mut queue = VecDeque::from([(from.clone(), 0usize)]);
            while let Some((node, depth)) = queue.pop_front() {
                if depth >= range.min {
                    targets.push(node.clone());
                }
                if depth == cap {
                    continue;
                }
                for (label, peer) in adjacency(&node) {
                    if !label_ok(&label, &step.edge.labels) || !step.edge.props.is_empty() {
                        continue;
                    }
                    if visited.insert(peer.clone()) {
                        stats.nodes_traversed += 1;
                        queue.push_back((peer, depth + 1));
                    }
                }
            }
            targets
        }
    }
}

fn label_ok(label: &str, accepted: &[String]) -> bool {
    accepted.is_empty() || accepted.iter().any(|l| l.eq_ignore_ascii_case(label))
}

fn node_matches(view: &dyn GraphView, node: &NodeRef, pattern: &NodePattern) -> bool {
    if let Some(label) = &pattern.label {
        if !entity_matches_type(&node.entity, label) {
            return false;
        }
    }
    pattern.props.iter().all(|(field, expected)| {
        view.node_property(node, field)
            .is_some_and(|actual| json_eq(&actual, expected))
    })
}

fn try_bind(row: &Row, target: &NodePattern, node: NodeRef, view: &dyn GraphView) -> Option<Row> {
    if let Some(existing) = row.binding.get(&target.var) {
        // Same variable twice in a pattern asserts node equality
        if *existing != node {
            return None;
        }
    }
    if !node_matches(view, &node, target) {
        return None;
    }
    let mut next = row.clone();
    next.binding.insert(target.var.clone(), node);
    Some(next)
}

fn check_deadline(opts: &ExecOptions) -> Result<()> {
    if let Some(deadline) = opts.deadline {
        if Instant::now() >= deadline {
            return Err(Error::Timeout("query execution deadline".to_string()));
        }
    }
    Ok(())
}

// =============================================================================
// Predicate evaluation
// =============================================================================

fn eval_expr(expr: &Expr, row: &Row, view: &dyn GraphView) -> Result<bool> {
    match expr {
        Expr::And(a, b) => Ok(eval_expr(a, row, view)? && eval_expr(b, row, view)?),
        Expr::Or(a, b) => Ok(eval_expr(a, row, view)? || eval_expr(b, row, view)?),
        Expr::Not(inner) => Ok(!eval_expr(inner, row, view)?),
        Expr::Cmp {
            var,
            field,
            op,
            value,
        } => {
            let node = bound_node(row, var)?;
            let actual = view.node_property(node, field).unwrap_or(Value::Null);
            eval_cmp(&actual, *op, value)
        }
        Expr::Exists { var, field } => {
            let node = bound_node(row, var)?;
            Ok(view
                .node_property(node, field)
                .is_some_and(|v| !v.is_null()))
        }
        Expr::HasEdge { var, labels } => {
            let node = bound_node(row, var)?;
            Ok(view
                .out_edges(node)
                .iter()
                .any(|(label, _)| label_ok(label, labels)))
        }
    }
}

fn bound_node<'a>(row: &'a Row, var: &str) -> Result<&'a NodeRef> {
    row.binding.get(var).ok_or_else(|| unresolved(var))
}

fn eval_cmp(actual: &Value, op: CmpOp, expected: &Value) -> Result<bool> {
    use std::cmp::Ordering;
    match op {
        CmpOp::Eq => Ok(json_eq(actual, expected)),
        CmpOp::Ne => Ok(!json_eq(actual, expected)),
        _ => {
            // A missing property never satisfies an ordering comparison
            let ord = match (actual, expected) {
                (Value::Null, _) | (_, Value::Null) => return Ok(false),
                (Value::Number(_), Value::Number(_)) | (Value::String(_), Value::String(_)) => {
                    json_cmp(actual, expected)
                }
                _ => {
                    return Err(Error::QueryRuntime(format!(
                        "type mismatch in predicate: {actual} {op} {expected}"
                    )))
                }
            };
            Ok(match op {
                CmpOp::Lt => ord == Ordering::Less,
                CmpOp::Le => ord != Ordering::Greater,
                CmpOp::Gt => ord == Ordering::Greater,
                CmpOp::Ge => ord != Ordering::Less,
                CmpOp::Eq | CmpOp::Ne => unreachable!(),
            })
        }
    }
}

fn json_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        // Numbers compare numerically so 3 = 3.0
        (Value::Number(_), Value::Number(_)) => json_cmp(a, b) == std::cmp::Ordering::Equal,
        _ => a == b,
    }
}

// =============================================================================
// Projection and aggregation
// =============================================================================

fn apply_with(projections: &[Projection], rows: Vec<Row>, view: &dyn GraphView) -> Vec<Row> {
    rows.into_iter()
        .map(|row| {
            let mut binding = Binding::default();
            let mut extra = JsonMap::new();
            for projection in projections {
                match projection {
                    Projection::Var(var) => {
                        if let Some(node) = row.binding.get(var) {
                            binding.insert(var.clone(), node.clone());
                        } else if let Some(value) = row.extra.get(var) {
                            extra.insert(var.clone(), value.clone());
                        }
                    }
                    Projection::Field { var, field } => {
                        let column = projection.column_name();
                        let value = row
                            .binding
                            .get(var)
                            .map(|node| view.node_property(node, field).unwrap_or(Value::Null))
                            .or_else(|| row.extra.get(&column).cloned())
                            .unwrap_or(Value::Null);
                        extra.insert(column, value);
                    }
                    // Rejected by the parser
                    Projection::Agg { .. } => {}
                }
            }
            Row { binding, extra }
        })
        .collect()
}

fn resolve_projection(
    projection: &Projection,
    row: &Row,
    view: &dyn GraphView,
) -> Result<Value> {
    match projection {
        Projection::Var(var) => {
            if let Some(node) = row.binding.get(var) {
                Ok(Value::Object(node_payload(view, node)))
            } else if let Some(value) = row.extra.get(var) {
                Ok(value.clone())
            } else {
                Err(unresolved(var))
            }
        }
        Projection::Field { var, field } => {
            if let Some(node) = row.binding.get(var) {
                Ok(view.node_property(node, field).unwrap_or(Value::Null))
            } else if let Some(value) = row.extra.get(&projection.column_name()) {
                Ok(value.clone())
            } else {
                Err(unresolved(var))
            }
        }
        Projection::Agg { arg, .. } => resolve_agg_arg(arg, row, view),
    }
}

fn resolve_agg_arg(arg: &AggArg, row: &Row, view: &dyn GraphView) -> Result<Value> {
    match arg {
        AggArg::Var(var) => {
            if let Some(node) = row.binding.get(var) {
                Ok(Value::from(node.id))
            } else if let Some(value) = row.extra.get(var) {
                Ok(value.clone())
            } else {
                Err(unresolved(var))
            }
        }
        AggArg::Field { var, field } => {
            if let Some(node) = row.binding.get(var) {
                Ok(view.node_property(node, field).unwrap_or(Value::Null))
            } else if let Some(value) = row.extra.get(&arg.to_string()) {
                Ok(value.clone())
            } else {
                Err(unresolved(var))
            }
        }
    }
}

/// The node payload: its non-reference fields, id always present.
fn node_payload(view: &dyn GraphView, node: &NodeRef) -> JsonMap {
    let mut payload = view.node_properties(node);
    payload
        .entry("id".to_string())
        .or_insert_with(|| Value::from(node.id));
    payload
}

/// Materialise the projection, applying aggregation when present.
///
/// Aggregations group by the non-aggregate projection columns (SQL
/// semantics); DISTINCT without another aggregate dedupes whole rows.
fn project(
    projections: &[Projection],
    rows: Vec<Row>,
    view: &dyn GraphView,
) -> Result<Vec<(JsonMap, Option<Row>)>> {
    let has_grouping_agg = projections.iter().any(
        |p| matches!(p, Projection::Agg { func, .. } if *func != AggFunc::Distinct),
    );
    let has_distinct = projections
        .iter()
        .any(|p| matches!(p, Projection::Agg { func: AggFunc::Distinct, .. }));

    if has_grouping_agg {
        return project_grouped(projections, rows, view);
    }

    let mut out = Vec::new();
    let mut seen_keys: HashSet<String> = HashSet::new();
    for row in rows {
        let mut map = JsonMap::new();
        for projection in projections {
            map.insert(
                projection.column_name(),
                resolve_projection(projection, &row, view)?,
            );
        }
        if has_distinct {
            let key = serde_json::to_string(&map).unwrap_or_default();
            if !seen_keys.insert(key) {
                continue;
            }
        }
        out.push((map, Some(row)));
    }
    Ok(out)
}

fn project_grouped(
    projections: &[Projection],
    rows: Vec<Row>,
    view: &dyn GraphView,
) -> Result<Vec<(JsonMap, Option<Row>)>> {
    let group_cols: Vec<&Projection> =
        projections.iter().filter(|p| !p.is_aggregate()).collect();

    // Group rows by the key columns, preserving first-seen group order
    let mut order: Vec<String> = Vec::new();
    let mut groups: FxHashMap<String, (Vec<Value>, Vec<Row>)> = FxHashMap::default();
    for row in rows {
        let mut key_values = Vec::with_capacity(group_cols.len());
        for col in &group_cols {
            key_values.push(resolve_projection(col, &row, view)?);
        }
        let key = serde_json::to_string(&key_values).unwrap_or_default();
        let entry = groups.entry(key.clone()).or_insert_with(|| {
            order.push(key);
            (key_values, Vec::new())
        });
        entry.1.push(row);
    }

    // All-aggregate projections over no rows still produce one group
    if groups.is_empty() && group_cols.is_empty() {
        order.push(String::new());
        groups.insert(String::new(), (Vec::new(), Vec::new()));
    }

    let mut out = Vec::new();
    for key in order {
        let (key_values, members) = groups.remove(&key).unwrap_or_default();
        let mut map = JsonMap::new();
        let mut key_iter = key_values.into_iter();
        for projection in projections {
            match projection {
                Projection::Agg { func, arg } => {
                    let mut values = Vec::with_capacity(members.len());
                    for row in &members {
                        let value = resolve_agg_arg(arg, row, view)?;
                        if !value.is_null() {
                            values.push(value);
                        }
                    }
                    map.insert(projection.column_name(), aggregate(*func, values)?);
                }
                _ => {
                    map.insert(
                        projection.column_name(),
                        key_iter.next().unwrap_or(Value::Null),
                    );
                }
            }
        }
        out.push((map, None));
    }
    Ok(out)
}

fn apply_order(
    order: Option<&OrderBy>,
    mut rows: Vec<(JsonMap, Option<Row>)>,
    view: &dyn GraphView,
) -> Vec<(JsonMap, Option<Row>)> {
    let Some(order) = order else {
        return rows;
    };
    let column = order.key.column_name();
    let key_of = |entry: &(JsonMap, Option<Row>)| -> Value {
        if let Some(value) = entry.0.get(&column) {
            return value.clone();
        }
        entry
            .1
            .as_ref()
            .and_then(|row| resolve_projection(&order.key, row, view).ok())
            .unwrap_or(Value::Null)
    };
    rows.sort_by(|a, b| {
        let ord = json_cmp(&key_of(a), &key_of(b));
        if order.desc {
            ord.reverse()
        } else {
            ord
        }
    });
    rows
}
