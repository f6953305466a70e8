//! Graph endpoints: Sulpher query jobs and the specialised algorithms.

use crate::envelope::{resource, resource_with_links};
use crate::error::{Result, ServerError};
use crate::jobs::{JobStatus, Submission};
use crate::state::AppState;
use axum::extract::{OriginalUri, Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use rserv_core::error::Error as CoreError;
use rserv_core::value::{DocId, NodeRef};
use rserv_graph::{algo, Aggregation, Direction};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

fn ensure_graph_enabled(state: &AppState) -> Result<()> {
    if state.settings.graph_enabled {
        Ok(())
    } else {
        Err(ServerError::Disabled(
            "Graph querying is not enabled".to_string(),
        ))
    }
}

/// Resolve a node reference from its path or body form.
///
/// Accepts `entity:id` and a bare integer id; a bare id must be unique
/// across entities. The node's document must exist.
fn resolve_node(state: &AppState, raw: &str) -> Result<NodeRef> {
    if let Ok(node) = raw.parse::<NodeRef>() {
        if !state.store.layout().doc_exists(&node.entity, node.id) {
            return Err(ServerError::Core(CoreError::document_not_found(
                &node.entity,
                node.id,
            )));
        }
        return Ok(node);
    }

    let id: DocId = raw
        .parse()
        .map_err(|_| CoreError::validation(format!("Invalid node reference: {raw}")))?;
    let mut matches = Vec::new();
    for entity in state.store.layout().list_entities().map_err(ServerError::Core)? {
        if state.store.layout().doc_exists(&entity, id) {
            matches.push(NodeRef::new(entity, id));
        }
    }
    match matches.len() {
        0 => Err(ServerError::Core(CoreError::NotFound(format!(
            "Node {raw} not found"
        )))),
        1 => Ok(matches.remove(0)),
        _ => Err(ServerError::Core(CoreError::validation(format!(
            "Node id {raw} is ambiguous across entities; use entity:id"
        )))),
    }
}

fn node_from_body(state: &AppState, body: &Value, keys: &[&str]) -> Result<NodeRef> {
    for key in keys {
        match body.get(key) {
            Some(Value::String(s)) => return resolve_node(state, s),
            Some(Value::Number(n)) => {
                let raw = n.to_string();
                return resolve_node(state, &raw);
            }
            Some(_) | None => continue,
        }
    }
    Err(ServerError::BadRequest(format!(
        "Missing node reference: expected one of {}",
        keys.join(", ")
    )))
}

/// Render a node path: bare ids when every node shares the start entity,
/// `entity:id` strings otherwise.
fn render_path(path: &[NodeRef]) -> Value {
    let homogeneous = path
        .windows(2)
        .all(|pair| pair[0].entity == pair[1].entity);
    if homogeneous {
        json!(path.iter().map(|n| n.id).collect::<Vec<_>>())
    } else {
        json!(path.iter().map(NodeRef::to_string).collect::<Vec<_>>())
    }
}

// =============================================================================
// Sulpher query jobs
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    query: Option<String>,
    max_depth: Option<usize>,
}

/// `POST /api/v1/graph/query`
pub async fn submit_query(
    State(state): State<Arc<AppState>>,
    OriginalUri(uri): OriginalUri,
    body: Option<Json<QueryRequest>>,
) -> Result<impl IntoResponse> {
    ensure_graph_enabled(&state)?;
    let Some(Json(request)) = body else {
        return Err(ServerError::no_input());
    };
    let Some(query) = request.query.filter(|q| !q.trim().is_empty()) else {
        return Err(ServerError::BadRequest(
            "Query string is required".to_string(),
        ));
    };
    let max_depth = request
        .max_depth
        .unwrap_or(state.settings.max_query_depth);

    match state.jobs.submit(query, max_depth).await {
        Submission::Cached { results, stats } => Ok((
            StatusCode::OK,
            resource(&uri, json!({ "results": results, "stats": stats })),
        )),
        Submission::Accepted { query_id } => Ok((
            StatusCode::ACCEPTED,
            resource_with_links(
                &uri,
                json!({ "query_id": query_id, "status": "pending" }),
                &[(
                    "result",
                    format!("/api/v1/graph/query/{query_id}/result"),
                )],
            ),
        )),
    }
}

fn lookup_job(state: &AppState, raw: &str) -> Result<crate::jobs::Job> {
    let id = Uuid::parse_str(raw)
        .map_err(|_| CoreError::NotFound("Query not found".to_string()))?;
    state
        .jobs
        .job(id)
        .ok_or_else(|| ServerError::Core(CoreError::NotFound("Query not found".to_string())))
}

/// `GET /api/v1/graph/query/:id`
pub async fn query_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    OriginalUri(uri): OriginalUri,
) -> Result<impl IntoResponse> {
    ensure_graph_enabled(&state)?;
    let job = lookup_job(&state, &id)?;
    Ok(resource_with_links(
        &uri,
        json!({
            "query_id": job.id,
            "status": job.status,
            "submitted_at": job.submitted_at,
            "finished_at": job.finished_at,
            "stats": job.stats,
        }),
        &[("result", format!("/api/v1/graph/query/{}/result", job.id))],
    ))
}

/// `GET /api/v1/graph/query/:id/result`
pub async fn query_result(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    OriginalUri(uri): OriginalUri,
) -> Result<impl IntoResponse> {
    ensure_graph_enabled(&state)?;
    let job = lookup_job(&state, &id)?;
    match job.status {
        JobStatus::Completed => Ok(resource(
            &uri,
            json!({
                "results": job.results.unwrap_or_default(),
                "stats": job.stats,
            }),
        )),
        JobStatus::Failed => {
            let error = job.error.unwrap_or(crate::jobs::JobError {
                status_code: 500,
                message: "query failed".to_string(),
            });
            Err(ServerError::Job {
                status_code: error.status_code,
                message: error.message,
            })
        }
        JobStatus::Pending | JobStatus::Running => Err(ServerError::Core(CoreError::Conflict(
            "Query has not completed yet".to_string(),
        ))),
    }
}

// =============================================================================
// Algorithms
// =============================================================================

/// `POST /api/v1/graph/shortestPath`
pub async fn shortest_path(
    State(state): State<Arc<AppState>>,
    OriginalUri(uri): OriginalUri,
    body: Option<Json<Value>>,
) -> Result<impl IntoResponse> {
    ensure_graph_enabled(&state)?;
    let Some(Json(body)) = body else {
        return Err(ServerError::no_input());
    };
    let start = node_from_body(&state, &body, &["start", "start_node_id"])?;
    let end = node_from_body(&state, &body, &["end", "end_node_id"])?;
    let max_depth = body
        .get("max_depth")
        .and_then(Value::as_u64)
        .map(|d| d as usize)
        .unwrap_or(state.settings.max_query_depth);

    let graph = state.store.graph();
    let found = algo::shortest_path(&graph.read(), &start, &end, max_depth);
    match found {
        Some(path) => Ok(resource(&uri, json!({ "path": render_path(&path) }))),
        None => Err(ServerError::Core(CoreError::NotFound(
            "No path found".to_string(),
        ))),
    }
}

/// `POST /api/v1/graph/pathExists`
pub async fn path_exists(
    State(state): State<Arc<AppState>>,
    OriginalUri(uri): OriginalUri,
    body: Option<Json<Value>>,
) -> Result<impl IntoResponse> {
    ensure_graph_enabled(&state)?;
    let Some(Json(body)) = body else {
        return Err(ServerError::no_input());
    };
    let start = node_from_body(&state, &body, &["start", "start_node_id"])?;
    let end = node_from_body(&state, &body, &["end", "end_node_id"])?;
    let max_depth = body
        .get("max_depth")
        .and_then(Value::as_u64)
        .map(|d| d as usize)
        .unwrap_or(state.settings.max_query_depth);

    let graph = state.store.graph();
    let exists = algo::path_exists(&graph.read(), &start, &end, max_depth);
    Ok(resource(
        &uri,
        json!({
            "start": start.to_string(),
            "end": end.to_string(),
            "path_exists": exists,
            "max_depth": max_depth,
        }),
    ))
}

/// `POST /api/v1/graph/commonNeighbors`
pub async fn common_neighbors(
    State(state): State<Arc<AppState>>,
    OriginalUri(uri): OriginalUri,
    body: Option<Json<Value>>,
) -> Result<impl IntoResponse> {
    ensure_graph_enabled(&state)?;
    let Some(Json(body)) = body else {
        return Err(ServerError::no_input());
    };
    let a = node_from_body(&state, &body, &["a", "node_id1"])?;
    let b = node_from_body(&state, &body, &["b", "node_id2"])?;

    let common = {
        let graph = state.store.graph();
        let graph = graph.read();
        algo::common_neighbors(&graph, &a, &b)
    };
    let mut neighbors = Vec::with_capacity(common.len());
    for node in common {
        let properties = state.store.node_properties(&node).unwrap_or_default();
        neighbors.push(json!({
            "node": node.to_string(),
            "properties": properties,
        }));
    }
    Ok(resource(&uri, json!({ "common_neighbors": neighbors })))
}

/// `GET /api/v1/graph/nodes/:id`
pub async fn node_properties(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    OriginalUri(uri): OriginalUri,
) -> Result<impl IntoResponse> {
    ensure_graph_enabled(&state)?;
    let node = resolve_node(&state, &id)?;
    let properties = state.store.node_properties(&node)?;
    Ok(resource_with_links(
        &uri,
        Value::Object(properties),
        &[
            (
                "relationships",
                format!("/api/v1/graph/nodes/{node}/relationships"),
            ),
            ("degree", format!("/api/v1/graph/nodes/{node}/degree")),
        ],
    ))
}

#[derive(Debug, Deserialize)]
pub struct DirectionParams {
    direction: Option<String>,
}

fn parse_direction(params: &DirectionParams) -> Result<Direction> {
    match params.direction.as_deref() {
        Some(raw) => raw.parse::<Direction>().map_err(ServerError::Core),
        None => Ok(Direction::default()),
    }
}

/// `GET /api/v1/graph/nodes/:id/degree?direction=`
pub async fn node_degree(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<DirectionParams>,
    OriginalUri(uri): OriginalUri,
) -> Result<impl IntoResponse> {
    ensure_graph_enabled(&state)?;
    let node = resolve_node(&state, &id)?;
    let direction = parse_direction(&params)?;
    let degree = {
        let graph = state.store.graph();
        let graph = graph.read();
        algo::degree(&graph, &node, direction)
    };
    Ok(resource(
        &uri,
        json!({
            "node_id": id,
            "degree": degree,
            "direction": params.direction.unwrap_or_else(|| "all".to_string()),
        }),
    ))
}

/// `GET /api/v1/graph/nodes/:id/relationships?direction=`
pub async fn node_relationships(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<DirectionParams>,
    OriginalUri(uri): OriginalUri,
) -> Result<impl IntoResponse> {
    ensure_graph_enabled(&state)?;
    let node = resolve_node(&state, &id)?;
    let direction = parse_direction(&params)?;
    let labels = {
        let graph = state.store.graph();
        let graph = graph.read();
        algo::relationship_labels(&graph, &node, direction)
    };
    Ok(resource(&uri, json!({ "relationship_types": labels })))
}

/// `POST /api/v1/graph/nodes/neighborhoodAggregate`
pub async fn neighborhood_aggregate(
    State(state): State<Arc<AppState>>,
    OriginalUri(uri): OriginalUri,
    body: Option<Json<Value>>,
) -> Result<impl IntoResponse> {
    ensure_graph_enabled(&state)?;
    let Some(Json(body)) = body else {
        return Err(ServerError::no_input());
    };
    let node = node_from_body(&state, &body, &["node", "node_id"])?;
    let depth = body
        .get("depth")
        .and_then(Value::as_u64)
        .map(|d| d as usize)
        .unwrap_or(1);
    let property = body
        .get("property")
        .and_then(Value::as_str)
        .unwrap_or("id")
        .to_string();
    let aggregation: Aggregation = body
        .get("aggregation")
        .and_then(Value::as_str)
        .unwrap_or("count")
        .parse()
        .map_err(ServerError::Core)?;

    let visited = {
        let graph = state.store.graph();
        let graph = graph.read();
        algo::neighborhood(&graph, &node, depth)
    };
    let mut values = Vec::new();
    for neighbor in &visited {
        let properties = state.store.node_properties(neighbor).unwrap_or_default();
        // Missing values are skipped
        if let Some(value) = properties.get(&property) {
            if !value.is_null() {
                values.push(value.clone());
            }
        }
    }
    let result = algo::aggregate_values(aggregation, &values).map_err(ServerError::Core)?;

    Ok(resource(
        &uri,
        json!({
            "node_id": node.to_string(),
            "depth": depth,
            "property": property,
            "aggregation": body.get("aggregation").cloned().unwrap_or(json!("count")),
            "result": result,
        }),
    ))
}

/// `GET /api/v1/graph/statistics`
pub async fn statistics(
    State(state): State<Arc<AppState>>,
    OriginalUri(uri): OriginalUri,
) -> Result<impl IntoResponse> {
    ensure_graph_enabled(&state)?;
    let node_count = state.store.count_documents()?;
    let edge_count = {
        let graph = state.store.graph();
        let graph = graph.read();
        graph.edge_count()
    };
    let avg_out_degree = if node_count == 0 {
        0.0
    } else {
        edge_count as f64 / node_count as f64
    };
    Ok(resource(
        &uri,
        json!({
            "node_count": node_count,
            "edge_count": edge_count,
            "avg_out_degree": avg_out_degree,
        }),
    ))
}

/// `GET /api/v1/graph/:node_ref/in`
pub async fn incoming_edges(
    State(state): State<Arc<AppState>>,
    Path(node_ref): Path<String>,
    OriginalUri(uri): OriginalUri,
) -> Result<impl IntoResponse> {
    ensure_graph_enabled(&state)?;
    let node = resolve_node(&state, &node_ref)?;
    let edges: Vec<(String, NodeRef)> = {
        let graph = state.store.graph();
        let graph = graph.read();
        graph
            .in_edges(&node)
            .map(|e| (e.label.clone(), e.peer.clone()))
            .collect()
    };
    let mut incoming = Vec::with_capacity(edges.len());
    for (label, source) in edges {
        let properties = state.store.node_properties(&source).unwrap_or_default();
        incoming.push(json!({
            "source": { "id": source.id, "properties": properties },
            "relationship": { "type": label },
            "target": node.to_string(),
        }));
    }
    Ok(resource(&uri, json!({ "incoming_edges": incoming })))
}

/// `GET /api/v1/graph/:node_ref/out`
pub async fn outgoing_edges(
    State(state): State<Arc<AppState>>,
    Path(node_ref): Path<String>,
    OriginalUri(uri): OriginalUri,
) -> Result<impl IntoResponse> {
    ensure_graph_enabled(&state)?;
    let node = resolve_node(&state, &node_ref)?;
    let edges: Vec<(String, NodeRef)> = {
        let graph = state.store.graph();
        let graph = graph.read();
        graph
            .out_edges(&node)
            .map(|e| (e.label.clone(), e.peer.clone()))
            .collect()
    };
    let mut outgoing = Vec::with_capacity(edges.len());
    for (label, target) in edges {
        let properties = state.store.node_properties(&target).unwrap_or_default();
        outgoing.push(json!({
            "source": node.to_string(),
            "relationship": { "type": label },
            "target": { "id": target.id, "properties": properties },
        }));
    }
    Ok(resource(&uri, json!({ "outgoing_edges": outgoing })))
}
