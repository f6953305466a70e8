//! HTTP route handlers and router configuration.

mod documents;
mod graph;
mod search;

use crate::envelope;
use crate::state::AppState;
use axum::extract::State;
use axum::routing::{get, post};
use axum::{middleware, Json, Router};
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Build the application router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        // Full-text search
        .route("/api/v1/search", post(search::fulltext))
        // Graph queries
        .route("/api/v1/graph/query", post(graph::submit_query))
        .route("/api/v1/graph/query/:id", get(graph::query_status))
        .route("/api/v1/graph/query/:id/result", get(graph::query_result))
        // Graph algorithms
        .route("/api/v1/graph/shortestPath", post(graph::shortest_path))
        .route("/api/v1/graph/pathExists", post(graph::path_exists))
        .route("/api/v1/graph/commonNeighbors", post(graph::common_neighbors))
        .route("/api/v1/graph/statistics", get(graph::statistics))
        .route(
            "/api/v1/graph/nodes/neighborhoodAggregate",
            post(graph::neighborhood_aggregate),
        )
        .route("/api/v1/graph/nodes/:id", get(graph::node_properties))
        .route("/api/v1/graph/nodes/:id/degree", get(graph::node_degree))
        .route(
            "/api/v1/graph/nodes/:id/relationships",
            get(graph::node_relationships),
        )
        .route("/api/v1/graph/:node_ref/in", get(graph::incoming_edges))
        .route("/api/v1/graph/:node_ref/out", get(graph::outgoing_edges))
        // Documents
        .route("/api/v1/:entity", post(documents::create))
        .route("/api/v1/:entity/list", get(documents::list))
        .route("/api/v1/:entity/search", get(documents::search))
        .route("/api/v1/:entity/save/:id", post(documents::save))
        .route(
            "/api/v1/:entity/:id",
            get(documents::get)
                .put(documents::replace)
                .patch(documents::patch)
                .delete(documents::delete),
        )
        .layer(middleware::from_fn(envelope::link_envelope))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Liveness probe.
async fn health(State(_state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
