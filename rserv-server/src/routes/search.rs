//! Full-text search endpoint.
//!
//! The indexer is an external collaborator behind
//! [`crate::state::FulltextIndex`]; the endpoint resolves its ranked
//! references back into documents.

use crate::envelope::resource;
use crate::error::{Result, ServerError};
use crate::state::AppState;
use axum::extract::{OriginalUri, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    query: Option<String>,
    limit: Option<usize>,
}

/// `POST /api/v1/search`
pub async fn fulltext(
    State(state): State<Arc<AppState>>,
    OriginalUri(uri): OriginalUri,
    body: Option<Json<SearchRequest>>,
) -> Result<impl IntoResponse> {
    if !state.settings.fulltext_enabled {
        return Err(ServerError::Disabled(
            "Full-text search is not enabled".to_string(),
        ));
    }
    let Some(index) = &state.fulltext else {
        return Err(ServerError::Disabled(
            "Full-text indexer is not configured".to_string(),
        ));
    };
    let Some(Json(request)) = body else {
        return Err(ServerError::no_input());
    };
    let Some(query) = request.query.filter(|q| !q.trim().is_empty()) else {
        return Err(ServerError::BadRequest("Query is required".to_string()));
    };

    let mut results: Vec<Value> = Vec::new();
    for node in index.search(&query, request.limit.unwrap_or(10)) {
        if let Ok(doc) = state.store.get(&node.entity, node.id) {
            results.push(doc);
        }
    }
    Ok(resource(&uri, json!({ "results": results })))
}
