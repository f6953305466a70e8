//! Document CRUD endpoints under `/api/v1/<entity>`.

use crate::envelope::resource;
use crate::error::{Result, ServerError};
use crate::state::AppState;
use axum::extract::{OriginalUri, Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use rserv_core::value::{DocId, JsonMap};
use rserv_store::list::parse_sort_spec;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

/// Pull a non-empty JSON object out of an optional request body.
fn require_object(body: Option<Json<Value>>) -> Result<JsonMap> {
    let Some(Json(value)) = body else {
        return Err(ServerError::no_input());
    };
    match value {
        Value::Object(map) if !map.is_empty() => Ok(map),
        _ => Err(ServerError::no_input()),
    }
}

/// `POST /api/v1/:entity`
pub async fn create(
    State(state): State<Arc<AppState>>,
    Path(entity): Path<String>,
    OriginalUri(uri): OriginalUri,
    body: Option<Json<Value>>,
) -> Result<impl IntoResponse> {
    let doc = require_object(body)?;
    let id = state.store.create(&entity, doc)?;
    Ok((
        StatusCode::CREATED,
        resource(
            &uri,
            json!({
                "message": format!(
                    "New resource of entity {entity} created successfully with id {id}"
                ),
                "id": id,
            }),
        ),
    ))
}

/// `POST /api/v1/:entity/save/:id`
pub async fn save(
    State(state): State<Arc<AppState>>,
    Path((entity, id)): Path<(String, DocId)>,
    OriginalUri(uri): OriginalUri,
    body: Option<Json<Value>>,
) -> Result<impl IntoResponse> {
    let doc = require_object(body)?;
    state.store.save(&entity, id, doc)?;
    Ok((
        StatusCode::CREATED,
        resource(
            &uri,
            json!({
                "message": format!("Resource of entity {entity} saved successfully with id {id}"),
                "id": id,
            }),
        ),
    ))
}

#[derive(Debug, Deserialize)]
pub struct GetParams {
    /// Comma-separated reference fields to embed
    lookup: Option<String>,
    /// Embedding depth; defaults to `ref_embed_depth`
    embed_depth: Option<usize>,
}

/// `GET /api/v1/:entity/:id`
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path((entity, id)): Path<(String, DocId)>,
    Query(params): Query<GetParams>,
    OriginalUri(uri): OriginalUri,
) -> Result<impl IntoResponse> {
    let doc = match params.lookup {
        Some(lookup) => {
            let fields: Vec<String> = lookup
                .split(',')
                .map(str::trim)
                .filter(|f| !f.is_empty())
                .map(String::from)
                .collect();
            let depth = params
                .embed_depth
                .unwrap_or(state.store.ref_embed_depth());
            state.store.get_with_lookup(&entity, id, &fields, depth)?
        }
        None => state.store.get(&entity, id)?,
    };
    Ok(resource(&uri, doc))
}

/// `PUT /api/v1/:entity/:id`
pub async fn replace(
    State(state): State<Arc<AppState>>,
    Path((entity, id)): Path<(String, DocId)>,
    OriginalUri(uri): OriginalUri,
    body: Option<Json<Value>>,
) -> Result<impl IntoResponse> {
    let doc = require_object(body)?;
    state.store.replace(&entity, id, doc)?;
    Ok(resource(
        &uri,
        json!({
            "message": format!("Resource of entity {entity} with id {id} updated successfully"),
        }),
    ))
}

/// `PATCH /api/v1/:entity/:id`
pub async fn patch(
    State(state): State<Arc<AppState>>,
    Path((entity, id)): Path<(String, DocId)>,
    OriginalUri(uri): OriginalUri,
    body: Option<Json<Value>>,
) -> Result<impl IntoResponse> {
    let Some(Json(value)) = body else {
        return Err(ServerError::no_input());
    };
    let Value::Object(partial) = value else {
        return Err(ServerError::no_input());
    };
    let updated_fields = state.store.patch(&entity, id, partial)?;
    Ok(resource(
        &uri,
        json!({
            "message": format!("{entity} with id {id} patched successfully"),
            "updated_fields": updated_fields,
        }),
    ))
}

/// `DELETE /api/v1/:entity/:id`
pub async fn delete(
    State(state): State<Arc<AppState>>,
    Path((entity, id)): Path<(String, DocId)>,
    OriginalUri(uri): OriginalUri,
) -> Result<impl IntoResponse> {
    let deleted = state.store.delete(&entity, id)?;
    Ok(resource(
        &uri,
        json!({
            "message": format!("{entity} with id {id} deleted successfully"),
            "cascaded_deletes": deleted,
        }),
    ))
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    page: Option<usize>,
    per_page: Option<usize>,
    sort: Option<String>,
}

/// `GET /api/v1/:entity/list?page=&per_page=&sort=field:asc,...`
pub async fn list(
    State(state): State<Arc<AppState>>,
    Path(entity): Path<String>,
    Query(params): Query<ListParams>,
    OriginalUri(uri): OriginalUri,
) -> Result<impl IntoResponse> {
    let sort = parse_sort_spec(params.sort.as_deref().unwrap_or("id:asc"))
        .map_err(ServerError::Core)?;
    let page = state.store.list(
        &entity,
        params.page.unwrap_or(1),
        params
            .per_page
            .unwrap_or(state.settings.default_page_size),
        &sort,
    )?;
    Ok(resource(&uri, serde_json::to_value(page).unwrap_or(Value::Null)))
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    query: String,
    field: Option<String>,
    page: Option<usize>,
    per_page: Option<usize>,
}

/// `GET /api/v1/:entity/search?query=&field=&page=&per_page=`
pub async fn search(
    State(state): State<Arc<AppState>>,
    Path(entity): Path<String>,
    Query(params): Query<SearchParams>,
    OriginalUri(uri): OriginalUri,
) -> Result<impl IntoResponse> {
    let page = state.store.search(
        &entity,
        &params.query,
        params.field.as_deref(),
        params.page.unwrap_or(1),
        params
            .per_page
            .unwrap_or(state.settings.default_page_size),
    )?;
    Ok(resource(&uri, serde_json::to_value(page).unwrap_or(Value::Null)))
}
