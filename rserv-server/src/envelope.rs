//! HATEOAS response envelope.
//!
//! Success bodies are `{"data": ..., "_links": {"self": {...}}}`; error
//! bodies are `{"error": {...}, "_links": {...}}`. Handlers build the data
//! half; the [`link_envelope`] middleware injects `_links` into any JSON
//! object body that lacks it, so error responses get their self link
//! without every handler threading the URI through.

use axum::body::Body;
use axum::extract::Request;
use axum::http::{header, Uri};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};

/// Build a success envelope around a resource.
pub fn resource(uri: &Uri, data: Value) -> Json<Value> {
    resource_with_links(uri, data, &[])
}

/// Build a success envelope with extra named links.
pub fn resource_with_links(uri: &Uri, data: Value, links: &[(&str, String)]) -> Json<Value> {
    let mut link_map = json!({ "self": { "href": uri.to_string() } });
    for (name, href) in links {
        link_map[name] = json!({ "href": href });
    }
    Json(json!({ "data": data, "_links": link_map }))
}

/// Inject `_links.self` into JSON object bodies that lack it.
pub async fn link_envelope(req: Request, next: Next) -> Response {
    let uri = req.uri().clone();
    let resp = next.run(req).await;

    let is_json = resp
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/json"));
    if !is_json {
        return resp;
    }

    let (parts, body) = resp.into_parts();
    let bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(_) => return Response::from_parts(parts, Body::empty()),
    };

    match serde_json::from_slice::<Value>(&bytes) {
        Ok(Value::Object(mut obj)) if !obj.contains_key("_links") => {
            obj.insert(
                "_links".to_string(),
                json!({ "self": { "href": uri.to_string() } }),
            );
            (parts.status, Json(Value::Object(obj))).into_response()
        }
        _ => Response::from_parts(parts, Body::from(bytes)),
    }
}
