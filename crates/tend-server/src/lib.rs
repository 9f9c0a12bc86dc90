//! tend-server
//!
//! axum の Router で HTTP リクエストを `Dispatcher` に橋渡しします。
//! ルーティング（`/items` 配下の解釈や 404/405）は Dispatcher 側の責務なので、
//! ここでは `/health` 以外をすべて fallback で渡すだけです。

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use tend_core::app::{Dispatcher, Request};
use tower_http::trace::TraceLayer;

/// Router を組み立てる
pub fn router(dispatcher: Arc<Dispatcher>) -> Router {
    Router::new()
        .route("/health", get(health))
        .fallback(dispatch)
        .layer(TraceLayer::new_for_http())
        .with_state(dispatcher)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn dispatch(
    State(dispatcher): State<Arc<Dispatcher>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request = Request::from_parts(method, uri.path(), &headers, body);
    let (status, body) = dispatcher.handle(request).await.into_parts();

    match body {
        Some(body) if status != StatusCode::NO_CONTENT => (status, Json(body)).into_response(),
        _ => status.into_response(),
    }
}
