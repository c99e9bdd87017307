//! Echo endpoints
//!
//! - any path containing `/search`: body is the `query` parameter
//! - anything else: body is `[<METHOD>] <path param x>`
//!
//! Missing parameters substitute as empty strings. Every response is 200.

use std::collections::HashMap;

use axum::{
    Router,
    extract::{Path, Query},
    http::{Method, StatusCode, Uri},
    routing::any,
};

use crate::constants::SEARCH_PATH;

/// The parts of an inbound request the echo rule looks at
#[derive(Debug, Clone, Default)]
pub struct EchoRequest {
    pub method: Method,
    pub path: String,
    pub query: HashMap<String, String>,
    pub path_params: HashMap<String, String>,
}

/// Apply the echo rule
pub fn respond(request: &EchoRequest) -> String {
    if request.path.contains(SEARCH_PATH) {
        return request.query.get("query").cloned().unwrap_or_default();
    }

    let x = request.path_params.get("x").map(String::as_str).unwrap_or_default();
    format!("[{}] {}", request.method, x)
}

pub fn routes() -> Router {
    Router::new()
        .route("/{x}", any(echo_with_params))
        .fallback(echo)
}

async fn echo_with_params(
    method: Method,
    uri: Uri,
    Path(path_params): Path<HashMap<String, String>>,
    Query(query): Query<HashMap<String, String>>,
) -> (StatusCode, String) {
    reply(EchoRequest {
        method,
        path: uri.path().to_string(),
        query,
        path_params,
    })
}

async fn echo(
    method: Method,
    uri: Uri,
    Query(query): Query<HashMap<String, String>>,
) -> (StatusCode, String) {
    reply(EchoRequest {
        method,
        path: uri.path().to_string(),
        query,
        path_params: HashMap::new(),
    })
}

fn reply(request: EchoRequest) -> (StatusCode, String) {
    (StatusCode::OK, respond(&request))
}
