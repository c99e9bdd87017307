pub mod echo;

use axum::Router;
use tower_http::trace::TraceLayer;

/// Build all routes for the API
pub fn build_routes() -> Router {
    Router::new()
        .merge(echo::routes())
        .layer(TraceLayer::new_for_http())
}
