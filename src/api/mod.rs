use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::pipeline::ClusteringAction;

pub mod handlers;
pub mod models;

pub fn create_router(action: Arc<ClusteringAction>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/_search_with_clusters", post(handlers::search_with_clusters))
        .route(
            "/:index/_search_with_clusters",
            post(handlers::search_index_with_clusters),
        )
        .route("/_algorithms", get(handlers::list_algorithms))
        .with_state(action)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
