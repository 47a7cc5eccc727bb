use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
};
use std::sync::Arc;

use crate::error::ClusteringError;
use crate::pipeline::ClusteringAction;
use crate::request::ClusteringRequest;
use crate::response::ClusteringActionResponse;

use super::models::{AlgorithmsResponse, AlgorithmSummary};

/// `POST /_search_with_clusters`, indices come from `search_request.index`.
pub async fn search_with_clusters(
    State(action): State<Arc<ClusteringAction>>,
    body: Bytes,
) -> Result<ClusteringActionResponse, ClusteringError> {
    let request = ClusteringRequest::parse(&body, None, &action.settings().default_algorithm)?;
    action.execute(request).await
}

/// `POST /{index}/_search_with_clusters`, `index` may list several names
/// separated by commas.
pub async fn search_index_with_clusters(
    State(action): State<Arc<ClusteringAction>>,
    Path(index): Path<String>,
    body: Bytes,
) -> Result<ClusteringActionResponse, ClusteringError> {
    let request =
        ClusteringRequest::parse(&body, Some(&index), &action.settings().default_algorithm)?;
    action.execute(request).await
}

pub async fn list_algorithms(
    State(action): State<Arc<ClusteringAction>>,
) -> Json<AlgorithmsResponse> {
    Json(AlgorithmsResponse {
        default: action.settings().default_algorithm.clone(),
        algorithms: action
            .engine()
            .registry()
            .list()
            .into_iter()
            .map(AlgorithmSummary::from)
            .collect(),
    })
}
