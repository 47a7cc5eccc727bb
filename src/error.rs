//! Error taxonomy for the clustering action.
//!
//! Every stage classifies its own failures into [`ClusteringError`] before
//! returning, so the REST layer only maps variants to status codes.

use axum::http::StatusCode;
use thiserror::Error;

/// Failures reported by a search index backend. Each kind carries the HTTP
/// status the index itself would answer with.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SearchError {
    #[error("no such index [{0}]")]
    IndexNotFound(String),

    #[error("failed to parse query: {0}")]
    QueryParsing(String),

    #[error("search backend failure: {0}")]
    Backend(String),

    #[error("search cancelled before dispatch")]
    Cancelled,
}

impl SearchError {
    pub fn status(&self) -> StatusCode {
        match self {
            SearchError::IndexNotFound(_) => StatusCode::NOT_FOUND,
            SearchError::QueryParsing(_) => StatusCode::BAD_REQUEST,
            SearchError::Backend(_) => StatusCode::INTERNAL_SERVER_ERROR,
            SearchError::Cancelled => StatusCode::GATEWAY_TIMEOUT,
        }
    }
}

/// Failures raised by a clustering capability itself.
#[derive(Error, Debug)]
pub enum AlgorithmError {
    #[error("invalid attribute [{name}]: {reason}")]
    InvalidAttribute { name: String, reason: String },

    #[error("clustering cancelled")]
    Cancelled,

    #[error("{0}")]
    Failed(String),
}

/// Pipeline failures, one variant per failure class a client can observe.
#[derive(Error, Debug)]
pub enum ClusteringError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Search failed: {0}")]
    Search(#[from] SearchError),

    #[error("No such algorithm: [{0}]")]
    UnknownAlgorithm(String),

    #[error("Invalid attributes for algorithm [{algorithm}]: {source}")]
    InvalidAttributes {
        algorithm: String,
        #[source]
        source: AlgorithmError,
    },

    #[error("Clustering failed for algorithm [{algorithm}]: {cause}")]
    ClusteringFailure { algorithm: String, cause: String },

    #[error("Request timed out during {stage} after {elapsed_ms} ms")]
    Timeout { stage: Stage, elapsed_ms: u64 },

    #[error("Clustering capacity exceeded ({limit} concurrent requests), retry later")]
    CapacityExceeded { limit: usize },

    #[error("Internal invariant violated: {0}")]
    InvariantViolation(String),
}

/// Pipeline stage that can suspend, used to classify timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Search,
    Clustering,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Search => f.write_str("search"),
            Stage::Clustering => f.write_str("clustering"),
        }
    }
}

impl ClusteringError {
    pub fn status(&self) -> StatusCode {
        match self {
            ClusteringError::InvalidRequest(_)
            | ClusteringError::UnknownAlgorithm(_)
            | ClusteringError::InvalidAttributes { .. } => StatusCode::BAD_REQUEST,
            ClusteringError::Search(e) => e.status(),
            ClusteringError::ClusteringFailure { .. } | ClusteringError::InvariantViolation(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ClusteringError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            ClusteringError::CapacityExceeded { .. } => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

pub type Result<T, E = ClusteringError> = std::result::Result<T, E>;
