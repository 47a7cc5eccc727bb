//! The clustering action: validate, search, adapt, cluster, assemble.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout_at;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::adapter;
use crate::clustering::ClusteringEngine;
use crate::data_models::Document;
use crate::error::{ClusteringError, SearchError, Stage};
use crate::request::ClusteringRequest;
use crate::response::{Assembly, ClusteringActionResponse, assemble};
use crate::search::SearchStage;

/// Per-request limits shared by every execution.
#[derive(Debug, Clone)]
pub struct ActionSettings {
    pub request_timeout: Duration,
    pub default_algorithm: String,
}

impl Default for ActionSettings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            default_algorithm: crate::clustering::frequent_terms::NAME.to_string(),
        }
    }
}

/// Stateless orchestrator over the search and clustering stages. Safe to share
/// between concurrent requests.
pub struct ClusteringAction {
    search: SearchStage,
    engine: Arc<ClusteringEngine>,
    settings: ActionSettings,
}

impl ClusteringAction {
    pub fn new(search: SearchStage, engine: Arc<ClusteringEngine>, settings: ActionSettings) -> Self {
        Self {
            search,
            engine,
            settings,
        }
    }

    pub fn engine(&self) -> &Arc<ClusteringEngine> {
        &self.engine
    }

    pub fn search_stage(&self) -> &SearchStage {
        &self.search
    }

    pub fn settings(&self) -> &ActionSettings {
        &self.settings
    }

    /// Runs one request to completion. Exactly one of a response or an error
    /// comes back; no partial results.
    pub async fn execute(
        &self,
        request: ClusteringRequest,
    ) -> Result<ClusteringActionResponse, ClusteringError> {
        let request_id = nanoid::nanoid!(8);
        let span = tracing::info_span!(
            "clustering_action",
            request_id = %request_id,
            algorithm = %request.algorithm,
        );
        let result = self.run(request).instrument(span.clone()).await;
        if let Err(ClusteringError::InvariantViolation(msg)) = &result {
            span.in_scope(|| tracing::error!(violation = %msg, "response failed validation"));
        }
        result
    }

    async fn run(
        &self,
        request: ClusteringRequest,
    ) -> Result<ClusteringActionResponse, ClusteringError> {
        let ClusteringRequest {
            indices,
            query,
            query_hint,
            field_mapping,
            algorithm,
            max_hits,
            attributes,
        } = request;

        // Unknown algorithms and bad attributes never reach the index.
        self.engine.check(&algorithm, &attributes)?;

        let started = Instant::now();
        let deadline = tokio::time::Instant::now() + self.settings.request_timeout;
        let cancel = CancellationToken::new();

        tracing::info!(indices = ?indices, max_hits = ?max_hits.limit(), "executing search");
        let searched = match timeout_at(
            deadline,
            self.search.execute(&query, &indices, max_hits, &cancel),
        )
        .await
        {
            Ok(Err(SearchError::Cancelled)) => {
                return Err(ClusteringError::Timeout {
                    stage: Stage::Search,
                    elapsed_ms: started.elapsed().as_millis() as u64,
                });
            }
            Ok(result) => result?,
            Err(_) => {
                cancel.cancel();
                return Err(ClusteringError::Timeout {
                    stage: Stage::Search,
                    elapsed_ms: started.elapsed().as_millis() as u64,
                });
            }
        };

        let documents: Vec<Document> = searched
            .hits
            .hits
            .iter()
            .map(|hit| adapter::adapt(hit, &field_mapping))
            .collect();

        let clustered = match timeout_at(
            deadline,
            self.engine
                .cluster(&algorithm, documents, query_hint, attributes, &cancel),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => {
                cancel.cancel();
                return Err(ClusteringError::Timeout {
                    stage: Stage::Clustering,
                    elapsed_ms: started.elapsed().as_millis() as u64,
                });
            }
        };

        let response = assemble(Assembly {
            hits: searched.hits,
            groups: clustered.groups,
            search_millis: searched.took_ms,
            clustering_millis: clustered.took_ms,
            algorithm,
            effective_cap: max_hits,
        })?;

        tracing::info!(
            hits = response.hits().hits.len(),
            groups = response.document_groups().len(),
            total_millis = response.info().total_millis,
            "clustering action finished"
        );
        Ok(response)
    }
}
