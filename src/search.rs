//! Search stage: runs the query against a [`SearchIndex`] under the request cap.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::data_models::MaxHits;
use crate::error::SearchError;

/// A single record returned by the search index.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Hit {
    #[serde(rename = "_index")]
    pub index: String,
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_score")]
    pub score: f32,
    #[serde(rename = "_source")]
    pub source: Map<String, Value>,
}

/// Hits for one query plus the total number of matches before capping.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct SearchHits {
    pub total: usize,
    pub hits: Vec<Hit>,
}

/// A search index the pipeline reads from. Implementations validate the query
/// and the index names themselves.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    async fn search(
        &self,
        indices: &[String],
        query: &Value,
        limit: Option<usize>,
    ) -> Result<SearchHits, SearchError>;

    /// Names of the indices this backend serves.
    fn indices(&self) -> Vec<String>;
}

/// The search stage output handed to the rest of the pipeline.
#[derive(Debug, Clone)]
pub struct SearchOutput {
    pub hits: SearchHits,
    pub took_ms: u64,
}

#[derive(Clone)]
pub struct SearchStage {
    index: Arc<dyn SearchIndex>,
}

impl SearchStage {
    pub fn new(index: Arc<dyn SearchIndex>) -> Self {
        Self { index }
    }

    pub fn index(&self) -> &Arc<dyn SearchIndex> {
        &self.index
    }

    /// Executes `query` against `indices`, returning at most `cap` hits.
    ///
    /// Repeated index names are searched once. When more than one index is
    /// searched, hit ids are qualified as `<index>/<id>` so every id in the
    /// output is unique. Backend failures are returned unchanged.
    pub async fn execute(
        &self,
        query: &Value,
        indices: &[String],
        cap: MaxHits,
        cancel: &CancellationToken,
    ) -> Result<SearchOutput, SearchError> {
        if cancel.is_cancelled() {
            return Err(SearchError::Cancelled);
        }

        let indices = distinct(indices);
        let start = Instant::now();
        let mut hits = self.index.search(&indices, query, cap.limit()).await?;
        if let Some(limit) = cap.limit() {
            hits.hits.truncate(limit);
        }
        if indices.len() > 1 {
            for hit in &mut hits.hits {
                hit.id = format!("{}/{}", hit.index, hit.id);
            }
        }
        ensure_unique_ids(&hits)?;
        let took_ms = start.elapsed().as_millis() as u64;

        tracing::debug!(
            indices = ?indices,
            total = hits.total,
            returned = hits.hits.len(),
            took_ms,
            "search stage finished"
        );

        Ok(SearchOutput { hits, took_ms })
    }
}

/// First occurrence of each index name, in request order.
fn distinct(indices: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    indices
        .iter()
        .filter(|name| seen.insert(name.as_str()))
        .cloned()
        .collect()
}

fn ensure_unique_ids(hits: &SearchHits) -> Result<(), SearchError> {
    let mut seen = HashSet::with_capacity(hits.hits.len());
    match hits.hits.iter().find(|hit| !seen.insert(hit.id.as_str())) {
        Some(hit) => Err(SearchError::Backend(format!(
            "index [{}] returned document [{}] more than once",
            hit.index, hit.id
        ))),
        None => Ok(()),
    }
}
