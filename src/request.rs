//! Clustering request parsing and validation.

use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashSet;

use crate::adapter::FieldMapping;
use crate::clustering::Attributes;
use crate::data_models::MaxHits;
use crate::error::ClusteringError;
use crate::transcoder;

/// Raw request body, before validation.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ClusteringRequestBody {
    #[serde(default)]
    search_request: Option<SearchRequestBody>,
    #[serde(default)]
    query_hint: Option<String>,
    #[serde(default)]
    field_mapping: Option<Value>,
    #[serde(default)]
    algorithm: Option<String>,
    #[serde(default)]
    max_hits: Option<Value>,
    #[serde(default)]
    attributes: Option<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SearchRequestBody {
    #[serde(default)]
    index: Option<Value>,
    #[serde(default)]
    query: Option<Value>,
}

/// A validated clustering request. Only requests that pass validation reach
/// the pipeline stages.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusteringRequest {
    pub indices: Vec<String>,
    pub query: Value,
    pub query_hint: Option<String>,
    pub field_mapping: FieldMapping,
    pub algorithm: String,
    pub max_hits: MaxHits,
    pub attributes: Attributes,
}

impl ClusteringRequest {
    /// A match-all request over `indices` with default mapping and settings.
    pub fn new(indices: Vec<String>, algorithm: impl Into<String>) -> Self {
        ClusteringRequest {
            indices,
            query: serde_json::json!({"match_all": {}}),
            query_hint: None,
            field_mapping: FieldMapping::defaults(),
            algorithm: algorithm.into(),
            max_hits: MaxHits::Unbounded,
            attributes: Attributes::default(),
        }
    }

    pub fn with_query(mut self, query: Value) -> Self {
        self.query = query;
        self
    }

    pub fn with_max_hits(mut self, max_hits: MaxHits) -> Self {
        self.max_hits = max_hits;
        self
    }

    pub fn with_field_mapping(mut self, field_mapping: FieldMapping) -> Self {
        self.field_mapping = field_mapping;
        self
    }

    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn with_query_hint(mut self, hint: impl Into<String>) -> Self {
        self.query_hint = Some(hint.into());
        self
    }

    /// Parses a JSON body. `path_indices` is the comma-separated `{index}` path
    /// segment, which takes precedence over `search_request.index`.
    pub fn parse(
        body: &[u8],
        path_indices: Option<&str>,
        default_algorithm: &str,
    ) -> Result<Self, ClusteringError> {
        let map = if body.iter().all(u8::is_ascii_whitespace) {
            Map::new()
        } else {
            transcoder::decode(body)?
        };
        let raw: ClusteringRequestBody = serde_json::from_value(Value::Object(map))
            .map_err(|e| ClusteringError::InvalidRequest(e.to_string()))?;

        let (body_indices, query) = match raw.search_request {
            Some(search) => (search.index, search.query),
            None => (None, None),
        };

        let mut indices = match path_indices {
            Some(path) => split_indices(path),
            None => parse_indices(body_indices)?,
        };
        let mut seen = HashSet::new();
        indices.retain(|name| seen.insert(name.clone()));
        if indices.is_empty() {
            return Err(ClusteringError::InvalidRequest(
                "at least one index is required, in the path or in [search_request.index]".into(),
            ));
        }

        let field_mapping = match raw.field_mapping {
            Some(value) => FieldMapping::parse(&value)?,
            None => FieldMapping::defaults(),
        };

        let algorithm = raw
            .algorithm
            .map(|a| a.trim().to_string())
            .unwrap_or_else(|| default_algorithm.to_string());
        if algorithm.is_empty() {
            return Err(ClusteringError::InvalidRequest(
                "[algorithm] must not be empty".into(),
            ));
        }

        Ok(ClusteringRequest {
            indices,
            query: query.unwrap_or_else(|| serde_json::json!({"match_all": {}})),
            query_hint: raw.query_hint.filter(|h| !h.trim().is_empty()),
            field_mapping,
            algorithm,
            max_hits: parse_max_hits(raw.max_hits)?,
            attributes: Attributes::new(raw.attributes.unwrap_or_default()),
        })
    }
}

fn split_indices(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_indices(value: Option<Value>) -> Result<Vec<String>, ClusteringError> {
    match value {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::String(s)) => Ok(split_indices(&s)),
        Some(Value::Array(items)) => items
            .into_iter()
            .map(|item| match item {
                Value::String(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
                other => Err(ClusteringError::InvalidRequest(format!(
                    "index names must be non-empty strings, got [{other}]"
                ))),
            })
            .collect(),
        Some(other) => Err(ClusteringError::InvalidRequest(format!(
            "[search_request.index] must be a string or an array, got [{other}]"
        ))),
    }
}

/// `max_hits` is a positive integer, `"unbounded"` or absent (unbounded).
fn parse_max_hits(value: Option<Value>) -> Result<MaxHits, ClusteringError> {
    let invalid = |v: &Value| {
        ClusteringError::InvalidRequest(format!(
            "[max_hits] must be a positive integer or \"unbounded\", got [{v}]"
        ))
    };
    match value {
        None | Some(Value::Null) => Ok(MaxHits::Unbounded),
        Some(Value::String(s)) if s.trim().is_empty() || s.trim() == "unbounded" => {
            Ok(MaxHits::Unbounded)
        }
        Some(v @ Value::String(_)) => match v.as_str().and_then(|s| s.trim().parse::<usize>().ok()) {
            Some(n) if n > 0 => Ok(MaxHits::Bounded(n)),
            _ => Err(invalid(&v)),
        },
        Some(v @ Value::Number(_)) => match v.as_u64() {
            Some(n) if n > 0 => Ok(MaxHits::Bounded(n as usize)),
            _ => Err(invalid(&v)),
        },
        Some(v) => Err(invalid(&v)),
    }
}
