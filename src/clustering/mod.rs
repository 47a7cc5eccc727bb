//! Pluggable clustering capabilities and the registry they are resolved from.
//!
//! A capability turns a set of [`Document`]s into a forest of labeled
//! [`DocumentGroup`]s. Capabilities are registered once at startup under a
//! fixed identifier and looked up per request by [`AlgorithmRegistry`].

use dashmap::DashMap;
use serde::Serialize;
use serde_json::{Map, Value};
use std::ops::RangeInclusive;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::data_models::{Document, DocumentGroup};
use crate::error::AlgorithmError;

pub mod by_language;
pub mod by_url;
pub mod engine;
pub mod frequent_terms;

pub use engine::{ClusterOutput, ClusteringEngine};

/// Per-request algorithm options, as sent in the request's `attributes` object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Attributes(Map<String, Value>);

impl Attributes {
    pub fn new(map: Map<String, Value>) -> Self {
        Self(map)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Reads an integer option, falling back to `default` when absent.
    pub fn usize_in(
        &self,
        name: &str,
        default: usize,
        range: RangeInclusive<usize>,
    ) -> Result<usize, AlgorithmError> {
        let value = match self.0.get(name) {
            None | Some(Value::Null) => return Ok(default),
            Some(v) => v,
        };
        let parsed = match value {
            Value::Number(n) => n.as_u64().map(|n| n as usize),
            Value::String(s) => s.trim().parse::<usize>().ok(),
            _ => None,
        };
        match parsed {
            Some(n) if range.contains(&n) => Ok(n),
            _ => Err(AlgorithmError::InvalidAttribute {
                name: name.to_string(),
                reason: format!(
                    "expected an integer in {}..={}, got {}",
                    range.start(),
                    range.end(),
                    value
                ),
            }),
        }
    }

    /// Rejects option names the algorithm does not know.
    pub fn only(&self, known: &[&str]) -> Result<(), AlgorithmError> {
        match self.keys().find(|k| !known.contains(k)) {
            Some(unknown) => Err(AlgorithmError::InvalidAttribute {
                name: unknown.to_string(),
                reason: format!("unknown attribute, expected one of [{}]", known.join(", ")),
            }),
            None => Ok(()),
        }
    }
}

/// Everything a capability gets for one request.
#[derive(Debug, Clone, Default)]
pub struct ClusteringInput {
    pub documents: Vec<Document>,
    pub query_hint: Option<String>,
    pub attributes: Attributes,
}

/// A named clustering algorithm. Implementations are CPU-bound and run on the
/// blocking pool; they must check `cancel` between iterations and return
/// [`AlgorithmError::Cancelled`] once it fires.
///
/// Empty input yields no groups. Non-empty input yields at least one group.
/// Sibling order is deterministic for identical input.
pub trait ClusteringAlgorithm: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// Checks the request attributes before any work is scheduled.
    fn validate(&self, attributes: &Attributes) -> Result<(), AlgorithmError> {
        attributes.only(&[])
    }

    fn cluster(
        &self,
        input: &ClusteringInput,
        cancel: &CancellationToken,
    ) -> Result<Vec<DocumentGroup>, AlgorithmError>;
}

pub(crate) fn check_cancelled(cancel: &CancellationToken) -> Result<(), AlgorithmError> {
    if cancel.is_cancelled() {
        Err(AlgorithmError::Cancelled)
    } else {
        Ok(())
    }
}

/// Registered algorithm as listed by `GET /_algorithms`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AlgorithmInfo {
    pub name: String,
    pub description: String,
}

/// Process-wide table of clustering capabilities, filled at startup.
pub struct AlgorithmRegistry {
    algorithms: DashMap<String, Arc<dyn ClusteringAlgorithm>>,
}

impl AlgorithmRegistry {
    /// Creates a new, empty registry.
    pub fn new() -> Self {
        Self {
            algorithms: DashMap::new(),
        }
    }

    /// A registry holding the built-in algorithms.
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        registry.register(Arc::new(frequent_terms::FrequentTermsAlgorithm));
        registry.register(Arc::new(by_url::ByUrlAlgorithm));
        registry.register(Arc::new(by_language::ByLanguageAlgorithm));
        registry
    }

    pub fn register(&self, algorithm: Arc<dyn ClusteringAlgorithm>) {
        let name = algorithm.name().to_string();
        tracing::info!("Registered clustering algorithm: {}", name);
        self.algorithms.insert(name, algorithm);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ClusteringAlgorithm>> {
        self.algorithms.get(name).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.algorithms.contains_key(name)
    }

    /// Registered algorithms sorted by name.
    pub fn list(&self) -> Vec<AlgorithmInfo> {
        let mut infos: Vec<AlgorithmInfo> = self
            .algorithms
            .iter()
            .map(|entry| AlgorithmInfo {
                name: entry.key().clone(),
                description: entry.value().description().to_string(),
            })
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }
}

impl Default for AlgorithmRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Uppercases the first character of a label.
pub(crate) fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
