//! Clustering stage: resolves the requested capability and runs it on the
//! blocking pool behind a concurrency bound.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use super::{AlgorithmRegistry, Attributes, ClusteringInput};
use crate::data_models::{Document, DocumentGroup};
use crate::error::{AlgorithmError, ClusteringError, Stage};

/// Groups produced by one clustering call and the time the call took.
#[derive(Debug, Clone)]
pub struct ClusterOutput {
    pub groups: Vec<DocumentGroup>,
    pub took_ms: u64,
}

pub struct ClusteringEngine {
    registry: Arc<AlgorithmRegistry>,
    permits: Arc<Semaphore>,
    max_concurrent: usize,
    admission_wait: Duration,
    default_language: String,
}

impl ClusteringEngine {
    pub fn new(
        registry: Arc<AlgorithmRegistry>,
        max_concurrent: usize,
        admission_wait: Duration,
        default_language: impl Into<String>,
    ) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            registry,
            permits: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
            admission_wait,
            default_language: default_language.into(),
        }
    }

    pub fn registry(&self) -> &Arc<AlgorithmRegistry> {
        &self.registry
    }

    /// Permits not currently held by a running clustering call.
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    /// Fails fast on unknown algorithms and invalid attributes, before the
    /// search stage runs.
    pub fn check(&self, algorithm: &str, attributes: &Attributes) -> Result<(), ClusteringError> {
        let capability = self
            .registry
            .get(algorithm)
            .ok_or_else(|| ClusteringError::UnknownAlgorithm(algorithm.to_string()))?;
        capability
            .validate(attributes)
            .map_err(|source| ClusteringError::InvalidAttributes {
                algorithm: algorithm.to_string(),
                source,
            })
    }

    /// Clusters `documents` with the named algorithm. Documents without a
    /// language get the configured default. Sibling order is whatever the
    /// algorithm returned.
    pub async fn cluster(
        &self,
        algorithm: &str,
        mut documents: Vec<Document>,
        query_hint: Option<String>,
        attributes: Attributes,
        cancel: &CancellationToken,
    ) -> Result<ClusterOutput, ClusteringError> {
        self.check(algorithm, &attributes)?;
        let capability = self
            .registry
            .get(algorithm)
            .ok_or_else(|| ClusteringError::UnknownAlgorithm(algorithm.to_string()))?;

        for doc in documents.iter_mut() {
            if doc.language.is_none() {
                doc.language = Some(self.default_language.clone());
            }
        }

        let permit = match tokio::time::timeout(
            self.admission_wait,
            self.permits.clone().acquire_owned(),
        )
        .await
        {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) | Err(_) => {
                tracing::warn!(
                    algorithm,
                    limit = self.max_concurrent,
                    "clustering request rejected, no capacity"
                );
                return Err(ClusteringError::CapacityExceeded {
                    limit: self.max_concurrent,
                });
            }
        };

        let input = ClusteringInput {
            documents,
            query_hint,
            attributes,
        };
        let token = cancel.clone();
        let task = tokio::task::spawn_blocking(move || {
            // Held until the algorithm actually returns, even if the caller gave up.
            let _permit = permit;
            let start = Instant::now();
            let result = capability.cluster(&input, &token);
            (result, start.elapsed())
        });

        match task.await {
            Ok((Ok(groups), elapsed)) => {
                let took_ms = elapsed.as_millis() as u64;
                tracing::debug!(algorithm, groups = groups.len(), took_ms, "clustering finished");
                Ok(ClusterOutput { groups, took_ms })
            }
            Ok((Err(AlgorithmError::Cancelled), elapsed)) => Err(ClusteringError::Timeout {
                stage: Stage::Clustering,
                elapsed_ms: elapsed.as_millis() as u64,
            }),
            Ok((Err(source @ AlgorithmError::InvalidAttribute { .. }), _)) => {
                Err(ClusteringError::InvalidAttributes {
                    algorithm: algorithm.to_string(),
                    source,
                })
            }
            Ok((Err(AlgorithmError::Failed(cause)), _)) => {
                tracing::error!(algorithm, %cause, "clustering algorithm failed");
                Err(ClusteringError::ClusteringFailure {
                    algorithm: algorithm.to_string(),
                    cause,
                })
            }
            Err(join_error) => {
                let cause = if join_error.is_panic() {
                    let payload = join_error.into_panic();
                    payload
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| payload.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "algorithm panicked".to_string())
                } else {
                    "clustering task was aborted".to_string()
                };
                tracing::error!(algorithm, %cause, "clustering task did not complete");
                Err(ClusteringError::ClusteringFailure {
                    algorithm: algorithm.to_string(),
                    cause,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clustering::ClusteringAlgorithm;
    use std::sync::Mutex;
    use std::sync::mpsc;

    struct Panicking;

    impl ClusteringAlgorithm for Panicking {
        fn name(&self) -> &str {
            "panicking"
        }
        fn description(&self) -> &str {
            "always panics"
        }
        fn cluster(
            &self,
            _input: &ClusteringInput,
            _cancel: &CancellationToken,
        ) -> Result<Vec<DocumentGroup>, AlgorithmError> {
            panic!("index out of bounds in scorer")
        }
    }

    struct Failing;

    impl ClusteringAlgorithm for Failing {
        fn name(&self) -> &str {
            "failing"
        }
        fn description(&self) -> &str {
            "always fails"
        }
        fn cluster(
            &self,
            _input: &ClusteringInput,
            _cancel: &CancellationToken,
        ) -> Result<Vec<DocumentGroup>, AlgorithmError> {
            Err(AlgorithmError::Failed("matrix is singular".into()))
        }
    }

    /// Echoes the languages it saw as group labels.
    struct Languages;

    impl ClusteringAlgorithm for Languages {
        fn name(&self) -> &str {
            "languages"
        }
        fn description(&self) -> &str {
            "labels groups with document languages"
        }
        fn cluster(
            &self,
            input: &ClusteringInput,
            _cancel: &CancellationToken,
        ) -> Result<Vec<DocumentGroup>, AlgorithmError> {
            Ok(input
                .documents
                .iter()
                .map(|d| {
                    DocumentGroup::new(d.language.clone().unwrap_or_default())
                        .with_documents(vec![d.id.clone()])
                })
                .collect())
        }
    }

    /// Blocks until released, signalling when it starts.
    struct Blocking {
        started: Mutex<mpsc::Sender<()>>,
        release: Mutex<mpsc::Receiver<()>>,
    }

    impl ClusteringAlgorithm for Blocking {
        fn name(&self) -> &str {
            "blocking"
        }
        fn description(&self) -> &str {
            "waits for a release signal"
        }
        fn cluster(
            &self,
            _input: &ClusteringInput,
            _cancel: &CancellationToken,
        ) -> Result<Vec<DocumentGroup>, AlgorithmError> {
            let _ = self.started.lock().unwrap().send(());
            let _ = self.release.lock().unwrap().recv();
            Ok(vec![DocumentGroup::new("done")])
        }
    }

    fn engine_with(registry: AlgorithmRegistry, max_concurrent: usize) -> ClusteringEngine {
        ClusteringEngine::new(
            Arc::new(registry),
            max_concurrent,
            Duration::from_millis(50),
            "en",
        )
    }

    fn docs() -> Vec<Document> {
        vec![
            Document::new("1", "one", ""),
            Document::new("2", "two", "").with_language("de"),
        ]
    }

    #[tokio::test]
    async fn test_unknown_algorithm() {
        let engine = engine_with(AlgorithmRegistry::with_defaults(), 2);
        let err = engine
            .cluster(
                "no-such-algorithm",
                docs(),
                None,
                Attributes::default(),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ClusteringError::UnknownAlgorithm(ref id) if id == "no-such-algorithm"));
    }

    #[tokio::test]
    async fn test_panic_is_classified_with_cause() {
        let registry = AlgorithmRegistry::new();
        registry.register(Arc::new(Panicking));
        let engine = engine_with(registry, 2);
        let err = engine
            .cluster("panicking", docs(), None, Attributes::default(), &CancellationToken::new())
            .await
            .unwrap_err();
        match err {
            ClusteringError::ClusteringFailure { algorithm, cause } => {
                assert_eq!(algorithm, "panicking");
                assert!(cause.contains("index out of bounds"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        // the permit came back
        assert_eq!(engine.available_permits(), 2);
    }

    #[tokio::test]
    async fn test_algorithm_failure_keeps_cause() {
        let registry = AlgorithmRegistry::new();
        registry.register(Arc::new(Failing));
        let engine = engine_with(registry, 1);
        let err = engine
            .cluster("failing", docs(), None, Attributes::default(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("matrix is singular"));
        assert!(err.to_string().contains("failing"));
    }

    #[tokio::test]
    async fn test_default_language_applied() {
        let registry = AlgorithmRegistry::new();
        registry.register(Arc::new(Languages));
        let engine = engine_with(registry, 1);
        let out = engine
            .cluster("languages", docs(), None, Attributes::default(), &CancellationToken::new())
            .await
            .unwrap();
        let labels: Vec<&str> = out.groups.iter().map(|g| g.label.as_str()).collect();
        assert_eq!(labels, vec!["en", "de"]);
    }

    #[tokio::test]
    async fn test_rejects_when_at_capacity() {
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let registry = AlgorithmRegistry::new();
        registry.register(Arc::new(Blocking {
            started: Mutex::new(started_tx),
            release: Mutex::new(release_rx),
        }));
        let engine = Arc::new(engine_with(registry, 1));

        let first = {
            let engine = engine.clone();
            tokio::spawn(async move {
                engine
                    .cluster("blocking", docs(), None, Attributes::default(), &CancellationToken::new())
                    .await
            })
        };
        tokio::task::spawn_blocking(move || started_rx.recv())
            .await
            .unwrap()
            .unwrap();

        let err = engine
            .cluster("blocking", docs(), None, Attributes::default(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ClusteringError::CapacityExceeded { limit: 1 }));

        release_tx.send(()).unwrap();
        let out = first.await.unwrap().unwrap();
        assert_eq!(out.groups[0].label, "done");
    }
}
