//! Response assembly: joins search output, the group tree and timing info into
//! one immutable [`ClusteringActionResponse`].

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::data_models::{DocumentGroup, MaxHits};
use crate::error::ClusteringError;
use crate::search::SearchHits;

/// Keys of the `info` object.
pub mod info_keys {
    pub const ALGORITHM: &str = "algorithm";
    pub const SEARCH_MILLIS: &str = "search-millis";
    pub const CLUSTERING_MILLIS: &str = "clustering-millis";
    pub const TOTAL_MILLIS: &str = "total-millis";
    pub const MAX_HITS: &str = "max-hits";

    pub const ALL: [&str; 5] = [
        ALGORITHM,
        SEARCH_MILLIS,
        CLUSTERING_MILLIS,
        TOTAL_MILLIS,
        MAX_HITS,
    ];
}

/// Diagnostics attached to every successful response. `max_hits` is `None`
/// when the search ran uncapped.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Info {
    #[serde(rename = "algorithm")]
    pub algorithm: String,
    #[serde(rename = "search-millis")]
    pub search_millis: u64,
    #[serde(rename = "clustering-millis")]
    pub clustering_millis: u64,
    #[serde(rename = "total-millis")]
    pub total_millis: u64,
    #[serde(rename = "max-hits")]
    pub max_hits: Option<usize>,
}

impl Info {
    pub fn effective_cap(&self) -> MaxHits {
        match self.max_hits {
            Some(n) => MaxHits::Bounded(n),
            None => MaxHits::Unbounded,
        }
    }
}

/// The search section of a response.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SearchResponse {
    pub took: u64,
    pub hits: SearchHits,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ClusteringActionResponse {
    search_response: SearchResponse,
    clusters: Vec<DocumentGroup>,
    info: Info,
}

impl ClusteringActionResponse {
    pub fn search_response(&self) -> &SearchResponse {
        &self.search_response
    }

    pub fn hits(&self) -> &SearchHits {
        &self.search_response.hits
    }

    pub fn document_groups(&self) -> &[DocumentGroup] {
        &self.clusters
    }

    pub fn info(&self) -> &Info {
        &self.info
    }
}

/// Inputs to [`assemble`], gathered from the two pipeline stages.
pub struct Assembly {
    pub hits: SearchHits,
    pub groups: Vec<DocumentGroup>,
    pub search_millis: u64,
    pub clustering_millis: u64,
    pub algorithm: String,
    pub effective_cap: MaxHits,
}

fn number_groups(groups: Vec<DocumentGroup>, next_id: &mut u32) -> Vec<DocumentGroup> {
    groups
        .into_iter()
        .map(|mut group| {
            group.id = *next_id;
            *next_id += 1;
            group.clusters = number_groups(std::mem::take(&mut group.clusters), next_id);
            group
        })
        .collect()
}

fn check_labels(groups: &[DocumentGroup]) -> Result<(), ClusteringError> {
    for root in groups {
        let mut unlabeled = None;
        root.walk(&mut |g| {
            if unlabeled.is_none() && g.label.trim().is_empty() {
                unlabeled = Some(g.documents.len());
            }
        });
        if let Some(size) = unlabeled {
            return Err(ClusteringError::InvariantViolation(format!(
                "group with {size} documents has an empty label"
            )));
        }
    }
    Ok(())
}

/// Hit ids are unique and no group lists the same document twice.
fn check_unique(hits: &SearchHits, groups: &[DocumentGroup]) -> Result<(), ClusteringError> {
    let mut seen = HashSet::with_capacity(hits.hits.len());
    if let Some(hit) = hits.hits.iter().find(|h| !seen.insert(h.id.as_str())) {
        return Err(ClusteringError::InvariantViolation(format!(
            "document id [{}] appears more than once among the hits",
            hit.id
        )));
    }
    for root in groups {
        let mut repeated = None;
        root.walk(&mut |g| {
            let mut members = HashSet::new();
            if repeated.is_none() {
                repeated = g
                    .documents
                    .iter()
                    .find(|id| !members.insert(id.as_str()))
                    .map(|id| (g.label.clone(), id.clone()));
            }
        });
        if let Some((label, id)) = repeated {
            return Err(ClusteringError::InvariantViolation(format!(
                "group [{label}] lists document [{id}] more than once"
            )));
        }
    }
    Ok(())
}

fn check_references(hits: &SearchHits, groups: &[DocumentGroup]) -> Result<(), ClusteringError> {
    let known: HashSet<&str> = hits.hits.iter().map(|h| h.id.as_str()).collect();
    for root in groups {
        if let Some(dangling) = root
            .all_document_refs()
            .into_iter()
            .find(|id| !known.contains(id))
        {
            return Err(ClusteringError::InvariantViolation(format!(
                "group [{}] references document [{}] which is not among the {} retrieved hits",
                root.label,
                dangling,
                known.len()
            )));
        }
    }
    Ok(())
}

/// Builds the response. Total time is the sum of the stage times. Hit ids
/// must be unique, and so must the documents of each group. With an
/// unbounded cap every referenced document must be one of the hits; with a
/// bounded cap that check is skipped.
pub fn assemble(assembly: Assembly) -> Result<ClusteringActionResponse, ClusteringError> {
    let Assembly {
        hits,
        groups,
        search_millis,
        clustering_millis,
        algorithm,
        effective_cap,
    } = assembly;

    check_labels(&groups)?;
    check_unique(&hits, &groups)?;
    if effective_cap.is_unbounded() {
        check_references(&hits, &groups)?;
    }

    let mut next_id = 0;
    let clusters = number_groups(groups, &mut next_id);

    Ok(ClusteringActionResponse {
        search_response: SearchResponse {
            took: search_millis,
            hits,
        },
        clusters,
        info: Info {
            algorithm,
            search_millis,
            clustering_millis,
            total_millis: search_millis + clustering_millis,
            max_hits: effective_cap.limit(),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::Hit;
    use serde_json::Map;

    fn hits(ids: &[&str]) -> SearchHits {
        SearchHits {
            total: ids.len(),
            hits: ids
                .iter()
                .map(|id| Hit {
                    index: "test".into(),
                    id: id.to_string(),
                    score: 1.0,
                    source: Map::new(),
                })
                .collect(),
        }
    }

    fn assembly(groups: Vec<DocumentGroup>, cap: MaxHits) -> Assembly {
        Assembly {
            hits: hits(&["a", "b"]),
            groups,
            search_millis: 7,
            clustering_millis: 5,
            algorithm: "frequent-terms".into(),
            effective_cap: cap,
        }
    }

    #[test]
    fn test_total_is_sum_and_ids_are_preorder() {
        let groups = vec![
            DocumentGroup::new("parent")
                .with_documents(vec!["a".into(), "b".into()])
                .with_clusters(vec![DocumentGroup::new("child").with_documents(vec!["a".into()])]),
            DocumentGroup::new("sibling").with_documents(vec!["b".into()]),
        ];
        let response = assemble(assembly(groups, MaxHits::Unbounded)).unwrap();

        assert_eq!(response.info().total_millis, 12);
        assert_eq!(response.info().max_hits, None);
        assert_eq!(response.search_response().took, 7);

        let g = response.document_groups();
        assert_eq!((g[0].id, g[0].clusters[0].id, g[1].id), (0, 1, 2));
    }

    #[test]
    fn test_dangling_reference_rejected_when_unbounded() {
        let groups = vec![DocumentGroup::new("x").with_documents(vec!["a".into(), "zzz".into()])];
        let err = assemble(assembly(groups, MaxHits::Unbounded)).unwrap_err();
        assert!(matches!(err, ClusteringError::InvariantViolation(ref m) if m.contains("zzz")));
    }

    #[test]
    fn test_nested_dangling_reference_rejected() {
        let groups = vec![
            DocumentGroup::new("x")
                .with_clusters(vec![DocumentGroup::new("y").with_documents(vec!["ghost".into()])]),
        ];
        assert!(assemble(assembly(groups, MaxHits::Unbounded)).is_err());
    }

    #[test]
    fn test_reference_check_skipped_when_bounded() {
        let groups = vec![DocumentGroup::new("x").with_documents(vec!["zzz".into()])];
        let response = assemble(assembly(groups, MaxHits::Bounded(2))).unwrap();
        assert_eq!(response.info().max_hits, Some(2));
        assert_eq!(response.info().effective_cap(), MaxHits::Bounded(2));
    }

    #[test]
    fn test_duplicate_hit_ids_rejected() {
        let err = assemble(Assembly {
            hits: hits(&["a", "b", "a"]),
            ..assembly(vec![], MaxHits::Bounded(3))
        })
        .unwrap_err();
        assert!(matches!(err, ClusteringError::InvariantViolation(ref m) if m.contains("[a]")));
    }

    #[test]
    fn test_document_listed_twice_in_group_rejected() {
        let groups = vec![
            DocumentGroup::new("outer").with_clusters(vec![
                DocumentGroup::new("inner").with_documents(vec!["b".into(), "b".into()]),
            ]),
        ];
        let err = assemble(assembly(groups, MaxHits::Unbounded)).unwrap_err();
        assert!(matches!(err, ClusteringError::InvariantViolation(ref m) if m.contains("inner")));
    }

    #[test]
    fn test_empty_label_rejected_at_any_depth() {
        let groups = vec![
            DocumentGroup::new("ok").with_clusters(vec![DocumentGroup::new("  ")]),
        ];
        let err = assemble(assembly(groups, MaxHits::Bounded(2))).unwrap_err();
        assert!(matches!(err, ClusteringError::InvariantViolation(_)));
    }

    #[test]
    fn test_no_groups_still_has_info() {
        let response = assemble(Assembly {
            hits: SearchHits::default(),
            groups: vec![],
            search_millis: 1,
            clustering_millis: 0,
            algorithm: "by-url".into(),
            effective_cap: MaxHits::Unbounded,
        })
        .unwrap();
        assert!(response.document_groups().is_empty());
        assert_eq!(response.info().algorithm, "by-url");
        assert_eq!(response.info().total_millis, 1);
    }
}
