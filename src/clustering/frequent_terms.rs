use porter_stemmer::stem;
use std::collections::{BTreeMap, HashMap, HashSet};
use tokio_util::sync::CancellationToken;

use super::{Attributes, ClusteringAlgorithm, ClusteringInput, capitalize, check_cancelled};
use crate::analyzer::TextAnalyzer;
use crate::data_models::DocumentGroup;
use crate::error::AlgorithmError;

pub const NAME: &str = "frequent-terms";
pub const OTHER_TOPICS: &str = "Other Topics";

#[derive(Debug, Clone, Copy)]
struct Params {
    max_clusters: usize,
    min_cluster_size: usize,
    max_depth: usize,
}

impl Params {
    fn from_attributes(attributes: &Attributes) -> Result<Params, AlgorithmError> {
        attributes.only(&["max_clusters", "min_cluster_size", "max_depth"])?;
        Ok(Params {
            max_clusters: attributes.usize_in("max_clusters", 10, 1..=100)?,
            min_cluster_size: attributes.usize_in("min_cluster_size", 2, 1..=1000)?,
            max_depth: attributes.usize_in("max_depth", 2, 1..=3)?,
        })
    }
}

/// Per-request term statistics shared by every level of the hierarchy.
struct TermTable {
    /// stems of each document, indexed like the input documents
    doc_stems: Vec<HashSet<String>>,
    /// stem -> surface form -> occurrences
    surfaces: HashMap<String, BTreeMap<String, usize>>,
    /// stems never used as labels
    excluded: HashSet<String>,
}

impl TermTable {
    fn build(input: &ClusteringInput, cancel: &CancellationToken) -> Result<Self, AlgorithmError> {
        let mut analyzers: HashMap<String, TextAnalyzer> = HashMap::new();
        let mut doc_stems = Vec::with_capacity(input.documents.len());
        let mut surfaces: HashMap<String, BTreeMap<String, usize>> = HashMap::new();

        for doc in &input.documents {
            check_cancelled(cancel)?;
            let language = doc.language.clone().unwrap_or_else(|| "en".to_string());
            let analyzer = analyzers
                .entry(language.clone())
                .or_insert_with(|| TextAnalyzer::surface(&language));
            let mut stems = HashSet::new();
            for word in analyzer.terms(&doc.text()) {
                let key = stem(&word);
                *surfaces
                    .entry(key.clone())
                    .or_default()
                    .entry(word)
                    .or_default() += 1;
                stems.insert(key);
            }
            doc_stems.push(stems);
        }

        let excluded = input
            .query_hint
            .as_deref()
            .map(|hint| {
                TextAnalyzer::surface("en")
                    .terms(hint)
                    .iter()
                    .map(|w| stem(w))
                    .collect()
            })
            .unwrap_or_default();

        Ok(TermTable {
            doc_stems,
            surfaces,
            excluded,
        })
    }

    /// Most frequent surface form of `stem`, ties broken alphabetically.
    fn label(&self, stem: &str) -> String {
        let best = self.surfaces.get(stem).and_then(|forms| {
            forms
                .iter()
                .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
                .map(|(form, _)| form.clone())
        });
        capitalize(&best.unwrap_or_else(|| stem.to_string()))
    }
}

/// Groups documents that share frequent terms. Each group is labeled with the
/// shared term; groups large enough are split again on the next most frequent
/// terms, up to `max_depth` levels. Documents left out of every top-level group
/// are collected under "Other Topics".
pub struct FrequentTermsAlgorithm;

impl FrequentTermsAlgorithm {
    #[allow(clippy::too_many_arguments)]
    fn build_level(
        &self,
        members: &[usize],
        table: &TermTable,
        input: &ClusteringInput,
        used: &HashSet<String>,
        depth: usize,
        params: Params,
        cancel: &CancellationToken,
    ) -> Result<Vec<DocumentGroup>, AlgorithmError> {
        check_cancelled(cancel)?;

        let mut df: HashMap<&str, Vec<usize>> = HashMap::new();
        for &doc in members {
            for s in &table.doc_stems[doc] {
                if used.contains(s) || table.excluded.contains(s) {
                    continue;
                }
                df.entry(s.as_str()).or_default().push(doc);
            }
        }

        // Below the top level a term shared by every member says nothing new.
        let max_df = if depth == 1 {
            members.len()
        } else {
            members.len() - 1
        };
        let mut candidates: Vec<(&str, Vec<usize>)> = df
            .into_iter()
            .filter(|(_, docs)| docs.len() >= params.min_cluster_size && docs.len() <= max_df)
            .collect();
        candidates.sort_by(|a, b| b.1.len().cmp(&a.1.len()).then_with(|| a.0.cmp(b.0)));

        let mut chosen: Vec<(&str, Vec<usize>)> = Vec::new();
        for (term, mut docs) in candidates {
            if chosen.len() >= params.max_clusters {
                break;
            }
            docs.sort_unstable();
            if chosen.iter().any(|(_, existing)| *existing == docs) {
                continue;
            }
            chosen.push((term, docs));
        }

        let mut groups = Vec::with_capacity(chosen.len());
        for (term, docs) in chosen {
            check_cancelled(cancel)?;
            let children = if depth < params.max_depth && docs.len() >= 2 * params.min_cluster_size
            {
                let mut used = used.clone();
                used.insert(term.to_string());
                self.build_level(&docs, table, input, &used, depth + 1, params, cancel)?
            } else {
                Vec::new()
            };
            let ids = docs
                .iter()
                .map(|&d| input.documents[d].id.clone())
                .collect();
            let mut group = DocumentGroup::new(table.label(term))
                .with_documents(ids)
                .with_clusters(children);
            group.phrases = vec![term.to_string()];
            groups.push(group);
        }
        Ok(groups)
    }
}

impl ClusteringAlgorithm for FrequentTermsAlgorithm {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Groups documents sharing frequent terms, with nested subgroups"
    }

    fn validate(&self, attributes: &Attributes) -> Result<(), AlgorithmError> {
        Params::from_attributes(attributes).map(|_| ())
    }

    fn cluster(
        &self,
        input: &ClusteringInput,
        cancel: &CancellationToken,
    ) -> Result<Vec<DocumentGroup>, AlgorithmError> {
        let params = Params::from_attributes(&input.attributes)?;
        if input.documents.is_empty() {
            return Ok(Vec::new());
        }

        let table = TermTable::build(input, cancel)?;
        let members: Vec<usize> = (0..input.documents.len()).collect();
        let mut groups = self.build_level(
            &members,
            &table,
            input,
            &HashSet::new(),
            1,
            params,
            cancel,
        )?;

        let mut assigned = vec![false; input.documents.len()];
        for group in &groups {
            for id in &group.documents {
                if let Some(pos) = input.documents.iter().position(|d| &d.id == id) {
                    assigned[pos] = true;
                }
            }
        }
        let leftovers: Vec<String> = input
            .documents
            .iter()
            .zip(assigned)
            .filter(|(_, assigned)| !assigned)
            .map(|(doc, _)| doc.id.clone())
            .collect();
        if !leftovers.is_empty() {
            groups.push(DocumentGroup::other_topics(OTHER_TOPICS, leftovers));
        }

        Ok(groups)
    }
}
