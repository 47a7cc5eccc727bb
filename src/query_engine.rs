use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::Path;

use crate::analyzer::TextAnalyzer;
use crate::error::SearchError;
use crate::search::{Hit, SearchHits, SearchIndex};

/// Field name that spans every string field of a document.
pub const ALL_FIELDS: &str = "_all";

pub fn intersect_two_postings<'a, T>(
    posting_list1: &'a [T],
    posting_list2: &'a [T],
    out: &mut Vec<T>,
) where
    T: Ord + Clone,
{
    let (mut p1i, mut p2i) = (0usize, 0usize);
    while p1i < posting_list1.len() && p2i < posting_list2.len() {
        match posting_list1[p1i].cmp(&posting_list2[p2i]) {
            std::cmp::Ordering::Equal => {
                out.push(posting_list1[p1i].clone());
                p1i += 1;
                p2i += 1;
            }
            std::cmp::Ordering::Less => p1i += 1,
            std::cmp::Ordering::Greater => p2i += 1,
        }
    }
}

/// Intersects sorted posting lists, starting from the shortest one.
pub fn intersect_postings<T>(posting_lists: &[&[T]]) -> Vec<T>
where
    T: Ord + Clone,
{
    if posting_lists.is_empty() {
        return Vec::new();
    }
    let mut smallest_idx = 0usize;
    for (idx, pl) in posting_lists.iter().enumerate() {
        if pl.len() < posting_lists[smallest_idx].len() {
            smallest_idx = idx;
        }
    }
    let mut result: Vec<T> = posting_lists[smallest_idx].to_vec();
    let mut scratch: Vec<T> = Vec::new();
    for (idx, pl) in posting_lists.iter().enumerate() {
        if idx == smallest_idx {
            continue;
        }
        scratch.clear();
        intersect_two_postings(&result, pl, &mut scratch);
        std::mem::swap(&mut result, &mut scratch);
        if result.is_empty() {
            break;
        }
    }

    result
}

/// Queries understood by [`QueryEngine`], parsed from their JSON form.
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    /// `{"match_all": {}}`
    MatchAll,
    /// `{"match": {"content": "data mining"}}`, every analyzed term must match.
    Match { field: String, text: String },
    /// `{"term": {"lang": "en"}}`, exact case-insensitive value match.
    Term { field: String, value: String },
}

impl Query {
    pub fn parse(value: &Value) -> Result<Query, SearchError> {
        let object = match value {
            Value::Null => return Ok(Query::MatchAll),
            Value::Object(object) => object,
            other => {
                return Err(SearchError::QueryParsing(format!(
                    "query must be an object, got [{}]",
                    other
                )));
            }
        };
        let mut clauses = object.iter();
        let (kind, body) = match (clauses.next(), clauses.next()) {
            (Some(clause), None) => clause,
            (None, _) => return Ok(Query::MatchAll),
            _ => {
                return Err(SearchError::QueryParsing(
                    "query must contain exactly one clause".into(),
                ));
            }
        };

        match kind.as_str() {
            "match_all" => match body {
                Value::Object(_) => Ok(Query::MatchAll),
                _ => Err(SearchError::QueryParsing(
                    "[match_all] expects an object".into(),
                )),
            },
            "match" => {
                let (field, text) = Self::single_field(kind, body)?;
                let text = match text {
                    Value::String(s) => s.clone(),
                    Value::Object(o) => match o.get("query") {
                        Some(Value::String(s)) => s.clone(),
                        _ => {
                            return Err(SearchError::QueryParsing(format!(
                                "[match] on [{field}] requires a string [query]"
                            )));
                        }
                    },
                    _ => {
                        return Err(SearchError::QueryParsing(format!(
                            "[match] on [{field}] requires a string"
                        )));
                    }
                };
                Ok(Query::Match { field, text })
            }
            "term" => {
                let (field, value) = Self::single_field(kind, body)?;
                let value = match value {
                    Value::String(s) => s.clone(),
                    Value::Number(n) => n.to_string(),
                    Value::Bool(b) => b.to_string(),
                    _ => {
                        return Err(SearchError::QueryParsing(format!(
                            "[term] on [{field}] requires a scalar value"
                        )));
                    }
                };
                Ok(Query::Term { field, value })
            }
            other => Err(SearchError::QueryParsing(format!(
                "unknown query type [{other}]"
            ))),
        }
    }

    fn single_field<'v>(kind: &str, body: &'v Value) -> Result<(String, &'v Value), SearchError> {
        match body {
            Value::Object(o) if o.len() == 1 => {
                let (field, value) = o.iter().next().ok_or_else(|| {
                    SearchError::QueryParsing(format!("[{kind}] requires a field"))
                })?;
                Ok((field.clone(), value))
            }
            _ => Err(SearchError::QueryParsing(format!(
                "[{kind}] requires exactly one field"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Posting {
    doc: usize,
    tf: u32,
}

#[derive(Default)]
struct IndexShard {
    docs: Vec<(String, Map<String, Value>)>,
    /// field -> term -> postings sorted by doc ordinal
    postings: HashMap<String, HashMap<String, Vec<Posting>>>,
}

impl IndexShard {
    fn postings_for(&self, field: &str, term: &str) -> Option<&[Posting]> {
        self.postings
            .get(field)
            .and_then(|terms| terms.get(term))
            .map(|v| v.as_slice())
    }
}

/// In-process inverted index over named indices. Documents are added at
/// startup; searching only reads.
pub struct QueryEngine {
    indices: HashMap<String, IndexShard>,
    analyzer: TextAnalyzer,
}

impl Default for QueryEngine {
    fn default() -> Self {
        Self::new(TextAnalyzer::stemming("en"))
    }
}

impl QueryEngine {
    pub fn new(analyzer: TextAnalyzer) -> Self {
        Self {
            indices: HashMap::new(),
            analyzer,
        }
    }

    pub fn analyzer(&self) -> &TextAnalyzer {
        &self.analyzer
    }

    /// Creates `index` if needed, so empty indices still resolve.
    pub fn create_index(&mut self, index: &str) {
        self.indices.entry(index.to_string()).or_default();
    }

    /// Adds a document to `index`. The id defaults to the document's ordinal.
    pub fn add_document(&mut self, index: &str, id: Option<String>, source: Map<String, Value>) {
        let shard = self.indices.entry(index.to_string()).or_default();
        let ord = shard.docs.len();
        let id = id.unwrap_or_else(|| ord.to_string());

        let mut all_terms: HashMap<String, u32> = HashMap::new();
        for (field, value) in source.iter() {
            let text = match value {
                Value::String(s) => s.clone(),
                Value::Array(items) => items
                    .iter()
                    .filter_map(Value::as_str)
                    .collect::<Vec<_>>()
                    .join(" "),
                _ => continue,
            };
            let mut field_terms: HashMap<String, u32> = HashMap::new();
            for term in self.analyzer.terms(&text) {
                *field_terms.entry(term.clone()).or_default() += 1;
                *all_terms.entry(term).or_default() += 1;
            }
            let field_postings = shard.postings.entry(field.clone()).or_default();
            for (term, tf) in field_terms {
                field_postings
                    .entry(term)
                    .or_default()
                    .push(Posting { doc: ord, tf });
            }
        }
        let all_postings = shard.postings.entry(ALL_FIELDS.to_string()).or_default();
        for (term, tf) in all_terms {
            all_postings
                .entry(term)
                .or_default()
                .push(Posting { doc: ord, tf });
        }

        shard.docs.push((id, source));
    }

    /// Loads a JSON array of source objects into `index`. A string `_id` key,
    /// if present, becomes the document id and is removed from the source.
    pub fn load_json_file(&mut self, index: &str, path: &Path) -> Result<usize> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read documents from {}", path.display()))?;
        let docs: Vec<Map<String, Value>> = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse documents in {}", path.display()))?;
        let count = docs.len();
        self.create_index(index);
        for mut source in docs {
            let id = match source.remove("_id") {
                Some(Value::String(id)) => Some(id),
                Some(Value::Number(n)) => Some(n.to_string()),
                _ => None,
            };
            self.add_document(index, id, source);
        }
        tracing::info!(index, count, "loaded documents");
        Ok(count)
    }

    /// Matching doc ordinals with their scores, in ordinal order.
    fn execute(&self, shard: &IndexShard, query: &Query) -> Vec<(usize, f32)> {
        match query {
            Query::MatchAll => (0..shard.docs.len()).map(|d| (d, 1.0)).collect(),
            Query::Match { field, text } => {
                let terms = self.analyzer.terms(text);
                if terms.is_empty() {
                    return Vec::new();
                }
                let mut lists: Vec<&[Posting]> = Vec::with_capacity(terms.len());
                for term in &terms {
                    match shard.postings_for(field, term) {
                        Some(list) => lists.push(list),
                        None => return Vec::new(),
                    }
                }
                let doc_lists: Vec<Vec<usize>> = lists
                    .iter()
                    .map(|l| l.iter().map(|p| p.doc).collect())
                    .collect();
                let doc_slices: Vec<&[usize]> = doc_lists.iter().map(|v| v.as_slice()).collect();
                intersect_postings(&doc_slices)
                    .into_iter()
                    .map(|doc| {
                        let score: f32 = lists
                            .iter()
                            .filter_map(|l| {
                                l.binary_search_by_key(&doc, |p| p.doc)
                                    .ok()
                                    .map(|i| l[i].tf as f32)
                            })
                            .sum();
                        (doc, score)
                    })
                    .collect()
            }
            Query::Term { field, value } => {
                let wanted = value.to_lowercase();
                let matches = |v: &Value| match v {
                    Value::String(s) => s.to_lowercase() == wanted,
                    Value::Number(n) => n.to_string() == wanted,
                    Value::Bool(b) => b.to_string() == wanted,
                    _ => false,
                };
                shard
                    .docs
                    .iter()
                    .enumerate()
                    .filter(|(_, (_, source))| match source.get(field) {
                        Some(Value::Array(items)) => items.iter().any(matches),
                        Some(v) => matches(v),
                        None => false,
                    })
                    .map(|(doc, _)| (doc, 1.0))
                    .collect()
            }
        }
    }
}

#[async_trait]
impl SearchIndex for QueryEngine {
    async fn search(
        &self,
        indices: &[String],
        query: &Value,
        limit: Option<usize>,
    ) -> Result<SearchHits, SearchError> {
        let query = Query::parse(query)?;

        let mut scored: Vec<(f32, usize, usize)> = Vec::new();
        let mut shards = Vec::with_capacity(indices.len());
        for (idx, name) in indices.iter().enumerate() {
            let shard = self
                .indices
                .get(name)
                .ok_or_else(|| SearchError::IndexNotFound(name.clone()))?;
            scored.extend(
                self.execute(shard, &query)
                    .into_iter()
                    .map(|(doc, score)| (score, idx, doc)),
            );
            shards.push(shard);
        }

        let total = scored.len();
        scored.sort_by(|a, b| {
            b.0.total_cmp(&a.0)
                .then_with(|| a.1.cmp(&b.1))
                .then_with(|| a.2.cmp(&b.2))
        });
        if let Some(limit) = limit {
            scored.truncate(limit);
        }

        let hits = scored
            .into_iter()
            .map(|(score, idx, doc)| {
                let (id, source) = &shards[idx].docs[doc];
                Hit {
                    index: indices[idx].clone(),
                    id: id.clone(),
                    score,
                    source: source.clone(),
                }
            })
            .collect();

        Ok(SearchHits { total, hits })
    }

    fn indices(&self) -> Vec<String> {
        let mut names: Vec<String> = self.indices.keys().cloned().collect();
        names.sort();
        names
    }
}

#[test]
fn test_intersect_two_postings() {
    {
        let p1 = vec![1, 2, 3, 4, 5];
        let p2 = vec![2, 10, 12, 15];
        let mut out = Vec::new();
        intersect_two_postings(&p1, &p2, &mut out);
        assert_eq!(out, vec![2]);
    }

    {
        let p1 = vec![100, 101, 102, 105];
        let p2 = vec![1, 2, 3, 4, 5];
        let mut out = Vec::new();
        intersect_two_postings(&p1, &p2, &mut out);
        assert!(out.is_empty());
    }
}

#[test]
fn test_intersect_postings_multilist() {
    {
        let l1 = vec![1u32, 2, 3, 4, 5, 8, 13, 21, 34, 55];
        let l2 = vec![2u32, 3, 5, 8, 13, 34, 89];
        let l3 = vec![3u32, 8, 34];
        let l4 = vec![0u32, 3, 8, 34, 144, 233];
        assert_eq!(intersect_postings(&[&l1, &l2, &l3, &l4]), vec![3u32, 8, 34]);
    }
    // Contains an empty list => empty result
    {
        let l1 = vec![1u32, 2, 3, 4, 5];
        let l2: Vec<u32> = vec![];
        let l3 = vec![2u32, 3, 4];
        assert!(intersect_postings(&[&l1, &l2, &l3]).is_empty());
    }
    // Single list input: intersection == that list
    {
        let l1 = vec![7u32, 9, 11, 13];
        assert_eq!(intersect_postings(&[&l1]), l1);
    }
}
