use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::options::ClientOptions;
use mongodb::{
    Client, Collection, Database as MongoDatabase,
    bson::{Document as BsonDocument, doc, oid::ObjectId},
};
use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::analyzer::TextAnalyzer;
use crate::data_models::{InvertedIndexDoc, Page};
use crate::error::SearchError;
use crate::query_engine::{Query, intersect_postings};
use crate::search::{Hit, SearchHits, SearchIndex};

/// Collection names as constants for consistency
pub mod collections {
    pub const PAGES: &str = "pages";
    pub const INDEX: &str = "inverted_index";
}

/// The only index name a [`MongoIndex`] answers to.
pub const PAGES_INDEX: &str = collections::PAGES;

/// Main database wrapper providing connection management and collection access
#[derive(Debug, Clone)]
pub struct Database {
    client: Client,
    db: MongoDatabase,
}

impl Database {
    /// Connects and pings the server before returning.
    pub async fn new(uri: &str, db_name: &str) -> Result<Self> {
        let client_options = ClientOptions::parse(uri)
            .await
            .context("Failed to parse MongoDB connection string")?;

        let client =
            Client::with_options(client_options).context("Failed to create MongoDB client")?;

        client
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .await
            .context("Failed to connect to MongoDB")?;

        log::info!("Connected to MongoDB database: {}", db_name);

        let db = client.database(db_name);

        Ok(Self { client, db })
    }

    /// Get a typed collection by name
    pub fn collection<T>(&self, name: &str) -> Collection<T>
    where
        T: Send + Sync,
    {
        self.db.collection(name)
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn pages(&self) -> Collection<Page> {
        self.collection(collections::PAGES)
    }

    pub fn inverted_index(&self) -> Collection<InvertedIndexDoc> {
        self.collection(collections::INDEX)
    }
}

/// Search backend over crawled pages and the term index built next to them.
/// Pages are exposed as hits with `url`, `title`, `content` and `language`
/// source fields.
///
/// The term index is not split by field, so `match` queries must target
/// `_all`. `term` queries filter on any stored page field.
pub struct MongoIndex {
    db: Database,
    analyzer: TextAnalyzer,
}

impl MongoIndex {
    pub fn new(db: Database, analyzer: TextAnalyzer) -> Self {
        Self { db, analyzer }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    /// Page ids containing every analyzed term of `text`, with a score equal
    /// to the summed term frequencies.
    async fn matching_pages(&self, text: &str) -> Result<Vec<(ObjectId, f32)>> {
        let terms = self.analyzer.terms(text);
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        // a term may span several buckets
        let index_docs: Vec<InvertedIndexDoc> = self
            .db
            .inverted_index()
            .find(doc! { "term": { "$in": terms.clone() } })
            .sort(doc! { "bucket": 1 })
            .await
            .context("Failed to query inverted index")?
            .try_collect()
            .await
            .context("Failed to collect inverted index documents")?;

        let mut term_postings: HashMap<String, Vec<ObjectId>> = HashMap::new();
        let mut frequencies: HashMap<ObjectId, usize> = HashMap::new();
        for index_doc in index_docs {
            for id in &index_doc.postings {
                let tf = index_doc
                    .positions
                    .get(&id.to_hex())
                    .map_or(1, |positions| positions.len().max(1));
                *frequencies.entry(*id).or_default() += tf;
            }
            term_postings
                .entry(index_doc.term)
                .or_default()
                .extend(index_doc.postings);
        }

        let distinct_terms = terms.iter().collect::<std::collections::HashSet<_>>().len();
        if term_postings.len() != distinct_terms {
            return Ok(Vec::new());
        }

        let posting_lists: Vec<&[ObjectId]> =
            term_postings.values().map(|v| v.as_slice()).collect();
        Ok(intersect_postings(&posting_lists)
            .into_iter()
            .map(|id| {
                let score = frequencies.get(&id).copied().unwrap_or(1) as f32;
                (id, score)
            })
            .collect())
    }

    async fn find_pages(&self, filter: BsonDocument) -> Result<Vec<Page>> {
        self.db
            .pages()
            .find(filter)
            .await
            .context("Failed to execute find query")?
            .try_collect()
            .await
            .context("Failed to collect results")
    }

    async fn run(&self, query: Query, limit: Option<usize>) -> Result<SearchHits> {
        let mut scored: Vec<(f32, Page)> = match query {
            Query::MatchAll => self
                .find_pages(doc! {})
                .await?
                .into_iter()
                .map(|page| (1.0, page))
                .collect(),
            Query::Term { field, value } => {
                let mut filter = BsonDocument::new();
                filter.insert(page_field(&field), value);
                self.find_pages(filter)
                    .await?
                    .into_iter()
                    .map(|page| (1.0, page))
                    .collect()
            }
            Query::Match { text, .. } => {
                let matches = self.matching_pages(&text).await?;
                let ids: Vec<ObjectId> = matches.iter().map(|(id, _)| *id).collect();
                let scores: HashMap<ObjectId, f32> = matches.into_iter().collect();
                self.find_pages(doc! { "_id": { "$in": ids } })
                    .await?
                    .into_iter()
                    .map(|page| (scores.get(&page.id).copied().unwrap_or(1.0), page))
                    .collect()
            }
        };

        let total = scored.len();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.id.cmp(&b.1.id)));
        if let Some(limit) = limit {
            scored.truncate(limit);
        }

        Ok(SearchHits {
            total,
            hits: scored
                .into_iter()
                .map(|(score, page)| page_to_hit(page, score))
                .collect(),
        })
    }
}

fn check_supported(query: &Query) -> Result<(), SearchError> {
    match query {
        Query::Match { field, .. } if field != "_all" => Err(SearchError::QueryParsing(format!(
            "[match] on [{field}] is not supported by the [{PAGES_INDEX}] index, use [_all]"
        ))),
        _ => Ok(()),
    }
}

/// Maps hit source names onto stored page fields.
fn page_field(field: &str) -> &str {
    match field {
        "content" => "cleaned_content",
        "_id" | "id" => "_id",
        other => other,
    }
}

fn page_to_hit(page: Page, score: f32) -> Hit {
    let mut source = Map::new();
    source.insert("url".into(), Value::String(page.url));
    source.insert("title".into(), Value::String(page.title));
    source.insert("content".into(), Value::String(page.cleaned_content));
    if let Some(language) = page.language {
        source.insert("language".into(), Value::String(language));
    }
    Hit {
        index: PAGES_INDEX.to_string(),
        id: page.id.to_hex(),
        score,
        source,
    }
}

#[async_trait]
impl SearchIndex for MongoIndex {
    async fn search(
        &self,
        indices: &[String],
        query: &Value,
        limit: Option<usize>,
    ) -> Result<SearchHits, SearchError> {
        if let Some(unknown) = indices.iter().find(|i| i.as_str() != PAGES_INDEX) {
            return Err(SearchError::IndexNotFound(unknown.clone()));
        }
        let query = Query::parse(query)?;
        check_supported(&query)?;
        self.run(query, limit).await.map_err(|e| {
            log::error!("MongoDB search failed: {:#}", e);
            SearchError::Backend(format!("{e:#}"))
        })
    }

    fn indices(&self) -> Vec<String> {
        vec![PAGES_INDEX.to_string()]
    }
}
