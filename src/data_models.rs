use std::collections::HashMap;

use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

/// A clustering-ready document built from a single search hit.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub url: String,
    pub title: String,
    pub content: String,
    pub language: Option<String>,
}

impl Document {
    pub fn new(id: impl Into<String>, title: impl Into<String>, content: impl Into<String>) -> Self {
        Document {
            id: id.into(),
            url: String::new(),
            title: title.into(),
            content: content.into(),
            language: None,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// Title and content joined, the text most algorithms look at.
    pub fn text(&self) -> String {
        match (self.title.is_empty(), self.content.is_empty()) {
            (true, _) => self.content.clone(),
            (_, true) => self.title.clone(),
            _ => format!("{} . {}", self.title, self.content),
        }
    }
}

/// A labeled group of document references. Children are owned, so the
/// hierarchy is always a tree.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct DocumentGroup {
    pub id: u32,
    pub score: f64,
    pub label: String,
    pub phrases: Vec<String>,
    pub other_topics: bool,
    pub documents: Vec<String>,
    pub clusters: Vec<DocumentGroup>,
}

impl DocumentGroup {
    pub fn new(label: impl Into<String>) -> Self {
        let label = label.into();
        DocumentGroup {
            phrases: vec![label.clone()],
            label,
            ..Default::default()
        }
    }

    pub fn other_topics(label: impl Into<String>, documents: Vec<String>) -> Self {
        let mut group = Self::new(label);
        group.other_topics = true;
        group.documents = documents;
        group
    }

    pub fn with_documents(mut self, documents: Vec<String>) -> Self {
        self.score = documents.len() as f64;
        self.documents = documents;
        self
    }

    pub fn with_clusters(mut self, clusters: Vec<DocumentGroup>) -> Self {
        self.clusters = clusters;
        self
    }

    /// Visits this group and all descendants in pre-order.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a DocumentGroup)) {
        visit(self);
        for child in &self.clusters {
            child.walk(visit);
        }
    }

    /// Every document id referenced anywhere in this subtree, in pre-order,
    /// duplicates included.
    pub fn all_document_refs(&self) -> Vec<&str> {
        let mut refs = Vec::new();
        self.walk(&mut |g| refs.extend(g.documents.iter().map(String::as_str)));
        refs
    }
}

/// The cap applied to the search stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MaxHits {
    #[default]
    Unbounded,
    Bounded(usize),
}

impl MaxHits {
    pub fn limit(&self) -> Option<usize> {
        match self {
            MaxHits::Unbounded => None,
            MaxHits::Bounded(n) => Some(*n),
        }
    }

    pub fn is_unbounded(&self) -> bool {
        matches!(self, MaxHits::Unbounded)
    }
}

/// A crawled page as stored in MongoDB by the external indexer.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Page {
    #[serde(rename = "_id")]
    pub id: ObjectId,

    pub url: String,
    pub title: String,
    pub cleaned_content: String,
    #[serde(default)]
    pub language: Option<String>,
}

impl Page {
    pub fn new(url: String, title: String, cleaned_content: String) -> Page {
        Page {
            id: ObjectId::new(),
            url,
            title,
            cleaned_content,
            language: None,
        }
    }
}

/// One bucket of the term -> postings index kept in MongoDB.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct InvertedIndexDoc {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub term: String,
    pub bucket: i16,
    pub document_frequency: i64,
    pub postings: Vec<ObjectId>,
    /// Term positions keyed by the hex form of the page id.
    #[serde(default)]
    pub positions: HashMap<String, Vec<usize>>,
}

impl InvertedIndexDoc {
    pub fn new(
        term: String,
        bucket: i16,
        document_frequency: i64,
        postings: Vec<ObjectId>,
        positions: HashMap<String, Vec<usize>>,
    ) -> InvertedIndexDoc {
        InvertedIndexDoc {
            id: ObjectId::new(),
            bucket,
            term,
            postings,
            document_frequency,
            positions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_text_joins_title_and_content() {
        assert_eq!(Document::new("1", "Title", "Body").text(), "Title . Body");
        assert_eq!(Document::new("1", "", "Body").text(), "Body");
        assert_eq!(Document::new("1", "Title", "").text(), "Title");
    }

    #[test]
    fn test_all_document_refs_walks_nested_groups() {
        let group = DocumentGroup::new("root")
            .with_documents(vec!["a".into()])
            .with_clusters(vec![
                DocumentGroup::new("child").with_documents(vec!["b".into(), "c".into()]),
                DocumentGroup::new("empty"),
            ]);
        assert_eq!(group.all_document_refs(), vec!["a", "b", "c"]);
    }
}
