use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;

use super::{ClusteringAlgorithm, ClusteringInput, check_cancelled};
use crate::data_models::DocumentGroup;
use crate::error::AlgorithmError;

pub const NAME: &str = "by-language";
pub const UNKNOWN_LANGUAGE: &str = "Unknown Language";

fn language_name(code: &str) -> String {
    let name = match code {
        "de" => "German",
        "en" => "English",
        "es" => "Spanish",
        "fr" => "French",
        "it" => "Italian",
        "nl" => "Dutch",
        "pl" => "Polish",
        "pt" => "Portuguese",
        "ru" => "Russian",
        "sv" => "Swedish",
        other => return other.to_uppercase(),
    };
    name.to_string()
}

/// One group per document language, largest first.
pub struct ByLanguageAlgorithm;

impl ClusteringAlgorithm for ByLanguageAlgorithm {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Groups documents by their language code"
    }

    fn cluster(
        &self,
        input: &ClusteringInput,
        cancel: &CancellationToken,
    ) -> Result<Vec<DocumentGroup>, AlgorithmError> {
        input.attributes.only(&[])?;

        let mut languages: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut unknown = Vec::new();
        for doc in &input.documents {
            check_cancelled(cancel)?;
            match doc.language.as_deref().map(str::trim) {
                Some(code) if !code.is_empty() => languages
                    .entry(code.to_lowercase())
                    .or_default()
                    .push(doc.id.clone()),
                _ => unknown.push(doc.id.clone()),
            }
        }

        let mut groups: Vec<DocumentGroup> = languages
            .into_iter()
            .map(|(code, ids)| {
                let mut group = DocumentGroup::new(language_name(&code)).with_documents(ids);
                group.phrases = vec![code];
                group
            })
            .collect();
        // stable sort keeps code order among equally sized groups
        groups.sort_by(|a, b| b.documents.len().cmp(&a.documents.len()));

        if !unknown.is_empty() {
            groups.push(DocumentGroup::other_topics(UNKNOWN_LANGUAGE, unknown));
        }
        Ok(groups)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_models::Document;

    #[test]
    fn test_groups_by_language() {
        let input = ClusteringInput {
            documents: vec![
                Document::new("1", "a", "").with_language("en"),
                Document::new("2", "b", "").with_language("de"),
                Document::new("3", "c", "").with_language("EN"),
                Document::new("4", "d", "").with_language("xx"),
                Document::new("5", "e", ""),
            ],
            ..Default::default()
        };
        let groups = ByLanguageAlgorithm
            .cluster(&input, &CancellationToken::new())
            .unwrap();

        let labels: Vec<&str> = groups.iter().map(|g| g.label.as_str()).collect();
        assert_eq!(labels, vec!["English", "German", "XX", UNKNOWN_LANGUAGE]);
        assert_eq!(groups[0].documents, vec!["1", "3"]);
        assert!(groups[3].other_topics);
    }
}
