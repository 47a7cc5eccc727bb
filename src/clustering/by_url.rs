use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;
use reqwest::Url;

use super::{ClusteringAlgorithm, ClusteringInput, check_cancelled};
use crate::data_models::DocumentGroup;
use crate::error::AlgorithmError;

pub const NAME: &str = "by-url";
pub const OTHER_SITES: &str = "Other Sites";

fn host_and_section(raw: &str) -> Option<(String, Option<String>)> {
    let url = Url::parse(raw.trim()).ok()?;
    let host = url.host_str()?.to_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host).to_string();
    let section = url
        .path_segments()
        .and_then(|mut segments| segments.next())
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    Some((host, section))
}

/// Sorts groups by size, largest first, then by label.
fn by_size_then_label(groups: &mut [DocumentGroup]) {
    groups.sort_by(|a, b| {
        b.documents
            .len()
            .cmp(&a.documents.len())
            .then_with(|| a.label.cmp(&b.label))
    });
}

/// Groups documents by site (host without `www.`), then by the first path
/// segment when a site has documents in more than one section.
pub struct ByUrlAlgorithm;

impl ClusteringAlgorithm for ByUrlAlgorithm {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Groups documents by site and top-level URL section"
    }

    fn cluster(
        &self,
        input: &ClusteringInput,
        cancel: &CancellationToken,
    ) -> Result<Vec<DocumentGroup>, AlgorithmError> {
        input.attributes.only(&[])?;

        // host -> section -> ids; documents at the site root use section None
        let mut sites: BTreeMap<String, BTreeMap<Option<String>, Vec<String>>> = BTreeMap::new();
        let mut other = Vec::new();
        for doc in &input.documents {
            check_cancelled(cancel)?;
            match host_and_section(&doc.url) {
                Some((host, section)) => sites
                    .entry(host)
                    .or_default()
                    .entry(section)
                    .or_default()
                    .push(doc.id.clone()),
                None => other.push(doc.id.clone()),
            }
        }

        let mut groups = Vec::with_capacity(sites.len() + 1);
        for (host, sections) in sites {
            let ids: Vec<String> = sections.values().flatten().cloned().collect();
            let named_sections = sections.keys().filter(|s| s.is_some()).count();
            let mut children = Vec::new();
            if sections.len() > 1 && named_sections > 0 {
                for (section, ids) in sections {
                    if let Some(section) = section {
                        children.push(
                            DocumentGroup::new(format!("{host}/{section}")).with_documents(ids),
                        );
                    }
                }
                by_size_then_label(&mut children);
            }
            groups.push(
                DocumentGroup::new(host)
                    .with_documents(ids)
                    .with_clusters(children),
            );
        }
        by_size_then_label(&mut groups);

        if !other.is_empty() {
            groups.push(DocumentGroup::other_topics(OTHER_SITES, other));
        }
        Ok(groups)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_models::Document;

    fn doc(id: &str, url: &str) -> Document {
        Document::new(id, "", "").with_url(url)
    }

    #[test]
    fn test_host_and_section() {
        assert_eq!(
            host_and_section("https://www.Example.com/news/today"),
            Some(("example.com".into(), Some("news".into())))
        );
        assert_eq!(
            host_and_section("http://example.com/"),
            Some(("example.com".into(), None))
        );
        assert_eq!(host_and_section("not a url"), None);
        assert_eq!(host_and_section(""), None);
    }

    #[test]
    fn test_groups_by_host_and_section() {
        let input = ClusteringInput {
            documents: vec![
                doc("1", "https://example.com/news/a"),
                doc("2", "https://www.example.com/news/b"),
                doc("3", "https://example.com/blog/c"),
                doc("4", "https://other.org/x"),
                doc("5", ""),
            ],
            ..Default::default()
        };
        let groups = ByUrlAlgorithm
            .cluster(&input, &CancellationToken::new())
            .unwrap();

        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0].label, "example.com");
        assert_eq!(groups[0].documents, vec!["3", "1", "2"]);
        assert_eq!(groups[0].clusters.len(), 2);
        assert_eq!(groups[0].clusters[0].label, "example.com/news");
        assert_eq!(groups[0].clusters[0].documents, vec!["1", "2"]);

        assert_eq!(groups[1].label, "other.org");
        assert!(groups[1].clusters.is_empty());

        assert_eq!(groups[2].label, OTHER_SITES);
        assert!(groups[2].other_topics);
        assert_eq!(groups[2].documents, vec!["5"]);
    }

    #[test]
    fn test_empty_input() {
        let groups = ByUrlAlgorithm
            .cluster(&ClusteringInput::default(), &CancellationToken::new())
            .unwrap();
        assert!(groups.is_empty());
    }
}
