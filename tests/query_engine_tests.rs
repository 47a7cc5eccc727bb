use anyhow::Result;
use serde_json::json;
use std::path::{Path, PathBuf};

use clusterfind::SearchError;
use clusterfind::query_engine::QueryEngine;
use clusterfind::search::SearchIndex;

mod test_helpers {
    use super::*;

    pub fn sample_path() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/data/sample_documents.json")
    }

    /// Writes `contents` to a uniquely named file in the temp dir.
    pub fn temp_json(contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("clusterfind_{}.json", nanoid::nanoid!(8)));
        std::fs::write(&path, contents).unwrap();
        path
    }
}

use test_helpers::*;

#[tokio::test]
async fn test_load_sample_documents() -> Result<()> {
    let mut engine = QueryEngine::default();
    let count = engine.load_json_file("test", &sample_path())?;
    assert_eq!(count, 13);
    assert_eq!(engine.indices(), vec!["test".to_string()]);

    let hits = engine.search(&["test".into()], &json!({"match_all": {}}), None).await?;
    assert_eq!(hits.total, 13);
    let first = &hits.hits[0];
    assert_eq!(first.id, "1");
    assert_eq!(first.index, "test");
    assert!(!first.source.contains_key("_id"));
    assert_eq!(first.source["title"], "Spiral galaxy survey");
    Ok(())
}

#[tokio::test]
async fn test_match_on_single_field() -> Result<()> {
    let mut engine = QueryEngine::default();
    engine.load_json_file("test", &sample_path())?;

    // "telescope" appears in the title of document 4 only
    let hits = engine
        .search(&["test".into()], &json!({"match": {"title": "telescope"}}), None)
        .await?;
    let ids: Vec<&str> = hits.hits.iter().map(|h| h.id.as_str()).collect();
    assert_eq!(ids, vec!["4"]);

    let hits = engine
        .search(&["test".into()], &json!({"match": {"_all": "telescope"}}), None)
        .await?;
    assert_eq!(hits.total, 3);
    // document 4 mentions it twice
    assert_eq!(hits.hits[0].id, "4");
    Ok(())
}

#[tokio::test]
async fn test_term_query() -> Result<()> {
    let mut engine = QueryEngine::default();
    engine.load_json_file("test", &sample_path())?;
    let hits = engine
        .search(&["test".into()], &json!({"term": {"language": "de"}}), None)
        .await?;
    let ids: Vec<&str> = hits.hits.iter().map(|h| h.id.as_str()).collect();
    assert_eq!(ids, vec!["10"]);
    Ok(())
}

#[tokio::test]
async fn test_search_across_indices_and_limit() -> Result<()> {
    let mut engine = QueryEngine::default();
    engine.load_json_file("a", &sample_path())?;
    let path = temp_json(r#"[{"title": "Galaxy zoo"}, {"_id": 7, "title": "Ocean tides"}]"#);
    engine.load_json_file("b", &path)?;
    std::fs::remove_file(&path)?;

    let hits = engine
        .search(
            &["a".into(), "b".into()],
            &json!({"match": {"title": "galaxy"}}),
            Some(2),
        )
        .await?;
    assert_eq!(hits.total, 4);
    assert_eq!(hits.hits.len(), 2);

    let hits = engine
        .search(&["b".into()], &json!({"match_all": {}}), None)
        .await?;
    let ids: Vec<&str> = hits.hits.iter().map(|h| h.id.as_str()).collect();
    assert_eq!(ids, vec!["0", "7"]);
    Ok(())
}

#[tokio::test]
async fn test_errors() {
    let mut engine = QueryEngine::default();
    engine.create_index("test");

    let err = engine
        .search(&["nope".into()], &json!({}), None)
        .await
        .unwrap_err();
    assert_eq!(err, SearchError::IndexNotFound("nope".into()));

    let err = engine
        .search(&["test".into()], &json!({"wildcard": {"title": "g*"}}), None)
        .await
        .unwrap_err();
    assert!(matches!(err, SearchError::QueryParsing(ref m) if m.contains("wildcard")));

    let missing = Path::new("/definitely/not/here.json");
    assert!(engine.load_json_file("test", missing).is_err());
}
