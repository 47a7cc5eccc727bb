//! Maps search hits onto clustering documents through a field mapping.

use serde_json::{Map, Value};

use crate::data_models::Document;
use crate::error::ClusteringError;
use crate::search::Hit;

const SOURCE_PREFIX: &str = "_source.";
const FIELD_SEPARATOR: &str = " . ";

/// Document role a source field can feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRole {
    Title,
    Content,
    Url,
    Language,
}

impl FieldRole {
    fn parse(name: &str) -> Option<FieldRole> {
        match name {
            "title" => Some(FieldRole::Title),
            "content" => Some(FieldRole::Content),
            "url" => Some(FieldRole::Url),
            "language" => Some(FieldRole::Language),
            _ => None,
        }
    }
}

/// Which `_source` fields supply each document role. Validated once per
/// request; adapting a hit never fails.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FieldMapping {
    title: Vec<String>,
    content: Vec<String>,
    url: Vec<String>,
    language: Vec<String>,
}

impl FieldMapping {
    /// `title`, `content` and `url` read from the same-named source fields.
    pub fn defaults() -> Self {
        FieldMapping {
            title: vec!["title".into()],
            content: vec!["content".into()],
            url: vec!["url".into()],
            language: Vec::new(),
        }
    }

    /// Parses `{"title": ["_source.title"], "content": "_source.body", ...}`.
    pub fn parse(value: &Value) -> Result<Self, ClusteringError> {
        let object = value.as_object().ok_or_else(|| {
            ClusteringError::InvalidRequest("[field_mapping] must be an object".into())
        })?;

        let mut mapping = FieldMapping::default();
        for (role_name, specs) in object {
            let role = FieldRole::parse(role_name).ok_or_else(|| {
                ClusteringError::InvalidRequest(format!(
                    "unknown field mapping role [{role_name}], expected one of title, content, url, language"
                ))
            })?;
            let specs: Vec<&Value> = match specs {
                Value::Array(items) => items.iter().collect(),
                other => vec![other],
            };
            for spec in specs {
                let field = Self::parse_spec(role_name, spec)?;
                mapping.fields_mut(role).push(field);
            }
        }

        if mapping.title.is_empty() && mapping.content.is_empty() {
            return Err(ClusteringError::InvalidRequest(
                "[field_mapping] must map at least one of [title] or [content]".into(),
            ));
        }
        Ok(mapping)
    }

    fn parse_spec(role_name: &str, spec: &Value) -> Result<String, ClusteringError> {
        let spec = spec.as_str().ok_or_else(|| {
            ClusteringError::InvalidRequest(format!(
                "field mapping for [{role_name}] must be a string or an array of strings"
            ))
        })?;
        match spec.strip_prefix(SOURCE_PREFIX) {
            Some(field) if !field.is_empty() => Ok(field.to_string()),
            _ => Err(ClusteringError::InvalidRequest(format!(
                "field mapping specification [{spec}] for [{role_name}] must start with [{SOURCE_PREFIX}]"
            ))),
        }
    }

    fn fields_mut(&mut self, role: FieldRole) -> &mut Vec<String> {
        match role {
            FieldRole::Title => &mut self.title,
            FieldRole::Content => &mut self.content,
            FieldRole::Url => &mut self.url,
            FieldRole::Language => &mut self.language,
        }
    }

    pub fn fields(&self, role: FieldRole) -> &[String] {
        match role {
            FieldRole::Title => &self.title,
            FieldRole::Content => &self.content,
            FieldRole::Url => &self.url,
            FieldRole::Language => &self.language,
        }
    }
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(value_text).collect();
            (!parts.is_empty()).then(|| parts.join(FIELD_SEPARATOR))
        }
        _ => None,
    }
}

/// Looks up a dotted path like `meta.lang` inside a source object.
fn lookup<'a>(source: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    if let Some(v) = source.get(path) {
        return Some(v);
    }
    let mut parts = path.split('.');
    let mut current = source.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

fn extract(source: &Map<String, Value>, fields: &[String]) -> String {
    fields
        .iter()
        .filter_map(|f| lookup(source, f).and_then(value_text))
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(FIELD_SEPARATOR)
}

/// Builds a [`Document`] from `hit`. Missing fields become empty strings; a
/// missing or blank language stays unset.
pub fn adapt(hit: &Hit, mapping: &FieldMapping) -> Document {
    let language = extract(&hit.source, mapping.fields(FieldRole::Language));
    Document {
        id: hit.id.clone(),
        url: extract(&hit.source, mapping.fields(FieldRole::Url)),
        title: extract(&hit.source, mapping.fields(FieldRole::Title)),
        content: extract(&hit.source, mapping.fields(FieldRole::Content)),
        language: (!language.trim().is_empty()).then(|| language.trim().to_lowercase()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn hit(source: Value) -> Hit {
        Hit {
            index: "test".into(),
            id: "42".into(),
            score: 1.0,
            source: source.as_object().cloned().unwrap_or_default(),
        }
    }

    #[test]
    fn test_parse_accepts_strings_and_arrays() {
        let mapping = FieldMapping::parse(&json!({
            "title": "_source.title",
            "content": ["_source.summary", "_source.body"],
            "language": ["_source.lang"]
        }))
        .unwrap();
        assert_eq!(mapping.fields(FieldRole::Title), ["title"]);
        assert_eq!(mapping.fields(FieldRole::Content), ["summary", "body"]);
        assert!(mapping.fields(FieldRole::Url).is_empty());
    }

    #[test]
    fn test_parse_rejects_bad_specs() {
        let err = FieldMapping::parse(&json!({"title": ["fields.title"]})).unwrap_err();
        assert!(err.to_string().contains("fields.title"));

        let err = FieldMapping::parse(&json!({"heading": ["_source.title"]})).unwrap_err();
        assert!(err.to_string().contains("heading"));

        let err = FieldMapping::parse(&json!({"url": ["_source.url"]})).unwrap_err();
        assert!(matches!(err, ClusteringError::InvalidRequest(_)));

        assert!(FieldMapping::parse(&json!(["_source.title"])).is_err());
    }

    #[test]
    fn test_adapt_fills_missing_fields_with_empty_strings() {
        let mapping = FieldMapping::defaults();
        let doc = adapt(&hit(json!({"title": "Only a title"})), &mapping);
        assert_eq!(doc.id, "42");
        assert_eq!(doc.title, "Only a title");
        assert_eq!(doc.content, "");
        assert_eq!(doc.url, "");
        assert_eq!(doc.language, None);
    }

    #[test]
    fn test_adapt_joins_multiple_fields_and_reads_nested_language() {
        let mapping = FieldMapping::parse(&json!({
            "title": ["_source.title"],
            "content": ["_source.summary", "_source.body"],
            "language": ["_source.meta.lang"]
        }))
        .unwrap();
        let doc = adapt(
            &hit(json!({
                "title": "T",
                "summary": "short",
                "body": "long",
                "meta": {"lang": "DE"}
            })),
            &mapping,
        );
        assert_eq!(doc.content, "short . long");
        assert_eq!(doc.language.as_deref(), Some("de"));
    }
}
