//! JSON transcoding of responses and the REST error contract.

use axum::Json;
use axum::response::{IntoResponse, Response};
use serde_json::{Map, Value, json};

use crate::error::ClusteringError;
use crate::response::ClusteringActionResponse;

pub const CLUSTERS: &str = "clusters";
pub const SEARCH_RESPONSE: &str = "search_response";
pub const INFO: &str = "info";
pub const ERROR: &str = "error";

/// Encodes a response as a JSON object with `search_response`, `clusters` and
/// `info` keys.
pub fn encode(response: &ClusteringActionResponse) -> Result<Value, ClusteringError> {
    serde_json::to_value(response).map_err(|e| {
        ClusteringError::InvariantViolation(format!("response could not be encoded: {e}"))
    })
}

/// Parses a JSON document into a top-level map.
pub fn decode(bytes: &[u8]) -> Result<Map<String, Value>, ClusteringError> {
    match serde_json::from_slice::<Value>(bytes) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(ClusteringError::InvalidRequest(format!(
            "expected a JSON object, got [{}]",
            type_name(&other)
        ))),
        Err(e) => Err(ClusteringError::InvalidRequest(format!(
            "malformed JSON: {e}"
        ))),
    }
}

/// Parses an encoded response back into its typed form.
pub fn decode_response(bytes: &[u8]) -> Result<ClusteringActionResponse, ClusteringError> {
    let map = decode(bytes)?;
    if let Some(error) = map.get(ERROR) {
        return Err(ClusteringError::InvalidRequest(format!(
            "response carries an error: {error}"
        )));
    }
    serde_json::from_value(Value::Object(map))
        .map_err(|e| ClusteringError::InvalidRequest(format!("not a clustering response: {e}")))
}

pub fn error_body(err: &ClusteringError) -> Value {
    json!({ ERROR: err.to_string() })
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

impl IntoResponse for ClusteringError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self, "clustering request failed");
        } else {
            tracing::warn!(status = status.as_u16(), error = %self, "clustering request rejected");
        }
        (status, Json(error_body(&self))).into_response()
    }
}

impl IntoResponse for ClusteringActionResponse {
    fn into_response(self) -> Response {
        match encode(&self) {
            Ok(body) => Json(body).into_response(),
            Err(e) => e.into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_models::{DocumentGroup, MaxHits};
    use crate::error::SearchError;
    use crate::response::{Assembly, assemble, info_keys};
    use crate::search::{Hit, SearchHits};
    use axum::http::StatusCode;

    fn response() -> ClusteringActionResponse {
        let hit = Hit {
            index: "test".into(),
            id: "0".into(),
            score: 1.5,
            source: json!({"title": "t"}).as_object().cloned().unwrap(),
        };
        assemble(Assembly {
            hits: SearchHits {
                total: 1,
                hits: vec![hit],
            },
            groups: vec![
                DocumentGroup::new("Parent")
                    .with_documents(vec!["0".into()])
                    .with_clusters(vec![DocumentGroup::new("Child").with_documents(vec!["0".into()])]),
            ],
            search_millis: 3,
            clustering_millis: 4,
            algorithm: "frequent-terms".into(),
            effective_cap: MaxHits::Unbounded,
        })
        .unwrap()
    }

    #[test]
    fn test_encoded_shape() {
        let value = encode(&response()).unwrap();
        let object = value.as_object().unwrap();
        assert!(object.contains_key(CLUSTERS));
        assert!(object.contains_key(SEARCH_RESPONSE));
        assert!(!object.contains_key(ERROR));

        let info = object[INFO].as_object().unwrap();
        for key in info_keys::ALL {
            assert!(info.contains_key(key), "missing info key {key}");
        }
        assert_eq!(info.len(), info_keys::ALL.len());
        assert_eq!(info[info_keys::MAX_HITS], Value::Null);

        let parent = &object[CLUSTERS][0];
        assert_eq!(parent["label"], "Parent");
        assert_eq!(parent["documents"], json!(["0"]));
        assert_eq!(parent[CLUSTERS][0]["label"], "Child");
        assert_eq!(object[SEARCH_RESPONSE]["hits"]["hits"][0]["_id"], "0");
    }

    #[test]
    fn test_round_trip_keeps_clusters_and_info() {
        let original = response();
        let bytes = serde_json::to_vec(&encode(&original).unwrap()).unwrap();

        let map = decode(&bytes).unwrap();
        assert!(map.contains_key(CLUSTERS));
        assert_eq!(
            map[INFO],
            serde_json::to_value(original.info()).unwrap()
        );

        let typed = decode_response(&bytes).unwrap();
        assert_eq!(typed, original);
    }

    #[test]
    fn test_decode_rejects_non_objects() {
        assert!(matches!(
            decode(b"[1, 2]"),
            Err(ClusteringError::InvalidRequest(ref m)) if m.contains("array")
        ));
        assert!(decode(b"{not json").is_err());
    }

    #[test]
    fn test_error_response_has_status_and_single_error_key() {
        let err = ClusteringError::Search(SearchError::IndexNotFound("missing".into()));
        let body = error_body(&err);
        let object = body.as_object().unwrap();
        assert_eq!(object.len(), 1);
        assert!(object[ERROR].as_str().unwrap().contains("missing"));

        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
