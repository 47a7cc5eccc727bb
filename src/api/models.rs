use serde::{Deserialize, Serialize};

use crate::clustering::AlgorithmInfo;

/// Body of `GET /_algorithms`.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct AlgorithmsResponse {
    pub default: String,
    pub algorithms: Vec<AlgorithmSummary>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct AlgorithmSummary {
    pub name: String,
    pub description: String,
}

impl From<AlgorithmInfo> for AlgorithmSummary {
    fn from(info: AlgorithmInfo) -> Self {
        Self {
            name: info.name,
            description: info.description,
        }
    }
}
