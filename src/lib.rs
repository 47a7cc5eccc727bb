pub mod adapter;
pub mod analyzer;
pub mod api;
pub mod clustering;
pub mod config;
pub mod data_models;
pub mod db;
pub mod error;
pub mod pipeline;
pub mod query_engine;
pub mod request;
pub mod response;
pub mod search;
pub mod transcoder;

pub use error::{ClusteringError, Result, SearchError};
pub use pipeline::{ActionSettings, ClusteringAction};
pub use request::ClusteringRequest;
pub use response::ClusteringActionResponse;
