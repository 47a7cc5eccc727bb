use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

/// Runtime configuration, read from the environment (and `.env` if present).
#[derive(Debug, Clone)]
pub struct Config {
    pub bind: SocketAddr,
    pub default_algorithm: String,
    pub default_language: String,
    pub request_timeout: Duration,
    pub max_concurrent_clusterings: usize,
    pub admission_wait: Duration,
    /// Index documents from MongoDB instead of local JSON when set.
    pub mongo_uri: Option<String>,
    pub mongo_db_name: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();
        Ok(Config {
            bind: parse_or_default("CLUSTERFIND_BIND", SocketAddr::from(([127, 0, 0, 1], 9280)))?,
            default_algorithm: get_env_or_default(
                "CLUSTERFIND_DEFAULT_ALGORITHM",
                crate::clustering::frequent_terms::NAME,
            ),
            default_language: get_env_or_default("CLUSTERFIND_DEFAULT_LANGUAGE", "en"),
            request_timeout: Duration::from_millis(parse_or_default(
                "CLUSTERFIND_REQUEST_TIMEOUT_MS",
                10_000u64,
            )?),
            max_concurrent_clusterings: parse_or_default(
                "CLUSTERFIND_MAX_CONCURRENT_CLUSTERINGS",
                default_parallelism(),
            )?,
            admission_wait: Duration::from_millis(parse_or_default(
                "CLUSTERFIND_ADMISSION_WAIT_MS",
                1_000u64,
            )?),
            mongo_uri: env::var("MONGO_URI").ok().filter(|s| !s.trim().is_empty()),
            mongo_db_name: get_env_or_default("MONGO_DB_NAME", "clusterfind"),
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bind: SocketAddr::from(([127, 0, 0, 1], 9280)),
            default_algorithm: crate::clustering::frequent_terms::NAME.to_string(),
            default_language: "en".to_string(),
            request_timeout: Duration::from_secs(10),
            max_concurrent_clusterings: default_parallelism(),
            admission_wait: Duration::from_secs(1),
            mongo_uri: None,
            mongo_db_name: "clusterfind".to_string(),
        }
    }
}

fn default_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

fn get_env_or_default(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid value for environment variable {key}: {raw}")),
        _ => Ok(default),
    }
}
