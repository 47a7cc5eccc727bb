use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use clusterfind::analyzer::TextAnalyzer;
use clusterfind::api::create_router;
use clusterfind::clustering::{AlgorithmRegistry, ClusteringEngine};
use clusterfind::config::Config;
use clusterfind::db::{Database, MongoIndex};
use clusterfind::query_engine::QueryEngine;
use clusterfind::search::{SearchIndex, SearchStage};
use clusterfind::{ActionSettings, ClusteringAction};

#[derive(Parser, Debug)]
#[command(name = "clusterfind", version, about = "Search results clustering over HTTP")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the clustering API
    Serve(ServeArgs),
    /// List the registered clustering algorithms
    Algorithms,
}

#[derive(Args, Debug)]
struct ServeArgs {
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// JSON array of documents to index in memory
    #[arg(long)]
    documents: Option<PathBuf>,

    /// Index name for --documents
    #[arg(long, default_value = "documents")]
    index: String,

    #[arg(long)]
    default_algorithm: Option<String>,

    #[arg(long)]
    request_timeout_ms: Option<u64>,

    #[arg(long)]
    max_concurrent_clusterings: Option<usize>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // the fmt subscriber also picks up `log` records
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env()?;

    match cli.command {
        Command::Algorithms => {
            for info in AlgorithmRegistry::with_defaults().list() {
                println!("{:<16} {}", info.name, info.description);
            }
            Ok(())
        }
        Command::Serve(args) => {
            if let Some(bind) = args.bind {
                config.bind = bind;
            }
            if let Some(algorithm) = args.default_algorithm {
                config.default_algorithm = algorithm;
            }
            if let Some(ms) = args.request_timeout_ms {
                config.request_timeout = Duration::from_millis(ms);
            }
            if let Some(n) = args.max_concurrent_clusterings {
                config.max_concurrent_clusterings = n;
            }
            serve(config, args.documents, &args.index).await
        }
    }
}

async fn serve(config: Config, documents: Option<PathBuf>, index: &str) -> anyhow::Result<()> {
    let registry = Arc::new(AlgorithmRegistry::with_defaults());
    anyhow::ensure!(
        registry.contains(&config.default_algorithm),
        "default algorithm [{}] is not registered",
        config.default_algorithm
    );

    let search_index: Arc<dyn SearchIndex> = match (&config.mongo_uri, documents) {
        (_, Some(path)) => {
            let mut engine = QueryEngine::new(TextAnalyzer::stemming(&config.default_language));
            let count = engine.load_json_file(index, &path)?;
            tracing::info!(index, count, path = %path.display(), "loaded documents");
            Arc::new(engine)
        }
        (Some(uri), None) => {
            let db = Database::new(uri, &config.mongo_db_name).await?;
            Arc::new(MongoIndex::new(
                db,
                TextAnalyzer::stemming(&config.default_language),
            ))
        }
        (None, None) => anyhow::bail!("either --documents or MONGO_URI is required"),
    };

    let engine = ClusteringEngine::new(
        registry,
        config.max_concurrent_clusterings,
        config.admission_wait,
        config.default_language.clone(),
    );
    let action = Arc::new(ClusteringAction::new(
        SearchStage::new(search_index),
        Arc::new(engine),
        ActionSettings {
            request_timeout: config.request_timeout,
            default_algorithm: config.default_algorithm.clone(),
        },
    ));

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind))?;
    tracing::info!(
        bind = %config.bind,
        default_algorithm = %config.default_algorithm,
        max_concurrent = config.max_concurrent_clusterings,
        "clusterfind listening"
    );
    axum::serve(listener, create_router(action)).await?;
    Ok(())
}
