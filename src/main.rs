use std::path::PathBuf;
use std::time::Duration;

mod config;
mod db;
mod error;
mod export;
mod feed;
mod ingest;
mod models;
mod store;

use config::Config;
use db::FeedRegistry;
use error::{AppError, Result};
use export::export_csv;
use feed::FeedExtractor;
use ingest::IngestOrchestrator;
use models::FeedDescriptor;
use store::FsArticleStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Log to stderr so command output stays pipeable
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let config = Config::load()?;

    let registry = FeedRegistry::new(&config.db_path).await?;

    match args.get(1).map(String::as_str) {
        Some("ingest") => {
            let Some(url) = args.get(2) else {
                return usage();
            };
            let orchestrator = build_orchestrator(registry, &config);
            let summary = match flag_value(&args, "--checkpoint")? {
                Some(checkpoint) => orchestrator.ingest_from(url, checkpoint).await?,
                None => orchestrator.ingest_feed(url).await?,
            };
            println!(
                "Found {} new articles, archived {}",
                summary.articles_found, summary.articles_archived
            );
        }
        Some("ingest-all") => {
            let orchestrator = build_orchestrator(registry, &config);
            let summary = orchestrator.ingest_all().await?;
            println!(
                "Found {} new articles, archived {}",
                summary.articles_found, summary.articles_archived
            );
        }
        Some("upsert") => {
            let Some(path) = args.get(2) else {
                return usage();
            };
            let content = std::fs::read_to_string(path)?;
            let feeds: Vec<FeedDescriptor> = serde_json::from_str(&content)?;
            let summary = registry.upsert_batch(&feeds).await?;
            println!(
                "Upsert complete. {} new items inserted. {} items updated.",
                summary.new_items, summary.updated_items
            );
        }
        Some("export") => {
            let output = args
                .get(2)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("consolidated_data.csv"));
            let store = FsArticleStore::new(&config.archive_dir);
            let count = export_csv(&store, &output).await?;
            println!("Exported {} articles to {}", count, output.display());
        }
        _ => return usage(),
    }

    Ok(())
}

fn build_orchestrator(
    registry: FeedRegistry,
    config: &Config,
) -> IngestOrchestrator<FeedExtractor, FsArticleStore> {
    IngestOrchestrator::new(
        registry,
        FeedExtractor::new(Duration::from_secs(config.fetch_timeout_secs)),
        FsArticleStore::new(&config.archive_dir),
        config.archive_concurrency,
        config.feed_concurrency,
    )
}

fn flag_value(args: &[String], flag: &str) -> Result<Option<i64>> {
    let Some(pos) = args.iter().position(|arg| arg == flag) else {
        return Ok(None);
    };
    let value = args
        .get(pos + 1)
        .ok_or_else(|| AppError::Config(format!("{flag} requires a value")))?;
    let value = value
        .parse()
        .map_err(|_| AppError::Config(format!("{flag} expects a Unix timestamp, got {value}")))?;
    Ok(Some(value))
}

fn usage() -> Result<()> {
    eprintln!(
        "Usage: feed-archiver <command>\n\n\
         Commands:\n\
         \x20 ingest <url> [--checkpoint N]  ingest one feed (override stored checkpoint with N)\n\
         \x20 ingest-all                     ingest every registered feed\n\
         \x20 upsert <feeds.json>            register or update feeds from a JSON file\n\
         \x20 export [out.csv]               flatten the archive into a CSV file"
    );
    Ok(())
}
