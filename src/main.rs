mod config;
mod crawler;
mod database;
mod error;
mod error_sink;
mod fetcher;
mod http_client;
mod models;
mod normalize;
mod parsing;
mod planner;

use anyhow::{Context, Result};
use clap::Parser;
use config::Config;
use crawler::Crawler;
use database::Database;
use error_sink::FileErrorSink;
use fetcher::HttpFetcher;
use models::FetchedDocument;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "soldfinder")]
#[command(about = "Crawler for sold property listings on hemnet.se", long_about = None)]
struct Args {
    /// First results page to crawl (overrides config)
    #[arg(long)]
    start: Option<u32>,

    /// Results page to stop before (overrides config)
    #[arg(long)]
    stop: Option<u32>,

    /// Fetch comparables for stored listings instead of crawling results pages
    #[arg(long)]
    comparables: bool,

    /// Parse a saved listing page and print the record, without storing it
    #[arg(long, requires = "url")]
    parse_file: Option<String>,

    /// URL the saved page was fetched from (used with --parse-file)
    #[arg(long)]
    url: Option<String>,

    /// Print a stored listing and its comparables
    #[arg(long)]
    show: Option<i64>,

    /// Write data/config.yaml with default values and exit
    #[arg(long)]
    init_config: bool,
}

fn init_logging(config: &Config) {
    // Initialize logging - use RUST_LOG env var if set, otherwise use config
    if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .init();
        tracing::info!("Logging level set from RUST_LOG environment variable");
    } else {
        let level = config.tracing_level.to_lowercase();
        let max_level = match level.as_str() {
            "trace" => tracing::Level::TRACE,
            "debug" => tracing::Level::DEBUG,
            "info" => tracing::Level::INFO,
            "warn" => tracing::Level::WARN,
            "error" => tracing::Level::ERROR,
            _ => {
                eprintln!("Invalid tracing level '{}', using 'info'", level);
                tracing::Level::INFO
            }
        };

        tracing_subscriber::fmt()
            .with_max_level(max_level)
            .init();

        tracing::info!("Logging level set to: {} (from {})", level, config::CONFIG_PATH);
    }
}

fn open_database(path: &str) -> Result<Database> {
    if let Some(parent) = std::path::Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Database::new(path).with_context(|| format!("Failed to open database {}", path))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.init_config {
        Config::create_default()?;
        eprintln!("Wrote default {}", config::CONFIG_PATH);
        return Ok(());
    }

    let mut config = Config::load()?;
    if let Some(start) = args.start {
        config.start_page = start;
    }
    if let Some(stop) = args.stop {
        config.stop_page = stop;
    }

    init_logging(&config);

    if let Some(path) = args.parse_file {
        let url = args.url.unwrap_or_default();
        return parse_saved_page(&path, &url, &config);
    }

    if let Some(hemnet_id) = args.show {
        return show_listing(hemnet_id, &config);
    }

    if args.comparables {
        return crawl_comparables(&config).await;
    }

    config.validate()?;
    crawl_listings(&config).await
}

async fn crawl_listings(config: &Config) -> Result<()> {
    tracing::info!(
        "Crawling results pages {}..{} of {}",
        config.start_page,
        config.stop_page,
        config.base_url
    );

    let crawler = Crawler::new(
        HttpFetcher::new(&config.user_agent, Duration::from_secs(config.request_timeout_seconds))?,
        open_database(&config.database_path)?,
        Arc::new(FileErrorSink::new(&config.error_log)),
        Duration::from_millis(config.request_delay_ms),
    );

    let pages = planner::start_urls(&config.base_url, config.start_page, config.stop_page);
    let summary = crawler.crawl_listings(&pages).await?;

    tracing::info!(
        "Done: {} pages fetched, {} listings stored, {} failed ({} listings in database)",
        summary.pages_fetched,
        summary.records_stored,
        summary.documents_failed,
        crawler.database().count_listings()?
    );
    Ok(())
}

async fn crawl_comparables(config: &Config) -> Result<()> {
    tracing::info!("Crawling comparables for stored listings");

    let crawler = Crawler::new(
        HttpFetcher::new(&config.user_agent, Duration::from_secs(config.request_timeout_seconds))?,
        open_database(&config.database_path)?,
        Arc::new(FileErrorSink::new(&config.comp_error_log)),
        Duration::from_millis(config.request_delay_ms),
    );

    let summary = crawler.crawl_comparables().await?;

    tracing::info!(
        "Done: {} pages fetched, {} comparables stored, {} failed ({} comparables in database)",
        summary.pages_fetched,
        summary.records_stored,
        summary.documents_failed,
        crawler.database().count_comparables()?
    );
    Ok(())
}

/// Run the detail parser on a page saved to disk
fn parse_saved_page(path: &str, url: &str, config: &Config) -> Result<()> {
    let body = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path))?;
    let document = FetchedDocument::new(url, body);
    let sink = FileErrorSink::new(&config.error_log);

    match parsing::parse_listing(&document, &sink) {
        Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
        None => eprintln!("No listing could be parsed from {} (see {})", path, config.error_log),
    }
    Ok(())
}

fn show_listing(hemnet_id: i64, config: &Config) -> Result<()> {
    let db = open_database(&config.database_path)?;

    let Some(listing) = db.get_listing(hemnet_id)? else {
        eprintln!("Listing {} is not stored", hemnet_id);
        return Ok(());
    };
    println!("{}", serde_json::to_string_pretty(&listing)?);

    let comparables = db.get_comparables(hemnet_id)?;
    println!("{} comparables", comparables.len());
    for comparable in &comparables {
        println!("{}", serde_json::to_string_pretty(comparable)?);
    }
    Ok(())
}
