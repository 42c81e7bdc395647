//! review-harvest command line entry point.

use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result, anyhow, bail};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use review_harvest_lib::infrastructure::logging;
use review_harvest_lib::{
    ConfigManager, ProgressCallback, ReviewScraper, ScrapeOptions, ScrapeProgress, ScrapeStatus, ScraperRegistry,
};

#[derive(Parser)]
#[command(
    name = "review-harvest",
    about = "Harvest product metadata and customer reviews from supported marketplaces",
    version
)]
struct Cli {
    /// Configuration file (defaults to the user config directory).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level override (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print product metadata as JSON.
    Product {
        url: String,
    },

    /// Stream reviews as JSON lines.
    Reviews {
        url: String,

        /// Skip reviews rated below this.
        #[arg(long, value_parser = clap::value_parser!(u8).range(1..=5))]
        min_rating: Option<u8>,

        /// Only reviews with photos or videos.
        #[arg(long)]
        photos_only: bool,

        /// Only reviews dated on or after this day (YYYY-MM-DD).
        #[arg(long)]
        after: Option<NaiveDate>,

        /// Stop after this many reviews.
        #[arg(long)]
        max: Option<u32>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let manager = match &cli.config {
        Some(path) => ConfigManager::with_path(path),
        None => ConfigManager::new()?,
    };
    let mut config = manager.load_config().await?;
    if let Some(level) = &cli.log_level {
        config.logging.level.clone_from(level);
    }
    logging::init_logging_with_config(&config.logging)?;
    logging::log_system_info();

    let registry = ScraperRegistry::from_config(&config).context("Invalid configuration")?;

    match cli.command {
        Commands::Product { url } => {
            let info = registry
                .parse_product_url(&url)
                .await
                .ok_or_else(|| anyhow!("Unsupported or unrecognized product URL: {url}"))?;
            println!("{}", serde_json::to_string_pretty(&info)?);
            Ok(())
        }
        Commands::Reviews { url, min_rating, photos_only, after, max } => {
            let options = ScrapeOptions {
                min_rating,
                photos_only,
                reviews_after_date: after.and_then(|day| day.and_hms_opt(0, 0, 0)).map(|dt| dt.and_utc()),
                max_reviews: max,
            };
            harvest_reviews(&registry, &url, options).await
        }
    }
}

async fn harvest_reviews(registry: &ScraperRegistry, url: &str, options: ScrapeOptions) -> Result<()> {
    let scraper = registry
        .find(url)
        .ok_or_else(|| anyhow!("No scraper supports {url}"))?;
    let product_id = scraper
        .extract_product_id(url)
        .ok_or_else(|| anyhow!("Could not read a {} product id from {url}", scraper.kind()))?;

    let cancel = CancellationToken::new();
    let ctrl_c_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, finishing the current review");
            ctrl_c_token.cancel();
        }
    });

    let last_progress: Arc<Mutex<Option<ScrapeProgress>>> = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&last_progress);
    let on_progress: ProgressCallback = Arc::new(move |progress: &ScrapeProgress| {
        info!(
            "📊 {} | total {} processed {} imported {} skipped {}",
            progress.current_status.as_deref().unwrap_or_default(),
            progress.total_reviews,
            progress.processed_reviews,
            progress.imported_reviews,
            progress.skipped_reviews
        );
        if let Ok(mut slot) = sink.lock() {
            *slot = Some(progress.clone());
        }
    });

    let mut stream = scraper.scrape_reviews(&product_id, options, Some(on_progress), cancel);
    let stdout = std::io::stdout();
    while let Some(review) = stream.next().await {
        let mut out = stdout.lock();
        writeln!(out, "{}", serde_json::to_string(&review)?)?;
    }
    drop(stream);

    let final_progress = last_progress.lock().ok().and_then(|slot| slot.clone());
    match final_progress {
        Some(progress) if progress.status == ScrapeStatus::Failed => {
            bail!(
                "Scrape failed after {} reviews: {}",
                progress.imported_reviews,
                progress.last_error.unwrap_or_default()
            )
        }
        Some(progress) => {
            info!("Done: {:?}, {} reviews written", progress.status, progress.imported_reviews);
            Ok(())
        }
        None => Ok(()),
    }
}
