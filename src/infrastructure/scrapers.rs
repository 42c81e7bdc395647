//! Review sources and the dispatcher that picks one for a URL
//!
//! The set of marketplaces is closed: each is a variant of [`SourceScraper`]
//! and [`ScraperRegistry`] tries them in a fixed order.

#![allow(clippy::uninlined_format_args)]

pub mod aliexpress;
pub mod amazon;
pub mod pagination;

use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::domain::{ParsedProductInfo, ProgressCallback, ScrapeOptions, SourceKind};
use crate::infrastructure::config::{AppConfig, SourceSettings};
use crate::infrastructure::errors::ScrapeError;
use crate::infrastructure::http_client::{FetchClient, PageFetcher, PageRequest};

pub use aliexpress::AliExpressScraper;
pub use amazon::AmazonScraper;
pub use pagination::{PageBody, RawReview, ReviewPage, ReviewSource, ReviewStream};

/// Capability contract every marketplace implements.
#[async_trait]
pub trait ReviewScraper: Send + Sync {
    fn kind(&self) -> SourceKind;

    /// Host-based ownership test. False for malformed URLs.
    fn can_handle(&self, url: &str) -> bool;

    /// Source-native product id, if the URL carries one.
    fn extract_product_id(&self, url: &str) -> Option<String>;

    /// Resolve product metadata. `None` only when no product id can be
    /// read from the URL; otherwise a best-effort record.
    async fn parse_product_url(&self, url: &str) -> Option<ParsedProductInfo>;

    /// Lazy stream of accepted reviews for `product_id`.
    fn scrape_reviews(
        &self,
        product_id: &str,
        options: ScrapeOptions,
        on_progress: Option<ProgressCallback>,
        cancel: CancellationToken,
    ) -> ReviewStream;
}

/// Whether `url` parses and its host contains `needle` (case-insensitive).
pub(crate) fn host_contains(url: &str, needle: &str) -> bool {
    Url::parse(url.trim())
        .ok()
        .and_then(|parsed| parsed.host_str().map(|host| host.to_ascii_lowercase().contains(needle)))
        .unwrap_or(false)
}

/// Fetch a product page with the source's retry policy. Product lookups are
/// not cancellable.
pub(crate) async fn fetch_product_page(
    fetcher: &dyn PageFetcher,
    request: &PageRequest,
    settings: &SourceSettings,
) -> Option<String> {
    match pagination::fetch_with_retries(fetcher, request, settings, settings.max_retries, &CancellationToken::new()).await {
        PageBody::Fetched(body) => Some(body),
        PageBody::Failed(reason) => {
            warn!("⚠️ Product page unavailable ({}): {}", request.url, reason);
            None
        }
        PageBody::Cancelled => None,
    }
}

/// Tagged variant over the compiled-in marketplaces.
#[derive(Clone)]
pub enum SourceScraper {
    Amazon(AmazonScraper),
    AliExpress(AliExpressScraper),
}

impl SourceScraper {
    fn inner(&self) -> &dyn ReviewScraper {
        match self {
            SourceScraper::Amazon(scraper) => scraper,
            SourceScraper::AliExpress(scraper) => scraper,
        }
    }
}

#[async_trait]
impl ReviewScraper for SourceScraper {
    fn kind(&self) -> SourceKind {
        self.inner().kind()
    }

    fn can_handle(&self, url: &str) -> bool {
        self.inner().can_handle(url)
    }

    fn extract_product_id(&self, url: &str) -> Option<String> {
        self.inner().extract_product_id(url)
    }

    async fn parse_product_url(&self, url: &str) -> Option<ParsedProductInfo> {
        self.inner().parse_product_url(url).await
    }

    fn scrape_reviews(
        &self,
        product_id: &str,
        options: ScrapeOptions,
        on_progress: Option<ProgressCallback>,
        cancel: CancellationToken,
    ) -> ReviewStream {
        self.inner().scrape_reviews(product_id, options, on_progress, cancel)
    }
}

/// Dispatcher: first scraper whose ownership test matches wins.
#[derive(Clone)]
pub struct ScraperRegistry {
    scrapers: Vec<SourceScraper>,
}

impl ScraperRegistry {
    /// Validate the configuration and build every scraper over a shared
    /// reqwest-backed client.
    pub fn from_config(config: &AppConfig) -> Result<Self, ScrapeError> {
        config.validate()?;
        let fetcher: Arc<dyn PageFetcher> = Arc::new(FetchClient::from_config(config)?);
        info!("✅ Scraper registry ready (relay: {})", config.relay.is_active());
        Self::with_fetcher(config, fetcher)
    }

    /// Build every scraper over a caller-supplied fetcher.
    pub fn with_fetcher(config: &AppConfig, fetcher: Arc<dyn PageFetcher>) -> Result<Self, ScrapeError> {
        let scrapers = vec![
            SourceScraper::Amazon(AmazonScraper::new(config.sources.amazon.clone(), Arc::clone(&fetcher))?),
            SourceScraper::AliExpress(AliExpressScraper::new(config.sources.aliexpress.clone(), fetcher)?),
        ];
        Ok(Self { scrapers })
    }

    pub fn scrapers(&self) -> &[SourceScraper] {
        &self.scrapers
    }

    pub fn find(&self, url: &str) -> Option<&SourceScraper> {
        let found = self.scrapers.iter().find(|scraper| scraper.can_handle(url));
        if found.is_none() {
            debug!("No scraper handles {}", url);
        }
        found
    }

    pub fn is_supported(&self, url: &str) -> bool {
        self.find(url).is_some()
    }

    pub fn source_kind(&self, url: &str) -> Option<SourceKind> {
        self.find(url).map(|scraper| scraper.kind())
    }

    pub fn by_kind(&self, kind: SourceKind) -> Option<&SourceScraper> {
        self.scrapers.iter().find(|scraper| scraper.kind() == kind)
    }

    /// Delegate to the owning scraper; `None` for unsupported URLs.
    pub async fn parse_product_url(&self, url: &str) -> Option<ParsedProductInfo> {
        self.find(url)?.parse_product_url(url).await
    }
}
