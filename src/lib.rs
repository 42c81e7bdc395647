//! review-harvest - multi-source product review extraction
//!
//! Given a product URL on a supported marketplace, resolves product metadata
//! and streams normalized, filtered reviews page by page with progress
//! reporting and cooperative cancellation.

// Module declarations
pub mod domain;
pub mod infrastructure;

// Re-export the entry points for easier access
pub use domain::{
    MediaType, ParsedProductInfo, ProgressCallback, ScrapeOptions, ScrapeProgress, ScrapeStatus,
    ScrapedReview, ScrapedReviewMedia, SourceKind,
};
pub use infrastructure::{AppConfig, ConfigManager, ReviewScraper, ScrapeError, ScraperRegistry};
