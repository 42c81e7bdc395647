//! Domain module - review records, scrape options and the filter policy
//!
//! Modern Rust module organization (Rust 2018+ style):
//! - Each module is its own file in the domain/ directory
//! - Public exports are defined here for convenience

pub mod filter;
pub mod review;
pub mod scrape;

pub use review::{MediaType, ParsedProductInfo, ScrapedReview, ScrapedReviewMedia, SourceKind};
pub use scrape::{ProgressCallback, ScrapeOptions, ScrapeProgress, ScrapeStatus};
