//! Infrastructure layer for fetching, parsing and configuration
//!
//! This module provides the HTTP fetch client, relay rewriting, HTML/JSON
//! parsing helpers, the marketplace scrapers and the ambient configuration
//! and logging setup.

pub mod config;  // Configuration file and defaults
pub mod errors;  // Construction-time errors
pub mod http_client;  // Fetch client and outcome classification
pub mod logging;  // Logging infrastructure
pub mod parsing;  // Selector chains, JSON-LD, normalization
pub mod parsing_error;  // Item-level extraction errors
pub mod relay;  // Anti-bot relay request construction
pub mod scrapers;  // Marketplace sources and dispatcher

// Re-export commonly used items
pub use config::{AppConfig, ConfigManager, SourceSettings};
pub use errors::ScrapeError;
pub use http_client::{FetchClient, FetchOutcome, FetchedPage, PageFetcher, PageRequest};
pub use logging::{init_logging, init_logging_with_config, get_log_directory};
pub use parsing_error::ParsingError;
pub use relay::{Relay, RelayProvider};
pub use scrapers::{ReviewScraper, ReviewStream, ScraperRegistry, SourceScraper};
