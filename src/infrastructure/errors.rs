//! Construction-time errors.
//!
//! Expected runtime failures (rate limiting, blocking, unparseable pages) are
//! reported through `ScrapeProgress` instead; only configuration and setup
//! mistakes surface as `ScrapeError`.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScrapeError {
    #[error("Configuration error in {field}: {message}")]
    InvalidConfiguration { field: String, message: String },

    #[error("Unknown relay provider '{0}' (expected scraperapi, zyte or brightdata)")]
    UnknownRelayProvider(String),

    #[error("Invalid selector '{selector}': {reason}")]
    InvalidSelector { selector: String, reason: String },

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
}
