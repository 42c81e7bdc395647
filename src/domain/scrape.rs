//! Scrape invocation inputs and the progress record pushed to callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Caller configuration for one scrape invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeOptions {
    pub min_rating: Option<u8>,
    #[serde(default)]
    pub photos_only: bool,
    pub reviews_after_date: Option<DateTime<Utc>>,
    pub max_reviews: Option<u32>,
}

impl ScrapeOptions {
    pub fn with_min_rating(mut self, rating: u8) -> Self {
        self.min_rating = Some(rating);
        self
    }

    pub fn with_photos_only(mut self) -> Self {
        self.photos_only = true;
        self
    }

    pub fn with_reviews_after(mut self, cutoff: DateTime<Utc>) -> Self {
        self.reviews_after_date = Some(cutoff);
        self
    }

    pub fn with_max_reviews(mut self, max: u32) -> Self {
        self.max_reviews = Some(max);
        self
    }

    /// True once `emitted` reviews satisfy the configured cap.
    pub fn limit_reached(&self, emitted: u32) -> bool {
        self.max_reviews.is_some_and(|max| emitted >= max)
    }
}

/// Lifecycle of a scrape as seen by progress consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ScrapeStatus {
    #[default]
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl ScrapeStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, ScrapeStatus::Running)
    }
}

/// Counter/status record owned by the engine for the duration of one scrape.
///
/// `imported_reviews + skipped_reviews == processed_reviews` holds whenever a
/// snapshot is handed to the progress callback. `unparsed_reviews` is a subset
/// of `skipped_reviews`: items the source returned that could not be read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeProgress {
    pub total_reviews: u32,
    pub processed_reviews: u32,
    pub imported_reviews: u32,
    pub skipped_reviews: u32,
    pub unparsed_reviews: u32,
    pub current_page: u32,
    pub status: ScrapeStatus,
    pub current_status: Option<String>,
    pub last_error: Option<String>,
}

impl ScrapeProgress {
    pub fn starting() -> Self {
        Self {
            current_status: Some("Starting...".to_string()),
            ..Self::default()
        }
    }

    pub fn set_status_text(&mut self, text: impl Into<String>) {
        self.current_status = Some(text.into());
    }

    pub fn record_imported(&mut self) {
        self.processed_reviews += 1;
        self.imported_reviews += 1;
    }

    pub fn record_skipped(&mut self) {
        self.processed_reviews += 1;
        self.skipped_reviews += 1;
    }

    pub fn record_unparsed(&mut self) {
        self.record_skipped();
        self.unparsed_reviews += 1;
    }

    pub fn complete(&mut self) {
        self.status = ScrapeStatus::Completed;
        self.set_status_text("Completed");
    }

    pub fn cancel(&mut self) {
        self.status = ScrapeStatus::Cancelled;
        self.set_status_text("Cancelled");
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = ScrapeStatus::Failed;
        self.last_error = Some(error.into());
        self.set_status_text("Failed");
    }

    pub fn counters_consistent(&self) -> bool {
        self.imported_reviews + self.skipped_reviews == self.processed_reviews
    }
}

/// Caller-supplied sink receiving progress snapshots.
pub type ProgressCallback = Arc<dyn Fn(&ScrapeProgress) + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_stay_consistent() {
        let mut progress = ScrapeProgress::starting();
        progress.record_imported();
        progress.record_skipped();
        progress.record_unparsed();
        assert_eq!(progress.processed_reviews, 3);
        assert_eq!(progress.imported_reviews, 1);
        assert_eq!(progress.skipped_reviews, 2);
        assert_eq!(progress.unparsed_reviews, 1);
        assert!(progress.counters_consistent());
    }

    #[test]
    fn test_terminal_states() {
        let mut progress = ScrapeProgress::starting();
        assert!(!progress.status.is_terminal());
        progress.fail("boom");
        assert_eq!(progress.status, ScrapeStatus::Failed);
        assert_eq!(progress.last_error.as_deref(), Some("boom"));
        assert!(progress.status.is_terminal());
    }

    #[test]
    fn test_limit_reached() {
        let options = ScrapeOptions::default().with_max_reviews(2);
        assert!(!options.limit_reached(1));
        assert!(options.limit_reached(2));
        assert!(!ScrapeOptions::default().limit_reached(u32::MAX));
    }
}
