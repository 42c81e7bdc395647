//! Pagination driver shared by every review source
//!
//! One scrape is one sequential flow: jitter, fetch with retry, structured
//! extraction, markup fallback, normalize, filter, emit. The flow only
//! suspends at delays and network fetches, and stops on exhaustion, the
//! caller's review cap, cancellation or an unrecoverable fetch failure.

#![allow(clippy::uninlined_format_args)]

use async_stream::stream;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::domain::filter;
use crate::domain::{
    ProgressCallback, ScrapeOptions, ScrapeProgress, ScrapedReview, ScrapedReviewMedia, SourceKind,
};
use crate::infrastructure::config::SourceSettings;
use crate::infrastructure::http_client::{FetchOutcome, PageFetcher, PageRequest};
use crate::infrastructure::parsing::normalize;
use crate::infrastructure::parsing_error::ParsingError;

/// Lazy, forward-only sequence of accepted reviews.
pub type ReviewStream = BoxStream<'static, ScrapedReview>;

/// Reviewer name used when the source omits one.
pub const ANONYMOUS_REVIEWER: &str = "Anonymous";

/// A review as read from the page, before normalization.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawReview {
    pub id: Option<String>,
    pub reviewer: Option<String>,
    pub rating: Option<f64>,
    pub title: Option<String>,
    pub body: Option<String>,
    pub date_text: Option<String>,
    pub verified: bool,
    pub image_urls: Vec<String>,
    pub video_urls: Vec<String>,
}

impl RawReview {
    /// Produce the emitted record: clamped rating, UTC date, full-size media.
    pub fn normalize(self, now: DateTime<Utc>) -> ScrapedReview {
        let (rating, rating_defaulted) = normalize::normalize_rating(self.rating);
        let (review_date, date_defaulted) = normalize::normalize_date(self.date_text.as_deref(), now);
        if rating_defaulted || date_defaulted {
            debug!(
                "Review {:?}: rating defaulted={}, date defaulted={} (raw date {:?})",
                self.id, rating_defaulted, date_defaulted, self.date_text
            );
        }

        let mut media: Vec<ScrapedReviewMedia> = Vec::new();
        let candidates = self
            .image_urls
            .iter()
            .filter_map(|url| normalize::image_media(url))
            .chain(self.video_urls.iter().filter_map(|url| normalize::video_media(url)));
        for item in candidates {
            if !media.iter().any(|m| m.url == item.url) {
                media.push(item);
            }
        }

        ScrapedReview {
            external_review_id: self
                .id
                .filter(|id| !id.trim().is_empty())
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            reviewer_name: self
                .reviewer
                .filter(|name| !name.trim().is_empty())
                .unwrap_or_else(|| ANONYMOUS_REVIEWER.to_string()),
            rating,
            title: self.title.filter(|t| !t.trim().is_empty()),
            body: self.body.filter(|b| !b.trim().is_empty()),
            review_date,
            is_verified_purchase: self.verified,
            media,
            rating_defaulted,
            date_defaulted,
        }
    }
}

/// Items extracted from one page plus the pagination signals that came with them.
#[derive(Debug, Default)]
pub struct ReviewPage {
    pub items: Vec<Result<RawReview, ParsingError>>,
    pub total_count: Option<u32>,
    /// Explicit continuation signal; `None` when the strategy has none.
    pub has_more: Option<bool>,
}

impl ReviewPage {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// At least one item was read successfully.
    pub fn has_usable_items(&self) -> bool {
        self.items.iter().any(Result::is_ok)
    }
}

/// Per-marketplace page mechanics the driver needs.
pub trait ReviewSource: Send + Sync {
    fn kind(&self) -> SourceKind;

    fn settings(&self) -> &SourceSettings;

    /// Request for review page `page` (1-based).
    fn page_request(&self, product_id: &str, page: u32) -> PageRequest;

    /// Structured-data strategy; `None` when the payload is absent.
    fn extract_structured(&self, body: &str) -> Option<ReviewPage>;

    /// Separate request for the markup strategy. `None` means the markup
    /// strategy reads the body already fetched.
    fn fallback_request(&self, _product_id: &str, _page: u32) -> Option<PageRequest> {
        None
    }

    fn extract_markup(&self, body: &str) -> ReviewPage;
}

/// Result of fetching one page through the retry loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageBody {
    Fetched(String),
    Failed(String),
    Cancelled,
}

/// Fetch `request` up to `attempts` times with escalating delays.
///
/// Cancellation is honoured before each attempt, during backoff and while a
/// fetch is in flight.
pub async fn fetch_with_retries(
    fetcher: &dyn PageFetcher,
    request: &PageRequest,
    settings: &SourceSettings,
    attempts: u32,
    cancel: &CancellationToken,
) -> PageBody {
    let attempts = attempts.max(1);
    let mut last_error = String::from("no attempt made");
    let mut rate_limited = false;
    let mut retry_after = None;

    for attempt in 1..=attempts {
        if cancel.is_cancelled() {
            return PageBody::Cancelled;
        }

        if attempt > 1 {
            let mut delay = settings.retry_delay(attempt - 1, rate_limited);
            if let Some(hint) = retry_after {
                delay = delay.max(hint);
            }
            if !delay.is_zero() {
                debug!("Backing off {:?} before attempt {}/{}", delay, attempt, attempts);
                let cancelled = tokio::select! {
                    _ = cancel.cancelled() => true,
                    _ = tokio::time::sleep(delay) => false,
                };
                if cancelled {
                    return PageBody::Cancelled;
                }
            }
        }

        let page = tokio::select! {
            _ = cancel.cancelled() => return PageBody::Cancelled,
            page = fetcher.fetch_page(request) => page,
        };

        if page.outcome.is_success() {
            return PageBody::Fetched(page.body);
        }
        last_error = page.outcome.describe();
        (rate_limited, retry_after) = match &page.outcome {
            FetchOutcome::RateLimited { retry_after } => (true, *retry_after),
            _ => (false, None),
        };
        warn!("🔄 Attempt {}/{} failed for {}: {}", attempt, attempts, request.url, last_error);
    }

    PageBody::Failed(format!("{} after {} attempt(s)", last_error, attempts))
}

/// Owns the progress record and publishes snapshots to the caller.
///
/// Dropping it before a terminal state (the consumer stopped pulling) is
/// reported as cancellation.
struct ProgressReporter {
    progress: ScrapeProgress,
    callback: Option<ProgressCallback>,
}

impl ProgressReporter {
    fn publish(&self) {
        debug_assert!(self.progress.counters_consistent());
        if let Some(callback) = &self.callback {
            callback(&self.progress);
        }
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        if !self.progress.status.is_terminal() {
            self.progress.cancel();
            self.publish();
        }
    }
}

/// Drive a scrape of `product_id` on `source` and return the lazy review stream.
///
/// Nothing is fetched until the stream is first polled.
pub fn review_stream<S>(
    source: Arc<S>,
    fetcher: Arc<dyn PageFetcher>,
    product_id: String,
    options: ScrapeOptions,
    on_progress: Option<ProgressCallback>,
    cancel: CancellationToken,
) -> ReviewStream
where
    S: ReviewSource + 'static,
{
    let stream = stream! {
        let kind = source.kind();
        let settings = source.settings().clone();
        let mut reporter = ProgressReporter {
            progress: ScrapeProgress::starting(),
            callback: on_progress,
        };
        reporter.publish();
        info!("🚀 [{}] Starting review scrape for {}", kind, product_id);

        let mut emitted: u32 = 0;
        let mut page: u32 = 1;

        'pages: loop {
            if cancel.is_cancelled() {
                reporter.progress.cancel();
                break;
            }
            if options.limit_reached(emitted) {
                info!("[{}] Review limit reached after {} reviews", kind, emitted);
                reporter.progress.complete();
                break;
            }

            reporter.progress.current_page = page;
            reporter.progress.set_status_text(format!("Fetching page {}", page));
            reporter.publish();

            if page > 1 {
                let delay = settings.jitter_delay();
                if !delay.is_zero() {
                    let cancelled = tokio::select! {
                        _ = cancel.cancelled() => true,
                        _ = tokio::time::sleep(delay) => false,
                    };
                    if cancelled {
                        reporter.progress.cancel();
                        break;
                    }
                }
            }

            let request = source.page_request(&product_id, page);
            let body = match fetch_with_retries(fetcher.as_ref(), &request, &settings, settings.max_retries, &cancel).await {
                PageBody::Fetched(body) => body,
                PageBody::Cancelled => {
                    reporter.progress.cancel();
                    break;
                }
                PageBody::Failed(reason) => {
                    error!("❌ [{}] Aborting scrape on page {}: {}", kind, page, reason);
                    reporter.progress.fail(format!("Page {}: {}", page, reason));
                    break;
                }
            };

            let structured = source.extract_structured(&body);
            let structured_total = structured.as_ref().and_then(|p| p.total_count);
            let mut fallback_error = None;

            let page_data = match structured {
                Some(data) if data.has_usable_items() => data,
                structured => {
                    debug!("[{}] No usable structured reviews on page {}, trying markup", kind, page);
                    let markup = match source.fallback_request(&product_id, page) {
                        None => source.extract_markup(&body),
                        Some(fallback) => match fetch_with_retries(fetcher.as_ref(), &fallback, &settings, 1, &cancel).await {
                            PageBody::Fetched(fallback_body) => source.extract_markup(&fallback_body),
                            PageBody::Cancelled => {
                                reporter.progress.cancel();
                                break 'pages;
                            }
                            PageBody::Failed(reason) => {
                                warn!("[{}] Markup fallback fetch failed on page {}: {}", kind, page, reason);
                                fallback_error = Some(reason);
                                ReviewPage::default()
                            }
                        },
                    };
                    // Unreadable structured entries still count when markup finds nothing
                    match structured {
                        Some(unreadable) if markup.is_empty() => unreadable,
                        _ => ReviewPage {
                            total_count: markup.total_count.or(structured_total),
                            ..markup
                        },
                    }
                }
            };

            if page == 1 {
                if let Some(total) = page_data.total_count {
                    reporter.progress.total_reviews = total;
                }
            }

            if page_data.is_empty() {
                if page == 1 {
                    let reason = fallback_error.unwrap_or_else(|| "No reviews found on the first page".to_string());
                    warn!("[{}] {}", kind, reason);
                    reporter.progress.fail(reason);
                } else {
                    info!("[{}] Page {} is empty, no more reviews", kind, page);
                    reporter.progress.complete();
                }
                break;
            }

            let raw_count = page_data.items.len();
            let has_more_signal = page_data.has_more;
            let now = Utc::now();

            for (index, item) in page_data.items.into_iter().enumerate() {
                if cancel.is_cancelled() {
                    reporter.progress.cancel();
                    break 'pages;
                }
                if options.limit_reached(emitted) {
                    break;
                }

                match item {
                    Err(e) => {
                        warn!("⚠️ [{}] Page {} item {} could not be parsed: {}", kind, page, index, e);
                        reporter.progress.record_unparsed();
                    }
                    Ok(raw) => {
                        let review = raw.normalize(now);
                        match filter::rejection(&review, &options) {
                            Some(rejection) => {
                                debug!("[{}] Skipping review {}: {:?}", kind, review.external_review_id, rejection);
                                reporter.progress.record_skipped();
                            }
                            None => {
                                reporter.progress.record_imported();
                                emitted += 1;
                                yield review;
                            }
                        }
                    }
                }
            }

            reporter.progress.set_status_text(format!(
                "Page {}: {} imported, {} skipped",
                page, reporter.progress.imported_reviews, reporter.progress.skipped_reviews
            ));
            reporter.publish();

            let has_more = raw_count >= settings.reviews_per_page && has_more_signal.unwrap_or(true);
            if !has_more {
                info!("[{}] Last page reached at page {}", kind, page);
                reporter.progress.complete();
                break;
            }
            page += 1;
        }

        info!(
            "🏁 [{}] Scrape finished: {:?} ({} imported / {} processed)",
            kind,
            reporter.progress.status,
            reporter.progress.imported_reviews,
            reporter.progress.processed_reviews
        );
        reporter.publish();
    };

    Box::pin(stream)
}
