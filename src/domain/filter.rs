//! Per-review filter policy.
//!
//! Pure predicates over a normalized review and the caller's options. Counter
//! bookkeeping belongs to the pagination driver.

use super::review::ScrapedReview;
use super::scrape::ScrapeOptions;

/// Why a review was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterRejection {
    BelowMinRating,
    NoMedia,
    BeforeCutoff,
}

/// Returns the first rule the review violates, if any.
pub fn rejection(review: &ScrapedReview, options: &ScrapeOptions) -> Option<FilterRejection> {
    if options.min_rating.is_some_and(|min| review.rating < min) {
        return Some(FilterRejection::BelowMinRating);
    }
    if options.photos_only && !review.has_media() {
        return Some(FilterRejection::NoMedia);
    }
    if options.reviews_after_date.is_some_and(|cutoff| review.review_date < cutoff) {
        return Some(FilterRejection::BeforeCutoff);
    }
    None
}

pub fn passes(review: &ScrapedReview, options: &ScrapeOptions) -> bool {
    rejection(review, options).is_none()
}
