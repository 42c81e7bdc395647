//! Value normalization shared by both marketplaces
//!
//! Every review leaves the engine with a rating in `1..=5`, a UTC timestamp
//! and absolute https media URLs. Substituted values are flagged so callers
//! can tell them from real data.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::domain::{MediaType, ScrapedReviewMedia};

/// Rating substituted when the source gives none.
pub const DEFAULT_RATING: u8 = 5;

/// Date-only layouts, most specific first
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%d %b %Y",
    "%b %d, %Y",
    "%B %d, %Y",
    "%d %B %Y",
    "%Y/%m/%d",
    "%m/%d/%Y",
];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
];

// `photo.jpg_220x220.jpg_.webp` -> `photo.jpg`
static SIZED_DERIVATIVE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(\.(?:jpe?g|png|webp|gif))_\d+x\d+[^/]*$").expect("static regex")
});

// `photo_50x50.jpg` -> `photo.jpg`
static SIZE_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"_\d+x\d+(\.\w+)$").expect("static regex"));

// `photo._SY88_.jpg` / `photo._AC_UL320_.jpg` -> `photo.jpg`
static RESIZE_DIRECTIVE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\._[A-Z0-9,_]+_\.(\w+)$").expect("static regex"));

/// Round and clamp to `1..=5`; a missing rating becomes [`DEFAULT_RATING`].
///
/// Returns the rating and whether it was defaulted.
pub fn normalize_rating(raw: Option<f64>) -> (u8, bool) {
    match raw.filter(|r| r.is_finite()) {
        Some(rating) => (rating.round().clamp(1.0, 5.0) as u8, false),
        None => (DEFAULT_RATING, true),
    }
}

/// Parse a source date string into UTC, trying every known layout.
pub fn parse_review_date(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
        }
    }
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Some(dt.and_utc());
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(text) {
        return Some(dt.with_timezone(&Utc));
    }

    // Unix timestamps: milliseconds when long enough, otherwise seconds
    if text.chars().all(|c| c.is_ascii_digit()) {
        let value: i64 = text.parse().ok()?;
        return if text.len() >= 12 {
            Utc.timestamp_millis_opt(value).single()
        } else {
            Utc.timestamp_opt(value, 0).single()
        };
    }

    None
}

/// Parsed date, or `now` flagged as defaulted.
pub fn normalize_date(text: Option<&str>, now: DateTime<Utc>) -> (DateTime<Utc>, bool) {
    match text.and_then(parse_review_date) {
        Some(date) => (date, false),
        None => (now, true),
    }
}

/// Absolute https form of a possibly protocol-relative or plain-http URL.
pub fn absolute_https(url: &str) -> String {
    let url = url.trim();
    if let Some(rest) = url.strip_prefix("//") {
        format!("https://{rest}")
    } else if let Some(rest) = url.strip_prefix("http://") {
        format!("https://{rest}")
    } else {
        url.to_string()
    }
}

/// Strip thumbnail sizing so the URL points at the full-size asset.
pub fn full_size_url(url: &str) -> String {
    let url = SIZED_DERIVATIVE.replace(url.trim(), "$1");
    let url = SIZE_SUFFIX.replace(&url, "$1");
    let url = RESIZE_DIRECTIVE.replace(&url, ".$1");
    absolute_https(&url)
}

/// Image entry with the full-size URL and the original as thumbnail.
pub fn image_media(raw_url: &str) -> Option<ScrapedReviewMedia> {
    let raw_url = raw_url.trim();
    if raw_url.is_empty() || raw_url.starts_with("data:") {
        return None;
    }
    Some(ScrapedReviewMedia {
        media_type: MediaType::Image,
        url: full_size_url(raw_url),
        thumbnail_url: Some(absolute_https(raw_url)),
    })
}

pub fn video_media(raw_url: &str) -> Option<ScrapedReviewMedia> {
    let raw_url = raw_url.trim();
    if raw_url.is_empty() {
        return None;
    }
    Some(ScrapedReviewMedia {
        media_type: MediaType::Video,
        url: absolute_https(raw_url),
        thumbnail_url: None,
    })
}
