//! Review, product and media records produced by the scrapers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Compiled-in marketplaces the engine knows how to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Amazon,
    AliExpress,
}

impl SourceKind {
    pub const ALL: [SourceKind; 2] = [SourceKind::Amazon, SourceKind::AliExpress];

    pub fn as_str(self) -> &'static str {
        match self {
            SourceKind::Amazon => "amazon",
            SourceKind::AliExpress => "aliexpress",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "amazon" => Ok(SourceKind::Amazon),
            "aliexpress" => Ok(SourceKind::AliExpress),
            other => Err(format!("unknown review source '{other}'")),
        }
    }
}

/// Snapshot of a product page, produced once per `parse_product_url` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedProductInfo {
    pub source: SourceKind,
    pub product_id: String,
    pub title: String,
    pub product_url: String,
    pub image_url: Option<String>,
    pub price: Option<f64>,
    pub average_rating: Option<f64>,
    pub total_reviews: Option<u32>,
}

impl ParsedProductInfo {
    /// Title used when neither the structured payload nor the markup yields one.
    pub const UNKNOWN_TITLE: &'static str = "Unknown Product";

    /// Record carrying only the identifying fields.
    pub fn identified(source: SourceKind, product_id: impl Into<String>, product_url: impl Into<String>) -> Self {
        Self {
            source,
            product_id: product_id.into(),
            title: Self::UNKNOWN_TITLE.to_string(),
            product_url: product_url.into(),
            image_url: None,
            price: None,
            average_rating: None,
            total_reviews: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    #[default]
    Image,
    Video,
}

/// Media attached to a review. Only URLs are captured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapedReviewMedia {
    pub media_type: MediaType,
    pub url: String,
    pub thumbnail_url: Option<String>,
}

/// One harvested review, normalized and ready to hand to the consumer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapedReview {
    /// Source-native id, or a generated UUID when the source omits one.
    pub external_review_id: String,
    pub reviewer_name: String,
    /// Always within `1..=5`.
    pub rating: u8,
    pub title: Option<String>,
    pub body: Option<String>,
    pub review_date: DateTime<Utc>,
    pub is_verified_purchase: bool,
    pub media: Vec<ScrapedReviewMedia>,
    /// Set when the source rating could not be read and 5 was substituted.
    #[serde(default)]
    pub rating_defaulted: bool,
    /// Set when the source date could not be read and the scrape time was substituted.
    #[serde(default)]
    pub date_defaulted: bool,
}

impl ScrapedReview {
    pub fn has_media(&self) -> bool {
        !self.media.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_kind_round_trips_through_str() {
        for kind in SourceKind::ALL {
            assert_eq!(kind.as_str().parse::<SourceKind>().unwrap(), kind);
        }
        assert!("ebay".parse::<SourceKind>().is_err());
        assert_eq!(" AliExpress ".parse::<SourceKind>().unwrap(), SourceKind::AliExpress);
    }

    #[test]
    fn test_identified_product_has_only_identity() {
        let info = ParsedProductInfo::identified(SourceKind::Amazon, "B000000001", "https://www.amazon.com/dp/B000000001");
        assert_eq!(info.title, ParsedProductInfo::UNKNOWN_TITLE);
        assert!(info.price.is_none());
        assert!(info.total_reviews.is_none());
    }

    #[test]
    fn test_review_serializes_camel_case() {
        let review = ScrapedReview {
            external_review_id: "R1".into(),
            reviewer_name: "Ann".into(),
            rating: 4,
            title: None,
            body: Some("ok".into()),
            review_date: Utc::now(),
            is_verified_purchase: true,
            media: vec![],
            rating_defaulted: false,
            date_defaulted: false,
        };
        let json = serde_json::to_value(&review).unwrap();
        assert_eq!(json["externalReviewId"], "R1");
        assert_eq!(json["isVerifiedPurchase"], true);
        assert!(!review.has_media());
    }
}
