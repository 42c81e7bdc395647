//! Amazon review source
//!
//! Review pages live at `/product-reviews/<ASIN>`. Structured data comes from
//! embedded JSON-LD when Amazon serves it; otherwise the review cards are read
//! from the `data-hook` markup.

#![allow(clippy::uninlined_format_args)]

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html};
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use url::Url;

use super::pagination::{self, RawReview, ReviewPage, ReviewSource, ReviewStream};
use super::{ReviewScraper, fetch_product_page, host_contains};
use crate::domain::{ParsedProductInfo, ProgressCallback, ScrapeOptions, SourceKind};
use crate::infrastructure::config::SourceSettings;
use crate::infrastructure::errors::ScrapeError;
use crate::infrastructure::http_client::{PageFetcher, PageRequest};
use crate::infrastructure::parsing::{
    SelectorSet, clean_text, element_text, jsonld, leading_count, leading_number, leading_rating,
};
use crate::infrastructure::parsing_error::ParsingError;

/// Body signatures of Amazon's robot check pages
pub const BLOCK_MARKERS: &[&str] = &[
    "/errors/validateCaptcha",
    "validateCaptcha",
    "api-services-support@amazon.com",
];

static ASIN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)/(?:dp|product|gp/product|ASIN)/([A-Z0-9]{10})").expect("static regex")
});
static STAR_CLASS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"a-star-(?:small-|mini-)?(\d)").expect("static regex"));
static OUT_OF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+(?:[.,]\d+)?)\s*out").expect("static regex"));
static RATING_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\d+([.,]\d+)?\s*out\s*of\s*\d+\s*stars?\s*").expect("static regex")
});
static REVIEWED_ON: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bon\s+(.+)$").expect("static regex"));
static TOTAL_COUNT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)([\d,.]+)\s*(?:global\s*)?(?:review|rating)").expect("static regex")
});

struct AmazonSelectors {
    review: SelectorSet,
    star_icon: SelectorSet,
    review_title: SelectorSet,
    review_body: SelectorSet,
    author: SelectorSet,
    review_date: SelectorSet,
    verified_badge: SelectorSet,
    review_images: SelectorSet,
    review_videos: SelectorSet,
    pagination: SelectorSet,
    next_page: SelectorSet,
    total_count: SelectorSet,
    product_title: SelectorSet,
    product_image: SelectorSet,
    product_price: SelectorSet,
    product_rating_attr: SelectorSet,
    product_rating_text: SelectorSet,
    product_review_count: SelectorSet,
}

impl AmazonSelectors {
    fn compile() -> Result<Self, ScrapeError> {
        Ok(Self {
            review: SelectorSet::compile(&["[data-hook='review']", "div.review"])?,
            star_icon: SelectorSet::compile(&[
                "[data-hook='review-star-rating']",
                "[data-hook='cmps-review-star-rating']",
                "i[class*='a-star']",
            ])?,
            review_title: SelectorSet::compile(&["[data-hook='review-title']", ".review-title"])?,
            review_body: SelectorSet::compile(&["[data-hook='review-body'] span", "[data-hook='review-body']"])?,
            author: SelectorSet::compile(&[".a-profile-name", "[data-hook='review-author']"])?,
            review_date: SelectorSet::compile(&["[data-hook='review-date']", ".review-date"])?,
            verified_badge: SelectorSet::compile(&["[data-hook='avp-badge']", "[data-hook='avp-badge-linkless']"])?,
            review_images: SelectorSet::compile(&[
                "[data-hook='review-image-tile'] img",
                ".review-image-tile-section img",
                ".review-image img",
            ])?,
            review_videos: SelectorSet::compile(&["[data-video-url]", "video source", "video[src]"])?,
            pagination: SelectorSet::compile(&[".a-pagination"])?,
            next_page: SelectorSet::compile(&[".a-pagination .a-last:not(.a-disabled)"])?,
            total_count: SelectorSet::compile(&[
                "[data-hook='cr-filter-info-review-rating-count']",
                "[data-hook='total-review-count']",
            ])?,
            product_title: SelectorSet::compile(&[
                "#productTitle",
                "[data-feature-name='title'] span",
                "#title span",
                "h1 span",
            ])?,
            product_image: SelectorSet::compile(&["#landingImage", "#imgBlkFront", "#main-image", ".a-dynamic-image"])?,
            product_price: SelectorSet::compile(&[
                ".a-price .a-offscreen",
                "#priceblock_ourprice",
                ".a-price-whole",
                "#corePrice_feature_buybox .a-offscreen",
            ])?,
            product_rating_attr: SelectorSet::compile(&["#acrPopover[title]"])?,
            product_rating_text: SelectorSet::compile(&[
                "[data-hook='rating-out-of-text']",
                "#averageCustomerReviews .a-icon-alt",
                "#acrPopover .a-icon-alt",
            ])?,
            product_review_count: SelectorSet::compile(&["#acrCustomerReviewText", "[data-hook='total-review-count']"])?,
        })
    }
}

/// Page mechanics for Amazon; shared by the scraper and its review streams.
pub struct AmazonSource {
    settings: SourceSettings,
    selectors: AmazonSelectors,
}

impl AmazonSource {
    pub fn new(settings: SourceSettings) -> Result<Self, ScrapeError> {
        settings.validate(SourceKind::Amazon)?;
        Ok(Self { settings, selectors: AmazonSelectors::compile()? })
    }

    /// ASIN from any of Amazon's product URL shapes.
    pub fn product_id(url: &str) -> Option<String> {
        ASIN.captures(url).map(|caps| caps[1].to_ascii_uppercase())
    }

    /// `<scheme>://<host>/dp/<ASIN>` on the URL's own storefront.
    pub fn canonical_url(&self, url: &str, asin: &str) -> String {
        match Url::parse(url.trim()) {
            Ok(parsed) if parsed.host_str().is_some() => {
                format!("{}://{}/dp/{}", parsed.scheme(), parsed.host_str().unwrap_or_default(), asin)
            }
            _ => format!("{}/dp/{}", self.base_url(), asin),
        }
    }

    fn base_url(&self) -> &str {
        self.settings.base_url.trim_end_matches('/')
    }

    fn html_request(&self, url: String) -> PageRequest {
        PageRequest::html(url)
            .with_block_markers(BLOCK_MARKERS)
            .via_relay(self.settings.use_relay)
            .with_min_body_bytes(self.settings.min_body_bytes)
    }

    pub fn product_request(&self, canonical_url: &str) -> PageRequest {
        self.html_request(canonical_url.to_string())
    }

    /// Fill `info` from a product page: JSON-LD first, then markup per field.
    pub fn extract_product(&self, body: &str, mut info: ParsedProductInfo) -> ParsedProductInfo {
        let document = Html::parse_document(body);
        let nodes = jsonld::nodes(&document);

        if let Some(product) = jsonld::find_typed(&nodes, "Product") {
            if let Some(name) = product.get("name").and_then(jsonld::text) {
                info.title = name;
            }
            info.image_url = product.get("image").and_then(jsonld::text);
            info.price = jsonld::as_list(product.get("offers"))
                .into_iter()
                .find_map(|offer| offer.get("price").and_then(jsonld::number));
            if let Some(aggregate) = product.get("aggregateRating") {
                info.average_rating = aggregate.get("ratingValue").and_then(jsonld::number);
                info.total_reviews = aggregate
                    .get("reviewCount")
                    .or_else(|| aggregate.get("ratingCount"))
                    .and_then(jsonld::number)
                    .map(|n| n as u32);
            }
        }

        let s = &self.selectors;
        if info.title == ParsedProductInfo::UNKNOWN_TITLE {
            if let Some(title) = s.product_title.text_in(&document) {
                info.title = title;
            }
        }
        if info.image_url.is_none() {
            info.image_url = s
                .product_image
                .attr_in(&document, "data-old-hires")
                .or_else(|| s.product_image.attr_in(&document, "src"));
        }
        if info.price.is_none() {
            info.price = s.product_price.text_in(&document).and_then(|text| leading_number(&text));
        }
        if info.average_rating.is_none() {
            info.average_rating = s
                .product_rating_attr
                .attr_in(&document, "title")
                .or_else(|| s.product_rating_text.text_in(&document))
                .and_then(|text| leading_rating(&text));
        }
        if info.total_reviews.is_none() {
            info.total_reviews = s
                .product_review_count
                .text_in(&document)
                .and_then(|text| leading_count(&text));
        }

        debug!(
            "Amazon product {}: title={:?} price={:?} rating={:?} reviews={:?}",
            info.product_id, info.title, info.price, info.average_rating, info.total_reviews
        );
        info
    }

    /// Continuation from the pagination widget; `None` when there is none.
    fn has_next_page(&self, document: &Html) -> Option<bool> {
        let root = document.root_element();
        self.selectors
            .pagination
            .exists(root)
            .then(|| self.selectors.next_page.exists(root))
    }

    fn markup_total(&self, document: &Html) -> Option<u32> {
        let text = self.selectors.total_count.text_in(document)?;
        let caps = TOTAL_COUNT.captures(&text)?;
        leading_count(&caps[1])
    }

    fn review_from_jsonld(index: usize, node: &Value) -> Result<RawReview, ParsingError> {
        let rating = node
            .get("reviewRating")
            .and_then(|r| r.get("ratingValue"))
            .and_then(jsonld::number);
        let title = node.get("name").and_then(jsonld::text);
        let body = node.get("reviewBody").and_then(jsonld::text);
        if rating.is_none() && title.is_none() && body.is_none() {
            return Err(ParsingError::review_extraction_failed(index, "JSON-LD review has no rating, title or body"));
        }

        let image_urls = jsonld::as_list(node.get("image"))
            .into_iter()
            .filter_map(|image| match image {
                Value::String(url) => Some(url.clone()),
                other => other.get("url").and_then(Value::as_str).map(str::to_string),
            })
            .collect();

        Ok(RawReview {
            id: node
                .get("@id")
                .or_else(|| node.get("identifier"))
                .and_then(Value::as_str)
                .map(str::to_string),
            reviewer: node.get("author").and_then(jsonld::text),
            rating,
            title,
            body,
            date_text: node.get("datePublished").and_then(jsonld::text),
            verified: false,
            image_urls,
            video_urls: Vec::new(),
        })
    }

    fn review_from_card(&self, index: usize, card: ElementRef<'_>) -> Result<RawReview, ParsingError> {
        let s = &self.selectors;

        let rating = s
            .star_icon
            .select_union(card)
            .into_iter()
            .find_map(|icon| {
                let class = icon.value().attr("class").unwrap_or_default();
                STAR_CLASS
                    .captures(class)
                    .and_then(|caps| caps[1].parse::<f64>().ok())
                    .or_else(|| element_text(icon).and_then(|text| out_of_rating(&text)))
            });

        let title = s
            .review_title
            .text(card)
            .map(|text| RATING_PREFIX.replace(&text, "").into_owned())
            .and_then(|text| clean_text(&text));
        let body = s.review_body.text(card);

        if rating.is_none() && title.is_none() && body.is_none() {
            return Err(ParsingError::review_extraction_failed(index, "review card has no rating, title or body"));
        }

        let date_text = s.review_date.text(card).map(|text| {
            REVIEWED_ON
                .captures(&text)
                .map(|caps| caps[1].trim().to_string())
                .unwrap_or(text)
        });

        let image_urls = s
            .review_images
            .select_union(card)
            .into_iter()
            .filter_map(|img| img.value().attr("src").or_else(|| img.value().attr("data-src")))
            .map(str::to_string)
            .collect();
        let video_urls = s
            .review_videos
            .select_union(card)
            .into_iter()
            .filter_map(|el| el.value().attr("data-video-url").or_else(|| el.value().attr("src")))
            .map(str::to_string)
            .collect();

        Ok(RawReview {
            id: card.value().attr("id").map(str::to_string),
            reviewer: s.author.text(card),
            rating,
            title,
            body,
            date_text,
            verified: s.verified_badge.exists(card),
            image_urls,
            video_urls,
        })
    }
}

fn out_of_rating(text: &str) -> Option<f64> {
    OUT_OF
        .captures(text)
        .and_then(|caps| caps[1].replace(',', ".").parse().ok())
}

impl ReviewSource for AmazonSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Amazon
    }

    fn settings(&self) -> &SourceSettings {
        &self.settings
    }

    fn page_request(&self, product_id: &str, page: u32) -> PageRequest {
        let base = self.base_url();
        self.html_request(format!(
            "{}/product-reviews/{}?pageNumber={}&sortBy=recent",
            base, product_id, page
        ))
        .with_referer(format!("{}/dp/{}", base, product_id))
    }

    fn extract_structured(&self, body: &str) -> Option<ReviewPage> {
        let document = Html::parse_document(body);
        let nodes = jsonld::nodes(&document);
        let product = nodes
            .iter()
            .find(|node| node.get("review").is_some())
            .or_else(|| jsonld::find_typed(&nodes, "Product"))?;

        let items = jsonld::as_list(product.get("review"))
            .into_iter()
            .enumerate()
            .map(|(index, node)| Self::review_from_jsonld(index, node))
            .collect();
        let total_count = product
            .get("aggregateRating")
            .and_then(|a| a.get("reviewCount"))
            .and_then(jsonld::number)
            .map(|n| n as u32);

        Some(ReviewPage { items, total_count, has_more: self.has_next_page(&document) })
    }

    fn extract_markup(&self, body: &str) -> ReviewPage {
        let document = Html::parse_document(body);
        let cards = self.selectors.review.select_all(document.root_element());
        debug!("Amazon markup strategy found {} review cards", cards.len());

        let items = cards
            .into_iter()
            .enumerate()
            .map(|(index, card)| self.review_from_card(index, card))
            .collect();

        ReviewPage {
            items,
            total_count: self.markup_total(&document),
            has_more: self.has_next_page(&document),
        }
    }
}

/// Amazon scraper: ASIN resolution, product metadata and review streaming.
#[derive(Clone)]
pub struct AmazonScraper {
    source: Arc<AmazonSource>,
    fetcher: Arc<dyn PageFetcher>,
}

impl AmazonScraper {
    pub fn new(settings: SourceSettings, fetcher: Arc<dyn PageFetcher>) -> Result<Self, ScrapeError> {
        Ok(Self { source: Arc::new(AmazonSource::new(settings)?), fetcher })
    }

    pub fn source(&self) -> &AmazonSource {
        &self.source
    }
}

#[async_trait]
impl ReviewScraper for AmazonScraper {
    fn kind(&self) -> SourceKind {
        SourceKind::Amazon
    }

    fn can_handle(&self, url: &str) -> bool {
        host_contains(url, "amazon.")
    }

    fn extract_product_id(&self, url: &str) -> Option<String> {
        AmazonSource::product_id(url)
    }

    async fn parse_product_url(&self, url: &str) -> Option<ParsedProductInfo> {
        let Some(asin) = self.extract_product_id(url) else {
            info!("No ASIN found in {}", url);
            return None;
        };
        let canonical = self.source.canonical_url(url, &asin);
        let info = ParsedProductInfo::identified(SourceKind::Amazon, &asin, &canonical);

        let request = self.source.product_request(&canonical);
        match fetch_product_page(self.fetcher.as_ref(), &request, self.source.settings()).await {
            Some(body) => Some(self.source.extract_product(&body, info)),
            None => Some(info),
        }
    }

    fn scrape_reviews(
        &self,
        product_id: &str,
        options: ScrapeOptions,
        on_progress: Option<ProgressCallback>,
        cancel: CancellationToken,
    ) -> ReviewStream {
        pagination::review_stream(
            Arc::clone(&self.source),
            Arc::clone(&self.fetcher),
            product_id.to_string(),
            options,
            on_progress,
            cancel,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> AmazonSource {
        AmazonSource::new(SourceSettings::amazon().without_delays()).unwrap()
    }

    const REVIEW_PAGE: &str = r#"<html><body>
        <div data-hook="cr-filter-info-review-rating-count"> 1,234 global ratings | 321 global reviews</div>
        <div id="R1ABC" data-hook="review">
            <span class="a-profile-name">Jane D.</span>
            <i data-hook="review-star-rating" class="a-icon a-icon-star a-star-4 review-rating"><span class="a-icon-alt">4.0 out of 5 stars</span></i>
            <a data-hook="review-title"><span>4.0 out of 5 stars</span> <span>Does the job</span></a>
            <span data-hook="review-date">Reviewed in the United States on January 5, 2024</span>
            <span data-hook="avp-badge">Verified Purchase</span>
            <span data-hook="review-body"><span>Works well, battery lasts.</span></span>
            <div class="review-image-tile-section"><img src="https://m.media-amazon.com/images/I/71xyz._SY88_.jpg"></div>
        </div>
        <div id="R2DEF" data-hook="review">
            <i data-hook="cmps-review-star-rating" class="a-icon a-icon-star"><span class="a-icon-alt">2,0 out of 5 stars</span></i>
            <span data-hook="review-body"><span>Broke after a week.</span></span>
            <span data-hook="review-date">Reviewed in Germany on 5 March 2024</span>
        </div>
        <div id="R3GHI" data-hook="review"><span class="a-profile-name">Empty</span></div>
        <ul class="a-pagination"><li class="a-last"><a href="?pageNumber=2">Next page</a></li></ul>
    </body></html>"#;

    #[test]
    fn test_product_id_shapes() {
        assert_eq!(AmazonSource::product_id("https://www.amazon.com/Echo/dp/B08N5WRWNW/ref=x").as_deref(), Some("B08N5WRWNW"));
        assert_eq!(AmazonSource::product_id("https://www.amazon.com/gp/product/b08n5wrwnw").as_deref(), Some("B08N5WRWNW"));
        assert_eq!(AmazonSource::product_id("https://www.amazon.de/product-reviews/B08N5WRWNW").as_deref(), None);
        assert!(AmazonSource::product_id("https://www.amazon.com/s?k=echo").is_none());
    }

    #[test]
    fn test_canonical_url_keeps_storefront() {
        let s = source();
        assert_eq!(s.canonical_url("https://www.amazon.co.uk/x/dp/B08N5WRWNW?th=1", "B08N5WRWNW"), "https://www.amazon.co.uk/dp/B08N5WRWNW");
        assert_eq!(s.canonical_url("garbage", "B08N5WRWNW"), "https://www.amazon.com/dp/B08N5WRWNW");
    }

    #[test]
    fn test_review_page_request() {
        let request = source().page_request("B08N5WRWNW", 3);
        assert_eq!(request.url, "https://www.amazon.com/product-reviews/B08N5WRWNW?pageNumber=3&sortBy=recent");
        assert_eq!(request.referer.as_deref(), Some("https://www.amazon.com/dp/B08N5WRWNW"));
        assert_eq!(request.min_body_bytes, 10_000);
        assert!(request.detect_block("<form action=\"/errors/validateCaptcha\">").is_some());
    }

    #[test]
    fn test_markup_strategy() {
        let s = source();
        assert!(s.extract_structured(REVIEW_PAGE).is_none());

        let page = s.extract_markup(REVIEW_PAGE);
        assert_eq!(page.items.len(), 3);
        assert_eq!(page.total_count, Some(1234));
        assert_eq!(page.has_more, Some(true));

        let first = page.items[0].as_ref().unwrap();
        assert_eq!(first.id.as_deref(), Some("R1ABC"));
        assert_eq!(first.reviewer.as_deref(), Some("Jane D."));
        assert_eq!(first.rating, Some(4.0));
        assert_eq!(first.title.as_deref(), Some("Does the job"));
        assert_eq!(first.date_text.as_deref(), Some("January 5, 2024"));
        assert!(first.verified);
        assert_eq!(first.image_urls.len(), 1);

        let second = page.items[1].as_ref().unwrap();
        assert_eq!(second.rating, Some(2.0));
        assert_eq!(second.date_text.as_deref(), Some("5 March 2024"));
        assert!(!second.verified);

        assert!(matches!(page.items[2], Err(ParsingError::ReviewExtractionFailed { index: 2, .. })));
    }

    #[test]
    fn test_last_page_has_no_next() {
        let html = r#"<div data-hook="review"><span data-hook="review-body"><span>ok</span></span></div>
            <ul class="a-pagination"><li class="a-last a-disabled">Next page</li></ul>"#;
        assert_eq!(source().extract_markup(html).has_more, Some(false));
    }

    #[test]
    fn test_structured_strategy() {
        let html = r#"<html><head><script type="application/ld+json">{
            "@type": "Product", "name": "Echo",
            "aggregateRating": {"ratingValue": 4.6, "reviewCount": "88"},
            "review": [
                {"author": {"@type": "Person", "name": "Sam"}, "reviewRating": {"ratingValue": "5"},
                 "name": "Great", "reviewBody": "Loud and clear", "datePublished": "2024-02-01",
                 "image": ["https://m.media-amazon.com/images/I/1._SY88_.jpg"]},
                {"author": "Nobody"}
            ]}</script></head><body></body></html>"#;
        let page = source().extract_structured(html).unwrap();
        assert_eq!(page.total_count, Some(88));
        assert_eq!(page.has_more, None);
        let first = page.items[0].as_ref().unwrap();
        assert_eq!(first.reviewer.as_deref(), Some("Sam"));
        assert_eq!(first.rating, Some(5.0));
        assert_eq!(first.image_urls.len(), 1);
        assert!(page.items[1].is_err());
    }

    #[test]
    fn test_product_metadata_markup_fallback() {
        let html = r#"<html><body>
            <span id="productTitle">  Echo Dot (5th Gen)  </span>
            <img id="landingImage" data-old-hires="https://m.media-amazon.com/images/I/big.jpg" src="https://m.media-amazon.com/images/I/small.jpg">
            <span class="a-price"><span class="a-offscreen">$49.99</span></span>
            <span id="acrPopover" title="4.7 out of 5 stars"></span>
            <span id="acrCustomerReviewText">12,345 ratings</span>
        </body></html>"#;
        let s = source();
        let info = s.extract_product(html, ParsedProductInfo::identified(SourceKind::Amazon, "B09B8V1LZ3", "https://www.amazon.com/dp/B09B8V1LZ3"));
        assert_eq!(info.title, "Echo Dot (5th Gen)");
        assert_eq!(info.image_url.as_deref(), Some("https://m.media-amazon.com/images/I/big.jpg"));
        assert_eq!(info.price, Some(49.99));
        assert_eq!(info.average_rating, Some(4.7));
        assert_eq!(info.total_reviews, Some(12345));
    }

    #[test]
    fn test_product_metadata_on_german_storefront() {
        let html = r#"<html><body>
            <span id="productTitle">Echo Dot (5. Generation)</span>
            <span class="a-price"><span class="a-offscreen">54,99 €</span></span>
            <span id="acrPopover" title="4,6 von 5 Sternen"></span>
            <span id="acrCustomerReviewText">1.234 Sternebewertungen</span>
        </body></html>"#;
        let info = source().extract_product(
            html,
            ParsedProductInfo::identified(SourceKind::Amazon, "B09B8V1LZ3", "https://www.amazon.de/dp/B09B8V1LZ3"),
        );
        assert_eq!(info.price, Some(54.99));
        assert_eq!(info.average_rating, Some(4.6));
        assert_eq!(info.total_reviews, Some(1234));
    }

    #[test]
    fn test_product_metadata_without_data_keeps_identity() {
        let s = source();
        let info = s.extract_product("<html></html>", ParsedProductInfo::identified(SourceKind::Amazon, "B09B8V1LZ3", "u"));
        assert_eq!(info.title, ParsedProductInfo::UNKNOWN_TITLE);
        assert_eq!(info.product_id, "B09B8V1LZ3");
    }
}
