//! AliExpress review source
//!
//! Reviews come from the first-party feedback API. When it returns nothing,
//! the item page is re-fetched once and read for an embedded feedback list
//! or, failing that, the rendered feedback cards.

#![allow(clippy::uninlined_format_args)]

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html};
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::pagination::{self, RawReview, ReviewPage, ReviewSource, ReviewStream};
use super::{ReviewScraper, fetch_product_page, host_contains};
use crate::domain::{ParsedProductInfo, ProgressCallback, ScrapeOptions, SourceKind};
use crate::infrastructure::config::SourceSettings;
use crate::infrastructure::errors::ScrapeError;
use crate::infrastructure::http_client::{PageFetcher, PageRequest};
use crate::infrastructure::parsing::normalize::absolute_https;
use crate::infrastructure::parsing::{SelectorSet, element_text, jsonld, leading_rating};
use crate::infrastructure::parsing_error::ParsingError;

/// Body signatures of AliExpress slider/captcha interstitials
pub const BLOCK_MARKERS: &[&str] = &["/_____tmd_____/punish", "x5secdata", "\"action\":\"captcha\""];

const FEEDBACK_API: &str = "https://feedback.aliexpress.com/pc/searchEvaluation.do";

static PRODUCT_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"/item/(\d+)").expect("static regex"));
static RUN_PARAMS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"window\.runParams\s*=\s*").expect("static regex"));
static FEEDBACK_LIST: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""feedbackList"\s*:\s*"#).expect("static regex"));

/// Parse the first JSON value starting at `text`, ignoring whatever follows.
fn leading_json(text: &str) -> Option<Value> {
    serde_json::Deserializer::from_str(text)
        .into_iter::<Value>()
        .next()
        .and_then(Result::ok)
}

/// Star rating from a feedback record. `buyerEval` is a 0-100 score on the
/// API (20 per star) but already a star count in some embedded payloads.
fn json_rating(node: &Value) -> Option<f64> {
    let eval = node.get("buyerEval").and_then(jsonld::number).filter(|v| *v > 0.0);
    match eval {
        Some(score) if score > 5.0 => Some(score / 20.0),
        Some(stars) => Some(stars),
        None => node.get("star").and_then(jsonld::number).filter(|v| *v > 0.0),
    }
}

fn json_string(node: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match node.get(*key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn review_from_json(index: usize, node: &Value) -> Result<RawReview, ParsingError> {
    if !node.is_object() {
        return Err(ParsingError::review_extraction_failed(index, "feedback entry is not an object"));
    }

    let rating = json_rating(node);
    let body = json_string(node, &["buyerFeedback", "content"]);
    let image_urls: Vec<String> = jsonld::as_list(node.get("images"))
        .into_iter()
        .filter_map(Value::as_str)
        .map(str::to_string)
        .collect();
    if rating.is_none() && body.is_none() && image_urls.is_empty() {
        return Err(ParsingError::review_extraction_failed(index, "feedback entry has no rating, text or images"));
    }

    Ok(RawReview {
        id: json_string(node, &["id", "evaluationId"]),
        reviewer: json_string(node, &["buyerName", "anonymousUser"]),
        rating,
        title: None,
        body,
        date_text: json_string(node, &["evalDate", "gmtCreate"]),
        verified: true,
        image_urls,
        video_urls: Vec::new(),
    })
}

struct AliExpressSelectors {
    feedback_item: SelectorSet,
    active_star: SelectorSet,
    rating_text: SelectorSet,
    user_name: SelectorSet,
    content: SelectorSet,
    date: SelectorSet,
    photos: SelectorSet,
    product_title: SelectorSet,
    product_image: SelectorSet,
}

impl AliExpressSelectors {
    fn compile() -> Result<Self, ScrapeError> {
        Ok(Self {
            feedback_item: SelectorSet::compile(&["[class*='feedback-item']", "[class*='review-item']"])?,
            active_star: SelectorSet::compile(&["[class*='star-view'] span[class*='star-active']", ".star-view .yellow"])?,
            rating_text: SelectorSet::compile(&["[class*='rating']"])?,
            user_name: SelectorSet::compile(&["[class*='user-name']", "[class*='buyer']"])?,
            content: SelectorSet::compile(&["[class*='content']", "[class*='feedback-text']"])?,
            date: SelectorSet::compile(&["[class*='date']", "[class*='time']"])?,
            photos: SelectorSet::compile(&["[class*='pic-view'] img", "[class*='photo'] img"])?,
            product_title: SelectorSet::compile(&["h1", "[data-pl='product-title']"])?,
            product_image: SelectorSet::compile(&["[class*='magnifier'] img", ".product-image img"])?,
        })
    }
}

/// Page mechanics for AliExpress.
pub struct AliExpressSource {
    settings: SourceSettings,
    selectors: AliExpressSelectors,
}

impl AliExpressSource {
    pub fn new(settings: SourceSettings) -> Result<Self, ScrapeError> {
        settings.validate(SourceKind::AliExpress)?;
        Ok(Self { settings, selectors: AliExpressSelectors::compile()? })
    }

    pub fn product_id(url: &str) -> Option<String> {
        PRODUCT_ID.captures(url).map(|caps| caps[1].to_string())
    }

    pub fn item_url(&self, product_id: &str) -> String {
        format!("{}/item/{}.html", self.settings.base_url.trim_end_matches('/'), product_id)
    }

    fn html_request(&self, url: String) -> PageRequest {
        PageRequest::html(url)
            .with_block_markers(BLOCK_MARKERS)
            .via_relay(self.settings.use_relay)
            .with_min_body_bytes(self.settings.min_body_bytes)
    }

    pub fn product_request(&self, product_id: &str) -> PageRequest {
        self.html_request(self.item_url(product_id))
    }

    /// `window.runParams` payload, unwrapping the `data` envelope when present.
    fn run_params(body: &str) -> Option<Value> {
        let start = RUN_PARAMS.find(body)?.end();
        let value = leading_json(&body[start..])?;
        match value.get("data") {
            Some(data) if data.is_object() => Some(data.clone()),
            _ => Some(value),
        }
    }

    pub fn extract_product(&self, body: &str, mut info: ParsedProductInfo) -> ParsedProductInfo {
        if let Some(params) = Self::run_params(body) {
            if let Some(title) = params.pointer("/pageModule/title").and_then(jsonld::text) {
                info.title = title;
            }
            info.price = params.pointer("/priceModule/minAmount").and_then(|amount| match amount {
                Value::Object(_) => amount.get("value").and_then(jsonld::number),
                other => jsonld::number(other),
            });
            if let Some(rating) = params.pointer("/titleModule/feedbackRating") {
                info.average_rating = rating.get("averageStar").and_then(jsonld::number);
                info.total_reviews = rating.get("totalValidNum").and_then(jsonld::number).map(|n| n as u32);
            }
            info.image_url = params
                .pointer("/imageModule/imagePathList/0")
                .and_then(Value::as_str)
                .map(absolute_https);
        } else {
            debug!("No runParams payload for AliExpress product {}", info.product_id);
        }

        let needs_markup = info.title == ParsedProductInfo::UNKNOWN_TITLE || info.image_url.is_none();
        if needs_markup {
            let document = Html::parse_document(body);
            if info.title == ParsedProductInfo::UNKNOWN_TITLE {
                if let Some(title) = self.selectors.product_title.text_in(&document) {
                    info.title = title;
                }
            }
            if info.image_url.is_none() {
                info.image_url = self.selectors.product_image.attr_in(&document, "src").map(|src| absolute_https(&src));
            }
        }
        info
    }

    fn embedded_feedback(body: &str) -> Option<ReviewPage> {
        let start = FEEDBACK_LIST.find(body)?.end();
        let list = leading_json(&body[start..])?;
        let items = list
            .as_array()?
            .iter()
            .enumerate()
            .map(|(index, node)| review_from_json(index, node))
            .collect();
        Some(ReviewPage { items, total_count: None, has_more: None })
    }

    fn review_from_card(&self, index: usize, card: ElementRef<'_>) -> Result<RawReview, ParsingError> {
        let s = &self.selectors;
        let stars = s.active_star.select_union(card).len();
        let rating = if stars > 0 {
            Some(stars as f64)
        } else {
            s.rating_text.text(card).and_then(|text| leading_rating(&text))
        };
        let body = s.content.text(card);
        let image_urls: Vec<String> = s
            .photos
            .select_union(card)
            .into_iter()
            .filter_map(|img| img.value().attr("src"))
            .map(str::to_string)
            .collect();
        if rating.is_none() && body.is_none() && image_urls.is_empty() {
            return Err(ParsingError::review_extraction_failed(index, "feedback card has no rating, text or images"));
        }

        Ok(RawReview {
            id: card.value().attr("data-id").map(str::to_string),
            reviewer: s.user_name.first(card).and_then(element_text),
            rating,
            title: None,
            body,
            date_text: s.date.text(card),
            verified: true,
            image_urls,
            video_urls: Vec::new(),
        })
    }
}

impl ReviewSource for AliExpressSource {
    fn kind(&self) -> SourceKind {
        SourceKind::AliExpress
    }

    fn settings(&self) -> &SourceSettings {
        &self.settings
    }

    fn page_request(&self, product_id: &str, page: u32) -> PageRequest {
        let url = format!(
            "{}?productId={}&page={}&pageSize={}&filter=all&sort=default",
            FEEDBACK_API, product_id, page, self.settings.reviews_per_page
        );
        PageRequest::json(url)
            .with_referer(self.item_url(product_id))
            .with_block_markers(BLOCK_MARKERS)
            .via_relay(self.settings.use_relay)
    }

    fn extract_structured(&self, body: &str) -> Option<ReviewPage> {
        let payload: Value = match serde_json::from_str(body) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("{}", ParsingError::malformed_payload("AliExpress feedback API", e));
                return None;
            }
        };
        let data = payload.get("data")?;

        let items = jsonld::as_list(data.get("productReviewList"))
            .into_iter()
            .enumerate()
            .map(|(index, node)| review_from_json(index, node))
            .collect();
        let total_count = data.get("totalNum").and_then(jsonld::number).map(|n| n as u32);
        let total_pages = data.get("totalPage").and_then(jsonld::number);
        let current_page = data.get("currentPage").and_then(jsonld::number);
        let has_more = match (current_page, total_pages) {
            (Some(current), Some(total)) => Some(current < total),
            _ => None,
        };

        Some(ReviewPage { items, total_count, has_more })
    }

    fn fallback_request(&self, product_id: &str, page: u32) -> Option<PageRequest> {
        Some(self.html_request(format!("{}?page={}", self.item_url(product_id), page)))
    }

    fn extract_markup(&self, body: &str) -> ReviewPage {
        if let Some(page) = Self::embedded_feedback(body) {
            debug!("AliExpress embedded feedback list with {} entries", page.items.len());
            return page;
        }

        let document = Html::parse_document(body);
        let items = self
            .selectors
            .feedback_item
            .select_union(document.root_element())
            .into_iter()
            .enumerate()
            .map(|(index, card)| self.review_from_card(index, card))
            .collect();
        ReviewPage { items, total_count: None, has_more: None }
    }
}

/// AliExpress scraper: item id resolution, product metadata and review streaming.
#[derive(Clone)]
pub struct AliExpressScraper {
    source: Arc<AliExpressSource>,
    fetcher: Arc<dyn PageFetcher>,
}

impl AliExpressScraper {
    pub fn new(settings: SourceSettings, fetcher: Arc<dyn PageFetcher>) -> Result<Self, ScrapeError> {
        Ok(Self { source: Arc::new(AliExpressSource::new(settings)?), fetcher })
    }

    pub fn source(&self) -> &AliExpressSource {
        &self.source
    }
}

#[async_trait]
impl ReviewScraper for AliExpressScraper {
    fn kind(&self) -> SourceKind {
        SourceKind::AliExpress
    }

    fn can_handle(&self, url: &str) -> bool {
        host_contains(url, "aliexpress")
    }

    fn extract_product_id(&self, url: &str) -> Option<String> {
        AliExpressSource::product_id(url)
    }

    async fn parse_product_url(&self, url: &str) -> Option<ParsedProductInfo> {
        let Some(product_id) = self.extract_product_id(url) else {
            info!("No AliExpress item id found in {}", url);
            return None;
        };
        let info = ParsedProductInfo::identified(
            SourceKind::AliExpress,
            &product_id,
            format!("https://www.aliexpress.com/item/{}.html", product_id),
        );

        let request = self.source.product_request(&product_id);
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
