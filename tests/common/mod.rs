//! Shared harness for integration tests: a scripted fetcher, progress
//! recording and marketplace fixture builders.
#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use review_harvest_lib::infrastructure::config::SourceSettings;
use review_harvest_lib::infrastructure::http_client::{FetchOutcome, FetchedPage, PageFetcher, PageRequest};
use review_harvest_lib::{AppConfig, ProgressCallback, ScrapeProgress, ScraperRegistry};

type Responder = Box<dyn Fn(&PageRequest, usize) -> FetchedPage + Send + Sync>;

/// Fetcher answering from a closure. The closure also receives the 1-based
/// attempt number for the requested URL.
pub struct ScriptedFetcher {
    responder: Responder,
    requests: Mutex<Vec<String>>,
}

impl ScriptedFetcher {
    pub fn new(responder: impl Fn(&PageRequest, usize) -> FetchedPage + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            responder: Box::new(responder),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn count_matching(&self, needle: &str) -> usize {
        self.requests().iter().filter(|url| url.contains(needle)).count()
    }
}

#[async_trait]
impl PageFetcher for ScriptedFetcher {
    async fn fetch_page(&self, request: &PageRequest) -> FetchedPage {
        let attempt = {
            let mut log = self.requests.lock().unwrap();
            log.push(request.url.clone());
            log.iter().filter(|url| **url == request.url).count()
        };
        (self.responder)(request, attempt)
    }
}

pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.sources.amazon = SourceSettings::amazon().without_delays();
    config.sources.aliexpress = SourceSettings::aliexpress().without_delays();
    config
}

pub fn registry(fetcher: &Arc<ScriptedFetcher>) -> ScraperRegistry {
    registry_with(fetcher, &test_config())
}

pub fn registry_with(fetcher: &Arc<ScriptedFetcher>, config: &AppConfig) -> ScraperRegistry {
    let fetcher: Arc<dyn PageFetcher> = fetcher.clone();
    ScraperRegistry::with_fetcher(config, fetcher).unwrap()
}

/// Records every progress snapshot pushed by a scrape.
#[derive(Clone, Default)]
pub struct ProgressLog {
    snapshots: Arc<Mutex<Vec<ScrapeProgress>>>,
}

impl ProgressLog {
    pub fn callback(&self) -> ProgressCallback {
        let snapshots = Arc::clone(&self.snapshots);
        Arc::new(move |progress: &ScrapeProgress| snapshots.lock().unwrap().push(progress.clone()))
    }

    pub fn snapshots(&self) -> Vec<ScrapeProgress> {
        self.snapshots.lock().unwrap().clone()
    }

    pub fn last(&self) -> ScrapeProgress {
        self.snapshots().last().cloned().expect("no progress reported")
    }
}

/// Page number from `pageNumber=N` or `page=N` in a URL.
pub fn page_number(url: &str) -> Option<u32> {
    let parsed = url::Url::parse(url).ok()?;
    parsed
        .query_pairs()
        .find(|(key, _)| key == "pageNumber" || key == "page")
        .and_then(|(_, value)| value.parse().ok())
}

pub fn transient(reason: &str) -> FetchedPage {
    FetchedPage::failed(FetchOutcome::TransientError { reason: reason.to_string() })
}

/// Amazon review page with one card per rating. Padded past the minimum
/// body size real pages always exceed.
pub fn amazon_reviews_html(page: u32, ratings: &[u8], has_next: bool) -> String {
    let mut html = String::from(
        r#"<html><body><div data-hook="cr-filter-info-review-rating-count">30 global ratings</div>"#,
    );
    for (i, rating) in ratings.iter().enumerate() {
        let id = format!("R{}-{}", page, i);
        let day = i % 28 + 1;
        html.push_str(&format!(
            r#"<div id="{id}" data-hook="review">
                <span class="a-profile-name">Reviewer {id}</span>
                <i data-hook="review-star-rating" class="a-icon a-icon-star a-star-{rating}"><span class="a-icon-alt">{rating}.0 out of 5 stars</span></i>
                <a data-hook="review-title"><span>{rating}.0 out of 5 stars</span><span>Title {id}</span></a>
                <span data-hook="review-date">Reviewed in the United States on March {day}, 2024</span>
                <span data-hook="avp-badge">Verified Purchase</span>
                <span data-hook="review-body"><span>Body of review {id}</span></span>
            </div>"#
        ));
    }
    if has_next {
        html.push_str(r#"<ul class="a-pagination"><li class="a-last"><a href="?pageNumber=2">Next page</a></li></ul>"#);
    } else {
        html.push_str(r#"<ul class="a-pagination"><li class="a-last a-disabled">Next page</li></ul>"#);
    }
    html.push_str(&format!("<!-- {} --></body></html>", "x".repeat(12_000)));
    html
}

pub fn amazon_product_html() -> String {
    format!(
        r#"<html><head><script type="application/ld+json">{{
            "@type": "Product", "name": "Echo Dot (5th Gen)",
            "image": "https://m.media-amazon.com/images/I/echo.jpg",
            "offers": {{"@type": "Offer", "price": "49.99", "priceCurrency": "USD"}},
            "aggregateRating": {{"ratingValue": "4.7", "reviewCount": "12345"}}
        }}</script></head><body><span id="productTitle">Echo Dot</span><!-- {} --></body></html>"#,
        "x".repeat(12_000)
    )
}

pub fn aliexpress_review(id: u64, stars: u8, images: &[&str]) -> serde_json::Value {
    serde_json::json!({
        "evaluationId": id,
        "buyerName": format!("B***{id}"),
        "buyerEval": u32::from(stars) * 20,
        "buyerFeedback": format!("Feedback {id}"),
        "evalDate": "05 Jan 2024",
        "images": images,
    })
}

pub fn aliexpress_api_json(reviews: Vec<serde_json::Value>, current_page: u32, total_pages: u32, total: u32) -> String {
    serde_json::json!({
        "data": {
            "productReviewList": reviews,
            "currentPage": current_page,
            "totalPage": total_pages,
            "totalNum": total,
        }
    })
    .to_string()
}
