//! Product URL dispatch and metadata resolution through the registry.

mod common;

use common::{ScriptedFetcher, amazon_product_html, registry, transient};
use review_harvest_lib::SourceKind;
use review_harvest_lib::infrastructure::http_client::{FetchOutcome, FetchedPage};

#[tokio::test]
async fn amazon_product_is_read_from_json_ld() {
    let fetcher = ScriptedFetcher::new(|_, _| FetchedPage::success(amazon_product_html()));
    let registry = registry(&fetcher);

    let info = registry
        .parse_product_url("https://www.amazon.com/Echo-Dot-5th-Gen/dp/B09B8V1LZ3/ref=sr_1_1?keywords=echo")
        .await
        .unwrap();

    assert_eq!(info.source, SourceKind::Amazon);
    assert_eq!(info.product_id, "B09B8V1LZ3");
    assert_eq!(info.title, "Echo Dot (5th Gen)");
    assert_eq!(info.product_url, "https://www.amazon.com/dp/B09B8V1LZ3");
    assert_eq!(info.price, Some(49.99));
    assert_eq!(info.average_rating, Some(4.7));
    assert_eq!(info.total_reviews, Some(12345));
    assert_eq!(info.image_url.as_deref(), Some("https://m.media-amazon.com/images/I/echo.jpg"));
    assert_eq!(fetcher.requests(), vec!["https://www.amazon.com/dp/B09B8V1LZ3".to_string()]);
}

#[tokio::test]
async fn failed_product_fetch_still_identifies_the_product() {
    let fetcher = ScriptedFetcher::new(|_, _| FetchedPage::failed(FetchOutcome::Blocked { marker: "captcha".into() }));
    let registry = registry(&fetcher);

    let info = registry
        .parse_product_url("https://www.amazon.co.uk/gp/product/B000000001")
        .await
        .unwrap();

    assert_eq!(info.product_id, "B000000001");
    assert_eq!(info.product_url, "https://www.amazon.co.uk/dp/B000000001");
    assert_eq!(info.title, "Unknown Product");
    assert!(info.price.is_none());
    assert_eq!(fetcher.requests().len(), 3);
}

#[tokio::test]
async fn aliexpress_product_is_read_from_run_params() {
    let fetcher = ScriptedFetcher::new(|_, _| {
        FetchedPage::success(
            r#"<html><script>window.runParams = {"data": {
                "pageModule": {"title": "USB-C Cable 2m"},
                "priceModule": {"minAmount": {"value": 3.25, "currency": "USD"}},
                "titleModule": {"feedbackRating": {"averageStar": "4.8", "totalValidNum": 2210}},
                "imageModule": {"imagePathList": ["//ae01.alicdn.com/kf/cable.jpg"]}
            }};</script></html>"#,
        )
    });
    let registry = registry(&fetcher);

    let info = registry
        .parse_product_url("https://m.aliexpress.com/item/1005004567890123.html?spm=a2g0o")
        .await
        .unwrap();

    assert_eq!(info.source, SourceKind::AliExpress);
    assert_eq!(info.product_id, "1005004567890123");
    assert_eq!(info.product_url, "https://www.aliexpress.com/item/1005004567890123.html");
    assert_eq!(info.title, "USB-C Cable 2m");
    assert_eq!(info.price, Some(3.25));
    assert_eq!(info.average_rating, Some(4.8));
    assert_eq!(info.total_reviews, Some(2210));
    assert_eq!(info.image_url.as_deref(), Some("https://ae01.alicdn.com/kf/cable.jpg"));
}

#[tokio::test]
async fn supported_host_without_id_yields_none() {
    let fetcher = ScriptedFetcher::new(|_, _| transient("unused"));
    let registry = registry(&fetcher);

    assert!(registry.parse_product_url("https://www.amazon.com/gp/help/customer").await.is_none());
    assert!(registry.parse_product_url("https://www.aliexpress.com/category/100003109.html").await.is_none());
    assert!(fetcher.requests().is_empty());
}

#[tokio::test]
async fn unsupported_or_malformed_urls_yield_none() {
    let fetcher = ScriptedFetcher::new(|_, _| transient("unused"));
    let registry = registry(&fetcher);

    for url in ["https://www.ebay.com/itm/1234", "not a url", ""] {
        assert!(!registry.is_supported(url));
        assert!(registry.parse_product_url(url).await.is_none());
    }
    assert!(fetcher.requests().is_empty());
}
