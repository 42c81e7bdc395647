//! Extraction throughput for both marketplaces on synthetic pages
//!
//! Covers the structured strategy, the markup fallback and product metadata.

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use std::fmt::Write;

use review_harvest_lib::infrastructure::config::SourceSettings;
use review_harvest_lib::infrastructure::scrapers::ReviewSource;
use review_harvest_lib::infrastructure::scrapers::aliexpress::AliExpressSource;
use review_harvest_lib::infrastructure::scrapers::amazon::AmazonSource;
use review_harvest_lib::{ParsedProductInfo, SourceKind};

fn amazon_review_page(cards: usize) -> String {
    let mut html = String::from(r#"<html><body><div data-hook="cr-filter-info-review-rating-count">1,204 global ratings</div>"#);
    for i in 0..cards {
        let rating = i % 5 + 1;
        let _ = write!(
            html,
            r#"<div id="R{i}" data-hook="review">
                <span class="a-profile-name">Reviewer {i}</span>
                <i data-hook="review-star-rating" class="a-icon a-star-{rating}"><span class="a-icon-alt">{rating}.0 out of 5 stars</span></i>
                <a data-hook="review-title"><span>Works as described {i}</span></a>
                <span data-hook="review-date">Reviewed in the United States on January 5, 2024</span>
                <span data-hook="review-body"><span>{body}</span></span>
                <img data-hook="review-image-tile" src="https://m.media-amazon.com/images/I/img{i}._SY88_.jpg">
            </div>"#,
            body = "Solid build quality and quick delivery. ".repeat(8)
        );
    }
    html.push_str(r#"<ul class="a-pagination"><li class="a-last"><a href="?pageNumber=2">Next</a></li></ul></body></html>"#);
    html
}

fn aliexpress_api_page(items: usize) -> String {
    let reviews: Vec<serde_json::Value> = (0..items)
        .map(|i| {
            serde_json::json!({
                "evaluationId": 9_000_000 + i,
                "buyerName": "A***r",
                "buyerEval": 20 * (i % 5 + 1),
                "buyerFeedback": "Arrived quickly, matches the pictures.",
                "evalDate": "12 Feb 2024",
                "images": ["//ae01.alicdn.com/kf/S1.jpg_220x220.jpg_.webp"],
            })
        })
        .collect();
    serde_json::json!({
        "data": { "productReviewList": reviews, "currentPage": 1, "totalPage": 40, "totalNum": 400 }
    })
    .to_string()
}

fn amazon_product_page() -> String {
    r#"<html><head><script type="application/ld+json">{"@type": "Product", "name": "Bench Widget",
        "offers": {"price": "19.99"}, "aggregateRating": {"ratingValue": 4.4, "reviewCount": 812}}</script></head>
        <body><span id="productTitle">Bench Widget</span><img id="landingImage" src="https://m.media-amazon.com/images/I/w.jpg"></body></html>"#
        .to_string()
}

fn extraction_benchmarks(c: &mut Criterion) {
    let amazon = AmazonSource::new(SourceSettings::amazon()).expect("default amazon settings");
    let aliexpress = AliExpressSource::new(SourceSettings::aliexpress()).expect("default aliexpress settings");

    let review_page = amazon_review_page(10);
    let api_page = aliexpress_api_page(20);
    let product_page = amazon_product_page();

    c.bench_function("amazon markup review page (10 cards)", |b| {
        b.iter(|| black_box(amazon.extract_markup(black_box(&review_page))));
    });

    c.bench_function("aliexpress feedback api page (20 items)", |b| {
        b.iter(|| black_box(aliexpress.extract_structured(black_box(&api_page))));
    });

    c.bench_function("amazon product metadata", |b| {
        b.iter(|| {
            let info = ParsedProductInfo::identified(SourceKind::Amazon, "B000000001", "https://www.amazon.com/dp/B000000001");
            black_box(amazon.extract_product(black_box(&product_page), info))
        });
    });
}

criterion_group!(benches, extraction_benchmarks);
criterion_main!(benches);
