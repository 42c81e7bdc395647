//! HTTP fetch client for review scraping
//!
//! Issues exactly one request per call with a randomized browser identity,
//! optionally rewritten through an anti-bot relay, and classifies the result
//! so the pagination driver can decide between retrying and aborting. Retry
//! policy lives with the caller; this client holds no mutable state.

use async_trait::async_trait;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, AUTHORIZATION, REFERER, RETRY_AFTER, USER_AGENT};
use reqwest::{Client, ClientBuilder, StatusCode};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::infrastructure::config::{AppConfig, HttpConfig};
use crate::infrastructure::errors::ScrapeError;
use crate::infrastructure::relay::Relay;

const HTML_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";
const JSON_ACCEPT: &str = "application/json, text/plain, */*";

/// What kind of payload a request expects back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Html,
    Json,
}

/// One page request as the sources describe it
#[derive(Debug, Clone)]
pub struct PageRequest {
    pub url: String,
    pub kind: ContentKind,
    pub referer: Option<String>,
    /// Body substrings identifying a CAPTCHA or challenge page
    pub block_markers: &'static [&'static str],
    /// Route through the relay when one is configured
    pub use_relay: bool,
    /// Bodies shorter than this are soft failures
    pub min_body_bytes: usize,
}

impl PageRequest {
    pub fn html(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            kind: ContentKind::Html,
            referer: None,
            block_markers: &[],
            use_relay: false,
            min_body_bytes: 0,
        }
    }

    pub fn json(url: impl Into<String>) -> Self {
        Self {
            kind: ContentKind::Json,
            ..Self::html(url)
        }
    }

    pub fn with_referer(mut self, referer: impl Into<String>) -> Self {
        self.referer = Some(referer.into());
        self
    }

    pub fn with_block_markers(mut self, markers: &'static [&'static str]) -> Self {
        self.block_markers = markers;
        self
    }

    pub fn via_relay(mut self, use_relay: bool) -> Self {
        self.use_relay = use_relay;
        self
    }

    pub fn with_min_body_bytes(mut self, bytes: usize) -> Self {
        self.min_body_bytes = bytes;
        self
    }

    /// First block marker contained in `body`
    pub fn detect_block(&self, body: &str) -> Option<&'static str> {
        self.block_markers.iter().copied().find(|marker| body.contains(marker))
    }
}

/// Classification of a single fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Success,
    /// HTTP 429, optionally with the server's Retry-After hint
    RateLimited { retry_after: Option<Duration> },
    /// CAPTCHA or challenge page recognized by a body marker
    Blocked { marker: String },
    /// Timeouts, connection errors, unexpected statuses, truncated bodies
    TransientError { reason: String },
}

impl FetchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, FetchOutcome::Success)
    }

    pub fn describe(&self) -> String {
        match self {
            FetchOutcome::Success => "success".to_string(),
            FetchOutcome::RateLimited { .. } => "rate limited (HTTP 429)".to_string(),
            FetchOutcome::Blocked { marker } => format!("blocked by anti-bot challenge ({marker})"),
            FetchOutcome::TransientError { reason } => reason.clone(),
        }
    }
}

/// Body plus classification; the body is empty unless the fetch succeeded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    pub body: String,
    pub outcome: FetchOutcome,
}

impl FetchedPage {
    pub fn success(body: impl Into<String>) -> Self {
        Self { body: body.into(), outcome: FetchOutcome::Success }
    }

    pub fn failed(outcome: FetchOutcome) -> Self {
        Self { body: String::new(), outcome }
    }
}

/// Transport seam between sources and the network
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch_page(&self, request: &PageRequest) -> FetchedPage;
}

/// reqwest-backed fetcher
#[derive(Clone)]
pub struct FetchClient {
    client: Client,
    relay: Option<Relay>,
    user_agents: Vec<String>,
    accept_language: String,
    direct_timeout: Duration,
    relay_timeout: Duration,
}

impl FetchClient {
    pub fn from_config(config: &AppConfig) -> Result<Self, ScrapeError> {
        config.relay.validate()?;
        let relay = Relay::from_config(&config.relay)?;
        Self::with_relay(&config.http, relay, config.relay.timeout())
    }

    pub fn with_relay(http: &HttpConfig, relay: Option<Relay>, relay_timeout: Duration) -> Result<Self, ScrapeError> {
        if http.user_agents.iter().all(|ua| ua.trim().is_empty()) {
            return Err(ScrapeError::InvalidConfiguration {
                field: "http.user_agents".to_string(),
                message: "at least one user agent is required".to_string(),
            });
        }

        let client = ClientBuilder::new()
            .cookie_store(true)
            .gzip(true)
            .brotli(true)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;

        if let Some(relay) = &relay {
            info!("🛰️ Relay enabled via {}", relay.provider());
        }

        Ok(Self {
            client,
            relay,
            user_agents: http.user_agents.iter().filter(|ua| !ua.trim().is_empty()).cloned().collect(),
            accept_language: http.accept_language.clone(),
            direct_timeout: Duration::from_secs(http.timeout_seconds),
            relay_timeout,
        })
    }

    pub fn relay_enabled(&self) -> bool {
        self.relay.is_some()
    }

    fn pick_user_agent(&self) -> &str {
        &self.user_agents[fastrand::usize(..self.user_agents.len())]
    }

    fn build(&self, request: &PageRequest) -> Result<reqwest::RequestBuilder, ScrapeError> {
        let relay = self.relay.as_ref().filter(|_| request.use_relay);

        let mut builder = match relay {
            Some(relay) => {
                let rewritten = relay.rewrite(&request.url)?;
                debug!("Fetching via {} relay: {}", relay.provider(), request.url);
                let builder = self.client.get(&rewritten.url).timeout(self.relay_timeout);
                match rewritten.bearer_token {
                    Some(token) => builder.header(AUTHORIZATION, format!("Bearer {token}")),
                    None => builder,
                }
            }
            None => self.client.get(&request.url).timeout(self.direct_timeout),
        };

        // Forwarded by relays that keep caller headers
        let accept = match request.kind {
            ContentKind::Html => HTML_ACCEPT,
            ContentKind::Json => JSON_ACCEPT,
        };
        builder = builder
            .header(USER_AGENT, self.pick_user_agent())
            .header(ACCEPT, accept)
            .header(ACCEPT_LANGUAGE, &self.accept_language);
        if let Some(referer) = &request.referer {
            builder = builder.header(REFERER, referer);
        }
        Ok(builder)
    }
}

#[async_trait]
impl PageFetcher for FetchClient {
    async fn fetch_page(&self, request: &PageRequest) -> FetchedPage {
        let builder = match self.build(request) {
            Ok(builder) => builder,
            Err(e) => {
                return FetchedPage::failed(FetchOutcome::TransientError { reason: e.to_string() });
            }
        };

        info!("🌐 HTTP GET: {}", request.url);
        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => {
                let reason = if e.is_timeout() {
                    format!("request timed out: {}", request.url)
                } else {
                    format!("HTTP request failed: {e}")
                };
                warn!("⚠️ {}", reason);
                return FetchedPage::failed(FetchOutcome::TransientError { reason });
            }
        };

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            warn!("⏳ Rate limited on {}", request.url);
            return FetchedPage::failed(FetchOutcome::RateLimited { retry_after });
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                return FetchedPage::failed(FetchOutcome::TransientError {
                    reason: format!("Failed to read response body: {e}"),
                });
            }
        };

        classify(request, status, body)
    }
}

/// Turn a completed HTTP exchange into a `FetchedPage`.
///
/// Block markers are checked before the status so challenge pages served
/// with 403/503 are reported as blocks rather than generic errors.
pub fn classify(request: &PageRequest, status: StatusCode, body: String) -> FetchedPage {
    if let Some(marker) = request.detect_block(&body) {
        warn!("🚫 Anti-bot challenge detected on {} ({})", request.url, marker);
        return FetchedPage::failed(FetchOutcome::Blocked { marker: marker.to_string() });
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        return FetchedPage::failed(FetchOutcome::RateLimited { retry_after: None });
    }

    if !status.is_success() {
        return FetchedPage::failed(FetchOutcome::TransientError {
            reason: format!("HTTP error {}: {}", status, request.url),
        });
    }

    if body.trim().is_empty() {
        return FetchedPage::failed(FetchOutcome::TransientError {
            reason: format!("Empty response from {}", request.url),
        });
    }

    if body.len() < request.min_body_bytes {
        return FetchedPage::failed(FetchOutcome::TransientError {
            reason: format!(
                "Response too small from {} ({} bytes, expected at least {})",
                request.url,
                body.len(),
                request.min_body_bytes
            ),
        });
    }

    debug!("Fetched {} bytes from {}", body.len(), request.url);
    FetchedPage::success(body)
}
