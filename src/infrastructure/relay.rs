//! Anti-bot relay request construction
//!
//! Each provider exposes the same idea (fetch this URL for me) behind a
//! different query shape. The target URL is always percent-encoded by
//! `Url::parse_with_params`.

use std::fmt;
use std::str::FromStr;
use url::Url;

use crate::infrastructure::config::RelayConfig;
use crate::infrastructure::errors::ScrapeError;

const SCRAPERAPI_ENDPOINT: &str = "http://api.scraperapi.com/";
const ZYTE_ENDPOINT: &str = "https://api.zyte.com/v1/extract";
const BRIGHTDATA_ENDPOINT: &str = "https://api.brightdata.com/request";
const BRIGHTDATA_ZONE: &str = "web_unlocker";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayProvider {
    /// Generic relay: key and flags in the query string
    ScraperApi,
    /// Extract-style API
    Zyte,
    /// Proxy-zone API; the key travels as a bearer token
    BrightData,
}

impl FromStr for RelayProvider {
    type Err = ScrapeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "scraperapi" => Ok(Self::ScraperApi),
            "zyte" => Ok(Self::Zyte),
            "brightdata" => Ok(Self::BrightData),
            _ => Err(ScrapeError::UnknownRelayProvider(s.to_string())),
        }
    }
}

impl fmt::Display for RelayProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ScraperApi => "scraperapi",
            Self::Zyte => "zyte",
            Self::BrightData => "brightdata",
        })
    }
}

/// A rewritten request: where to send it and an optional bearer credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayRequest {
    pub url: String,
    pub bearer_token: Option<String>,
}

/// Validated relay settings, read-only after construction.
#[derive(Debug, Clone)]
pub struct Relay {
    provider: RelayProvider,
    api_key: String,
    render_js: bool,
    country_code: Option<String>,
    premium_proxy: bool,
}

impl Relay {
    /// Returns `None` when the relay is disabled or has no key.
    pub fn from_config(config: &RelayConfig) -> Result<Option<Self>, ScrapeError> {
        if !config.is_active() {
            return Ok(None);
        }
        let provider = config.provider.parse()?;
        Ok(Some(Self {
            provider,
            api_key: config.api_key.clone().unwrap_or_default().trim().to_string(),
            render_js: config.render_js,
            country_code: config.country_code.clone().filter(|c| !c.trim().is_empty()),
            premium_proxy: config.premium_proxy,
        }))
    }

    pub fn provider(&self) -> RelayProvider {
        self.provider
    }

    /// Rewrite `target` into the provider-specific request.
    pub fn rewrite(&self, target: &str) -> Result<RelayRequest, ScrapeError> {
        let (endpoint, params, bearer) = match self.provider {
            RelayProvider::ScraperApi => {
                let mut params = vec![
                    ("api_key", self.api_key.clone()),
                    ("url", target.to_string()),
                    ("keep_headers", "true".to_string()),
                ];
                if self.render_js {
                    params.push(("render", "true".to_string()));
                }
                if let Some(country) = &self.country_code {
                    params.push(("country_code", country.clone()));
                }
                if self.premium_proxy {
                    params.push(("premium", "true".to_string()));
                }
                (SCRAPERAPI_ENDPOINT, params, None)
            }
            RelayProvider::Zyte => (
                ZYTE_ENDPOINT,
                vec![
                    ("apikey", self.api_key.clone()),
                    ("url", target.to_string()),
                    ("render_js", self.render_js.to_string()),
                ],
                None,
            ),
            RelayProvider::BrightData => (
                BRIGHTDATA_ENDPOINT,
                vec![
                    ("url", target.to_string()),
                    ("zone", BRIGHTDATA_ZONE.to_string()),
                ],
                Some(self.api_key.clone()),
            ),
        };

        let url = Url::parse_with_params(endpoint, &params).map_err(|e| ScrapeError::InvalidUrl {
            url: endpoint.to_string(),
            reason: e.to_string(),
        })?;

        Ok(RelayRequest {
            url: url.to_string(),
            bearer_token: bearer,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(provider: &str) -> RelayConfig {
        RelayConfig {
            enabled: true,
            provider: provider.to_string(),
            api_key: Some("KEY".to_string()),
            render_js: true,
            country_code: Some("de".to_string()),
            premium_proxy: true,
            timeout_seconds: 60,
        }
    }

    const TARGET: &str = "https://www.amazon.com/product-reviews/B0ABCDEFGH?pageNumber=2&sortBy=recent";

    #[test]
    fn test_disabled_relay_is_none() {
        let mut cfg = config("scraperapi");
        cfg.enabled = false;
        assert!(Relay::from_config(&cfg).unwrap().is_none());

        let mut cfg = config("scraperapi");
        cfg.api_key = Some("  ".into());
        assert!(Relay::from_config(&cfg).unwrap().is_none());
    }

    #[test]
    fn test_scraperapi_request_shape() {
        let relay = Relay::from_config(&config("ScraperAPI")).unwrap().unwrap();
        let request = relay.rewrite(TARGET).unwrap();
        assert!(request.bearer_token.is_none());

        let url = Url::parse(&request.url).unwrap();
        assert_eq!(url.host_str(), Some("api.scraperapi.com"));
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs[0], ("api_key".into(), "KEY".into()));
        assert_eq!(pairs[1], ("url".into(), TARGET.into()));
        assert!(pairs.contains(&("render".into(), "true".into())));
        assert!(pairs.contains(&("country_code".into(), "de".into())));
        assert!(pairs.contains(&("premium".into(), "true".into())));
        // the embedded target's own query must not leak into the relay query
        assert!(!pairs.iter().any(|(k, _)| k == "pageNumber"));
    }

    #[test]
    fn test_zyte_request_shape() {
        let mut cfg = config("zyte");
        cfg.render_js = false;
        let request = Relay::from_config(&cfg).unwrap().unwrap().rewrite(TARGET).unwrap();
        let url = Url::parse(&request.url).unwrap();
        assert_eq!(url.path(), "/v1/extract");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("apikey".into(), "KEY".into())));
        assert!(pairs.contains(&("render_js".into(), "false".into())));
    }

    #[test]
    fn test_brightdata_uses_bearer_token() {
        let request = Relay::from_config(&config("brightdata")).unwrap().unwrap().rewrite(TARGET).unwrap();
        assert_eq!(request.bearer_token.as_deref(), Some("KEY"));
        assert!(request.url.contains("zone=web_unlocker"));
        assert!(!request.url.contains("KEY"));
    }

    #[test]
    fn test_unknown_provider_is_configuration_error() {
        assert!(matches!(
            Relay::from_config(&config("oxylabs")),
            Err(ScrapeError::UnknownRelayProvider(_))
        ));
    }
}
