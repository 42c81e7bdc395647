//! Compiled CSS selector fallback chains

#![allow(clippy::uninlined_format_args)]

use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use crate::infrastructure::errors::ScrapeError;

/// Ordered list of selectors tried until one matches.
///
/// Markup changes on marketplaces are usually partial, so each field keeps
/// its historical selectors as fallbacks.
#[derive(Debug, Clone)]
pub struct SelectorSet {
    selectors: Vec<Selector>,
}

impl SelectorSet {
    /// Compile every selector; any invalid entry is an error.
    pub fn compile(selector_strings: &[&str]) -> Result<Self, ScrapeError> {
        let mut selectors = Vec::with_capacity(selector_strings.len());
        for selector_str in selector_strings {
            let selector = Selector::parse(selector_str).map_err(|e| ScrapeError::InvalidSelector {
                selector: selector_str.to_string(),
                reason: e.to_string(),
            })?;
            selectors.push(selector);
        }
        if selectors.is_empty() {
            return Err(ScrapeError::InvalidSelector {
                selector: String::new(),
                reason: "empty selector list".to_string(),
            });
        }
        Ok(Self { selectors })
    }

    /// Elements of the first selector that matches anything under `scope`.
    pub fn select_all<'a>(&self, scope: ElementRef<'a>) -> Vec<ElementRef<'a>> {
        for (i, selector) in self.selectors.iter().enumerate() {
            let found: Vec<ElementRef<'a>> = scope.select(selector).collect();
            if !found.is_empty() {
                if i > 0 {
                    debug!("Matched {} elements using fallback selector #{}", found.len(), i);
                }
                return found;
            }
        }
        Vec::new()
    }

    /// Elements matched by any selector, in selector order, without duplicates.
    pub fn select_union<'a>(&self, scope: ElementRef<'a>) -> Vec<ElementRef<'a>> {
        let mut found: Vec<ElementRef<'a>> = Vec::new();
        for selector in &self.selectors {
            for element in scope.select(selector) {
                if !found.iter().any(|e| e.id() == element.id()) {
                    found.push(element);
                }
            }
        }
        found
    }

    pub fn first<'a>(&self, scope: ElementRef<'a>) -> Option<ElementRef<'a>> {
        self.selectors.iter().find_map(|selector| scope.select(selector).next())
    }

    pub fn exists(&self, scope: ElementRef<'_>) -> bool {
        self.first(scope).is_some()
    }

    /// First non-blank text content across the chain.
    pub fn text(&self, scope: ElementRef<'_>) -> Option<String> {
        self.selectors
            .iter()
            .flat_map(|selector| scope.select(selector))
            .find_map(element_text)
    }

    /// First non-blank attribute value across the chain.
    pub fn attr(&self, scope: ElementRef<'_>, attribute: &str) -> Option<String> {
        self.selectors
            .iter()
            .flat_map(|selector| scope.select(selector))
            .filter_map(|element| element.value().attr(attribute))
            .map(str::trim)
            .find(|value| !value.is_empty())
            .map(str::to_string)
    }

    pub fn text_in(&self, document: &Html) -> Option<String> {
        self.text(document.root_element())
    }

    pub fn attr_in(&self, document: &Html, attribute: &str) -> Option<String> {
        self.attr(document.root_element(), attribute)
    }
}

/// Whitespace-normalized text of an element, `None` when blank.
pub fn element_text(element: ElementRef<'_>) -> Option<String> {
    super::clean_text(&element.text().collect::<String>())
}
