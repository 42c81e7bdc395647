//! Shared HTML and JSON parsing helpers used by every review source
//!
//! Sources own their selectors and field names; this module owns the
//! mechanics: fallback selector chains, JSON-LD discovery and value
//! normalization.

pub mod jsonld;
pub mod normalize;
pub mod selectors;

pub use selectors::{SelectorSet, element_text};

/// First run of digits and `.`/`,` separators, without trailing separators.
fn numeric_token(text: &str) -> Option<&str> {
    let start = text.find(|c: char| c.is_ascii_digit())?;
    let rest = &text[start..];
    let end = rest
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == ','))
        .unwrap_or(rest.len());
    Some(rest[..end].trim_end_matches(['.', ',']))
}

/// Read the first number from text in US (`1,299.99`) or European
/// (`1.299,99`) notation.
///
/// When both separators appear the last one is the decimal mark. A lone
/// separator followed by exactly three digits groups thousands.
pub fn leading_number(text: &str) -> Option<f64> {
    let token = numeric_token(text)?;
    let decimal = match (token.rfind('.'), token.rfind(',')) {
        (Some(dot), Some(comma)) => Some(dot.max(comma)),
        (Some(at), None) | (None, Some(at)) => {
            let separator = token.as_bytes()[at];
            let lone = token.bytes().filter(|b| *b == separator).count() == 1;
            (lone && token.len() - at - 1 != 3).then_some(at)
        }
        (None, None) => None,
    };
    let normalized: String = token
        .char_indices()
        .filter_map(|(at, ch)| match ch {
            '0'..='9' => Some(ch),
            _ if Some(at) == decimal => Some('.'),
            _ => None,
        })
        .collect();
    normalized.parse().ok()
}

/// Integer count from text such as `12,345 ratings` or `1.234 Sternebewertungen`.
pub fn leading_count(text: &str) -> Option<u32> {
    let digits: String = numeric_token(text)?.chars().filter(char::is_ascii_digit).collect();
    digits.parse().ok()
}

/// Star rating from text such as `4.6 out of 5` or `4,6 von 5 Sternen`.
pub fn leading_rating(text: &str) -> Option<f64> {
    leading_number(text).filter(|rating| (0.0..=5.0).contains(rating))
}

/// Collapse runs of whitespace and trim; `None` for blank input.
pub fn clean_text(text: &str) -> Option<String> {
    let cleaned = text.split_whitespace().collect::<Vec<_>>().join(" ");
    (!cleaned.is_empty()).then_some(cleaned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leading_number() {
        assert_eq!(leading_number("$1,299.99"), Some(1299.99));
        assert_eq!(leading_number("4.5 out of 5 stars"), Some(4.5));
        assert_eq!(leading_number("12,345 global ratings"), Some(12345.0));
        assert_eq!(leading_number("no digits"), None);
        assert_eq!(leading_number("Price: 19."), Some(19.0));
        assert_eq!(leading_number("49,99 €"), Some(49.99));
        assert_eq!(leading_number("1.299,00 €"), Some(1299.0));
        assert_eq!(leading_number("4,6 von 5 Sternen"), Some(4.6));
    }

    #[test]
    fn test_leading_count_ignores_both_separators() {
        assert_eq!(leading_count("12,345 global ratings"), Some(12345));
        assert_eq!(leading_count("1.234 Sternebewertungen"), Some(1234));
        assert_eq!(leading_count("88"), Some(88));
        assert_eq!(leading_count("keine"), None);
    }

    #[test]
    fn test_leading_rating_rejects_out_of_range() {
        assert_eq!(leading_rating("4,6 von 5 Sternen"), Some(4.6));
        assert_eq!(leading_rating("4.7 out of 5 stars"), Some(4.7));
        assert_eq!(leading_rating("46 Bewertungen"), None);
    }

    #[test]
    fn test_clean_text() {
        assert_eq!(clean_text("  Great \n\t product  ").as_deref(), Some("Great product"));
        assert_eq!(clean_text(" \n "), None);
    }
}
