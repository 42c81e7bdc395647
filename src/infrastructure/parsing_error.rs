//! Parsing error types for review and product extraction
//!
//! Item-level failures never abort a scrape; they are logged and counted, so
//! each variant carries enough context to diagnose a markup change later.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParsingError {
    #[error("Structured payload from {source_hint} is malformed: {reason}")]
    MalformedPayload {
        reason: String,
        source_hint: String,
    },

    #[error("Review extraction failed at index {index}: {reason}")]
    ReviewExtractionFailed {
        index: usize,
        reason: String,
    },
}

impl ParsingError {
    pub fn malformed_payload(source_hint: &str, reason: impl ToString) -> Self {
        Self::MalformedPayload {
            reason: reason.to_string(),
            source_hint: source_hint.to_string(),
        }
    }

    pub fn review_extraction_failed(index: usize, reason: impl ToString) -> Self {
        Self::ReviewExtractionFailed {
            index,
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_carry_context() {
        let err = ParsingError::review_extraction_failed(3, "missing body");
        assert_eq!(err.to_string(), "Review extraction failed at index 3: missing body");

        let err = ParsingError::malformed_payload("feedback API", "expected value at line 1");
        assert_eq!(
            err.to_string(),
            "Structured payload from feedback API is malformed: expected value at line 1"
        );
    }
}
