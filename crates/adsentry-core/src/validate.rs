//! Input validation at the edge of the pipeline.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("text is empty")]
    EmptyText,
}

/// Reject empty or whitespace-only submissions before they reach the pipeline.
pub fn validate_text(text: &str) -> Result<&str, ValidationError> {
    if text.trim().is_empty() {
        return Err(ValidationError::EmptyText);
    }
    Ok(text)
}
