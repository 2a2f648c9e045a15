//! Validation of incoming synthesis requests.

use thiserror::Error;

use crate::text_prep::prepare_text;

/// Why a request was rejected before reaching the engine.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("missing 'text' query parameter")]
    MissingText,
    #[error("'text' must contain something to say")]
    EmptyText,
    #[error("'text' is {len} characters long; the limit is {max}")]
    TextTooLong { len: usize, max: usize },
}

/// Text that passed validation: prepared, non-empty and within limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesisText(String);

impl SynthesisText {
    /// Validate already percent-decoded `text`.
    pub fn parse(raw: Option<&str>, max_len: usize) -> Result<Self, RequestError> {
        let raw = raw.ok_or(RequestError::MissingText)?;
        let prepared = prepare_text(raw);

        if prepared.is_empty() || !prepared.chars().any(char::is_alphanumeric) {
            return Err(RequestError::EmptyText);
        }

        let len = prepared.chars().count();
        if len > max_len {
            return Err(RequestError::TextTooLong { len, max: max_len });
        }

        Ok(Self(prepared))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}
