//! Error types for the redaction engine.

use thiserror::Error;

/// Result type for redaction operations.
pub type Result<T> = std::result::Result<T, RedactionError>;

/// Errors raised while building a redactor.
///
/// Redacting an event never fails; these only surface from setup.
#[derive(Error, Debug)]
pub enum RedactionError {
    /// A sensitive pattern did not compile.
    #[error("pattern error in {pattern:?}: {message}")]
    PatternError { pattern: String, message: String },

    /// A pattern compiled but has a capture layout the engine cannot mask.
    #[error("pattern {pattern:?} has {groups} capture groups; expected 1 or 3")]
    GroupCount { pattern: String, groups: usize },

    /// A masking rule string is malformed or out of range.
    #[error("invalid masking rule {0:?}")]
    RuleError(String),

    /// Failed to load or parse the redaction policy.
    #[error("policy error: {0}")]
    PolicyError(String),

    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("json error: {0}")]
    JsonError(#[from] serde_json::Error),
}
