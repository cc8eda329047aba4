//! Errors from writer construction and delivery.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for writer operations.
pub type Result<T> = std::result::Result<T, WriterError>;

/// Errors from writer operations.
#[derive(Error, Debug)]
pub enum WriterError {
    #[error("unsupported writer scheme: {0}")]
    UnknownScheme(String),

    #[error("invalid destination {destination:?}: {message}")]
    InvalidDestination {
        destination: String,
        message: String,
    },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("bulk request failed: {0}")]
    Transport(String),

    #[error("bulk endpoint returned status {0}")]
    Status(u16),

    #[error("bulk endpoint rejected batch: {0}")]
    Rejected(String),

    #[error("failed to spawn delivery thread: {0}")]
    Spawn(#[source] std::io::Error),
}

impl WriterError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        WriterError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn invalid(destination: &str, message: impl Into<String>) -> Self {
        WriterError::InvalidDestination {
            destination: destination.to_string(),
            message: message.into(),
        }
    }
}
