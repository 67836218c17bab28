//! Error types for the mining pipeline

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type alias for mining operations
pub type Result<T> = std::result::Result<T, Error>;

/// How a failed model call should be treated by the retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallFailure {
    /// Network trouble, timeouts, 429 and 5xx responses
    Transient,
    /// Authentication, bad requests, unknown models
    Permanent,
}

/// Dataset miner errors
#[derive(Debug, Error)]
pub enum Error {
    /// Missing argument, missing API key, invalid setting
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// File extension with no extractor
    #[error("Unsupported file type: {0}")]
    UnsupportedFormat(String),

    /// Parse or decode failure for a supported file
    #[error("Failed to extract text from '{}': {message}", path.display())]
    Extraction { path: PathBuf, message: String },

    /// Completion request failed
    #[error("Model call failed ({kind:?}): {message}")]
    ModelCall { kind: CallFailure, message: String },

    /// Model output did not match the expected shape
    #[error("Could not parse model response: {0}")]
    ParseResponse(String),

    /// No price entry for a model
    #[error("No pricing found for model '{0}'")]
    PricingNotFound(String),

    /// Output file could not be prepared or written
    #[error("Cannot write output '{}': {message}", path.display())]
    Output { path: PathBuf, message: String },

    /// Run stopped by the user between units of work
    #[error("Interrupted")]
    Interrupted,

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Create an extraction error for a file
    pub fn extraction(path: impl AsRef<Path>, message: impl Into<String>) -> Self {
        Self::Extraction {
            path: path.as_ref().to_path_buf(),
            message: message.into(),
        }
    }

    /// Create a retryable model error
    pub fn transient(message: impl Into<String>) -> Self {
        Self::ModelCall {
            kind: CallFailure::Transient,
            message: message.into(),
        }
    }

    /// Create a non-retryable model error
    pub fn permanent(message: impl Into<String>) -> Self {
        Self::ModelCall {
            kind: CallFailure::Permanent,
            message: message.into(),
        }
    }

    /// Create an output error
    pub fn output(path: impl AsRef<Path>, message: impl Into<String>) -> Self {
        Self::Output {
            path: path.as_ref().to_path_buf(),
            message: message.into(),
        }
    }

    /// Whether the retry policy may try this call again
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ModelCall {
                kind: CallFailure::Transient,
                ..
            }
        )
    }

    /// Whether this error must stop the run
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_) | Self::Output { .. } | Self::Interrupted
        )
    }

    /// Process exit code for a fatal error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Interrupted => 130,
            Self::Configuration(_) => 2,
            _ => 1,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || err.is_request() {
            return Error::transient(err.to_string());
        }
        match err.status() {
            Some(status) if status.as_u16() == 429 || status.is_server_error() => {
                Error::transient(err.to_string())
            }
            _ => Error::permanent(err.to_string()),
        }
    }
}
