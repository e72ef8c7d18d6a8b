//! Error types for request decoding failures.
//!
//! Decoding runs in two stages: the envelope (`id` and `body`) and then the
//! command inside the body. Failures in the second stage keep the request id
//! so the loop can still answer the caller.

use serde_json::Value;
use thiserror::Error;

/// Errors surfaced while decoding a request line.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Line could not be parsed as a request envelope.
    #[error("malformed request: {message}")]
    Malformed {
        /// Description of the failure.
        message: String,
        /// Parse failure reported by `serde_json`.
        #[source]
        source: Option<serde_json::Error>,
    },

    /// Envelope decoded but the body is not a valid command.
    #[error("invalid command: {message}")]
    InvalidCommand {
        /// Identifier of the offending request.
        id: Value,
        /// Description of the failure.
        message: String,
    },

    /// The `lang` field names a language without a known kernel.
    #[error("unsupported kernel language: {language}")]
    UnsupportedLanguage {
        /// Identifier of the offending request.
        id: Value,
        /// Language identifier as sent.
        language: String,
    },

    /// Request exceeds the maximum allowed size.
    #[error("request too large: {size} bytes exceeds {max_size} byte limit")]
    TooLarge {
        /// Bytes read before giving up.
        size: usize,
        /// Configured limit.
        max_size: usize,
    },
}

impl DecodeError {
    /// Creates a malformed request error from a serde error.
    pub fn from_json_error(source: serde_json::Error) -> Self {
        Self::Malformed {
            message: source.to_string(),
            source: Some(source),
        }
    }

    /// Creates a malformed request error with a custom message.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
            source: None,
        }
    }

    /// Creates an invalid command error for request `id`.
    pub fn invalid_command(id: Value, message: impl Into<String>) -> Self {
        Self::InvalidCommand {
            id,
            message: message.into(),
        }
    }

    /// Creates a request too large error.
    pub const fn too_large(size: usize, max_size: usize) -> Self {
        Self::TooLarge { size, max_size }
    }

    /// Returns the request id when decoding got far enough to recover it.
    pub const fn request_id(&self) -> Option<&Value> {
        match self {
            Self::InvalidCommand { id, .. } | Self::UnsupportedLanguage { id, .. } => Some(id),
            Self::Malformed { .. } | Self::TooLarge { .. } => None,
        }
    }
}
