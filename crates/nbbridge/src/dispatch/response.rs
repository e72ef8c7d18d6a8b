//! Response serialization for the protocol loop.
//!
//! Every request produces exactly one response line. Successful responses
//! carry the body produced by the dispatcher; failures carry an empty body
//! plus a machine-readable error kind so the editor can tell them apart.

use std::io::{self, Write};

use serde::Serialize;
use serde_json::Value;

use crate::session::SessionError;

use super::errors::DecodeError;

/// Outcome marker carried by every response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    /// The request was handled.
    Ok,
    /// The request failed; see the error detail.
    Error,
}

/// Category of a failed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The request line could not be decoded.
    Decode,
    /// The kernel for the requested language failed to start.
    KernelStart,
    /// The kernel could not be restarted.
    KernelRestart,
    /// The kernel broke while running the cell.
    Kernel,
}

/// Error detail attached to failed responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorDetail {
    /// Failure category.
    pub kind: ErrorKind,
    /// Human-readable description.
    pub message: String,
}

/// One response line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
    /// Identifier copied from the request.
    pub id: Value,
    /// Rendered markup, or `""`.
    pub body: String,
    /// Whether the request succeeded.
    pub status: ResponseStatus,
    /// Failure detail for error responses.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
}

impl Response {
    /// Creates a successful response.
    pub fn ok(id: Value, body: impl Into<String>) -> Self {
        Self {
            id,
            body: body.into(),
            status: ResponseStatus::Ok,
            error: None,
        }
    }

    /// Creates an error response with an empty body.
    pub fn error(id: Value, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            id,
            body: String::new(),
            status: ResponseStatus::Error,
            error: Some(ErrorDetail {
                kind,
                message: message.into(),
            }),
        }
    }

    /// Builds the response for a dispatch result.
    pub fn from_result(id: Value, result: Result<String, SessionError>) -> Self {
        match result {
            Ok(body) => Self::ok(id, body),
            Err(error) => Self::error(id, ErrorKind::from(&error), error.to_string()),
        }
    }

    /// Builds the response for a request that failed to decode.
    pub fn decode_error(id: Value, error: &DecodeError) -> Self {
        Self::error(id, ErrorKind::Decode, error.to_string())
    }
}

impl From<&SessionError> for ErrorKind {
    fn from(error: &SessionError) -> Self {
        match error {
            SessionError::KernelStart { .. } => Self::KernelStart,
            SessionError::KernelRestart { .. } => Self::KernelRestart,
            SessionError::Kernel { .. } | SessionError::NoKernel { .. } | SessionError::ShutDown => {
                Self::Kernel
            }
        }
    }
}

/// Errors raised while writing a response line.
#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    /// Response serialization failed.
    #[error("failed to serialize response: {0}")]
    Serialize(#[from] serde_json::Error),
    /// Writing or flushing the output stream failed.
    #[error("failed to write response: {0}")]
    Io(#[from] io::Error),
}

/// Writer that frames responses as JSONL and flushes each line.
pub struct ResponseWriter<W> {
    writer: W,
}

impl<W: Write> ResponseWriter<W> {
    /// Creates a new response writer wrapping the given output stream.
    pub const fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Writes a response as one line and flushes the stream.
    ///
    /// Returns the encoded line (without the delimiter) for logging.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization, writing or flushing fails.
    pub fn write_response(&mut self, response: &Response) -> Result<String, WriteError> {
        let line = serde_json::to_string(response)?;
        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(line)
    }
}
