//! Failures reported by kernel runtimes.

use std::io;

use thiserror::Error;

use crate::language::Language;

/// Errors raised by a kernel runtime or its launcher.
///
/// These describe the runtime itself misbehaving. Code that raises inside a
/// running kernel is not an error at this level; it is reported through
/// [`crate::ExecutionOutcome::CellFailed`].
#[derive(Debug, Error)]
pub enum KernelError {
    /// The kernel host process could not be spawned.
    #[error("failed to spawn kernel host '{program}': {source}")]
    Spawn {
        /// Program that was executed.
        program: String,
        /// Underlying spawn error.
        #[source]
        source: io::Error,
    },
    /// Reading from or writing to the kernel host failed.
    #[error("kernel host I/O failed: {source}")]
    Io {
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// The kernel host replied with something other than a protocol line.
    #[error("kernel host sent an invalid reply: {message}")]
    Protocol {
        /// Description of the malformed reply.
        message: String,
        /// Parse failure, when the reply was not valid JSON.
        #[source]
        source: Option<serde_json::Error>,
    },
    /// The kernel host reported a failure while handling a request.
    #[error("kernel host reported a failure: {message}")]
    Host {
        /// Message captured from the host.
        message: String,
    },
    /// The kernel host closed its output before answering.
    #[error("kernel host for {language} exited unexpectedly")]
    Exited {
        /// Language the host was serving.
        language: Language,
    },
    /// The operation needs a live kernel but the kernel is gone.
    #[error("{language} kernel is not alive")]
    NotAlive {
        /// Language of the dead kernel.
        language: Language,
    },
}

impl KernelError {
    /// Creates an I/O error.
    #[must_use]
    pub const fn io(source: io::Error) -> Self {
        Self::Io { source }
    }

    /// Creates a protocol error without an underlying parse failure.
    #[must_use]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a host failure.
    #[must_use]
    pub fn host(message: impl Into<String>) -> Self {
        Self::Host {
            message: message.into(),
        }
    }
}
