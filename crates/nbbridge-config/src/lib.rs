//! Shared configuration for the notebook kernel bridge.
//!
//! Configuration is resolved from command-line arguments with environment
//! variable fallbacks. The server is bound to a single editor document whose
//! identifier is the only positional argument; it appears in diagnostics and
//! has no effect on execution.
//!
//! | Flag | Environment | Default |
//! |------|-------------|---------|
//! | `--log-filter` | `NBBRIDGE_LOG_FILTER` | `info` |
//! | `--log-format` | `NBBRIDGE_LOG_FORMAT` | `json` |
//! | `--decode-policy` | `NBBRIDGE_DECODE_POLICY` | `skip` |
//! | `--python` | `NBBRIDGE_PYTHON` | `python3` |

mod decode;
mod defaults;
mod logging;

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use clap::Parser;
use thiserror::Error;

pub use decode::{DecodePolicy, DecodePolicyParseError};
pub use defaults::{
    DEFAULT_LOG_FILTER, DEFAULT_PYTHON, default_decode_policy, default_log_filter,
    default_log_format,
};
pub use logging::{LogFormat, LogFormatParseError};

/// Resolved configuration for one server process.
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(
    name = "nbbridge",
    version,
    about = "Line-delimited JSON bridge between an editor and a Jupyter kernel"
)]
pub struct Config {
    /// Identifier of the editor document served by this process.
    #[arg(value_name = "DOCUMENT_ID")]
    pub document_id: String,
    /// Tracing filter expression for the diagnostic stream.
    #[arg(long, env = "NBBRIDGE_LOG_FILTER", default_value = DEFAULT_LOG_FILTER)]
    pub log_filter: String,
    /// Output format for the diagnostic stream (`json` or `compact`).
    #[arg(long, env = "NBBRIDGE_LOG_FORMAT", default_value_t = LogFormat::Json)]
    pub log_format: LogFormat,
    /// Reaction to malformed request lines (`skip` or `strict`).
    #[arg(long, env = "NBBRIDGE_DECODE_POLICY", default_value_t = DecodePolicy::Skip)]
    pub decode_policy: DecodePolicy,
    /// Python interpreter used to host Jupyter kernels.
    #[arg(long, env = "NBBRIDGE_PYTHON", default_value = DEFAULT_PYTHON)]
    pub python: PathBuf,
}

/// Errors raised while resolving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Command-line parsing failed, or help/version output was requested.
    #[error(transparent)]
    Arguments(#[from] clap::Error),
}

impl Config {
    /// Builds a configuration with defaults for everything but the document.
    #[must_use]
    pub fn new(document_id: impl Into<String>) -> Self {
        Self {
            document_id: document_id.into(),
            log_filter: default_log_filter().to_owned(),
            log_format: default_log_format(),
            decode_policy: default_decode_policy(),
            python: PathBuf::from(DEFAULT_PYTHON),
        }
    }

    /// Loads configuration from the process arguments and environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Arguments`] when the arguments are invalid.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_iter(std::env::args_os())
    }

    /// Loads configuration from an explicit argument list.
    ///
    /// The first item is treated as the binary name.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Arguments`] when the arguments are invalid.
    pub fn load_from_iter<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        Ok(Self::try_parse_from(args)?)
    }

    /// Identifier of the document served by this process.
    #[must_use]
    pub fn document_id(&self) -> &str {
        self.document_id.as_str()
    }

    /// Tracing filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        self.log_filter.as_str()
    }

    /// Diagnostic output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Handling of malformed request lines.
    #[must_use]
    pub const fn decode_policy(&self) -> DecodePolicy {
        self.decode_policy
    }

    /// Interpreter used to host kernels.
    #[must_use]
    pub fn python(&self) -> &Path {
        self.python.as_path()
    }
}
