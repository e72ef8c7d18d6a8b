//! Diagnostic logging for the bridge.
//!
//! Logs go to stderr; stdout carries nothing but response lines. The
//! subscriber is installed once per process, and the handle remembers the
//! format it was installed with so later callers can tell when their own
//! settings were ignored.

use std::io::{self, IsTerminal};

use once_cell::sync::OnceCell;
use tracing::{Subscriber, subscriber::SetGlobalDefaultError};
use tracing_subscriber::filter::{EnvFilter, ParseError};
use tracing_subscriber::fmt::{self, MakeWriter};

use nbbridge_config::LogFormat;

static INSTALLED: OnceCell<TelemetryHandle> = OnceCell::new();

/// Handle to the installed subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TelemetryHandle {
    format: LogFormat,
}

impl TelemetryHandle {
    /// Output format of the installed subscriber.
    #[must_use]
    pub const fn format(&self) -> LogFormat {
        self.format
    }
}

/// Errors encountered while configuring telemetry.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// The log filter expression does not parse.
    #[error("invalid log filter `{filter}`: {source}")]
    Filter {
        /// Filter expression as configured.
        filter: String,
        /// Parser diagnostic.
        #[source]
        source: ParseError,
    },
    /// Another global subscriber is already installed.
    #[error("failed to install telemetry subscriber: {source}")]
    Subscriber {
        /// Failure reported by `tracing`.
        #[source]
        source: SetGlobalDefaultError,
    },
}

/// Installs the stderr subscriber for `filter` and `format`.
///
/// Only the first successful call installs anything. Later calls return the
/// handle of the subscriber already in place, whatever they ask for.
///
/// # Errors
///
/// Returns [`TelemetryError`] when the filter expression is invalid or a
/// subscriber from elsewhere already owns the global default.
pub fn initialise(filter: &str, format: LogFormat) -> Result<TelemetryHandle, TelemetryError> {
    INSTALLED
        .get_or_try_init(|| {
            let ansi = format == LogFormat::Compact && io::stderr().is_terminal();
            let subscriber = build_subscriber(filter, format, io::stderr, ansi)?;
            tracing::subscriber::set_global_default(subscriber)
                .map_err(|source| TelemetryError::Subscriber { source })?;
            Ok(TelemetryHandle { format })
        })
        .copied()
}

/// Parses a filter directive string such as `nbbridge=debug,warn`.
pub(crate) fn parse_filter(filter: &str) -> Result<EnvFilter, TelemetryError> {
    EnvFilter::try_new(filter).map_err(|source| TelemetryError::Filter {
        filter: filter.to_owned(),
        source,
    })
}

/// Builds a subscriber writing `format` records to `writer`.
fn build_subscriber<W>(
    filter: &str,
    format: LogFormat,
    writer: W,
    ansi: bool,
) -> Result<Box<dyn Subscriber + Send + Sync>, TelemetryError>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let builder = fmt::Subscriber::builder()
        .with_env_filter(parse_filter(filter)?)
        .with_target(true)
        .with_thread_names(false)
        .with_writer(writer)
        .with_ansi(ansi)
        .with_timer(fmt::time::UtcTime::rfc_3339());

    Ok(match format {
        LogFormat::Json => Box::new(builder.json().flatten_event(true).finish()),
        LogFormat::Compact => Box::new(builder.compact().finish()),
    })
}
