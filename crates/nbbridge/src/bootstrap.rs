//! Process bootstrap: telemetry, session construction and the serve loop.

use std::io::{self, BufRead, Write};

use thiserror::Error;
use tracing::{debug, info};

use nbbridge_config::Config;
use nbbridge_kernel::{JupyterLauncher, KernelLauncher};

use crate::server::{LoopExit, LoopOutcome, ProtocolLoop, ServerError};
use crate::session::Session;
use crate::telemetry::{self, TelemetryError};

const BOOTSTRAP_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::bootstrap");

/// Errors surfaced while running the bridge.
#[derive(Debug, Error)]
pub enum RunError {
    /// Telemetry initialisation failed.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        /// Underlying telemetry error.
        #[source]
        source: TelemetryError,
    },
    /// The protocol loop stopped on a stream failure.
    #[error("protocol loop failed: {source}")]
    Server {
        /// Underlying stream failure.
        #[source]
        source: ServerError,
    },
}

impl RunError {
    /// Returns the process exit status for this error.
    ///
    /// Stream failures return status 1. Startup failures return status 2.
    #[must_use]
    pub const fn exit_status(&self) -> u8 {
        match self {
            Self::Server { .. } => 1,
            Self::Telemetry { .. } => 2,
        }
    }
}

/// Returns the process exit status for a completed run.
#[must_use]
pub const fn outcome_status(outcome: &LoopOutcome) -> u8 {
    match outcome.exit {
        LoopExit::EndOfInput => 0,
        LoopExit::Aborted => 1,
    }
}

/// Serves stdin/stdout with Jupyter kernels until input ends.
///
/// # Errors
///
/// Returns [`RunError`] when telemetry cannot be installed or a stream
/// fails.
pub fn run(config: &Config) -> Result<LoopOutcome, RunError> {
    let handle = telemetry::initialise(config.log_filter(), config.log_format())
        .map_err(|source| RunError::Telemetry { source })?;
    debug!(
        target: BOOTSTRAP_TARGET,
        log_format = %handle.format(),
        log_filter = config.log_filter(),
        "telemetry ready"
    );
    let launcher = JupyterLauncher::new(config.python());
    let stdin = io::stdin();
    let stdout = io::stdout();
    serve(config, launcher, stdin.lock(), stdout.lock())
}

/// Serves `input`/`output` with kernels from `launcher`.
///
/// The session is torn down before this returns, whatever the outcome.
///
/// # Errors
///
/// Returns [`RunError::Server`] when reading or writing fails.
pub fn serve<L, I, O>(
    config: &Config,
    launcher: L,
    input: I,
    output: O,
) -> Result<LoopOutcome, RunError>
where
    L: KernelLauncher,
    I: BufRead,
    O: Write,
{
    info!(
        target: BOOTSTRAP_TARGET,
        document = config.document_id(),
        "started server for document"
    );

    let mut session = Session::new(launcher);
    let result = ProtocolLoop::new(config.decode_policy()).run(&mut session, input, output);

    match &result {
        Ok(outcome) => info!(
            target: BOOTSTRAP_TARGET,
            document = config.document_id(),
            requests = outcome.requests,
            exit = ?outcome.exit,
            "exiting"
        ),
        Err(error) => info!(
            target: BOOTSTRAP_TARGET,
            document = config.document_id(),
            %error,
            "exiting after stream failure"
        ),
    }
    result.map_err(|source| RunError::Server { source })
}
