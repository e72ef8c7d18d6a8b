//! Command routing onto the kernel session.
//!
//! The dispatcher turns a decoded [`Command`] into session operations and a
//! response body. Code that raises inside the kernel is still rendered; only
//! kernel lifecycle failures come back as errors.

use nbbridge_kernel::{ExecutionOutcome, KernelLauncher, Language};
use tracing::{debug, error, info};

use crate::render::{CellRenderer, HtmlRenderer};
use crate::session::{Session, SessionError};

use super::request::Command;

/// Tracing target for dispatch operations.
pub(crate) const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");

/// Routes commands to the session and renders the results.
#[derive(Debug, Clone, Default)]
pub struct CommandDispatcher<R = HtmlRenderer> {
    renderer: R,
}

impl<R: CellRenderer> CommandDispatcher<R> {
    /// Creates a dispatcher rendering with `renderer`.
    pub const fn new(renderer: R) -> Self {
        Self { renderer }
    }

    /// Dispatches one command and returns the response body.
    ///
    /// # Errors
    ///
    /// Returns the session error when a kernel cannot be started, restarted
    /// or breaks during execution.
    pub fn dispatch<L: KernelLauncher>(
        &self,
        session: &mut Session<L>,
        command: &Command,
    ) -> Result<String, SessionError> {
        match command {
            Command::Execute { language, source } => self.execute(session, *language, source),
            Command::RestartKernel => {
                session.restart()?;
                Ok(String::new())
            }
            Command::Unknown { name } => {
                error!(target: DISPATCH_TARGET, command = %name, "unrecognised command");
                Ok(String::new())
            }
        }
    }

    fn execute<L: KernelLauncher>(
        &self,
        session: &mut Session<L>,
        language: Language,
        source: &str,
    ) -> Result<String, SessionError> {
        session.ensure_language(language)?;
        debug!(
            target: DISPATCH_TARGET,
            kernel = language.kernel_name(),
            bytes = source.len(),
            "executing cell"
        );
        if let ExecutionOutcome::CellFailed(failure) = session.execute(source)? {
            info!(
                target: DISPATCH_TARGET,
                ename = %failure.ename,
                evalue = %failure.evalue,
                "cell failed to execute"
            );
        }
        Ok(self.renderer.render(session.notebook()))
    }
}
