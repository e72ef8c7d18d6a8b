//! Kernel session state machine.
//!
//! A [`Session`] owns at most one live kernel and the single reusable
//! notebook cell. Kernels start lazily: the session binds the default
//! language when it is created and only launches a process once the first
//! execution asks for one. Switching language tears the old kernel down
//! before the new one starts, so two kernels are never alive at once.
//!
//! Teardown is guaranteed. [`Session::shutdown`] is idempotent and the
//! session's `Drop` implementation calls it for any path that skipped the
//! explicit call.

use nbbridge_kernel::{
    ExecutionOutcome, KernelError, KernelLauncher, KernelRuntime, Language, Notebook,
};
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Tracing target for session lifecycle events.
pub(crate) const SESSION_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::session");

/// Errors surfaced by session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The kernel for the requested language could not be started.
    #[error("failed to start {language} kernel: {source}")]
    KernelStart {
        /// Language that was requested.
        language: Language,
        /// Failure reported by the launcher.
        #[source]
        source: KernelError,
    },
    /// The kernel could not be restarted.
    #[error("failed to restart {language} kernel: {source}")]
    KernelRestart {
        /// Language bound to the session.
        language: Language,
        /// Failure reported by the runtime.
        #[source]
        source: KernelError,
    },
    /// The kernel broke while executing a cell.
    #[error("{language} kernel failed during execution: {source}")]
    Kernel {
        /// Language of the broken kernel.
        language: Language,
        /// Failure reported by the runtime.
        #[source]
        source: KernelError,
    },
    /// Execution was requested without a live kernel.
    #[error("no {language} kernel is running")]
    NoKernel {
        /// Language bound to the session.
        language: Language,
    },
    /// The session has already been shut down.
    #[error("session has been shut down")]
    ShutDown,
}

/// Report of what [`Session::shutdown`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Teardown {
    /// No live kernel needed stopping.
    NoKernel,
    /// A live kernel was shut down.
    Stopped {
        /// Language of the stopped kernel.
        language: Language,
    },
    /// Shutdown had already run.
    AlreadyShutDown,
}

/// The bridge's only long-lived mutable state.
pub struct Session<L: KernelLauncher> {
    launcher: L,
    language: Language,
    runtime: Option<L::Runtime>,
    notebook: Notebook,
    shut_down: bool,
}

impl<L: KernelLauncher> Session<L> {
    /// Creates a session bound to the default language.
    #[must_use]
    pub fn new(launcher: L) -> Self {
        Self::with_language(launcher, Language::default())
    }

    /// Creates a session bound to `language` without starting a kernel.
    #[must_use]
    pub fn with_language(launcher: L, language: Language) -> Self {
        Self {
            launcher,
            language,
            runtime: None,
            notebook: Notebook::new(),
            shut_down: false,
        }
    }

    /// Language the session is bound to.
    #[must_use]
    pub const fn language(&self) -> Language {
        self.language
    }

    /// Language of the live kernel, if one is running.
    #[must_use]
    pub fn current_language(&self) -> Option<Language> {
        self.runtime.as_ref().map(KernelRuntime::language)
    }

    /// The notebook holding the most recent execution.
    #[must_use]
    pub const fn notebook(&self) -> &Notebook {
        &self.notebook
    }

    /// Returns `true` once [`Session::shutdown`] has run.
    #[must_use]
    pub const fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    /// Makes sure a live kernel for `language` is running.
    ///
    /// A live kernel already serving `language` is left untouched. Any other
    /// kernel is torn down first (best effort) and a new one is started.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::KernelStart`] when the new kernel fails to
    /// start. The session is then bound to `language` with no live kernel.
    pub fn ensure_language(&mut self, language: Language) -> Result<(), SessionError> {
        if self.shut_down {
            return Err(SessionError::ShutDown);
        }

        if language == self.language
            && let Some(runtime) = self.runtime.as_mut()
        {
            if runtime.is_alive() {
                return Ok(());
            }
            warn!(
                target: SESSION_TARGET,
                kernel = language.kernel_name(),
                "kernel is no longer alive; starting a fresh one"
            );
        }

        self.teardown_runtime();
        self.language = language;

        info!(
            target: SESSION_TARGET,
            kernel = language.kernel_name(),
            "starting kernel"
        );
        let runtime = self
            .launcher
            .start(language)
            .map_err(|source| SessionError::KernelStart { language, source })?;
        self.runtime = Some(runtime);
        Ok(())
    }

    /// Runs `source` as the notebook cell on the live kernel.
    ///
    /// The cell is reused: its outputs are replaced by this run's outputs.
    /// Code that raises is not an error here; the returned outcome carries
    /// the failure and the notebook keeps the partial outputs.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NoKernel`] when no kernel is live and
    /// [`SessionError::Kernel`] when the runtime itself breaks, in which case
    /// the broken kernel is released.
    pub fn execute(&mut self, source: &str) -> Result<ExecutionOutcome, SessionError> {
        if self.shut_down {
            return Err(SessionError::ShutDown);
        }
        let language = self.language;
        let Some(runtime) = self.runtime.as_mut() else {
            return Err(SessionError::NoKernel { language });
        };

        self.notebook.set_source(source);
        match runtime.execute(&mut self.notebook) {
            Ok(outcome) => Ok(outcome),
            Err(source) => {
                error!(
                    target: SESSION_TARGET,
                    kernel = language.kernel_name(),
                    error = %source,
                    "kernel failed during execution"
                );
                self.teardown_runtime();
                Err(SessionError::Kernel { language, source })
            }
        }
    }

    /// Restarts the live kernel, keeping its language and the last outputs.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::KernelRestart`] when no live kernel exists or
    /// the runtime fails to restart.
    pub fn restart(&mut self) -> Result<(), SessionError> {
        if self.shut_down {
            return Err(SessionError::ShutDown);
        }
        let language = self.language;
        let alive = self.runtime.as_mut().is_some_and(|runtime| runtime.is_alive());
        let runtime = match self.runtime.as_mut() {
            Some(runtime) if alive => runtime,
            _ => {
                return Err(SessionError::KernelRestart {
                    language,
                    source: KernelError::NotAlive { language },
                });
            }
        };

        info!(
            target: SESSION_TARGET,
            kernel = language.kernel_name(),
            "restarting kernel"
        );
        runtime
            .restart()
            .map_err(|source| SessionError::KernelRestart { language, source })
    }

    /// Tears the session down, stopping the kernel if it is alive.
    ///
    /// Only the first call does any work. Shutdown failures are logged and
    /// swallowed.
    pub fn shutdown(&mut self) -> Teardown {
        if self.shut_down {
            return Teardown::AlreadyShutDown;
        }
        self.shut_down = true;
        match self.teardown_runtime() {
            Some(language) => Teardown::Stopped { language },
            None => Teardown::NoKernel,
        }
    }

    /// Releases the current runtime, returning its language when a live
    /// kernel was shut down.
    fn teardown_runtime(&mut self) -> Option<Language> {
        let mut runtime = self.runtime.take()?;
        let language = runtime.language();
        if !runtime.is_alive() {
            debug!(
                target: SESSION_TARGET,
                kernel = language.kernel_name(),
                "releasing dead kernel"
            );
            return None;
        }

        info!(
            target: SESSION_TARGET,
            kernel = language.kernel_name(),
            "shutting down kernel"
        );
        if let Err(error) = runtime.shutdown() {
            error!(
                target: SESSION_TARGET,
                kernel = language.kernel_name(),
                %error,
                "kernel shutdown failed"
            );
        }
        Some(language)
    }
}

impl<L: KernelLauncher> Drop for Session<L> {
    fn drop(&mut self) {
        if !self.shut_down {
            self.shutdown();
        }
    }
}
