//! Capability traits for kernel runtimes.
//!
//! The session layer only ever talks to a kernel through these traits, which
//! keeps it independent of how the kernel process is hosted and lets tests
//! substitute instrumented doubles.

use crate::error::KernelError;
use crate::language::Language;
use crate::notebook::Notebook;

/// Details of code that raised inside the kernel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellFailure {
    /// Exception type name.
    pub ename: String,
    /// Exception message.
    pub evalue: String,
}

/// Result of running the notebook cell on a healthy kernel.
///
/// Both variants leave the notebook holding whatever outputs the kernel
/// produced; a failed cell still carries its partial output and error record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// The cell ran to completion.
    Completed,
    /// The cell raised during execution.
    CellFailed(CellFailure),
}

impl ExecutionOutcome {
    /// Builds a failed outcome.
    #[must_use]
    pub fn failed(ename: impl Into<String>, evalue: impl Into<String>) -> Self {
        Self::CellFailed(CellFailure {
            ename: ename.into(),
            evalue: evalue.into(),
        })
    }

    /// Returns the failure details, if the cell raised.
    #[must_use]
    pub const fn failure(&self) -> Option<&CellFailure> {
        match self {
            Self::Completed => None,
            Self::CellFailed(failure) => Some(failure),
        }
    }
}

/// A running kernel bound to one language.
pub trait KernelRuntime {
    /// Language the kernel was started with.
    fn language(&self) -> Language;

    /// Executes the notebook's cell, replacing its outputs.
    ///
    /// # Errors
    ///
    /// Returns an error when the runtime itself fails. Code raising inside
    /// the kernel is reported as [`ExecutionOutcome::CellFailed`] instead.
    fn execute(&mut self, notebook: &mut Notebook) -> Result<ExecutionOutcome, KernelError>;

    /// Restarts the kernel in place, keeping its language.
    ///
    /// # Errors
    ///
    /// Returns an error when the kernel cannot be restarted.
    fn restart(&mut self) -> Result<(), KernelError>;

    /// Shuts the kernel down and releases its process.
    ///
    /// # Errors
    ///
    /// Returns an error when the shutdown handshake fails. The process is
    /// released regardless.
    fn shutdown(&mut self) -> Result<(), KernelError>;

    /// Reports whether the kernel is still running.
    fn is_alive(&mut self) -> bool;
}

/// Starts kernel runtimes on demand.
pub trait KernelLauncher {
    /// Runtime type produced by this launcher.
    type Runtime: KernelRuntime;

    /// Starts a kernel for `language` and waits until it is ready.
    ///
    /// # Errors
    ///
    /// Returns an error when the kernel cannot be started.
    fn start(&self, language: Language) -> Result<Self::Runtime, KernelError>;
}
