//! Kernel runtimes and the notebook document they execute.
//!
//! The crate defines the capability boundary between the bridge's session
//! state machine and an interactive code-execution kernel:
//!
//! - [`Language`] is the closed set of kernels the bridge can start.
//! - [`Notebook`] is the single-cell document whose outputs a run replaces.
//! - [`KernelLauncher`] and [`KernelRuntime`] describe starting, executing,
//!   restarting and stopping a kernel.
//! - [`JupyterLauncher`] implements those traits by hosting a
//!   `jupyter_client` kernel manager in a Python helper process.

mod error;
pub mod jupyter;
mod language;
pub mod notebook;
mod runtime;

pub use error::KernelError;
pub use jupyter::{JupyterKernel, JupyterLauncher};
pub use language::{Language, LanguageParseError};
pub use notebook::{Cell, MimeBundle, Notebook, Output, mime_text};
pub use runtime::{CellFailure, ExecutionOutcome, KernelLauncher, KernelRuntime};
