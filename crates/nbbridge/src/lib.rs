//! Line-delimited JSON bridge between an editor and a Jupyter kernel.
//!
//! The bridge reads one request per line from stdin, runs it against a
//! single kernel session and writes one response per line to stdout. The
//! pieces are layered:
//!
//! - [`Session`] owns the live kernel and the reusable notebook cell. It
//!   starts kernels lazily, switches language by replacing the kernel, and
//!   guarantees the kernel is shut down exactly once.
//! - [`CommandDispatcher`] maps decoded commands onto the session and renders
//!   executed cells through a [`CellRenderer`].
//! - [`ProtocolLoop`] frames requests and responses, applies the configured
//!   [`nbbridge_config::DecodePolicy`] to malformed lines, and tears the
//!   session down on every exit path.
//!
//! Diagnostics are emitted through `tracing` to stderr; stdout carries only
//! response lines.

mod bootstrap;
pub mod dispatch;
mod render;
mod server;
mod session;
mod telemetry;

pub use bootstrap::{RunError, outcome_status, run, serve};
pub use dispatch::{Command, CommandDispatcher, DecodeError, Request, Response};
pub use render::{CellRenderer, HtmlRenderer};
pub use server::{LoopExit, LoopOutcome, LoopState, MAX_REQUEST_BYTES, ProtocolLoop, ServerError};
pub use session::{Session, SessionError, Teardown};
pub use telemetry::{TelemetryError, TelemetryHandle};

#[cfg(test)]
mod tests;
