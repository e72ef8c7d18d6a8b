//! Line protocol spoken with the kernel host script.
//!
//! The bridge writes one [`HostCommand`] per line to the host's stdin and
//! reads exactly one [`HostReply`] line back. The first line the host writes,
//! before any command, reports whether the kernel became ready.

use serde::{Deserialize, Serialize};

use crate::error::KernelError;
use crate::notebook::Output;
use crate::runtime::ExecutionOutcome;

/// Request sent to the host.
#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub(crate) enum HostCommand<'a> {
    Execute { source: &'a str },
    Restart,
    Ping,
    Shutdown,
}

/// Kernel-reported status of an `execute_request`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum ExecutionStatus {
    #[default]
    Ok,
    Error,
    Aborted,
}

/// Reply read from the host.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct HostReply {
    pub(crate) ok: bool,
    #[serde(default)]
    pub(crate) error: Option<String>,
    #[serde(default)]
    pub(crate) alive: Option<bool>,
    #[serde(default)]
    pub(crate) outputs: Vec<Output>,
    #[serde(default)]
    pub(crate) execution_count: Option<u32>,
    #[serde(default)]
    pub(crate) status: ExecutionStatus,
    #[serde(default)]
    pub(crate) ename: Option<String>,
    #[serde(default)]
    pub(crate) evalue: Option<String>,
}

impl HostReply {
    /// Parses one reply line, turning `ok: false` into a host failure.
    pub(crate) fn parse(line: &str) -> Result<Self, KernelError> {
        let reply: Self =
            serde_json::from_str(line.trim()).map_err(|source| KernelError::Protocol {
                message: format!("unparseable host reply: {source}"),
                source: Some(source),
            })?;
        if reply.ok {
            Ok(reply)
        } else {
            Err(KernelError::host(
                reply
                    .error
                    .unwrap_or_else(|| String::from("kernel host failed without a message")),
            ))
        }
    }

    /// Maps the execution status onto the runtime outcome.
    pub(crate) fn outcome(&self) -> ExecutionOutcome {
        match self.status {
            ExecutionStatus::Ok => ExecutionOutcome::Completed,
            ExecutionStatus::Error => ExecutionOutcome::failed(
                self.ename.clone().unwrap_or_default(),
                self.evalue.clone().unwrap_or_default(),
            ),
            ExecutionStatus::Aborted => {
                ExecutionOutcome::failed("ExecutionAborted", "the kernel aborted execution")
            }
        }
    }
}

/// Serialises a command as one protocol line, newline included.
pub(crate) fn encode(command: &HostCommand<'_>) -> Result<String, KernelError> {
    let mut line = serde_json::to_string(command).map_err(|source| KernelError::Protocol {
        message: format!("failed to encode host command: {source}"),
        source: Some(source),
    })?;
    line.push('\n');
    Ok(line)
}
