//! Request deserialization for the protocol loop.
//!
//! A request line carries an opaque `id`, echoed back untouched, and a
//! `body` naming the command:
//!
//! ```json
//! {"id":1,"body":{"command":"execute","lang":"python3","source":"1+1"}}
//! ```

use nbbridge_kernel::Language;
use serde::Deserialize;
use serde_json::Value;

use super::errors::DecodeError;

/// Command name for running a cell.
const EXECUTE: &str = "execute";
/// Command name for restarting the kernel.
const RESTART_KERNEL: &str = "restart_kernel";

/// Outer request shape, decoded before the command itself.
#[derive(Debug, Deserialize)]
struct Envelope {
    id: Value,
    #[serde(default)]
    body: Value,
}

/// Command body as sent, before validation.
#[derive(Debug, Deserialize)]
struct RawCommand {
    command: String,
    #[serde(default)]
    lang: Option<String>,
    #[serde(default)]
    source: Option<String>,
}

/// Decoded command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run `source` on a kernel for `language`.
    Execute {
        /// Kernel language.
        language: Language,
        /// Cell source.
        source: String,
    },
    /// Restart the live kernel.
    RestartKernel,
    /// Any other command name.
    Unknown {
        /// Command name as sent.
        name: String,
    },
}

/// Decoded request line.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// Opaque identifier echoed in the response.
    pub id: Value,
    /// Command to dispatch.
    pub command: Command,
}

impl Request {
    /// Parses a JSONL line into a request.
    ///
    /// Trailing whitespace (including the newline delimiter) is trimmed
    /// before parsing. The `id` is required; an explicit `null` is kept.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Malformed`] when the line is not a JSON object
    /// envelope or has no `id`, and [`DecodeError::InvalidCommand`] or
    /// [`DecodeError::UnsupportedLanguage`] when the body is not a valid
    /// command.
    pub fn parse(line: &[u8]) -> Result<Self, DecodeError> {
        let trimmed = trim_trailing_whitespace(line);
        if trimmed.is_empty() {
            return Err(DecodeError::malformed("empty request line"));
        }

        let envelope: Envelope =
            serde_json::from_slice(trimmed).map_err(DecodeError::from_json_error)?;
        let command = Command::decode(&envelope.id, envelope.body)?;
        Ok(Self {
            id: envelope.id,
            command,
        })
    }

    /// Returns the command name for logging.
    pub fn command_name(&self) -> &str {
        self.command.name()
    }
}

impl Command {
    fn decode(id: &Value, body: Value) -> Result<Self, DecodeError> {
        let raw: RawCommand = serde_json::from_value(body)
            .map_err(|error| DecodeError::invalid_command(id.clone(), error.to_string()))?;

        match raw.command.as_str() {
            EXECUTE => {
                let lang = raw.lang.ok_or_else(|| {
                    DecodeError::invalid_command(id.clone(), "execute requires `lang`")
                })?;
                let source = raw.source.ok_or_else(|| {
                    DecodeError::invalid_command(id.clone(), "execute requires `source`")
                })?;
                let language = lang
                    .parse::<Language>()
                    .map_err(|_| DecodeError::UnsupportedLanguage {
                        id: id.clone(),
                        language: lang,
                    })?;
                Ok(Self::Execute { language, source })
            }
            RESTART_KERNEL => Ok(Self::RestartKernel),
            _ => Ok(Self::Unknown { name: raw.command }),
        }
    }

    /// Returns the command name as it appears on the wire.
    pub fn name(&self) -> &str {
        match self {
            Self::Execute { .. } => EXECUTE,
            Self::RestartKernel => RESTART_KERNEL,
            Self::Unknown { name } => name,
        }
    }
}

/// Trims trailing ASCII whitespace from a byte slice.
pub(crate) fn trim_trailing_whitespace(bytes: &[u8]) -> &[u8] {
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(0, |pos| pos + 1);
    &bytes[..end]
}
