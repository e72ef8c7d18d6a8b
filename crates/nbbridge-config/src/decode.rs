use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// How the protocol loop reacts to request lines it cannot decode.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum DecodePolicy {
    /// Log the malformed line, answer it when its id is recoverable, and keep
    /// serving.
    #[default]
    Skip,
    /// Stop serving at the first malformed line and exit with a failure
    /// status once the kernel has been torn down.
    Strict,
}

impl DecodePolicy {
    /// Returns `true` when a malformed line must terminate the loop.
    #[must_use]
    pub const fn is_strict(self) -> bool {
        matches!(self, Self::Strict)
    }
}

/// Errors encountered while parsing a [`DecodePolicy`] from text.
pub type DecodePolicyParseError = strum::ParseError;
