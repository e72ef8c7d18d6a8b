//! Closed set of kernel languages the bridge can drive.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Languages with a known Jupyter kernel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Language {
    /// IPython kernel (`python3`).
    #[default]
    Python,
    /// evcxr kernel (`rust`).
    Rust,
}

impl Language {
    /// Every supported language, in wire-identifier order.
    pub const ALL: [Self; 2] = [Self::Python, Self::Rust];

    /// Returns the Jupyter kernel name the runtime is started with.
    #[must_use]
    pub const fn kernel_name(self) -> &'static str {
        match self {
            Self::Python => "python3",
            Self::Rust => "rust",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.kernel_name())
    }
}

/// Error returned when a language identifier is outside the supported set.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unsupported kernel language: {0}")]
pub struct LanguageParseError(String);

impl LanguageParseError {
    /// Creates a parse error describing the unsupported value.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the offending value.
    #[must_use]
    pub fn value(&self) -> &str {
        self.0.as_str()
    }
}

impl FromStr for Language {
    type Err = LanguageParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "python3" | "python" => Ok(Self::Python),
            "rust" => Ok(Self::Rust),
            _ => Err(LanguageParseError::new(value)),
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("python3", Language::Python)]
    #[case("python", Language::Python)]
    #[case(" Python3 ", Language::Python)]
    #[case("rust", Language::Rust)]
    #[case("RUST", Language::Rust)]
    fn parses_supported_identifiers(#[case] input: &str, #[case] expected: Language) {
        assert_eq!(input.parse::<Language>(), Ok(expected));
    }

    #[rstest]
    #[case("julia")]
    #[case("")]
    #[case("python2")]
    fn rejects_identifiers_outside_the_set(#[case] input: &str) {
        let error = input.parse::<Language>().expect_err("should reject");
        assert_eq!(error.value(), input);
    }

    #[test]
    fn kernel_names_round_trip() {
        for language in Language::ALL {
            assert_eq!(language.kernel_name().parse::<Language>(), Ok(language));
        }
    }

    #[test]
    fn defaults_to_python() {
        assert_eq!(Language::default(), Language::Python);
    }
}
