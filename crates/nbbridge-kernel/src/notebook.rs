//! Single-cell notebook document.
//!
//! The bridge keeps one code cell alive for the whole session. Each execution
//! overwrites the cell source and replaces its outputs wholesale, so the
//! document always describes the most recent run. Output records follow the
//! nbformat v4 shape so host replies deserialise without translation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// MIME type to payload mapping carried by rich outputs.
pub type MimeBundle = BTreeMap<String, Value>;

/// Output metadata attached to rich outputs.
pub type OutputMetadata = serde_json::Map<String, Value>;

/// One output record produced by executing a cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "output_type", rename_all = "snake_case")]
pub enum Output {
    /// Text written to `stdout` or `stderr`.
    Stream {
        /// Stream name (`stdout` or `stderr`).
        name: String,
        /// Text written to the stream.
        text: String,
    },
    /// Value of the final expression of the cell.
    ExecuteResult {
        /// Execution counter reported by the kernel.
        #[serde(default)]
        execution_count: Option<u32>,
        /// Representations keyed by MIME type.
        data: MimeBundle,
        /// Representation metadata.
        #[serde(default)]
        metadata: OutputMetadata,
    },
    /// Rich output emitted through the display machinery.
    DisplayData {
        /// Representations keyed by MIME type.
        data: MimeBundle,
        /// Representation metadata.
        #[serde(default)]
        metadata: OutputMetadata,
    },
    /// Exception raised while executing the cell.
    Error {
        /// Exception type name.
        ename: String,
        /// Exception message.
        evalue: String,
        /// Formatted traceback lines, possibly carrying ANSI colour codes.
        #[serde(default)]
        traceback: Vec<String>,
    },
}

impl Output {
    /// Builds a stream output.
    #[must_use]
    pub fn stream(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self::Stream {
            name: name.into(),
            text: text.into(),
        }
    }

    /// Builds an execute result carrying a single `text/plain` payload.
    #[must_use]
    pub fn plain_result(execution_count: u32, text: impl Into<String>) -> Self {
        let mut data = MimeBundle::new();
        data.insert(String::from("text/plain"), Value::String(text.into()));
        Self::ExecuteResult {
            execution_count: Some(execution_count),
            data,
            metadata: OutputMetadata::new(),
        }
    }

    /// Builds an error output.
    #[must_use]
    pub fn error(
        ename: impl Into<String>,
        evalue: impl Into<String>,
        traceback: Vec<String>,
    ) -> Self {
        Self::Error {
            ename: ename.into(),
            evalue: evalue.into(),
            traceback,
        }
    }

    /// Returns `true` for error records.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

/// Reads a MIME payload as text.
///
/// nbformat allows multi-line payloads to be stored as arrays of strings;
/// those are concatenated. Non-textual payloads yield `None`.
#[must_use]
pub fn mime_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Array(parts) => parts
            .iter()
            .map(|part| part.as_str())
            .collect::<Option<Vec<&str>>>()
            .map(|parts| parts.concat()),
        _ => None,
    }
}

/// The code cell held by the notebook.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    source: String,
    execution_count: Option<u32>,
    outputs: Vec<Output>,
}

impl Cell {
    /// Pending or most recently executed source.
    #[must_use]
    pub fn source(&self) -> &str {
        self.source.as_str()
    }

    /// Execution counter of the most recent run, if any.
    #[must_use]
    pub const fn execution_count(&self) -> Option<u32> {
        self.execution_count
    }

    /// Outputs of the most recent run.
    #[must_use]
    pub fn outputs(&self) -> &[Output] {
        &self.outputs
    }
}

/// Notebook document holding exactly one reusable code cell.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Notebook {
    cell: Cell,
}

impl Notebook {
    /// Creates an empty notebook.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the source for the next execution.
    ///
    /// Outputs from the previous run stay in place until the runtime replaces
    /// them.
    pub fn set_source(&mut self, source: impl Into<String>) {
        self.cell.source = source.into();
    }

    /// Replaces the cell outputs and execution counter.
    pub fn replace_outputs(&mut self, outputs: Vec<Output>, execution_count: Option<u32>) {
        self.cell.outputs = outputs;
        self.cell.execution_count = execution_count;
    }

    /// The notebook's only cell.
    #[must_use]
    pub const fn cell(&self) -> &Cell {
        &self.cell
    }

    /// Source of the cell.
    #[must_use]
    pub fn source(&self) -> &str {
        self.cell.source()
    }

    /// Outputs of the cell.
    #[must_use]
    pub fn outputs(&self) -> &[Output] {
        self.cell.outputs()
    }
}
