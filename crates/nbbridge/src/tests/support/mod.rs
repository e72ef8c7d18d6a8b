//! Test doubles shared by the unit and behavioural suites.

mod kernel;

pub use kernel::{KernelEvent, Recorder, RecordingLauncher};
