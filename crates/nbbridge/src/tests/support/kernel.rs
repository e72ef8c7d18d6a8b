//! Recording kernel launcher: tracks lifecycle events and evaluates a tiny
//! arithmetic language so session behaviour can be observed without Jupyter.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use nbbridge_kernel::{
    ExecutionOutcome, KernelError, KernelLauncher, KernelRuntime, Language, Notebook, Output,
};

/// Lifecycle event observed by the recorder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelEvent {
    /// A kernel started.
    Started(Language),
    /// A cell executed.
    Executed(Language),
    /// A kernel restarted.
    Restarted(Language),
    /// A kernel shut down.
    ShutDown(Language),
}

/// Shared log of kernel lifecycle events.
#[derive(Clone, Default)]
pub struct Recorder {
    state: Arc<Mutex<RecorderState>>,
}

#[derive(Default)]
struct RecorderState {
    events: Vec<KernelEvent>,
    kernels: Vec<Arc<AtomicBool>>,
    failures: HashSet<Language>,
}

impl Recorder {
    fn with_state<T>(&self, f: impl FnOnce(&mut RecorderState) -> T) -> T {
        let mut state = self.state.lock().expect("recorder mutex poisoned");
        f(&mut state)
    }

    fn record(&self, event: KernelEvent) {
        self.with_state(|state| state.events.push(event));
    }

    /// Returns every event recorded so far.
    #[must_use]
    pub fn events(&self) -> Vec<KernelEvent> {
        self.with_state(|state| state.events.clone())
    }

    fn count(&self, predicate: impl Fn(&KernelEvent) -> bool) -> usize {
        self.with_state(|state| state.events.iter().filter(|event| predicate(event)).count())
    }

    /// Number of kernels started.
    #[must_use]
    pub fn starts(&self) -> usize {
        self.count(|event| matches!(event, KernelEvent::Started(_)))
    }

    /// Number of kernels shut down.
    #[must_use]
    pub fn shutdowns(&self) -> usize {
        self.count(|event| matches!(event, KernelEvent::ShutDown(_)))
    }

    /// Number of kernel restarts.
    #[must_use]
    pub fn restarts(&self) -> usize {
        self.count(|event| matches!(event, KernelEvent::Restarted(_)))
    }

    /// Marks every kernel started so far as dead.
    pub fn kill_kernels(&self) {
        self.with_state(|state| {
            for alive in &state.kernels {
                alive.store(false, Ordering::SeqCst);
            }
        });
    }

    /// Makes subsequent starts for `language` fail.
    pub fn fail_starts_for(&self, language: Language) {
        self.with_state(|state| state.failures.insert(language));
    }
}

/// Launcher producing [`RecordingRuntime`]s.
#[derive(Clone)]
pub struct RecordingLauncher {
    recorder: Recorder,
}

impl RecordingLauncher {
    /// Builds a launcher that records into `recorder`.
    #[must_use]
    pub const fn new(recorder: Recorder) -> Self {
        Self { recorder }
    }

    /// Makes starts for `language` fail.
    #[must_use]
    pub fn failing_for(self, language: Language) -> Self {
        self.recorder.fail_starts_for(language);
        self
    }
}

impl KernelLauncher for RecordingLauncher {
    type Runtime = RecordingRuntime;

    fn start(&self, language: Language) -> Result<RecordingRuntime, KernelError> {
        let alive = Arc::new(AtomicBool::new(true));
        let failed = self.recorder.with_state(|state| {
            if state.failures.contains(&language) {
                return true;
            }
            state.kernels.push(Arc::clone(&alive));
            false
        });
        if failed {
            return Err(KernelError::host(format!(
                "No such kernel named {}",
                language.kernel_name()
            )));
        }
        self.recorder.record(KernelEvent::Started(language));
        Ok(RecordingRuntime {
            language,
            recorder: self.recorder.clone(),
            alive,
            execution_count: 0,
        })
    }
}

/// Runtime double that evaluates sums of integers.
///
/// `print(text)` writes `text` to stdout, sources starting with `raise`
/// print a line and then fail, and `crash` breaks the runtime itself.
pub struct RecordingRuntime {
    language: Language,
    recorder: Recorder,
    alive: Arc<AtomicBool>,
    execution_count: u32,
}

impl RecordingRuntime {
    fn evaluate(&self, source: &str) -> (Vec<Output>, ExecutionOutcome) {
        let source = source.trim();
        if let Some(text) = source
            .strip_prefix("print(")
            .and_then(|rest| rest.strip_suffix(')'))
        {
            let text = text.trim_matches(|c| c == '\'' || c == '"');
            return (
                vec![Output::stream("stdout", format!("{text}\n"))],
                ExecutionOutcome::Completed,
            );
        }
        if source.starts_with("raise") {
            let outputs = vec![
                Output::stream("stdout", "partial\n"),
                Output::error(
                    "ValueError",
                    "boom",
                    vec![String::from("\u{1b}[0;31mValueError\u{1b}[0m: boom")],
                ),
            ];
            return (outputs, ExecutionOutcome::failed("ValueError", "boom"));
        }
        let sum: Option<i64> = source
            .split('+')
            .map(|term| term.trim().parse::<i64>().ok())
            .sum();
        match sum {
            Some(value) => (
                vec![Output::plain_result(self.execution_count, value.to_string())],
                ExecutionOutcome::Completed,
            ),
            None => (Vec::new(), ExecutionOutcome::Completed),
        }
    }
}

impl KernelRuntime for RecordingRuntime {
    fn language(&self) -> Language {
        self.language
    }

    fn execute(&mut self, notebook: &mut Notebook) -> Result<ExecutionOutcome, KernelError> {
        if !self.alive.load(Ordering::SeqCst) {
            return Err(KernelError::NotAlive {
                language: self.language,
            });
        }
        if notebook.source().trim() == "crash" {
            self.alive.store(false, Ordering::SeqCst);
            return Err(KernelError::Exited {
                language: self.language,
            });
        }
        self.execution_count += 1;
        self.recorder.record(KernelEvent::Executed(self.language));
        let (outputs, outcome) = self.evaluate(notebook.source());
        notebook.replace_outputs(outputs, Some(self.execution_count));
        Ok(outcome)
    }

    fn restart(&mut self) -> Result<(), KernelError> {
        self.execution_count = 0;
        self.recorder.record(KernelEvent::Restarted(self.language));
        Ok(())
    }

    fn shutdown(&mut self) -> Result<(), KernelError> {
        self.alive.store(false, Ordering::SeqCst);
        self.recorder.record(KernelEvent::ShutDown(self.language));
        Ok(())
    }

    fn is_alive(&mut self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }
}
