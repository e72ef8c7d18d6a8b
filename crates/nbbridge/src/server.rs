//! Line-oriented protocol loop.
//!
//! The loop reads one request line at a time, dispatches it against the
//! session and writes exactly one response line before reading the next.
//! Kernel failures are answered in-band; only failures of the input or
//! output streams end the loop early. Whatever ends the loop, the session
//! is torn down before [`ProtocolLoop::run`] returns.

use std::io::{self, BufRead, Read, Write};

use nbbridge_config::DecodePolicy;
use nbbridge_kernel::KernelLauncher;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::dispatch::{
    CommandDispatcher, DecodeError, Request, Response, ResponseWriter, WriteError,
    trim_trailing_whitespace,
};
use crate::render::{CellRenderer, HtmlRenderer};
use crate::session::{Session, Teardown};

/// Tracing target for protocol loop events.
pub(crate) const SERVER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::server");

/// Maximum size of a single request line in bytes.
pub const MAX_REQUEST_BYTES: usize = 16 * 1024 * 1024;

/// Lifecycle state of the protocol loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Reading and answering requests.
    Running,
    /// Input ended or the loop aborted; the session is being torn down.
    Draining,
    /// The session has been torn down.
    Terminated,
}

/// Why the loop stopped reading requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// The input stream ended.
    EndOfInput,
    /// A malformed line was read under [`DecodePolicy::Strict`].
    Aborted,
}

/// Summary of a completed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopOutcome {
    /// Number of non-blank request lines read.
    pub requests: usize,
    /// Why the loop stopped.
    pub exit: LoopExit,
}

/// Stream failures that end the loop.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Reading the input stream failed.
    #[error("failed to read request: {0}")]
    Read(#[source] io::Error),
    /// Writing a response failed.
    #[error(transparent)]
    Write(#[from] WriteError),
}

/// What to do after handling a line.
enum Step {
    Continue,
    Abort,
}

/// One framed input line.
enum Frame {
    Line,
    Oversized(usize),
    EndOfInput,
}

/// Drives the request/response state machine over a pair of streams.
#[derive(Debug)]
pub struct ProtocolLoop<R = HtmlRenderer> {
    dispatcher: CommandDispatcher<R>,
    policy: DecodePolicy,
    max_request_bytes: usize,
    state: LoopState,
}

impl ProtocolLoop<HtmlRenderer> {
    /// Creates a loop that renders cells as HTML.
    #[must_use]
    pub const fn new(policy: DecodePolicy) -> Self {
        Self::with_renderer(HtmlRenderer, policy)
    }
}

impl<R: CellRenderer> ProtocolLoop<R> {
    /// Creates a loop rendering with `renderer`.
    pub const fn with_renderer(renderer: R, policy: DecodePolicy) -> Self {
        Self {
            dispatcher: CommandDispatcher::new(renderer),
            policy,
            max_request_bytes: MAX_REQUEST_BYTES,
            state: LoopState::Running,
        }
    }

    /// Overrides the request size limit.
    #[must_use]
    pub const fn with_max_request_bytes(mut self, max_request_bytes: usize) -> Self {
        self.max_request_bytes = max_request_bytes;
        self
    }

    /// Current lifecycle state.
    pub const fn state(&self) -> LoopState {
        self.state
    }

    /// Serves requests from `input` until it ends, then tears the session
    /// down.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] when reading a request or writing a response
    /// fails. The session is torn down on this path as well.
    pub fn run<L, I, O>(
        &mut self,
        session: &mut Session<L>,
        mut input: I,
        output: O,
    ) -> Result<LoopOutcome, ServerError>
    where
        L: KernelLauncher,
        I: BufRead,
        O: Write,
    {
        let mut guard = TeardownGuard::new(session);
        let mut writer = ResponseWriter::new(output);
        let mut buffer = Vec::new();
        let mut requests = 0;
        self.state = LoopState::Running;
        debug!(target: SERVER_TARGET, policy = %self.policy, "protocol loop running");

        let result = loop {
            let step = match self.read_frame(&mut input, &mut buffer) {
                Ok(Frame::EndOfInput) => break Ok(LoopExit::EndOfInput),
                Ok(Frame::Oversized(size)) => {
                    requests += 1;
                    self.reject(
                        &mut writer,
                        &DecodeError::too_large(size, self.max_request_bytes),
                    )
                }
                Ok(Frame::Line) => {
                    let line = trim_trailing_whitespace(&buffer);
                    if line.is_empty() {
                        continue;
                    }
                    requests += 1;
                    self.handle_line(guard.session(), line, &mut writer)
                }
                Err(error) => break Err(ServerError::Read(error)),
            };
            match step {
                Ok(Step::Continue) => {}
                Ok(Step::Abort) => break Ok(LoopExit::Aborted),
                Err(error) => break Err(ServerError::from(error)),
            }
        };

        self.state = LoopState::Draining;
        if let Err(error) = &result {
            error!(target: SERVER_TARGET, %error, "protocol loop failed");
        }
        guard.finish();
        self.state = LoopState::Terminated;

        result.map(|exit| LoopOutcome { requests, exit })
    }

    fn read_frame<I: BufRead>(&self, input: &mut I, buffer: &mut Vec<u8>) -> io::Result<Frame> {
        buffer.clear();
        let limit = u64::try_from(self.max_request_bytes)
            .unwrap_or(u64::MAX)
            .saturating_add(1);
        let read = input.by_ref().take(limit).read_until(b'\n', buffer)?;
        if read == 0 {
            return Ok(Frame::EndOfInput);
        }
        if buffer.len() > self.max_request_bytes && buffer.last() != Some(&b'\n') {
            let skipped = input.skip_until(b'\n')?;
            return Ok(Frame::Oversized(buffer.len() + skipped));
        }
        Ok(Frame::Line)
    }

    fn handle_line<L: KernelLauncher, O: Write>(
        &self,
        session: &mut Session<L>,
        line: &[u8],
        writer: &mut ResponseWriter<O>,
    ) -> Result<Step, WriteError> {
        info!(
            target: SERVER_TARGET,
            request = %String::from_utf8_lossy(line),
            "received request"
        );

        let request = match Request::parse(line) {
            Ok(request) => request,
            Err(error) => return self.reject(writer, &error),
        };

        let result = self.dispatcher.dispatch(session, &request.command);
        if let Err(error) = &result {
            warn!(
                target: SERVER_TARGET,
                command = request.command_name(),
                %error,
                "command failed"
            );
        }
        send(writer, &Response::from_result(request.id, result))?;
        Ok(Step::Continue)
    }

    fn reject<O: Write>(
        &self,
        writer: &mut ResponseWriter<O>,
        error: &DecodeError,
    ) -> Result<Step, WriteError> {
        warn!(target: SERVER_TARGET, %error, "malformed request");
        if let Some(id) = error.request_id() {
            send(writer, &Response::decode_error(id.clone(), error))?;
        }
        if self.policy.is_strict() {
            error!(target: SERVER_TARGET, "terminating on malformed request");
            return Ok(Step::Abort);
        }
        Ok(Step::Continue)
    }
}

fn send<O: Write>(writer: &mut ResponseWriter<O>, response: &Response) -> Result<(), WriteError> {
    let line = writer.write_response(response)?;
    info!(
        target: SERVER_TARGET,
        id = %response.id,
        status = ?response.status,
        bytes = line.len(),
        "sent response"
    );
    debug!(target: SERVER_TARGET, response = %line, "response line");
    Ok(())
}

/// Tears the session down when the loop exits, including by unwinding.
struct TeardownGuard<'a, L: KernelLauncher> {
    session: &'a mut Session<L>,
}

impl<'a, L: KernelLauncher> TeardownGuard<'a, L> {
    fn new(session: &'a mut Session<L>) -> Self {
        Self { session }
    }

    fn session(&mut self) -> &mut Session<L> {
        self.session
    }

    fn finish(&mut self) {
        match self.session.shutdown() {
            Teardown::Stopped { language } => {
                info!(target: SERVER_TARGET, kernel = language.kernel_name(), "kernel shut down");
            }
            Teardown::NoKernel => {
                debug!(target: SERVER_TARGET, "no live kernel to shut down");
            }
            Teardown::AlreadyShutDown => {}
        }
    }
}

impl<L: KernelLauncher> Drop for TeardownGuard<'_, L> {
    fn drop(&mut self) {
        if !self.session.is_shut_down() {
            self.finish();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::{BufReader, Cursor};

    use nbbridge_kernel::Language;
    use rstest::{fixture, rstest};
    use serde_json::{Value, json};

    use super::*;
    use crate::tests::support::{Recorder, RecordingLauncher};

    #[fixture]
    fn recorder() -> Recorder {
        Recorder::default()
    }

    struct Run {
        result: Result<LoopOutcome, ServerError>,
        lines: Vec<Value>,
        session: Session<RecordingLauncher>,
        state: LoopState,
    }

    fn run_with(server: ProtocolLoop, recorder: &Recorder, input: &str) -> Run {
        let mut server = server;
        let mut session = Session::new(RecordingLauncher::new(recorder.clone()));
        let mut output = Vec::new();
        let result = server.run(&mut session, Cursor::new(input.as_bytes()), &mut output);
        let lines = String::from_utf8(output)
            .expect("utf8 output")
            .lines()
            .map(|line| serde_json::from_str(line).expect("response json"))
            .collect();
        Run {
            result,
            lines,
            session,
            state: server.state(),
        }
    }

    fn run(recorder: &Recorder, input: &str) -> Run {
        run_with(ProtocolLoop::new(DecodePolicy::Skip), recorder, input)
    }

    #[rstest]
    fn execute_then_restart_scenario(recorder: Recorder) {
        let input = concat!(
            r#"{"id":1,"body":{"command":"execute","lang":"python3","source":"1+1"}}"#,
            "\n",
            r#"{"id":2,"body":{"command":"restart_kernel"}}"#,
            "\n",
        );

        let run = run(&recorder, input);

        let outcome = run.result.expect("loop succeeds");
        assert_eq!(outcome.requests, 2);
        assert_eq!(outcome.exit, LoopExit::EndOfInput);
        assert_eq!(run.lines.len(), 2);
        assert_eq!(run.lines[0]["id"], json!(1));
        assert_eq!(run.lines[1]["id"], json!(2));
        let body = run.lines[0]["body"].as_str().expect("body");
        assert!(body.contains("<pre>2</pre>"), "rendered result in {body}");
        assert_eq!(run.lines[1]["body"], json!(""));
        assert_eq!(recorder.restarts(), 1);
        assert_eq!(recorder.shutdowns(), 1);
        assert!(run.session.is_shut_down());
        assert_eq!(run.state, LoopState::Terminated);
    }

    #[rstest]
    #[case::number(json!(42))]
    #[case::string(json!("req-7"))]
    #[case::null(Value::Null)]
    #[case::object(json!({"doc": "a.md", "seq": [1, 2]}))]
    fn ids_round_trip(recorder: Recorder, #[case] id: Value) {
        let input = format!(
            "{}\n{}\n",
            json!({"id": id, "body": {"command": "noop"}}),
            json!({"id": id, "body": {"command": "execute", "lang": "rust", "source": "2+2"}}),
        );

        let run = run(&recorder, &input);

        assert_eq!(run.lines.len(), 2);
        assert!(run.lines.iter().all(|line| line["id"] == id));
    }

    #[rstest]
    #[case::no_requests("", 0)]
    #[case::one_request("{\"id\":1,\"body\":{\"command\":\"execute\",\"lang\":\"python\",\"source\":\"1\"}}\n", 1)]
    #[case::many_requests(
        concat!(
            "{\"id\":1,\"body\":{\"command\":\"execute\",\"lang\":\"python\",\"source\":\"1\"}}\n",
            "{\"id\":2,\"body\":{\"command\":\"execute\",\"lang\":\"rust\",\"source\":\"2\"}}\n",
            "{\"id\":3,\"body\":{\"command\":\"execute\",\"lang\":\"rust\",\"source\":\"3\"}}\n",
            "{\"id\":4,\"body\":{\"command\":\"restart_kernel\"}}\n",
        ),
        4
    )]
    fn teardown_runs_exactly_once(recorder: Recorder, #[case] input: &str, #[case] requests: usize) {
        let run = run(&recorder, input);

        let outcome = run.result.expect("loop succeeds");
        assert_eq!(outcome.requests, requests);
        assert!(run.session.is_shut_down());
        assert_eq!(recorder.shutdowns(), recorder.starts());
        drop(run.session);
        assert_eq!(recorder.shutdowns(), recorder.starts());
    }

    #[rstest]
    fn cell_failures_do_not_stop_the_loop(recorder: Recorder) {
        let input = concat!(
            r#"{"id":1,"body":{"command":"execute","lang":"python3","source":"raise ValueError"}}"#,
            "\n",
            r#"{"id":2,"body":{"command":"execute","lang":"python3","source":"3+4"}}"#,
            "\n",
        );

        let run = run(&recorder, input);

        assert_eq!(run.lines.len(), 2);
        assert_eq!(run.lines[0]["status"], json!("ok"));
        assert!(
            run.lines[0]["body"]
                .as_str()
                .is_some_and(|body| body.contains("ValueError"))
        );
        assert!(
            run.lines[1]["body"]
                .as_str()
                .is_some_and(|body| body.contains("<pre>7</pre>"))
        );
        assert_eq!(recorder.starts(), 1);
    }

    #[rstest]
    fn kernel_failures_are_answered_in_band(recorder: Recorder) {
        let input = concat!(
            r#"{"id":1,"body":{"command":"restart_kernel"}}"#,
            "\n",
            r#"{"id":2,"body":{"command":"execute","lang":"python3","source":"crash"}}"#,
            "\n",
            r#"{"id":3,"body":{"command":"execute","lang":"python3","source":"1+1"}}"#,
            "\n",
        );

        let run = run(&recorder, input);

        assert_eq!(run.lines.len(), 3);
        assert_eq!(run.lines[0]["status"], json!("error"));
        assert_eq!(run.lines[0]["error"]["kind"], json!("kernel_restart"));
        assert_eq!(run.lines[0]["body"], json!(""));
        assert_eq!(run.lines[1]["error"]["kind"], json!("kernel"));
        assert_eq!(run.lines[2]["status"], json!("ok"));
        assert_eq!(recorder.starts(), 2);
    }

    #[rstest]
    fn start_failures_are_distinguishable(recorder: Recorder) {
        let launcher = RecordingLauncher::new(recorder.clone()).failing_for(Language::Rust);
        let mut session = Session::new(launcher);
        let mut output = Vec::new();
        let input = "{\"id\":9,\"body\":{\"command\":\"execute\",\"lang\":\"rust\",\"source\":\"1\"}}\n";

        ProtocolLoop::new(DecodePolicy::Skip)
            .run(&mut session, Cursor::new(input), &mut output)
            .expect("loop succeeds");

        let line: Value = serde_json::from_slice(&output).expect("response");
        assert_eq!(line["id"], json!(9));
        assert_eq!(line["error"]["kind"], json!("kernel_start"));
    }

    #[rstest]
    fn blank_lines_are_ignored(recorder: Recorder) {
        let input = "\n  \n{\"id\":1,\"body\":{\"command\":\"noop\"}}\r\n\n";

        let run = run(&recorder, input);

        assert_eq!(run.result.expect("loop succeeds").requests, 1);
        assert_eq!(run.lines.len(), 1);
    }

    #[rstest]
    fn skip_policy_answers_recoverable_ids(recorder: Recorder) {
        let input = concat!(
            "not json\n",
            r#"{"id":"x","body":{"command":"execute","lang":"cobol","source":"1"}}"#,
            "\n",
            r#"{"id":"y","body":{"command":"noop"}}"#,
            "\n",
        );

        let run = run(&recorder, input);

        let outcome = run.result.expect("loop succeeds");
        assert_eq!(outcome.requests, 3);
        assert_eq!(outcome.exit, LoopExit::EndOfInput);
        assert_eq!(run.lines.len(), 2);
        assert_eq!(run.lines[0]["id"], json!("x"));
        assert_eq!(run.lines[0]["error"]["kind"], json!("decode"));
        assert_eq!(run.lines[1]["id"], json!("y"));
        assert_eq!(run.lines[1]["status"], json!("ok"));
    }

    #[rstest]
    fn strict_policy_aborts_after_teardown(recorder: Recorder) {
        let input = concat!(
            r#"{"id":1,"body":{"command":"execute","lang":"python3","source":"1"}}"#,
            "\n",
            "not json\n",
            r#"{"id":3,"body":{"command":"noop"}}"#,
            "\n",
        );

        let run = run_with(ProtocolLoop::new(DecodePolicy::Strict), &recorder, input);

        let outcome = run.result.expect("loop returns");
        assert_eq!(outcome.exit, LoopExit::Aborted);
        assert_eq!(outcome.requests, 2);
        assert_eq!(run.lines.len(), 1);
        assert_eq!(recorder.shutdowns(), 1);
        assert_eq!(run.state, LoopState::Terminated);
    }

    #[rstest]
    fn strict_policy_rejects_requests_without_id(recorder: Recorder) {
        let input = concat!(
            r#"{"body":{"command":"execute","lang":"python3","source":"1+1"}}"#,
            "\n",
            r#"{"id":2,"body":{"command":"execute","lang":"python3","source":"1+1"}}"#,
            "\n",
        );

        let run = run_with(ProtocolLoop::new(DecodePolicy::Strict), &recorder, input);

        let outcome = run.result.expect("loop returns");
        assert_eq!(outcome.exit, LoopExit::Aborted);
        assert_eq!(outcome.requests, 1);
        assert!(run.lines.is_empty());
        assert_eq!(recorder.starts(), 0);
    }

    #[rstest]
    fn skip_policy_drops_requests_without_id(recorder: Recorder) {
        let input = concat!(
            r#"{"body":{"command":"restart_kernel"}}"#,
            "\n",
            r#"{"id":2,"body":{"command":"noop"}}"#,
            "\n",
        );

        let run = run(&recorder, input);

        assert_eq!(run.result.expect("loop succeeds").requests, 2);
        assert_eq!(run.lines.len(), 1);
        assert_eq!(run.lines[0]["id"], json!(2));
    }

    #[rstest]
    fn oversized_lines_are_skipped(recorder: Recorder) {
        let input = format!(
            "{}\n{}\n",
            "x".repeat(64),
            r#"{"id":2,"body":{"command":"noop"}}"#
        );
        let server = ProtocolLoop::new(DecodePolicy::Skip).with_max_request_bytes(48);

        let run = run_with(server, &recorder, &input);

        assert_eq!(run.result.expect("loop succeeds").requests, 2);
        assert_eq!(run.lines.len(), 1);
        assert_eq!(run.lines[0]["id"], json!(2));
    }

    struct ClosedPipe;

    impl Write for ClosedPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::from(io::ErrorKind::BrokenPipe))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Read for ClosedPipe {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::from(io::ErrorKind::BrokenPipe))
        }
    }

    #[rstest]
    fn write_failures_still_tear_down(recorder: Recorder) {
        let mut session = Session::new(RecordingLauncher::new(recorder.clone()));
        let input = "{\"id\":1,\"body\":{\"command\":\"execute\",\"lang\":\"python3\",\"source\":\"1\"}}\n";
        let mut server = ProtocolLoop::new(DecodePolicy::Skip);

        let error = server
            .run(&mut session, Cursor::new(input), ClosedPipe)
            .expect_err("write fails");

        assert!(matches!(error, ServerError::Write(_)));
        assert_eq!(recorder.shutdowns(), 1);
        assert!(session.is_shut_down());
        assert_eq!(server.state(), LoopState::Terminated);
    }

    #[rstest]
    fn read_failures_still_tear_down(recorder: Recorder) {
        let mut session = Session::new(RecordingLauncher::new(recorder.clone()));
        session.ensure_language(Language::Rust).expect("start");

        let error = ProtocolLoop::new(DecodePolicy::Skip)
            .run(&mut session, BufReader::new(ClosedPipe), Vec::new())
            .expect_err("read fails");

        assert!(matches!(error, ServerError::Read(_)));
        assert_eq!(recorder.shutdowns(), 1);
    }
}
