//! Jupyter kernels hosted by a Python helper process.
//!
//! [`JupyterLauncher`] spawns the configured Python interpreter running an
//! embedded host script. The script owns a `jupyter_client` kernel manager
//! and relays requests over a line-delimited JSON exchange on its stdio (see
//! [`protocol`]). [`JupyterKernel`] owns the child process. Dropping a kernel
//! that was never shut down closes the host's stdin so it can stop its
//! kernel, and kills the host only if it has not exited after a grace period.

mod protocol;


use std::ffi::OsString;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::error::KernelError;
use crate::language::Language;
use crate::notebook::Notebook;
use crate::runtime::{ExecutionOutcome, KernelLauncher, KernelRuntime};

use self::protocol::{HostCommand, HostReply, encode};

/// Tracing target for kernel host operations.
const JUPYTER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::jupyter");

/// Host script run by the Python interpreter.
pub const HOST_SCRIPT: &str = include_str!("host.py");

/// Time a released host gets to stop its kernel after stdin closes.
///
/// `jupyter_client` waits up to five seconds for a kernel to stop on its own.
const HOST_EXIT_GRACE: Duration = Duration::from_secs(8);
/// Interval between exit checks during the grace period.
const HOST_EXIT_POLL: Duration = Duration::from_millis(25);

/// Starts Jupyter kernels through the host script.
///
/// The kernel name of the requested language is appended as the final
/// argument of the host command line.
#[derive(Debug, Clone)]
pub struct JupyterLauncher {
    program: OsString,
    args: Vec<OsString>,
}

impl JupyterLauncher {
    /// Builds a launcher that runs [`HOST_SCRIPT`] with `python`.
    #[must_use]
    pub fn new(python: impl AsRef<Path>) -> Self {
        Self::with_command(
            python.as_ref().as_os_str(),
            [OsString::from("-c"), OsString::from(HOST_SCRIPT)],
        )
    }

    /// Builds a launcher around an arbitrary host command.
    ///
    /// The command must speak the host protocol on its stdio.
    #[must_use]
    pub fn with_command<I, S>(program: impl Into<OsString>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    fn program_label(&self) -> String {
        self.program.to_string_lossy().into_owned()
    }
}

impl KernelLauncher for JupyterLauncher {
    type Runtime = JupyterKernel;

    fn start(&self, language: Language) -> Result<JupyterKernel, KernelError> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .arg(language.kernel_name())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        debug!(
            target: JUPYTER_TARGET,
            program = %self.program_label(),
            kernel = language.kernel_name(),
            "spawning kernel host"
        );

        let mut child = command.spawn().map_err(|source| KernelError::Spawn {
            program: self.program_label(),
            source,
        })?;

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        if let Some(stderr) = child.stderr.take() {
            forward_stderr(language, stderr);
        }

        let (Some(stdin), Some(stdout)) = (stdin, stdout) else {
            drop(child.kill());
            drop(child.wait());
            return Err(KernelError::protocol("failed to capture kernel host stdio"));
        };

        let mut kernel = JupyterKernel {
            language,
            child,
            stdin: Some(stdin),
            stdout: BufReader::new(stdout),
            released: false,
        };
        // An early return drops `kernel`, which releases the host.
        kernel.read_reply()?;

        info!(
            target: JUPYTER_TARGET,
            kernel = language.kernel_name(),
            pid = kernel.child.id(),
            "kernel ready"
        );
        Ok(kernel)
    }
}

/// A kernel host process serving one language.
#[derive(Debug)]
pub struct JupyterKernel {
    language: Language,
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: BufReader<ChildStdout>,
    released: bool,
}

impl JupyterKernel {
    fn request(&mut self, command: &HostCommand<'_>) -> Result<HostReply, KernelError> {
        let Some(stdin) = self.stdin.as_mut() else {
            return Err(KernelError::NotAlive {
                language: self.language,
            });
        };
        let line = encode(command)?;
        stdin
            .write_all(line.as_bytes())
            .and_then(|()| stdin.flush())
            .map_err(KernelError::io)?;
        self.read_reply()
    }

    fn read_reply(&mut self) -> Result<HostReply, KernelError> {
        let mut line = String::new();
        let bytes_read = self.stdout.read_line(&mut line).map_err(KernelError::io)?;
        if bytes_read == 0 {
            return Err(KernelError::Exited {
                language: self.language,
            });
        }
        HostReply::parse(&line)
    }

    /// Closes the host's stdin and reaps it, killing it if it outlives the
    /// grace period.
    ///
    /// The host treats end of input as a shutdown request, so a live kernel
    /// behind it is stopped rather than orphaned.
    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        drop(self.stdin.take());

        if self.wait_for_exit(HOST_EXIT_GRACE) {
            return;
        }
        warn!(
            target: JUPYTER_TARGET,
            kernel = self.language.kernel_name(),
            "kernel host did not exit after stdin closed; killing it"
        );
        if let Err(error) = self.child.kill() {
            warn!(
                target: JUPYTER_TARGET,
                kernel = self.language.kernel_name(),
                %error,
                "failed to kill kernel host"
            );
        }
        drop(self.child.wait());
    }

    /// Polls the host until it exits or `grace` elapses.
    fn wait_for_exit(&mut self, grace: Duration) -> bool {
        let deadline = Instant::now() + grace;
        loop {
            match self.child.try_wait() {
                Ok(Some(status)) => {
                    debug!(
                        target: JUPYTER_TARGET,
                        kernel = self.language.kernel_name(),
                        ?status,
                        "kernel host exited after release"
                    );
                    return true;
                }
                Ok(None) if Instant::now() < deadline => thread::sleep(HOST_EXIT_POLL),
                Ok(None) | Err(_) => return false,
            }
        }
    }
}

impl KernelRuntime for JupyterKernel {
    fn language(&self) -> Language {
        self.language
    }

    fn execute(&mut self, notebook: &mut Notebook) -> Result<ExecutionOutcome, KernelError> {
        let reply = self.request(&HostCommand::Execute {
            source: notebook.source(),
        })?;
        let outcome = reply.outcome();
        notebook.replace_outputs(reply.outputs, reply.execution_count);
        Ok(outcome)
    }

    fn restart(&mut self) -> Result<(), KernelError> {
        self.request(&HostCommand::Restart).map(drop)
    }

    fn shutdown(&mut self) -> Result<(), KernelError> {
        if self.released {
            return Ok(());
        }
        let result = self.request(&HostCommand::Shutdown).map(drop);
        if result.is_err() {
            self.release();
            return result;
        }
        match self.child.wait() {
            Ok(status) => {
                self.released = true;
                self.stdin = None;
                debug!(
                    target: JUPYTER_TARGET,
                    kernel = self.language.kernel_name(),
                    ?status,
                    "kernel host exited"
                );
            }
            Err(error) => {
                warn!(
                    target: JUPYTER_TARGET,
                    kernel = self.language.kernel_name(),
                    %error,
                    "failed to wait for kernel host"
                );
                self.release();
            }
        }
        result
    }

    fn is_alive(&mut self) -> bool {
        if self.released {
            return false;
        }
        match self.child.try_wait() {
            Ok(None) => {}
            Ok(Some(_)) | Err(_) => return false,
        }
        self.request(&HostCommand::Ping)
            .map(|reply| reply.alive.unwrap_or(false))
            .unwrap_or(false)
    }
}

impl Drop for JupyterKernel {
    fn drop(&mut self) {
        if !self.released {
            warn!(
                target: JUPYTER_TARGET,
                kernel = self.language.kernel_name(),
                "kernel dropped without shutdown; releasing host"
            );
            self.release();
        }
    }
}

/// Relays the host's stderr into the diagnostic log.
fn forward_stderr(language: Language, stderr: ChildStderr) {
    let spawned = thread::Builder::new()
        .name(format!("kernel-stderr-{language}"))
        .spawn(move || {
            for line in BufReader::new(stderr).lines() {
                match line {
                    Ok(line) => debug!(
                        target: JUPYTER_TARGET,
                        kernel = language.kernel_name(),
                        "{line}"
                    ),
                    Err(_) => break,
                }
            }
        });
    if let Err(error) = spawned {
        warn!(
            target: JUPYTER_TARGET,
            kernel = language.kernel_name(),
            %error,
            "failed to forward kernel host stderr"
        );
    }
}
