use std::io;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt as _};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

use crate::error::{Error, ShutdownError, StartupError, StartupPhase};
use crate::signal::{self, ControlSignal};

/// How long a failed server gets to exit after being interrupted before it is killed.
const ABORT_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// How long to wait for the output pipes to reach end-of-file once the server exited.
const DRAIN_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Bytes kept per output stream. Older output is discarded, the tail is what explains a failure.
const CAPTURE_LIMIT: usize = 64 * 1024;

/// A running server process with both output streams captured.
#[derive(Debug)]
pub(crate) struct ServerProcess {
    child: Child,
    stdout: Capture,
    stderr: Capture,
}

impl ServerProcess {
    /// Spawns `program` with `config` as its sole argument.
    ///
    /// Returns as soon as the process is started, readiness is checked separately.
    pub(crate) async fn spawn(program: &Path, config: &Path) -> Result<Self, Error> {
        let mut child = Command::new(program)
            .arg(config)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| Error::Launch {
                program: program.to_owned(),
                source,
            })?;

        debug!(pid = child.id(), program = %program.display(), "Spawned server process");

        let stdout = child.stdout.take().map(|stream| Capture::start(stream, "stdout"));
        let stderr = child.stderr.take().map(|stream| Capture::start(stream, "stderr"));

        match (stdout, stderr) {
            (Some(stdout), Some(stderr)) => Ok(Self { child, stdout, stderr }),
            (stdout, stderr) => {
                let process = Self {
                    child,
                    stdout: stdout.unwrap_or_else(Capture::empty),
                    stderr: stderr.unwrap_or_else(Capture::empty),
                };

                Err(process
                    .abort(
                        StartupPhase::Launch,
                        "Failed to start Redis",
                        io::Error::other("output stream is not captured").into(),
                    )
                    .await)
            }
        }
    }

    /// `None` once the process has been reaped.
    pub(crate) fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    /// Delivers `signal`, doing nothing if the process was already reaped.
    pub(crate) fn signal(&self, signal: ControlSignal) -> io::Result<()> {
        match self.pid() {
            Some(pid) => {
                trace!(pid, ?signal, "Send signal");
                signal::send(pid, signal)
            }
            None => Ok(()),
        }
    }

    /// Exit status, if the process already exited.
    pub(crate) fn try_exit_status(&mut self) -> Option<ExitStatus> {
        self.child.try_wait().ok().flatten()
    }

    /// Interrupts the process, reaps it and closes the captured streams.
    pub(crate) async fn shutdown(mut self) -> Result<(), ShutdownError> {
        let result = self.interrupt_and_wait().await;

        self.stdout.close();
        self.stderr.close();

        result
    }

    async fn interrupt_and_wait(&mut self) -> Result<(), ShutdownError> {
        self.signal(ControlSignal::Interrupt).map_err(ShutdownError::Interrupt)?;

        let status = self.child.wait().await.map_err(ShutdownError::Wait)?;

        if status.success() {
            Ok(())
        } else {
            Err(ShutdownError::Exit(status))
        }
    }

    /// Tears down a server that failed to start and turns `cause` into a self-contained diagnostic.
    ///
    /// Shutdown is best-effort: failures to interrupt or wait are ignored, and a process ignoring
    /// the interrupt is killed after a grace period. The error embeds everything the process wrote.
    pub(crate) async fn abort(
        mut self,
        phase: StartupPhase,
        what: &'static str,
        cause: Box<dyn core::error::Error + Send + Sync>,
    ) -> Error {
        if let Err(error) = self.signal(ControlSignal::Interrupt) {
            debug!(%error, "Couldn't interrupt server process");
        }

        let exit_status = match tokio::time::timeout(ABORT_GRACE_PERIOD, self.child.wait()).await {
            Ok(Ok(status)) => Some(status),
            Ok(Err(error)) => {
                debug!(%error, "Couldn't wait for server process");
                None
            }
            Err(_) => {
                warn!(
                    grace_period = ?ABORT_GRACE_PERIOD,
                    "Server process ignored the interrupt; killing it"
                );
                let _ = self.child.start_kill();
                self.child.wait().await.ok()
            }
        };

        let stdout = self.stdout.collect().await;
        let stderr = self.stderr.collect().await;

        StartupError::new(phase, what, cause, exit_status, stdout, stderr).into()
    }
}

/// Background reader keeping the last [`CAPTURE_LIMIT`] bytes written to one output stream.
///
/// Reading continuously keeps a chatty server from blocking on a full pipe, for as long as the
/// server runs.
#[derive(Debug)]
struct Capture {
    buffer: Arc<Mutex<Vec<u8>>>,
    task: JoinHandle<()>,
}

impl Capture {
    fn start<R>(mut stream: R, name: &'static str) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buffer = Arc::new(Mutex::new(Vec::new()));

        let task = tokio::spawn({
            let buffer = Arc::clone(&buffer);

            async move {
                let mut chunk = [0; 4096];

                loop {
                    match stream.read(&mut chunk).await {
                        Ok(0) => break,
                        Ok(n) => keep_tail(&mut buffer.lock(), &chunk[..n], CAPTURE_LIMIT),
                        Err(error) => {
                            debug!(%error, stream = name, "Output capture interrupted");
                            break;
                        }
                    }
                }
            }
        });

        Self { buffer, task }
    }

    fn empty() -> Self {
        Self {
            buffer: Arc::default(),
            task: tokio::spawn(async {}),
        }
    }

    /// Waits for end-of-file and returns the retained output.
    async fn collect(mut self) -> Vec<u8> {
        if tokio::time::timeout(DRAIN_GRACE_PERIOD, &mut self.task).await.is_err() {
            debug!("Output stream still open after the process exited");
            self.task.abort();
        }

        core::mem::take(&mut *self.buffer.lock())
    }

    /// Stops reading, closing the pipe.
    fn close(self) {
        self.task.abort();
    }
}

fn keep_tail(buffer: &mut Vec<u8>, chunk: &[u8], limit: usize) {
    if chunk.len() >= limit {
        buffer.clear();
        buffer.extend_from_slice(&chunk[chunk.len() - limit..]);
        return;
    }

    let overflow = (buffer.len() + chunk.len()).saturating_sub(limit);
    buffer.drain(..overflow);
    buffer.extend_from_slice(chunk);
}
