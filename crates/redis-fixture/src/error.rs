use core::fmt;
use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;

/// Coarse classification of [`Error`], stable for callers matching on failure causes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The server executable is missing from the environment.
    Environment,
    /// The temporary workspace could not be prepared.
    Provisioning,
    /// The server process could not be started.
    Launch,
    /// The server never answered the liveness probe.
    Readiness,
    /// The server did not shut down cleanly.
    Shutdown,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("did not find `{executable}` installed")]
    ExecutableNotFound { executable: String },
    #[error("failed to {step}")]
    Provision {
        step: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("failed to start {}", program.display())]
    Launch {
        program: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Startup(Box<StartupError>),
    #[error(transparent)]
    Shutdown(#[from] ShutdownError),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::ExecutableNotFound { .. } => ErrorKind::Environment,
            Error::Provision { .. } => ErrorKind::Provisioning,
            Error::Launch { .. } => ErrorKind::Launch,
            Error::Startup(error) => match error.phase() {
                StartupPhase::Launch => ErrorKind::Launch,
                StartupPhase::Readiness => ErrorKind::Readiness,
            },
            Error::Shutdown(_) => ErrorKind::Shutdown,
        }
    }

    /// Returns the startup diagnostics when the failure happened after the process was spawned.
    pub fn as_startup(&self) -> Option<&StartupError> {
        match self {
            Error::Startup(error) => Some(error),
            _ => None,
        }
    }
}

impl From<StartupError> for Error {
    fn from(error: StartupError) -> Self {
        Self::Startup(Box::new(error))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ShutdownError {
    #[error("failed to interrupt the server process")]
    Interrupt(#[source] io::Error),
    #[error("failed to wait for the server process")]
    Wait(#[source] io::Error),
    #[error("server process exited unsuccessfully ({0})")]
    Exit(ExitStatus),
}

/// Step at which a spawned server process was given up on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupPhase {
    Launch,
    Readiness,
}

/// Failure of a server that was already running.
///
/// By the time this value exists the process has been interrupted and reaped, and both of its
/// output streams have been read to the end. Everything the server printed is kept here so the
/// error alone is enough to understand what went wrong.
pub struct StartupError {
    phase: StartupPhase,
    what: &'static str,
    cause: Box<dyn core::error::Error + Send + Sync>,
    exit_status: Option<ExitStatus>,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

impl StartupError {
    pub(crate) fn new(
        phase: StartupPhase,
        what: &'static str,
        cause: Box<dyn core::error::Error + Send + Sync>,
        exit_status: Option<ExitStatus>,
        stdout: Vec<u8>,
        stderr: Vec<u8>,
    ) -> Self {
        Self {
            phase,
            what,
            cause,
            exit_status,
            stdout,
            stderr,
        }
    }

    pub fn phase(&self) -> StartupPhase {
        self.phase
    }

    /// Short description of the step that failed.
    pub fn what(&self) -> &'static str {
        self.what
    }

    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.exit_status
    }

    /// Everything the server wrote on its standard output.
    pub fn stdout(&self) -> &[u8] {
        &self.stdout
    }

    /// Everything the server wrote on its standard error.
    pub fn stderr(&self) -> &[u8] {
        &self.stderr
    }
}

impl fmt::Display for StartupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}\nOUT: {}\nERR: {}",
            self.what,
            self.cause,
            String::from_utf8_lossy(&self.stdout),
            String::from_utf8_lossy(&self.stderr),
        )
    }
}

impl fmt::Debug for StartupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StartupError")
            .field("phase", &self.phase)
            .field("what", &self.what)
            .field("cause", &self.cause)
            .field("exit_status", &self.exit_status)
            .field("stdout", &String::from_utf8_lossy(&self.stdout))
            .field("stderr", &String::from_utf8_lossy(&self.stderr))
            .finish()
    }
}

impl core::error::Error for StartupError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        Some(self.cause.as_ref())
    }
}
