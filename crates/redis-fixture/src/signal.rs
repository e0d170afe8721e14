//! Control signals delivered to the server process.
//!
//! Suspension relies on job-control signals: a stopped process is not scheduled at all, which from
//! the outside is indistinguishable from a hung server.

use std::io;

use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ControlSignal {
    /// Ask for a graceful shutdown.
    Interrupt,
    /// Stop scheduling the process without terminating it.
    Suspend,
    /// Undo [`ControlSignal::Suspend`].
    Resume,
}

impl ControlSignal {
    fn as_signal(self) -> Signal {
        match self {
            ControlSignal::Interrupt => Signal::SIGINT,
            ControlSignal::Suspend => Signal::SIGSTOP,
            ControlSignal::Resume => Signal::SIGCONT,
        }
    }
}

/// Delivers `signal` to the process itself, not to its process group.
pub(crate) fn send(pid: u32, signal: ControlSignal) -> io::Result<()> {
    let pid = i32::try_from(pid).map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
    kill(Pid::from_raw(pid), signal.as_signal())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signals_map_to_job_control() {
        assert_eq!(ControlSignal::Interrupt.as_signal(), Signal::SIGINT);
        assert_eq!(ControlSignal::Suspend.as_signal(), Signal::SIGSTOP);
        assert_eq!(ControlSignal::Resume.as_signal(), Signal::SIGCONT);
    }

    #[test]
    fn out_of_range_pid_is_rejected() {
        let error = send(u32::MAX, ControlSignal::Resume).unwrap_err();
        assert_eq!(error.kind(), io::ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn suspend_and_resume_a_child() {
        let mut child = tokio::process::Command::new("sleep")
            .arg("30")
            .kill_on_drop(true)
            .spawn()
            .unwrap();
        let pid = child.id().unwrap();

        send(pid, ControlSignal::Suspend).unwrap();
        send(pid, ControlSignal::Resume).unwrap();
        send(pid, ControlSignal::Interrupt).unwrap();

        let status = child.wait().await.unwrap();
        assert!(!status.success());
    }
}
