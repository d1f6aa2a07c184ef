//! # Worker process launcher.
//!
//! The supervisor never touches process APIs directly; it goes through the [`Launcher`]
//! trait. [`OsLauncher`] is the production implementation:
//!
//! ```text
//! launch(spec) ─► <program> worker --slot N --mode M --heavy W:S --light W:S
//!                                  [--channel PATH] --status-ms MS
//! signal(pid)  ─► kill(pid, sig)          ESRCH → SpawnError::Gone
//! try_reap()   ─► waitpid(-1, WNOHANG)    one terminated child per call
//! ```
//!
//! ## Rules
//! - Workers are started with an explicit exec of a program (no fork of the supervisor).
//! - The child execs with [`worker_sigset`] blocked; the worker unblocks it after its
//!   listeners exist. Blocked signals survive exec and stay pending.
//! - The `std::process::Child` handle is dropped right away; reaping is done with
//!   `waitpid(-1)` so that every exited child is collected, including ones the
//!   supervisor no longer tracks.
//! - Only `Exited` and `Signaled` statuses are reported.

use std::fmt;
use std::io;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::Pid;

use crate::error::SpawnError;
use crate::mode::{Mode, ModeProfiles};
use crate::signals::{ControlSignal, worker_sigset};

/// Everything a worker process needs to know at launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub slot: usize,
    /// Initial mode (the supervisor's last broadcast mode).
    pub mode: Mode,
    pub profiles: ModeProfiles,
    /// Assignment segment to attach, if one exists.
    pub channel: Option<PathBuf>,
    pub status_every: Duration,
}

impl LaunchSpec {
    /// Command-line arguments of the `worker` subcommand.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            "worker".to_string(),
            "--slot".to_string(),
            self.slot.to_string(),
            "--mode".to_string(),
            self.mode.to_string(),
            "--heavy".to_string(),
            self.profiles.heavy.to_string(),
            "--light".to_string(),
            self.profiles.light.to_string(),
            "--status-ms".to_string(),
            self.status_every.as_millis().to_string(),
        ];
        if let Some(path) = &self.channel {
            args.push("--channel".to_string());
            args.push(path.display().to_string());
        }
        args
    }
}

/// How a reaped child terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitKind {
    Exited(i32),
    Signaled(Signal),
}

impl fmt::Display for ExitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitKind::Exited(code) => write!(f, "exited({code})"),
            ExitKind::Signaled(sig) => write!(f, "signaled({})", sig.as_str()),
        }
    }
}

/// Process operations used by the supervisor control loop.
pub trait Launcher: Send {
    /// Starts a worker process for `spec.slot` and returns its pid.
    fn launch(&mut self, spec: &LaunchSpec) -> Result<Pid, SpawnError>;

    /// Delivers a control signal; [`SpawnError::Gone`] when the process does not exist.
    fn signal(&mut self, pid: Pid, sig: ControlSignal) -> Result<(), SpawnError>;

    /// Collects one terminated child without blocking; `None` when nothing is pending.
    fn try_reap(&mut self) -> Option<(Pid, ExitKind)>;
}

/// Launches workers as real OS processes.
#[derive(Debug, Clone)]
pub struct OsLauncher {
    program: PathBuf,
}

impl OsLauncher {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Launcher re-executing the running binary.
    pub fn current_exe() -> io::Result<Self> {
        std::env::current_exe().map(Self::new)
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

impl Launcher for OsLauncher {
    fn launch(&mut self, spec: &LaunchSpec) -> Result<Pid, SpawnError> {
        let blocked = worker_sigset();
        let mut cmd = Command::new(&self.program);
        cmd.args(spec.to_args()).stdin(Stdio::null());
        // SAFETY: runs in the forked child before exec; only changes the signal mask.
        unsafe {
            cmd.pre_exec(move || blocked.thread_block().map_err(io::Error::from));
        }
        let child = cmd
            .spawn()
            .map_err(|source| SpawnError::Launch {
                slot: spec.slot,
                source,
            })?;
        let raw = i32::try_from(child.id()).map_err(|_| SpawnError::Launch {
            slot: spec.slot,
            source: io::Error::other("pid out of range"),
        })?;
        Ok(Pid::from_raw(raw))
    }

    fn signal(&mut self, pid: Pid, sig: ControlSignal) -> Result<(), SpawnError> {
        match kill(pid, sig.os_signal()) {
            Ok(()) => Ok(()),
            Err(Errno::ESRCH) => Err(SpawnError::Gone { pid: pid.as_raw() }),
            Err(errno) => Err(SpawnError::Signal {
                pid: pid.as_raw(),
                reason: errno.to_string(),
            }),
        }
    }

    fn try_reap(&mut self) -> Option<(Pid, ExitKind)> {
        loop {
            match waitpid(Pid::from_raw(-1), Some(WaitPidFlag::WNOHANG)) {
                Ok(WaitStatus::Exited(pid, code)) => return Some((pid, ExitKind::Exited(code))),
                Ok(WaitStatus::Signaled(pid, sig, _)) => {
                    return Some((pid, ExitKind::Signaled(sig)));
                }
                Ok(WaitStatus::StillAlive) => return None,
                Ok(_) => continue,
                Err(Errno::EINTR) => continue,
                // ECHILD: no children at all.
                Err(_) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mode::DutyProfile;

    #[test]
    fn args_carry_slot_mode_and_profiles() {
        let spec = LaunchSpec {
            slot: 3,
            mode: Mode::Light,
            profiles: ModeProfiles {
                heavy: DutyProfile::HEAVY,
                light: DutyProfile {
                    work_us: 1500,
                    sleep_us: 500,
                },
            },
            channel: Some(PathBuf::from("/dev/shm/dutyvisor-1")),
            status_every: Duration::from_millis(250),
        };
        let args = spec.to_args();
        assert_eq!(
            args,
            vec![
                "worker",
                "--slot",
                "3",
                "--mode",
                "light",
                "--heavy",
                "9000:1000",
                "--light",
                "1500:500",
                "--status-ms",
                "250",
                "--channel",
                "/dev/shm/dutyvisor-1",
            ]
        );
    }

    #[test]
    fn exit_kind_display() {
        assert_eq!(ExitKind::Exited(0).to_string(), "exited(0)");
        assert_eq!(
            ExitKind::Signaled(Signal::SIGKILL).to_string(),
            "signaled(SIGKILL)"
        );
    }

    #[test]
    fn signalling_a_missing_process_reports_gone() {
        let mut launcher = OsLauncher::new("/bin/true");
        // pid_max never reaches i32::MAX.
        let err = launcher
            .signal(Pid::from_raw(i32::MAX), ControlSignal::Terminate)
            .unwrap_err();
        assert!(matches!(err, SpawnError::Gone { .. }));
    }
}
