//! # Control-signal protocol between supervisor and workers.
//!
//! | Control        | OS signal | Supervisor reaction                | Worker reaction            |
//! |----------------|-----------|------------------------------------|----------------------------|
//! | `Terminate`    | `SIGTERM` | graceful shutdown (also `SIGINT`)  | finish slice, exit 0       |
//! | `Reload`       | `SIGHUP`  | reload config + propagate          | re-read own assignment     |
//! | `ModeLight`    | `SIGUSR1` | broadcast to workers               | switch to light            |
//! | `ModeHeavy`    | `SIGUSR2` | broadcast to workers               | switch to heavy            |
//! | `ChildExited`  | `SIGCHLD` | reap                               | –                          |
//! | `ForceKill`    | `SIGKILL` | –                                  | unconditional termination  |
//!
//! Reception uses [`tokio::signal::unix`] streams; a listener only raises a flag and the
//! owning loop does the actual work.
//!
//! A worker is exec'ed with [`worker_sigset`] blocked and unblocks it once its listeners
//! are registered, so a control signal sent right after launch stays pending instead of
//! hitting the default (terminating) disposition.

use std::fmt;

use nix::sys::signal::{SigSet, Signal};

use crate::mode::Mode;

/// Control messages of the supervisor/worker protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlSignal {
    Terminate,
    Reload,
    ModeLight,
    ModeHeavy,
    ChildExited,
    ForceKill,
}

impl ControlSignal {
    /// OS signal carrying this control message.
    pub fn os_signal(self) -> Signal {
        match self {
            ControlSignal::Terminate => Signal::SIGTERM,
            ControlSignal::Reload => Signal::SIGHUP,
            ControlSignal::ModeLight => Signal::SIGUSR1,
            ControlSignal::ModeHeavy => Signal::SIGUSR2,
            ControlSignal::ChildExited => Signal::SIGCHLD,
            ControlSignal::ForceKill => Signal::SIGKILL,
        }
    }

    /// Control message for a mode transition.
    pub fn for_mode(mode: Mode) -> Self {
        match mode {
            Mode::Heavy => ControlSignal::ModeHeavy,
            Mode::Light => ControlSignal::ModeLight,
        }
    }

    /// Mode carried by a mode transition, if any.
    pub fn mode(self) -> Option<Mode> {
        match self {
            ControlSignal::ModeHeavy => Some(Mode::Heavy),
            ControlSignal::ModeLight => Some(Mode::Light),
            _ => None,
        }
    }

    /// Stable snake_case name for logs.
    pub fn as_str(self) -> &'static str {
        match self {
            ControlSignal::Terminate => "terminate",
            ControlSignal::Reload => "reload",
            ControlSignal::ModeLight => "mode_light",
            ControlSignal::ModeHeavy => "mode_heavy",
            ControlSignal::ChildExited => "child_exited",
            ControlSignal::ForceKill => "force_kill",
        }
    }
}

/// Signals a worker handles itself: TERMINATE (and `SIGINT`), RELOAD and both modes.
pub fn worker_sigset() -> SigSet {
    let mut set = SigSet::empty();
    for sig in [
        Signal::SIGTERM,
        Signal::SIGINT,
        Signal::SIGHUP,
        Signal::SIGUSR1,
        Signal::SIGUSR2,
    ] {
        set.add(sig);
    }
    set
}

impl fmt::Display for ControlSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.as_str(), self.os_signal())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_signals_roundtrip() {
        for mode in [Mode::Heavy, Mode::Light] {
            assert_eq!(ControlSignal::for_mode(mode).mode(), Some(mode));
        }
        assert_eq!(ControlSignal::Reload.mode(), None);
    }

    #[test]
    fn signal_mapping_matches_protocol() {
        assert_eq!(ControlSignal::Terminate.os_signal(), Signal::SIGTERM);
        assert_eq!(ControlSignal::Reload.os_signal(), Signal::SIGHUP);
        assert_eq!(ControlSignal::ModeLight.os_signal(), Signal::SIGUSR1);
        assert_eq!(ControlSignal::ModeHeavy.os_signal(), Signal::SIGUSR2);
        assert_eq!(ControlSignal::ChildExited.os_signal(), Signal::SIGCHLD);
        assert_eq!(ControlSignal::ForceKill.os_signal(), Signal::SIGKILL);
        assert_eq!(ControlSignal::ModeLight.to_string(), "mode_light(SIGUSR1)");
    }

    #[test]
    fn worker_set_covers_handled_signals_only() {
        let set = worker_sigset();
        for sig in [
            ControlSignal::Terminate,
            ControlSignal::Reload,
            ControlSignal::ModeLight,
            ControlSignal::ModeHeavy,
        ] {
            assert!(set.contains(sig.os_signal()), "{sig} missing");
        }
        assert!(set.contains(Signal::SIGINT));
        assert!(!set.contains(Signal::SIGCHLD));
        assert!(!set.contains(Signal::SIGKILL));
    }
}
