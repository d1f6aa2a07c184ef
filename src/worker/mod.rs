//! # Worker process.
//!
//! A worker is one process of the pool, launched by the supervisor as
//! `dutyvisor worker --slot N ...`. It owns a [`DutyCycle`], applies its own scheduling
//! assignment and reacts to control signals.
//!
//! ## Lifecycle
//! ```text
//! Starting ─► install listeners (SIGTERM/SIGINT, SIGHUP, SIGUSR1, SIGUSR2)
//!          ─► unblock them (the launcher execs the worker with them blocked)
//!          ─► duty thread: attach channel (best-effort), read own entry, apply
//! Running  ─► DutyCycle::run
//!               SIGUSR1/2 → flags.mode         (next cycle)
//!               SIGHUP    → flags.reload       (re-read entry, re-apply)
//!               SIGTERM   → flags.terminate
//! Stopping ─► channel handle dropped, final tick count logged
//! Exited   ─► exit status 0
//! ```
//!
//! ## Rules
//! - Listeners only set flags; all work happens on the duty thread.
//! - Signals sent before the listeners exist stay pending and are handled afterwards.
//! - Niceness and affinity are per-thread on Linux; a refresh applies them to every
//!   thread of the process.
//! - Channel and scheduling errors are logged and never stop the worker; the previously
//!   applied attributes stay in effect.

mod duty;
mod flags;

pub use duty::{DutyCycle, SLEEP_SLICE, TickReport};
pub use flags::WorkerFlags;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::signal::unix::{SignalKind, signal};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::channel::{Assignment, AssignmentReader};
use crate::error::RuntimeError;
use crate::mode::{Mode, ModeProfiles};
use crate::sched;
use crate::signals::worker_sigset;

/// Launch parameters of a worker (mirrors the `worker` subcommand).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerArgs {
    pub slot: usize,
    pub mode: Mode,
    pub profiles: ModeProfiles,
    pub channel: Option<PathBuf>,
    pub status_every: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerPhase {
    Starting,
    Running,
    Stopping,
    Exited,
}

impl fmt::Display for WorkerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WorkerPhase::Starting => "starting",
            WorkerPhase::Running => "running",
            WorkerPhase::Stopping => "stopping",
            WorkerPhase::Exited => "exited",
        })
    }
}

/// Best-effort view of this worker's own slot in the assignment channel.
pub struct OwnAssignment {
    slot: usize,
    reader: Option<AssignmentReader>,
    applied: Assignment,
}

impl OwnAssignment {
    /// Attaches to `channel`; a missing or unreadable segment means "no attributes".
    pub fn attach(slot: usize, channel: Option<PathBuf>) -> Self {
        let reader = channel.and_then(|path| match AssignmentReader::attach(&path) {
            Ok(r) => Some(r),
            Err(e) => {
                warn!(target: "dutyvisor::worker", slot, err = %e, "assignment channel unavailable");
                None
            }
        });
        Self {
            slot,
            reader,
            applied: Assignment::default(),
        }
    }

    /// Last assignment read successfully.
    pub fn applied(&self) -> &Assignment {
        &self.applied
    }

    /// Re-reads the own entry and applies it to every thread of the process.
    ///
    /// A parse failure (torn read, garbage) keeps the previous assignment.
    pub fn refresh(&mut self) {
        let Some(reader) = &self.reader else {
            return;
        };
        let entry = match reader.read_entry(self.slot) {
            Ok(entry) => entry.unwrap_or_default(),
            Err(e) => {
                warn!(target: "dutyvisor::worker", slot = self.slot, err = %e, "cannot read assignment; keeping previous");
                return;
            }
        };

        let report = sched::apply_process(&entry);
        for (attr, err) in report.errors() {
            warn!(target: "dutyvisor::worker", slot = self.slot, attr, err = %err, label = err.as_label(), "cannot apply scheduling attribute");
        }
        self.applied = entry;
    }
}

/// Registers the worker's signal streams; listeners only flip `flags`.
fn install_listeners(
    flags: Arc<WorkerFlags>,
    token: CancellationToken,
) -> std::io::Result<JoinHandle<()>> {
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sighup = signal(SignalKind::hangup())?;
    let mut sigusr1 = signal(SignalKind::user_defined1())?;
    let mut sigusr2 = signal(SignalKind::user_defined2())?;

    Ok(tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = sigterm.recv() => flags.request_terminate(),
                _ = sigint.recv() => flags.request_terminate(),
                _ = sighup.recv() => flags.request_reload(),
                _ = sigusr1.recv() => flags.set_mode(Mode::Light),
                _ = sigusr2.recv() => flags.set_mode(Mode::Heavy),
            }
        }
    }))
}

/// Runs a worker until TERMINATE; returns the number of completed duty cycles.
///
/// Must be called inside a tokio runtime.
pub async fn run_worker(args: WorkerArgs) -> Result<u64, RuntimeError> {
    let slot = args.slot;
    let pid = std::process::id();
    info!(target: "dutyvisor::worker", slot, pid, mode = %args.mode, phase = %WorkerPhase::Starting, "worker starting");

    let flags = Arc::new(WorkerFlags::new(args.mode));
    let token = CancellationToken::new();
    let listeners =
        install_listeners(Arc::clone(&flags), token.clone()).map_err(RuntimeError::Signals)?;
    worker_sigset()
        .thread_unblock()
        .map_err(|errno| RuntimeError::Signals(errno.into()))?;

    let duty_flags = Arc::clone(&flags);
    let duty = tokio::task::spawn_blocking(move || {
        let mut own = OwnAssignment::attach(slot, args.channel);
        own.refresh();
        info!(target: "dutyvisor::worker", slot, pid, phase = %WorkerPhase::Running, "worker running");

        let mut cycle = DutyCycle::new(args.profiles, duty_flags, args.status_every);
        cycle.run(
            || own.refresh(),
            |r| {
                let cpus = r
                    .sched
                    .cpus
                    .as_ref()
                    .map(|s| format!("{s:?}"))
                    .unwrap_or_else(|| "?".into());
                info!(
                    target: "dutyvisor::worker",
                    slot,
                    pid,
                    tick = r.ticks,
                    mode = %r.mode,
                    work_us = r.profile.work_us,
                    sleep_us = r.profile.sleep_us,
                    nice = r.sched.nice,
                    affinity = %cpus,
                    cpu = r.sched.cpu,
                    "status"
                );
            },
        )
    });

    let ticks = match duty.await {
        Ok(ticks) => ticks,
        Err(e) => {
            warn!(target: "dutyvisor::worker", slot, err = %e, "duty thread failed");
            0
        }
    };

    info!(target: "dutyvisor::worker", slot, pid, phase = %WorkerPhase::Stopping, ticks, "worker stopping");
    token.cancel();
    let _ = listeners.await;
    info!(target: "dutyvisor::worker", slot, pid, phase = %WorkerPhase::Exited, ticks, "worker exited");
    Ok(ticks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{AssignmentChannel, AssignmentTable};
    use nix::unistd::Pid;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn missing_channel_means_no_attributes() {
        let dir = tempdir().unwrap();
        let mut own = OwnAssignment::attach(0, Some(dir.path().join("absent")));
        own.refresh();
        assert!(own.applied().is_empty());

        let mut own = OwnAssignment::attach(0, None);
        own.refresh();
        assert!(own.applied().is_empty());
    }

    #[test]
    fn garbage_keeps_previous_assignment() {
        let dir = tempdir().unwrap();
        let mut chan = AssignmentChannel::create(dir.path(), "seg", 4096).unwrap();
        // Raising niceness by 0 is always permitted.
        let current = sched::current_nice(Pid::from_raw(0)).unwrap_or(0);
        chan.write(&AssignmentTable::new(vec![Assignment {
            nice: Some(current),
            cpus: None,
        }]))
        .unwrap();

        let mut own = OwnAssignment::attach(0, Some(chan.path().to_path_buf()));
        own.refresh();
        assert_eq!(own.applied().nice, Some(current));

        // Overwrite in place; truncating a mapped file would fault the reader.
        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .open(chan.path())
            .unwrap();
        file.write_all(b"{not json").unwrap();
        drop(file);
        own.refresh();
        assert_eq!(own.applied().nice, Some(current));
    }

    #[test]
    fn phase_names() {
        assert_eq!(WorkerPhase::Stopping.to_string(), "stopping");
    }
}
