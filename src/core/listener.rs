//! # OS signal listeners for the supervisor.
//!
//! Provides [`install`], which registers one tokio signal stream per control signal and
//! spawns a task that turns every delivery into a flag on [`PendingEvents`].
//!
//! ## Signals
//! - `SIGTERM`, `SIGINT` → shutdown
//! - `SIGHUP` → reload
//! - `SIGUSR1` / `SIGUSR2` → light / heavy mode
//! - `SIGCHLD` → reap
//!
//! ## Rules
//! - Registration happens synchronously, so a signal sent right after `install` returns
//!   is never lost.
//! - The listener task does nothing but raise flags; it stops when `token` is cancelled.

use std::sync::Arc;

use tokio::signal::unix::{SignalKind, signal};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::core::pending::PendingEvents;
use crate::mode::Mode;

/// Registers the supervisor's signal streams and spawns the flag-raising task.
///
/// Returns `Err` if any registration fails. Must be called inside a tokio runtime.
pub fn install(
    pending: Arc<PendingEvents>,
    token: CancellationToken,
) -> std::io::Result<JoinHandle<()>> {
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sighup = signal(SignalKind::hangup())?;
    let mut sigusr1 = signal(SignalKind::user_defined1())?;
    let mut sigusr2 = signal(SignalKind::user_defined2())?;
    let mut sigchld = signal(SignalKind::child())?;

    Ok(tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = sigterm.recv() => pending.request_shutdown(),
                _ = sigint.recv() => pending.request_shutdown(),
                _ = sighup.recv() => pending.request_reload(),
                _ = sigusr1.recv() => pending.request_mode(Mode::Light),
                _ = sigusr2.recv() => pending.request_mode(Mode::Heavy),
                _ = sigchld.recv() => pending.child_exited(),
            }
        }
    }))
}
