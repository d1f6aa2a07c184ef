//! # LogWriter: renders events as `tracing` records
//!
//! The diagnostic stream of the supervisor. Every [`Event`] becomes one structured
//! record under the `dutyvisor::supervisor` target; failures are `warn`/`error`,
//! everything else `info`.
//!
//! ## Example output (fmt layer)
//! ```text
//! INFO dutyvisor::supervisor: worker spawned slot=0 pid=4121 mode=heavy in_window=1
//! INFO dutyvisor::supervisor: worker exited slot=0 pid=4121 status=signaled(SIGKILL)
//! WARN dutyvisor::supervisor: restart refused slot=0 in_window=5
//! INFO dutyvisor::supervisor: mode broadcast mode=light workers=2
//! ```

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let reason = e.reason.as_deref().unwrap_or("");
        let mode = e.mode.map(|m| m.as_str()).unwrap_or("");
        match e.kind {
            EventKind::SupervisorStarted => {
                info!(target: "dutyvisor::supervisor", workers = e.count, channel = reason, "supervisor started");
            }
            EventKind::ShutdownRequested => {
                info!(target: "dutyvisor::supervisor", "shutdown requested");
            }
            EventKind::AllStoppedWithin => {
                info!(target: "dutyvisor::supervisor", "all workers stopped within grace");
            }
            EventKind::GraceExceeded => {
                warn!(target: "dutyvisor::supervisor", stuck = e.count, "grace exceeded");
            }
            EventKind::WorkerForceKilled => {
                warn!(target: "dutyvisor::supervisor", slot = e.slot, pid = e.pid, "worker force-killed");
            }
            EventKind::SupervisorStopped => {
                info!(target: "dutyvisor::supervisor", "shutdown complete");
            }
            EventKind::WorkerSpawned => {
                info!(target: "dutyvisor::supervisor", slot = e.slot, pid = e.pid, mode, in_window = e.count, "worker spawned");
            }
            EventKind::SpawnFailed => {
                error!(target: "dutyvisor::supervisor", slot = e.slot, err = reason, "worker launch failed");
            }
            EventKind::WorkerExited => {
                info!(target: "dutyvisor::supervisor", slot = e.slot, pid = e.pid, status = reason, "worker exited");
            }
            EventKind::RestartRefused => {
                warn!(target: "dutyvisor::supervisor", slot = e.slot, in_window = e.count, "restart refused");
            }
            EventKind::WorkerRetired => {
                info!(target: "dutyvisor::supervisor", slot = e.slot, pid = e.pid, "worker retired");
            }
            EventKind::ModeBroadcast => {
                info!(target: "dutyvisor::supervisor", mode, workers = e.count, "mode broadcast");
            }
            EventKind::SignalFailed => {
                warn!(target: "dutyvisor::supervisor", slot = e.slot, pid = e.pid, err = reason, "signal delivery failed");
            }
            EventKind::ReloadRequested => {
                info!(target: "dutyvisor::supervisor", "reload requested");
            }
            EventKind::ReloadApplied => {
                info!(target: "dutyvisor::supervisor", workers = e.count, "reload applied");
            }
            EventKind::ReloadFailed => {
                error!(target: "dutyvisor::supervisor", err = reason, "reload failed; keeping previous configuration");
            }
            EventKind::ChannelWritten => {
                info!(target: "dutyvisor::supervisor", entries = e.count, bytes = reason, "assignments written");
            }
            EventKind::ChannelRejected => {
                error!(target: "dutyvisor::supervisor", err = reason, "assignments rejected");
            }
            EventKind::SubscriberOverflow | EventKind::SubscriberPanicked => {
                warn!(target: "dutyvisor::supervisor", detail = reason, "subscriber problem");
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mode::Mode;

    #[tokio::test]
    async fn renders_events_with_and_without_metadata() {
        let w = LogWriter::new();
        w.on_event(&Event::new(EventKind::ShutdownRequested)).await;
        w.on_event(
            &Event::new(EventKind::WorkerSpawned)
                .with_slot(0)
                .with_pid(42)
                .with_mode(Mode::Light)
                .with_count(1),
        )
        .await;
        w.on_event(&Event::subscriber_overflow("log", "full")).await;
        assert_eq!(w.name(), "LogWriter");
    }
}
