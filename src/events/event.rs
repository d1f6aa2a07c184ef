//! # Runtime events emitted by the supervisor.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Worker lifecycle**: spawn, exit, restart refusal, retirement
//! - **Control**: mode broadcasts, reload outcome, signal delivery failures
//! - **Channel**: assignment table writes and rejections
//! - **Shutdown**: request, grace outcome, forced kills
//!
//! The [`Event`] struct carries metadata such as the slot index, pid, mode and a
//! human-readable reason.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//!
//! ## Example
//! ```rust
//! use dutyvisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::WorkerExited)
//!     .with_slot(1)
//!     .with_pid(4242)
//!     .with_reason("signaled(SIGKILL)");
//!
//! assert_eq!(ev.kind, EventKind::WorkerExited);
//! assert_eq!(ev.slot, Some(1));
//! assert_eq!(ev.reason.as_deref(), Some("signaled(SIGKILL)"));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

use crate::mode::Mode;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets:
    /// - `reason`: subscriber name and panic info
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets:
    /// - `reason`: subscriber name and reason ("full", "closed")
    SubscriberOverflow,

    // === Supervisor lifecycle ===
    /// Supervisor is up: channel created, signals installed.
    ///
    /// Sets:
    /// - `count`: configured worker count
    /// - `reason`: channel path
    SupervisorStarted,

    /// Shutdown requested (signal observed or explicit call).
    ShutdownRequested,

    /// All workers exited within the grace period.
    AllStoppedWithin,

    /// Grace period exceeded; `count` slots are being force-killed.
    ///
    /// Sets:
    /// - `count`: number of stuck slots
    GraceExceeded,

    /// A stuck worker received FORCE_KILL.
    ///
    /// Sets:
    /// - `slot`, `pid`
    WorkerForceKilled,

    /// Shutdown finished; channel released.
    SupervisorStopped,

    // === Worker lifecycle ===
    /// A worker process was launched for a slot.
    ///
    /// Sets:
    /// - `slot`, `pid`, `mode` (initial mode)
    /// - `count`: launches of this slot inside the restart window
    WorkerSpawned,

    /// The OS refused to launch a worker.
    ///
    /// Sets:
    /// - `slot`, `reason`
    SpawnFailed,

    /// A worker process was reaped.
    ///
    /// Sets:
    /// - `slot` (absent for unknown children), `pid`
    /// - `reason`: `exited(<code>)` or `signaled(<signal>)`
    WorkerExited,

    /// Restart-rate limit reached; the slot stays empty.
    ///
    /// Sets:
    /// - `slot`, `count` (launches in window)
    RestartRefused,

    /// Slot removed by a reload that shrank the pool.
    ///
    /// Sets:
    /// - `slot`, `pid`
    WorkerRetired,

    // === Control ===
    /// Mode transition broadcast to all live workers.
    ///
    /// Sets:
    /// - `mode`, `count` (workers signalled)
    ModeBroadcast,

    /// A control signal could not be delivered; the target was dropped if gone.
    ///
    /// Sets:
    /// - `slot`, `pid`, `reason`
    SignalFailed,

    /// Reload requested (SIGHUP or explicit call).
    ReloadRequested,

    /// Reload applied and propagated.
    ///
    /// Sets:
    /// - `count`: new worker count
    ReloadApplied,

    /// Reload aborted; previous configuration kept.
    ///
    /// Sets:
    /// - `reason`
    ReloadFailed,

    // === Channel ===
    /// Assignment table written to the channel.
    ///
    /// Sets:
    /// - `count`: entries, `reason`: byte size
    ChannelWritten,

    /// Assignment table rejected; previous content kept.
    ///
    /// Sets:
    /// - `reason`
    ChannelRejected,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Worker slot index, if applicable.
    pub slot: Option<usize>,
    /// OS process id, if applicable.
    pub pid: Option<i32>,
    /// Mode, for spawn and broadcast events.
    pub mode: Option<Mode>,
    /// Kind-specific counter (workers, launches in window, entries...).
    pub count: Option<u32>,
    /// Human-readable reason (errors, exit status, details).
    pub reason: Option<Arc<str>>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            slot: None,
            pid: None,
            mode: None,
            count: None,
            reason: None,
        }
    }

    /// Attaches a slot index.
    #[inline]
    pub fn with_slot(mut self, slot: usize) -> Self {
        self.slot = Some(slot);
        self
    }

    /// Attaches a process id.
    #[inline]
    pub fn with_pid(mut self, pid: i32) -> Self {
        self.pid = Some(pid);
        self
    }

    /// Attaches a mode.
    #[inline]
    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Attaches a counter (saturated to `u32::MAX`).
    #[inline]
    pub fn with_count(mut self, n: usize) -> Self {
        self.count = Some(u32::try_from(n).unwrap_or(u32::MAX));
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_reason(format!("subscriber={subscriber} info={info}"))
    }

    #[inline]
    pub fn is_subscriber_event(&self) -> bool {
        matches!(
            self.kind,
            EventKind::SubscriberOverflow | EventKind::SubscriberPanicked
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_is_monotonic() {
        let a = Event::new(EventKind::ReloadRequested);
        let b = Event::new(EventKind::ReloadApplied);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn builders_set_fields() {
        let ev = Event::new(EventKind::WorkerSpawned)
            .with_slot(2)
            .with_pid(99)
            .with_mode(Mode::Light)
            .with_count(usize::MAX);
        assert_eq!(ev.slot, Some(2));
        assert_eq!(ev.pid, Some(99));
        assert_eq!(ev.mode, Some(Mode::Light));
        assert_eq!(ev.count, Some(u32::MAX));
        assert!(!ev.is_subscriber_event());
        assert!(Event::subscriber_overflow("log", "full").is_subscriber_event());
    }
}
