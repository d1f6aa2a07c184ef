//! # Supervisor runtime configuration.
//!
//! Provides [`SupervisorConfig`], the knobs of the control loop itself. What the pool
//! runs (worker count, duty profiles, assignments) lives in the workload document
//! ([`WorkloadConfig`](crate::WorkloadConfig)); this struct describes *how* the supervisor
//! runs it.
//!
//! ## Sentinel values
//! - `grace = 0s` → no wait, stuck workers are force-killed immediately
//! - `status_every = 0s` → workers emit a status record every cycle
//! - `worker_program = None` → workers are launched from the current executable

use std::path::PathBuf;
use std::time::Duration;

use crate::channel::DEFAULT_CAPACITY;
use crate::config::WorkloadConfig;
use crate::policies::RestartLimiter;

/// Runtime configuration for the supervisor.
///
/// ## Field semantics
/// - `grace`: maximum wait between TERMINATE and FORCE_KILL during shutdown
/// - `poll_interval`: upper bound on the control loop's sleep between passes
/// - `restart_window` / `max_restarts`: defaults of the restart limiter, overridden by
///   the workload document's `restart_limit`
/// - `channel_dir` / `channel_capacity`: where and how large the assignment segment is
/// - `bus_capacity`: event bus ring buffer size (min 1; clamped by Bus)
/// - `status_every`: interval of the workers' status records
/// - `worker_program`: executable launched for every worker
///
/// ## Notes
/// All fields are public. Prefer the helper accessors to sprinkling sentinel checks.
#[derive(Clone, Debug)]
pub struct SupervisorConfig {
    /// Maximum time to wait for workers to exit after TERMINATE.
    ///
    /// Every slot still occupied after the deadline receives FORCE_KILL once and
    /// `shutdown` returns `RuntimeError::GraceExceeded`.
    pub grace: Duration,

    /// Maximum sleep of the control loop between two passes.
    ///
    /// The loop also wakes up immediately whenever a signal raises a pending flag.
    pub poll_interval: Duration,

    /// Default sliding window of the restart limiter.
    pub restart_window: Duration,

    /// Default number of launches allowed per slot inside `restart_window`.
    pub max_restarts: usize,

    /// Directory holding the assignment segment (POSIX shm filesystem by default).
    pub channel_dir: PathBuf,

    /// Size of the assignment segment in bytes.
    pub channel_capacity: usize,

    /// Capacity of the event bus broadcast channel ring buffer.
    pub bus_capacity: usize,

    /// Interval between worker status records.
    pub status_every: Duration,

    /// Program launched for workers (`<program> worker --slot ...`).
    pub worker_program: Option<PathBuf>,
}

impl SupervisorConfig {
    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    /// Restart limits effective for `workload`: the document's override, else defaults.
    pub fn restart_limits(&self, workload: &WorkloadConfig) -> (Duration, usize) {
        match workload.restart_limit {
            Some(limit) => (limit.window(), limit.count),
            None => (self.restart_window, self.max_restarts),
        }
    }
}

impl Default for SupervisorConfig {
    /// Default configuration:
    ///
    /// - `grace = 5s`
    /// - `poll_interval = 500ms`
    /// - `restart_window = 30s`, `max_restarts = 5`
    /// - `channel_dir = /dev/shm`, `channel_capacity = 64 KiB`
    /// - `bus_capacity = 1024`
    /// - `status_every = 1s`
    /// - `worker_program = None` (current executable)
    fn default() -> Self {
        Self {
            grace: Duration::from_secs(5),
            poll_interval: Duration::from_millis(500),
            restart_window: RestartLimiter::DEFAULT_WINDOW,
            max_restarts: RestartLimiter::DEFAULT_MAX,
            channel_dir: PathBuf::from("/dev/shm"),
            channel_capacity: DEFAULT_CAPACITY,
            bus_capacity: 1024,
            status_every: Duration::from_secs(1),
            worker_program: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RestartLimit;

    #[test]
    fn document_limit_overrides_defaults() {
        let cfg = SupervisorConfig::default();
        let mut doc = WorkloadConfig::with_workers(2);
        assert_eq!(cfg.restart_limits(&doc), (Duration::from_secs(30), 5));

        doc.restart_limit = Some(RestartLimit {
            count: 2,
            window_seconds: 10,
        });
        assert_eq!(cfg.restart_limits(&doc), (Duration::from_secs(10), 2));
    }

    #[test]
    fn bus_capacity_is_clamped() {
        let cfg = SupervisorConfig {
            bus_capacity: 0,
            ..SupervisorConfig::default()
        };
        assert_eq!(cfg.bus_capacity_clamped(), 1);
    }
}
