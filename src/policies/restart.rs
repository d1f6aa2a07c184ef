//! # Restart-rate limiting for worker slots.
//!
//! [`RestartWindow`] is a sliding window of launch timestamps for one slot;
//! [`RestartLimiter`] keeps one window per slot index.
//!
//! ## Semantics
//! ```text
//! allow(slot, now):
//!   ├─► prune entries with now - t > window
//!   ├─► len < max ─► push(now), true
//!   └─► otherwise  ─► false (nothing recorded)
//! ```
//!
//! ## Rules
//! - Pruning is lazy: it only happens inside `allow` / `in_window`.
//! - One entry is recorded per **allowed** launch; refusals are free.
//! - Windows are keyed by slot index and outlive the slot's registry entry, so a slot that
//!   was dropped for exhausting its budget is still throttled when reconsidered.
//! - Only the supervisor control loop touches the limiter; no locking.
//!
//! ## Defaults
//! `window = 30s`, `max_restarts = 5`.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

/// Sliding window of launch timestamps for one slot.
#[derive(Debug, Clone)]
pub struct RestartWindow {
    window: Duration,
    max: usize,
    history: VecDeque<Instant>,
}

impl RestartWindow {
    pub fn new(window: Duration, max: usize) -> Self {
        Self {
            window,
            max,
            history: VecDeque::with_capacity(max),
        }
    }

    fn prune(&mut self, now: Instant) {
        while let Some(&front) = self.history.front() {
            if now.saturating_duration_since(front) > self.window {
                self.history.pop_front();
            } else {
                break;
            }
        }
    }

    /// Records `now` and returns true iff fewer than `max` launches remain in the window.
    pub fn allow(&mut self, now: Instant) -> bool {
        self.prune(now);
        if self.history.len() < self.max {
            self.history.push_back(now);
            true
        } else {
            false
        }
    }

    /// Launches still inside the window at `now`.
    pub fn in_window(&mut self, now: Instant) -> usize {
        self.prune(now);
        self.history.len()
    }

    /// Ordered launch timestamps currently recorded.
    pub fn history(&self) -> impl Iterator<Item = &Instant> {
        self.history.iter()
    }

    /// Updates limits; the recorded history is kept.
    pub fn set_limits(&mut self, window: Duration, max: usize) {
        self.window = window;
        self.max = max;
    }
}

/// Per-slot restart limiter.
#[derive(Debug, Clone)]
pub struct RestartLimiter {
    window: Duration,
    max: usize,
    slots: HashMap<usize, RestartWindow>,
}

impl RestartLimiter {
    /// Default window duration.
    pub const DEFAULT_WINDOW: Duration = Duration::from_secs(30);
    /// Default launches per window.
    pub const DEFAULT_MAX: usize = 5;

    pub fn new(window: Duration, max: usize) -> Self {
        Self {
            window,
            max,
            slots: HashMap::new(),
        }
    }

    /// See [`RestartWindow::allow`].
    pub fn allow(&mut self, slot: usize) -> bool {
        self.allow_at(slot, Instant::now())
    }

    /// [`RestartLimiter::allow`] with an explicit clock reading.
    pub fn allow_at(&mut self, slot: usize, now: Instant) -> bool {
        let (window, max) = (self.window, self.max);
        self.slots
            .entry(slot)
            .or_insert_with(|| RestartWindow::new(window, max))
            .allow(now)
    }

    /// Launches of `slot` inside the window at `now`.
    pub fn in_window(&mut self, slot: usize, now: Instant) -> usize {
        self.slots
            .get_mut(&slot)
            .map_or(0, |w| w.in_window(now))
    }

    /// Applies new limits to all existing and future windows.
    pub fn set_limits(&mut self, window: Duration, max: usize) {
        self.window = window;
        self.max = max;
        for w in self.slots.values_mut() {
            w.set_limits(window, max);
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn max_restarts(&self) -> usize {
        self.max
    }
}

impl Default for RestartLimiter {
    fn default() -> Self {
        Self::new(Self::DEFAULT_WINDOW, Self::DEFAULT_MAX)
    }
}
