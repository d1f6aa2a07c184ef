//! # Worker registry: slot index → live process.
//!
//! The registry is plain single-owner data on the supervisor control loop (no locks).
//!
//! ## Architecture
//! ```text
//! spawn(slot) ──► occupy(slot, pid)      slot created or refilled, launches += 1
//! reap(pid)   ──► release_pid(pid)       pid cleared, slot kept (restart decision next)
//! refused     ──► remove(slot)           slot dropped (history stays in the limiter)
//! shrink      ──► remove(slot)           TERMINATE sent, slot dropped
//! ```
//!
//! ## Rules
//! - Exactly one [`WorkerSlot`] per index.
//! - `occupy` refuses a slot that still holds a live pid; two live pids for one index
//!   never coexist.
//! - Restart history is **not** stored here.

use std::collections::BTreeMap;
use std::time::Instant;

use nix::unistd::Pid;

/// Supervisor-side record of one worker slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSlot {
    /// Slot index in `[0, workers)`.
    pub index: usize,
    /// Live process, `None` between reap and respawn.
    pub pid: Option<Pid>,
    /// Start time of the current (or last) process.
    pub start_time: Instant,
    /// Number of processes launched for this slot since it was created.
    pub launches: u32,
}

impl WorkerSlot {
    #[inline]
    pub fn is_live(&self) -> bool {
        self.pid.is_some()
    }
}

/// Slots ordered by index.
#[derive(Debug, Default)]
pub struct Registry {
    slots: BTreeMap<usize, WorkerSlot>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `pid` as the live process of `index`.
    ///
    /// Returns `false` (and changes nothing) if the slot already holds a live pid.
    pub fn occupy(&mut self, index: usize, pid: Pid, now: Instant) -> bool {
        match self.slots.get_mut(&index) {
            Some(slot) if slot.is_live() => false,
            Some(slot) => {
                slot.pid = Some(pid);
                slot.start_time = now;
                slot.launches = slot.launches.saturating_add(1);
                true
            }
            None => {
                self.slots.insert(
                    index,
                    WorkerSlot {
                        index,
                        pid: Some(pid),
                        start_time: now,
                        launches: 1,
                    },
                );
                true
            }
        }
    }

    /// Clears the slot owning `pid` and returns its index, or `None` for unknown pids.
    pub fn release_pid(&mut self, pid: Pid) -> Option<usize> {
        let slot = self.slots.values_mut().find(|s| s.pid == Some(pid))?;
        slot.pid = None;
        Some(slot.index)
    }

    /// Drops the slot entirely.
    pub fn remove(&mut self, index: usize) -> Option<WorkerSlot> {
        self.slots.remove(&index)
    }

    pub fn get(&self, index: usize) -> Option<&WorkerSlot> {
        self.slots.get(&index)
    }

    #[inline]
    pub fn contains(&self, index: usize) -> bool {
        self.slots.contains_key(&index)
    }

    /// Live pid of `index`, if any.
    pub fn pid_of(&self, index: usize) -> Option<Pid> {
        self.slots.get(&index).and_then(|s| s.pid)
    }

    /// `(index, pid)` of every live slot, ascending by index.
    pub fn live(&self) -> Vec<(usize, Pid)> {
        self.slots
            .values()
            .filter_map(|s| s.pid.map(|pid| (s.index, pid)))
            .collect()
    }

    pub fn live_count(&self) -> usize {
        self.slots.values().filter(|s| s.is_live()).count()
    }

    /// Indices of all slots, ascending.
    pub fn indices(&self) -> Vec<usize> {
        self.slots.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &WorkerSlot> {
        self.slots.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(n: i32) -> Pid {
        Pid::from_raw(n)
    }

    #[test]
    fn occupy_refuses_live_slot() {
        let mut reg = Registry::new();
        let now = Instant::now();
        assert!(reg.occupy(0, pid(10), now));
        assert!(!reg.occupy(0, pid(11), now));
        assert_eq!(reg.pid_of(0), Some(pid(10)));
        assert_eq!(reg.get(0).map(|s| s.launches), Some(1));
    }

    #[test]
    fn release_then_refill_counts_launches() {
        let mut reg = Registry::new();
        let now = Instant::now();
        reg.occupy(1, pid(20), now);
        assert_eq!(reg.release_pid(pid(20)), Some(1));
        assert!(reg.contains(1));
        assert_eq!(reg.live_count(), 0);

        assert!(reg.occupy(1, pid(21), now));
        assert_eq!(reg.get(1).map(|s| s.launches), Some(2));
        assert_eq!(reg.live(), vec![(1, pid(21))]);
    }

    #[test]
    fn unknown_pid_is_ignored() {
        let mut reg = Registry::new();
        reg.occupy(0, pid(30), Instant::now());
        assert_eq!(reg.release_pid(pid(99)), None);
        assert_eq!(reg.live_count(), 1);
    }

    #[test]
    fn remove_drops_slot() {
        let mut reg = Registry::new();
        reg.occupy(2, pid(40), Instant::now());
        reg.occupy(0, pid(41), Instant::now());
        assert_eq!(reg.indices(), vec![0, 2]);
        assert_eq!(reg.remove(2).and_then(|s| s.pid), Some(pid(40)));
        assert!(!reg.contains(2));
        assert_eq!(reg.len(), 1);
    }
}
