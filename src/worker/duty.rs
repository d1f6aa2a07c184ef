//! # Duty-cycle executor.
//!
//! Alternates a CPU-bound busy phase and a sleep phase whose lengths come from the
//! profile of the current [`Mode`].
//!
//! ```text
//! loop until terminate:
//!   reload pending?  ─► on_reload()            (re-read + re-apply assignment)
//!   mode = flags.mode(); profile = profiles.get(mode)
//!   busy(profile.work)                          spin, checks terminate every iteration
//!   ticks += 1
//!   status due or mode changed? ─► on_status(TickReport)
//!   sleep(profile.sleep)                        slices ≤ 100ms, leaves on terminate/reload
//! ```
//!
//! ## Rules
//! - The mode is read once per cycle; a switch takes effect on the next cycle.
//! - The first cycle after a mode change always emits a status record.
//! - `status_every = 0` emits a record every cycle.

use std::hint::black_box;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::mode::{DutyProfile, Mode, ModeProfiles};
use crate::sched::SchedSnapshot;
use crate::worker::flags::WorkerFlags;

/// Longest uninterrupted sleep slice.
pub const SLEEP_SLICE: Duration = Duration::from_millis(100);

/// Diagnostic record emitted by the executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickReport {
    /// Completed cycles so far.
    pub ticks: u64,
    pub mode: Mode,
    pub profile: DutyProfile,
    /// Effective scheduling state read back from the OS.
    pub sched: SchedSnapshot,
}

pub struct DutyCycle {
    profiles: ModeProfiles,
    flags: Arc<WorkerFlags>,
    status_every: Duration,
    ticks: u64,
}

impl DutyCycle {
    pub fn new(profiles: ModeProfiles, flags: Arc<WorkerFlags>, status_every: Duration) -> Self {
        Self {
            profiles,
            flags,
            status_every,
            ticks: 0,
        }
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Runs until the terminate flag is raised; returns the tick count.
    pub fn run<R, S>(&mut self, mut on_reload: R, mut on_status: S) -> u64
    where
        R: FnMut(),
        S: FnMut(&TickReport),
    {
        let mut last_status: Option<Instant> = None;
        let mut last_mode: Option<Mode> = None;

        while !self.flags.is_terminating() {
            if self.flags.take_reload() {
                on_reload();
            }

            let mode = self.flags.mode();
            let profile = self.profiles.get(mode);

            self.busy(profile.work());
            if self.flags.is_terminating() {
                break;
            }
            self.ticks += 1;

            let due = last_status.is_none_or(|t| t.elapsed() >= self.status_every);
            if due || last_mode != Some(mode) {
                on_status(&TickReport {
                    ticks: self.ticks,
                    mode,
                    profile,
                    sched: SchedSnapshot::current(),
                });
                last_status = Some(Instant::now());
                last_mode = Some(mode);
            }

            self.sleep(profile.sleep());
        }
        self.ticks
    }

    fn busy(&self, work: Duration) {
        let end = Instant::now() + work;
        let mut acc: u64 = self.ticks;
        while Instant::now() < end {
            if self.flags.is_terminating() {
                return;
            }
            for i in 0..64u64 {
                acc = black_box(acc.wrapping_mul(6364136223846793005).wrapping_add(i));
            }
        }
        black_box(acc);
    }

    fn sleep(&self, total: Duration) {
        let end = Instant::now() + total;
        loop {
            if self.flags.interrupted() {
                return;
            }
            let left = end.saturating_duration_since(Instant::now());
            if left.is_zero() {
                return;
            }
            thread::sleep(left.min(SLEEP_SLICE));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn fast_profiles() -> ModeProfiles {
        ModeProfiles {
            heavy: DutyProfile {
                work_us: 500,
                sleep_us: 500,
            },
            light: DutyProfile::LIGHT,
        }
    }

    #[test]
    fn mode_switch_is_reported_on_next_cycle() {
        let flags = Arc::new(WorkerFlags::new(Mode::Heavy));
        let mut duty = DutyCycle::new(fast_profiles(), flags.clone(), Duration::from_secs(3600));
        let reports = Arc::new(Mutex::new(Vec::<TickReport>::new()));

        let sink = reports.clone();
        let f = flags.clone();
        let ticks = duty.run(
            || {},
            move |r| {
                let mut seen = sink.lock().unwrap();
                seen.push(r.clone());
                match seen.len() {
                    1 => f.set_mode(Mode::Light),
                    _ => f.request_terminate(),
                }
            },
        );

        let seen = reports.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].mode, Mode::Heavy);
        assert_eq!(seen[1].mode, Mode::Light);
        assert_eq!(
            seen[1].profile,
            DutyProfile {
                work_us: 2000,
                sleep_us: 8000
            }
        );
        assert_eq!(seen[1].ticks, seen[0].ticks + 1);
        assert_eq!(ticks, seen[1].ticks);
    }

    #[test]
    fn pending_reload_runs_hook_before_cycle() {
        let flags = Arc::new(WorkerFlags::new(Mode::Heavy));
        flags.request_reload();
        let mut duty = DutyCycle::new(fast_profiles(), flags.clone(), Duration::ZERO);

        let mut reloads = 0;
        let f = flags.clone();
        duty.run(|| reloads += 1, move |_| f.request_terminate());
        assert_eq!(reloads, 1);
        assert!(!flags.take_reload());
    }

    #[test]
    fn terminate_interrupts_long_busy_phase() {
        let flags = Arc::new(WorkerFlags::new(Mode::Heavy));
        let profiles = ModeProfiles {
            heavy: DutyProfile {
                work_us: 30_000_000,
                sleep_us: 0,
            },
            light: DutyProfile::LIGHT,
        };
        let mut duty = DutyCycle::new(profiles, flags.clone(), Duration::ZERO);

        let f = flags.clone();
        let stopper = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            f.request_terminate();
        });

        let started = Instant::now();
        let ticks = duty.run(|| {}, |_| {});
        stopper.join().unwrap();

        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(ticks, 0);
    }

    #[test]
    fn status_every_zero_reports_each_cycle() {
        let flags = Arc::new(WorkerFlags::new(Mode::Heavy));
        let mut duty = DutyCycle::new(fast_profiles(), flags.clone(), Duration::ZERO);
        let mut count = 0;
        let f = flags.clone();
        duty.run(
            || {},
            |r| {
                count += 1;
                assert_eq!(r.ticks, count);
                if count == 3 {
                    f.request_terminate();
                }
            },
        );
        assert_eq!(count, 3);
        assert_eq!(duty.ticks(), 3);
    }
}
