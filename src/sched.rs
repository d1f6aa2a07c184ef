//! # Scheduling applier: niceness and CPU affinity.
//!
//! Thin wrappers over the OS calls a worker uses to apply its [`Assignment`] and to
//! report what is actually in effect:
//!
//! ```text
//! apply(pid, assignment)
//!   ├─► nice  = Some(n) ─► setpriority(PRIO_PROCESS, pid, n)
//!   └─► cpus  = Some(s) ─► sched_setaffinity(pid, s)
//!
//! apply_process(assignment)
//!   └─► apply(tid, assignment) for every tid in /proc/self/task
//!
//! read side: current_nice(pid), current_affinity(pid), current_cpu()
//! ```
//!
//! ## Rules
//! - Every failure is a [`SchedError`]; none of them is fatal to the caller.
//! - `None` fields are left untouched (the OS default stays in place).
//! - Raising niceness works unprivileged; lowering it needs `CAP_SYS_NICE`.
//! - On Linux both attributes belong to a thread; "pid 0" means the calling thread.
//!   [`apply_process`] covers every thread so tools like `ps -o ni,psr` agree.
//! - On non-Linux targets everything reports [`SchedError::Unsupported`].

use std::collections::BTreeSet;

use nix::unistd::Pid;

use crate::channel::Assignment;
use crate::error::SchedError;

/// Outcome of one [`apply`] call; each attribute is reported independently.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ApplyReport {
    /// `None` when no niceness was requested.
    pub nice: Option<Result<i32, SchedError>>,
    /// `None` when no affinity was requested.
    pub affinity: Option<Result<BTreeSet<usize>, SchedError>>,
}

impl ApplyReport {
    /// True when every requested attribute was applied.
    pub fn is_clean(&self) -> bool {
        !matches!(self.nice, Some(Err(_))) && !matches!(self.affinity, Some(Err(_)))
    }

    /// Errors of this report, labelled by attribute.
    pub fn errors(&self) -> Vec<(&'static str, &SchedError)> {
        let mut out = Vec::new();
        if let Some(Err(e)) = &self.nice {
            out.push(("nice", e));
        }
        if let Some(Err(e)) = &self.affinity {
            out.push(("affinity", e));
        }
        out
    }
}

/// Applies `assignment` to `pid` (`Pid::from_raw(0)` = calling process).
pub fn apply(pid: Pid, assignment: &Assignment) -> ApplyReport {
    ApplyReport {
        nice: assignment.nice.map(|n| set_nice(pid, n).map(|()| n)),
        affinity: assignment
            .cpus
            .as_ref()
            .map(|cpus| set_affinity(pid, cpus).map(|()| cpus.clone())),
    }
}

/// Applies `assignment` to every thread of the calling process.
///
/// Threads that exit while this runs are skipped. The report keeps the first failure of
/// each attribute.
pub fn apply_process(assignment: &Assignment) -> ApplyReport {
    let threads = process_threads();
    if threads.is_empty() {
        return apply(Pid::from_raw(0), assignment);
    }
    let mut report = ApplyReport {
        nice: assignment.nice.map(Ok),
        affinity: assignment.cpus.clone().map(Ok),
    };
    for tid in threads {
        let one = apply(tid, assignment);
        if let Some(Err(e)) = one.nice {
            if !e.is_gone() && matches!(report.nice, Some(Ok(_))) {
                report.nice = Some(Err(e));
            }
        }
        if let Some(Err(e)) = one.affinity {
            if !e.is_gone() && matches!(report.affinity, Some(Ok(_))) {
                report.affinity = Some(Err(e));
            }
        }
    }
    report
}

#[cfg(target_os = "linux")]
mod imp {
    use std::collections::BTreeSet;

    use nix::errno::Errno;
    use nix::sched::{CpuSet, sched_getaffinity, sched_setaffinity};
    use nix::unistd::Pid;

    use crate::error::SchedError;

    pub fn set_nice(pid: Pid, nice: i32) -> Result<(), SchedError> {
        // SAFETY: plain syscall wrapper, no pointers involved.
        let rc = unsafe { libc::setpriority(libc::PRIO_PROCESS, pid.as_raw() as libc::id_t, nice) };
        if rc == -1 {
            return Err(SchedError::Os {
                op: "setpriority",
                errno: Errno::last(),
            });
        }
        Ok(())
    }

    pub fn current_nice(pid: Pid) -> Result<i32, SchedError> {
        // -1 is a legal priority, so errno has to be cleared and inspected.
        // SAFETY: __errno_location returns the calling thread's errno slot.
        let value = unsafe {
            *libc::__errno_location() = 0;
            libc::getpriority(libc::PRIO_PROCESS, pid.as_raw() as libc::id_t)
        };
        if value == -1 {
            let errno = Errno::last();
            if errno != Errno::UnknownErrno {
                return Err(SchedError::Os {
                    op: "getpriority",
                    errno,
                });
            }
        }
        Ok(value)
    }

    pub fn set_affinity(pid: Pid, cpus: &BTreeSet<usize>) -> Result<(), SchedError> {
        if cpus.is_empty() {
            return Err(SchedError::EmptyCpuSet);
        }
        let mut set = CpuSet::new();
        for &cpu in cpus {
            set.set(cpu).map_err(|_| SchedError::InvalidCpu(cpu))?;
        }
        sched_setaffinity(pid, &set).map_err(|errno| SchedError::Os {
            op: "sched_setaffinity",
            errno,
        })
    }

    pub fn current_affinity(pid: Pid) -> Result<BTreeSet<usize>, SchedError> {
        let set = sched_getaffinity(pid).map_err(|errno| SchedError::Os {
            op: "sched_getaffinity",
            errno,
        })?;
        Ok((0..CpuSet::count())
            .filter(|&cpu| set.is_set(cpu).unwrap_or(false))
            .collect())
    }

    pub fn current_cpu() -> Option<usize> {
        // SAFETY: no arguments; returns -1 on failure.
        let cpu = unsafe { libc::sched_getcpu() };
        usize::try_from(cpu).ok()
    }

    /// Thread ids of the calling process; empty when `/proc` is unavailable.
    pub fn process_threads() -> Vec<Pid> {
        let Ok(dir) = std::fs::read_dir("/proc/self/task") else {
            return Vec::new();
        };
        dir.filter_map(|entry| entry.ok()?.file_name().to_str()?.parse().ok())
            .map(Pid::from_raw)
            .collect()
    }
}

#[cfg(not(target_os = "linux"))]
mod imp {
    use std::collections::BTreeSet;

    use nix::unistd::Pid;

    use crate::error::SchedError;

    pub fn set_nice(_pid: Pid, _nice: i32) -> Result<(), SchedError> {
        Err(SchedError::Unsupported("setpriority"))
    }

    pub fn current_nice(_pid: Pid) -> Result<i32, SchedError> {
        Err(SchedError::Unsupported("getpriority"))
    }

    pub fn set_affinity(_pid: Pid, _cpus: &BTreeSet<usize>) -> Result<(), SchedError> {
        Err(SchedError::Unsupported("sched_setaffinity"))
    }

    pub fn current_affinity(_pid: Pid) -> Result<BTreeSet<usize>, SchedError> {
        Err(SchedError::Unsupported("sched_getaffinity"))
    }

    pub fn current_cpu() -> Option<usize> {
        None
    }

    pub fn process_threads() -> Vec<Pid> {
        Vec::new()
    }
}

pub use imp::{
    current_affinity, current_cpu, current_nice, process_threads, set_affinity, set_nice,
};

/// Effective scheduling state of a process, as read back from the OS.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SchedSnapshot {
    pub nice: Option<i32>,
    pub cpus: Option<BTreeSet<usize>>,
    pub cpu: Option<usize>,
}

impl SchedSnapshot {
    /// Reads the calling process's state; unreadable attributes become `None`.
    pub fn current() -> Self {
        let me = Pid::from_raw(0);
        Self {
            nice: current_nice(me).ok(),
            cpus: current_affinity(me).ok(),
            cpu: current_cpu(),
        }
    }
}

#[cfg(all(test, target_os = "linux"))]
mod tests {
    use super::*;

    fn me() -> Pid {
        Pid::from_raw(0)
    }

    #[test]
    fn empty_assignment_touches_nothing() {
        let report = apply(me(), &Assignment::default());
        assert_eq!(report, ApplyReport::default());
        assert!(report.is_clean());
    }

    #[test]
    fn affinity_roundtrips_on_current_cpus() {
        let cpus = current_affinity(me()).unwrap();
        assert!(!cpus.is_empty());

        // Re-applying the current mask is always permitted.
        let report = apply(
            me(),
            &Assignment {
                nice: None,
                cpus: Some(cpus.clone()),
            },
        );
        assert_eq!(report.affinity, Some(Ok(cpus.clone())));
        assert_eq!(current_affinity(me()).unwrap(), cpus);
    }

    #[test]
    fn empty_and_out_of_range_cpu_sets_are_rejected() {
        assert_eq!(
            set_affinity(me(), &BTreeSet::new()),
            Err(SchedError::EmptyCpuSet)
        );
        let huge = nix::sched::CpuSet::count() + 1;
        assert_eq!(
            set_affinity(me(), &BTreeSet::from([huge])),
            Err(SchedError::InvalidCpu(huge))
        );
    }

    #[test]
    fn reapplying_current_nice_succeeds() {
        let nice = current_nice(me()).unwrap();
        let report = apply(
            me(),
            &Assignment {
                nice: Some(nice),
                cpus: None,
            },
        );
        assert_eq!(report.nice, Some(Ok(nice)));
        assert!(report.errors().is_empty());
    }

    #[test]
    fn process_apply_reaches_other_threads() {
        let nice = current_nice(me()).unwrap();
        let cpus = current_affinity(me()).unwrap();

        let (ready_tx, ready_rx) = std::sync::mpsc::channel();
        let (done_tx, done_rx) = std::sync::mpsc::channel::<()>();
        let helper = std::thread::spawn(move || {
            // SAFETY: gettid takes no arguments and cannot fail.
            let tid = unsafe { libc::syscall(libc::SYS_gettid) };
            ready_tx.send(Pid::from_raw(tid as i32)).unwrap();
            let _ = done_rx.recv();
        });
        let tid = ready_rx.recv().unwrap();
        assert!(process_threads().contains(&tid));

        let report = apply_process(&Assignment {
            nice: Some(nice),
            cpus: Some(cpus.clone()),
        });
        assert!(report.is_clean(), "{:?}", report.errors());
        assert_eq!(current_nice(tid).unwrap(), nice);
        assert_eq!(current_affinity(tid).unwrap(), cpus);

        done_tx.send(()).unwrap();
        helper.join().unwrap();
    }

    #[test]
    fn snapshot_reports_a_running_cpu() {
        let snap = SchedSnapshot::current();
        let cpu = snap.cpu.expect("sched_getcpu works on linux");
        assert!(snap.cpus.unwrap().contains(&cpu));
    }
}
