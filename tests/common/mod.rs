#![allow(dead_code)]

use std::collections::{BTreeMap, VecDeque};
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use dutyvisor::{
    ConfigError, ConfigSource, ControlSignal, ExitKind, LaunchSpec, Launcher, Mode, SpawnError,
    Supervisor, SupervisorConfig, WorkloadConfig,
};
use nix::sys::signal::Signal;
use nix::unistd::Pid;

/// How a mock worker reacts to TERMINATE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behaviour {
    /// Exits with status 0 right away.
    Obedient,
    /// Ignores TERMINATE; only FORCE_KILL stops it.
    Stubborn,
}

#[derive(Debug, Clone)]
pub struct MockProc {
    pub slot: usize,
    pub mode: Mode,
    pub alive: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct SentSignal {
    pub pid: Pid,
    pub sig: ControlSignal,
    pub at: Instant,
}

#[derive(Debug)]
pub struct MockState {
    next_pid: i32,
    pub behaviour: Behaviour,
    pub fail_launch: bool,
    pub procs: BTreeMap<i32, MockProc>,
    pub exited: VecDeque<(Pid, ExitKind)>,
    pub launches: Vec<(usize, Pid, Mode)>,
    pub signals: Vec<SentSignal>,
}

/// In-memory process table standing in for the OS.
#[derive(Clone)]
pub struct MockLauncher(Arc<Mutex<MockState>>);

impl MockLauncher {
    pub fn new(behaviour: Behaviour) -> Self {
        Self(Arc::new(Mutex::new(MockState {
            next_pid: 1000,
            behaviour,
            fail_launch: false,
            procs: BTreeMap::new(),
            exited: VecDeque::new(),
            launches: Vec::new(),
            signals: Vec::new(),
        })))
    }

    pub fn state(&self) -> MutexGuard<'_, MockState> {
        self.0.lock().unwrap()
    }

    /// The process dies on its own and waits to be reaped.
    pub fn crash(&self, pid: Pid) {
        let mut guard = self.state();
        let st = &mut *guard;
        if let Some(p) = st.procs.get_mut(&pid.as_raw()) {
            if p.alive {
                p.alive = false;
                st.exited.push_back((pid, ExitKind::Exited(1)));
            }
        }
    }

    /// The process disappears without ever being reported to `try_reap`.
    pub fn vanish(&self, pid: Pid) {
        if let Some(p) = self.state().procs.get_mut(&pid.as_raw()) {
            p.alive = false;
        }
    }

    pub fn set_fail_launch(&self, fail: bool) {
        self.state().fail_launch = fail;
    }

    pub fn launch_count(&self) -> usize {
        self.state().launches.len()
    }

    pub fn launches(&self) -> Vec<(usize, Pid, Mode)> {
        self.state().launches.clone()
    }

    pub fn signals(&self) -> Vec<SentSignal> {
        self.state().signals.clone()
    }

    pub fn signals_of(&self, sig: ControlSignal) -> Vec<SentSignal> {
        self.signals().into_iter().filter(|s| s.sig == sig).collect()
    }

    /// Alive processes per slot.
    pub fn alive_by_slot(&self) -> BTreeMap<usize, Vec<Pid>> {
        let mut out: BTreeMap<usize, Vec<Pid>> = BTreeMap::new();
        for (&pid, p) in &self.state().procs {
            if p.alive {
                out.entry(p.slot).or_default().push(Pid::from_raw(pid));
            }
        }
        out
    }
}

impl Launcher for MockLauncher {
    fn launch(&mut self, spec: &LaunchSpec) -> Result<Pid, SpawnError> {
        let mut st = self.state();
        if st.fail_launch {
            return Err(SpawnError::Launch {
                slot: spec.slot,
                source: io::Error::other("resource temporarily unavailable"),
            });
        }
        let pid = Pid::from_raw(st.next_pid);
        st.next_pid += 1;
        st.procs.insert(
            pid.as_raw(),
            MockProc {
                slot: spec.slot,
                mode: spec.mode,
                alive: true,
            },
        );
        st.launches.push((spec.slot, pid, spec.mode));
        Ok(pid)
    }

    fn signal(&mut self, pid: Pid, sig: ControlSignal) -> Result<(), SpawnError> {
        let mut guard = self.state();
        let st = &mut *guard;
        let behaviour = st.behaviour;
        let alive = st.procs.get(&pid.as_raw()).is_some_and(|p| p.alive);
        if !alive {
            return Err(SpawnError::Gone { pid: pid.as_raw() });
        }
        st.signals.push(SentSignal {
            pid,
            sig,
            at: Instant::now(),
        });

        let exit = match (sig, behaviour) {
            (ControlSignal::Terminate, Behaviour::Obedient) => Some(ExitKind::Exited(0)),
            (ControlSignal::ForceKill, _) => Some(ExitKind::Signaled(Signal::SIGKILL)),
            _ => None,
        };
        if let Some(kind) = exit {
            if let Some(p) = st.procs.get_mut(&pid.as_raw()) {
                p.alive = false;
            }
            st.exited.push_back((pid, kind));
        }
        Ok(())
    }

    fn try_reap(&mut self) -> Option<(Pid, ExitKind)> {
        self.state().exited.pop_front()
    }
}

/// Config source whose next answer the test controls.
#[derive(Clone)]
pub struct ScriptedSource(Arc<Mutex<Result<WorkloadConfig, String>>>);

impl ScriptedSource {
    pub fn new(cfg: WorkloadConfig) -> Self {
        Self(Arc::new(Mutex::new(Ok(cfg))))
    }

    pub fn set(&self, cfg: WorkloadConfig) {
        *self.0.lock().unwrap() = Ok(cfg);
    }

    pub fn break_with(&self, reason: &str) {
        *self.0.lock().unwrap() = Err(reason.to_string());
    }
}

impl ConfigSource for ScriptedSource {
    fn load(&self) -> Result<WorkloadConfig, ConfigError> {
        match &*self.0.lock().unwrap() {
            Ok(cfg) => Ok(cfg.clone()),
            Err(reason) => Err(ConfigError::Parse {
                path: "scripted.toml".into(),
                reason: reason.clone(),
            }),
        }
    }
}

/// Fast runtime settings for tests; the channel lives in `dir`.
pub fn test_config(dir: &std::path::Path) -> SupervisorConfig {
    SupervisorConfig {
        grace: Duration::from_millis(300),
        poll_interval: Duration::from_millis(10),
        channel_dir: dir.to_path_buf(),
        channel_capacity: 4096,
        ..SupervisorConfig::default()
    }
}

pub fn supervisor(
    cfg: SupervisorConfig,
    source: &ScriptedSource,
    launcher: &MockLauncher,
) -> Supervisor {
    Supervisor::new(
        cfg,
        Box::new(source.clone()),
        Box::new(launcher.clone()),
        Vec::new(),
    )
}
