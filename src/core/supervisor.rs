//! # Supervisor: worker-pool lifecycle, control protocol and shutdown.
//!
//! The [`Supervisor`] owns the worker registry, the restart limiter, the assignment
//! channel and the event bus. Everything runs on one control loop; OS signals only raise
//! flags in [`PendingEvents`] and the loop does the work.
//!
//! ## High-level architecture
//! ```text
//! run():
//!   listener::install()  SIGTERM/SIGINT/SIGHUP/SIGUSR1/SIGUSR2/SIGCHLD ─► PendingEvents
//!   start():
//!     ConfigSource::load()            (fatal on error)
//!     AssignmentChannel::create()     (fatal on error) ─► write(AssignmentTable)
//!     spawn(0..workers)
//!
//!   loop (state = Running):
//!     shutdown flag?  ─► break
//!     child flag      ─► reap()        waitpid drain, respawn via spawn(index)
//!     reload flag     ─► reload()      load → write table → retire/RELOAD/spawn
//!     mode flag       ─► broadcast_mode(m)
//!     reconcile()                      spawn missing slots, unpark drained windows
//!     wait(poll_interval | flag raised)
//!
//!   shutdown():
//!     TERMINATE to live + retiring ─► reap until empty or grace deadline
//!       ├─ all gone  → AllStoppedWithin
//!       └─ deadline  → GraceExceeded, FORCE_KILL once per stuck slot, reap
//!     release channel ─► SupervisorStopped   (state = Terminated)
//! ```
//!
//! ## Event flow
//! ```text
//! Supervisor ── publish(Event) ──► Bus ──► subscriber_listener ──► SubscriberSet::emit
//! ```
//!
//! ## Rules
//! - At most one live pid per slot; `spawn` refuses a live slot.
//! - A slot retired by a shrinking reload keeps its pid in `retiring` until it is reaped;
//!   the index cannot be spawned again before that, and shutdown escalates on it too.
//! - Every launch (initial, respawn, reconcile) consults the restart limiter; a refused
//!   slot is removed from the registry and parked until its window has room again or the
//!   next successful reload.
//! - A failed reload changes nothing: config, registry, mode and channel stay as they were.
//! - FORCE_KILL is sent only after the grace deadline, at most once per slot.
//! - `shutdown` is idempotent.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use nix::unistd::Pid;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::channel::{AssignmentChannel, AssignmentTable, segment_name};
use crate::config::{ConfigSource, WorkloadConfig};
use crate::core::config::SupervisorConfig;
use crate::core::launcher::{LaunchSpec, Launcher};
use crate::core::listener;
use crate::core::pending::PendingEvents;
use crate::core::registry::Registry;
use crate::error::{ConfigError, RuntimeError, SpawnError};
use crate::events::{Bus, Event, EventKind};
use crate::mode::Mode;
use crate::policies::RestartLimiter;
use crate::signals::ControlSignal;
use crate::subscribers::{Subscribe, SubscriberSet};

/// Poll slice while waiting for workers to exit during shutdown.
const SHUTDOWN_POLL: Duration = Duration::from_millis(20);

/// Upper bound on reaping force-killed workers.
const KILL_REAP_TIMEOUT: Duration = Duration::from_secs(1);

/// Lifecycle of the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    /// Constructed, `start` not called yet.
    Created,
    Running,
    ShuttingDown,
    Terminated,
}

/// Result of one [`Supervisor::spawn`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnOutcome {
    Spawned(Pid),
    /// The slot already holds a live (or retiring) pid.
    AlreadyLive,
    /// Restart limit reached; the slot was removed and parked.
    Refused,
    /// The OS refused to launch; the slot stays empty.
    Failed,
    /// Shutting down or terminated.
    NotRunning,
}

/// Owns the worker pool and drives the control protocol.
pub struct Supervisor {
    cfg: SupervisorConfig,
    source: Box<dyn ConfigSource>,
    launcher: Box<dyn Launcher>,

    workload: Arc<WorkloadConfig>,
    registry: Registry,
    limiter: RestartLimiter,
    parked: BTreeSet<usize>,
    retiring: BTreeMap<usize, Pid>,
    mode: Mode,
    state: SupervisorState,
    channel: Option<AssignmentChannel>,

    pending: Arc<PendingEvents>,
    bus: Bus,
    subscribers: Vec<Arc<dyn Subscribe>>,
    listener: Option<JoinHandle<()>>,
}

impl Supervisor {
    /// Creates a supervisor; nothing is loaded or launched until [`Supervisor::start`].
    pub fn new(
        cfg: SupervisorConfig,
        source: Box<dyn ConfigSource>,
        launcher: Box<dyn Launcher>,
        subscribers: Vec<Arc<dyn Subscribe>>,
    ) -> Self {
        let bus = Bus::new(cfg.bus_capacity_clamped());
        let limiter = RestartLimiter::new(cfg.restart_window, cfg.max_restarts);
        Self {
            cfg,
            source,
            launcher,
            workload: Arc::new(WorkloadConfig::with_workers(1)),
            registry: Registry::new(),
            limiter,
            parked: BTreeSet::new(),
            retiring: BTreeMap::new(),
            mode: Mode::default(),
            state: SupervisorState::Created,
            channel: None,
            pending: Arc::new(PendingEvents::new()),
            bus,
            subscribers,
            listener: None,
        }
    }

    /// Installs signal listeners, starts the pool and drives the control loop until a
    /// shutdown is requested; then shuts down and flushes subscribers.
    ///
    /// Must be called inside a tokio runtime.
    pub async fn run(mut self) -> Result<(), RuntimeError> {
        let token = CancellationToken::new();
        let signals = listener::install(Arc::clone(&self.pending), token.clone())
            .map_err(RuntimeError::Signals)?;

        let res = self.drive().await;

        token.cancel();
        let _ = signals.await;
        if let Some(h) = self.listener.take() {
            let _ = h.await;
        }
        res
    }

    async fn drive(&mut self) -> Result<(), RuntimeError> {
        self.start()?;
        while !self.pending.take_shutdown() {
            self.step();
            tokio::select! {
                _ = tokio::time::sleep(self.cfg.poll_interval) => {}
                _ = self.pending.notified() => {}
            }
        }
        self.shutdown().await
    }

    /// Loads the initial config, creates the assignment channel and spawns the pool.
    ///
    /// Errors here are fatal. Must be called inside a tokio runtime (subscribers are
    /// spawned as tasks). Only valid once, from [`SupervisorState::Created`].
    pub fn start(&mut self) -> Result<(), RuntimeError> {
        if self.state != SupervisorState::Created {
            return Err(RuntimeError::AlreadyStarted);
        }
        let workload = self.source.load()?;
        let (window, max) = self.cfg.restart_limits(&workload);
        self.limiter.set_limits(window, max);
        self.workload = Arc::new(workload);

        let name = segment_name(std::process::id());
        let channel =
            AssignmentChannel::create(&self.cfg.channel_dir, &name, self.cfg.channel_capacity)?;
        self.subscriber_listener();
        self.bus.publish(
            Event::new(EventKind::SupervisorStarted)
                .with_count(self.workload.workers)
                .with_reason(channel.path().display().to_string()),
        );
        self.channel = Some(channel);
        self.write_assignments();

        self.state = SupervisorState::Running;
        for index in 0..self.workload.workers {
            self.spawn(index);
        }
        Ok(())
    }

    /// One pass of the control loop: consumes pending flags, then reconciles the pool.
    pub fn step(&mut self) {
        if self.state != SupervisorState::Running {
            return;
        }
        if self.pending.take_child_exited() {
            self.reap();
        }
        if self.pending.take_reload() {
            let _ = self.reload();
        }
        if let Some(mode) = self.pending.take_mode() {
            self.broadcast_mode(mode);
        }
        self.reconcile();
    }

    /// Launches a worker for `index` unless it is live or the restart limit refuses it.
    pub fn spawn(&mut self, index: usize) -> SpawnOutcome {
        if self.state != SupervisorState::Running {
            return SpawnOutcome::NotRunning;
        }
        if self.registry.pid_of(index).is_some() || self.retiring.contains_key(&index) {
            return SpawnOutcome::AlreadyLive;
        }

        if !self.limiter.allow(index) {
            let in_window = self.limiter.in_window(index, Instant::now());
            self.registry.remove(index);
            self.parked.insert(index);
            self.bus.publish(
                Event::new(EventKind::RestartRefused)
                    .with_slot(index)
                    .with_count(in_window),
            );
            return SpawnOutcome::Refused;
        }

        let spec = LaunchSpec {
            slot: index,
            mode: self.mode,
            profiles: self.workload.profiles(),
            channel: self.channel.as_ref().map(|c| c.path().to_path_buf()),
            status_every: self.cfg.status_every,
        };
        match self.launcher.launch(&spec) {
            Ok(pid) => {
                let now = Instant::now();
                self.registry.occupy(index, pid, now);
                self.bus.publish(
                    Event::new(EventKind::WorkerSpawned)
                        .with_slot(index)
                        .with_pid(pid.as_raw())
                        .with_mode(self.mode)
                        .with_count(self.limiter.in_window(index, now)),
                );
                SpawnOutcome::Spawned(pid)
            }
            Err(e) => {
                self.bus.publish(
                    Event::new(EventKind::SpawnFailed)
                        .with_slot(index)
                        .with_reason(e.to_string()),
                );
                SpawnOutcome::Failed
            }
        }
    }

    /// Drains every terminated child; respawns their slots while running.
    ///
    /// Returns the number of children reaped.
    pub fn reap(&mut self) -> usize {
        let mut reaped = 0;
        while let Some((pid, status)) = self.launcher.try_reap() {
            reaped += 1;
            let mut ev = Event::new(EventKind::WorkerExited)
                .with_pid(pid.as_raw())
                .with_reason(status.to_string());
            match self.registry.release_pid(pid) {
                Some(index) => {
                    ev = ev.with_slot(index);
                    self.bus.publish(ev);
                    if self.state == SupervisorState::Running && index < self.workload.workers {
                        self.spawn(index);
                    }
                }
                None => match self.take_retiring(pid) {
                    Some(index) => {
                        self.bus.publish(
                            ev.with_slot(index)
                                .with_reason(format!("retired, {status}")),
                        );
                        if self.state == SupervisorState::Running
                            && index < self.workload.workers
                        {
                            self.spawn(index);
                        }
                    }
                    None => {
                        self.bus
                            .publish(ev.with_reason(format!("unknown child, {status}")));
                    }
                },
            }
        }
        reaped
    }

    /// Sends `sig` to every live worker; returns how many deliveries succeeded.
    ///
    /// Targets that no longer exist are dropped from the registry.
    pub fn broadcast(&mut self, sig: ControlSignal) -> usize {
        let mut delivered = 0;
        for (index, pid) in self.registry.live() {
            match self.launcher.signal(pid, sig) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    if matches!(e, SpawnError::Gone { .. }) {
                        self.registry.remove(index);
                    }
                    self.bus.publish(
                        Event::new(EventKind::SignalFailed)
                            .with_slot(index)
                            .with_pid(pid.as_raw())
                            .with_reason(format!("{sig}: {e}")),
                    );
                }
            }
        }
        delivered
    }

    /// Sends `sig` to every retiring worker; vanished ones are forgotten.
    fn signal_retiring(&mut self, sig: ControlSignal) {
        let retiring: Vec<(usize, Pid)> = self.retiring.iter().map(|(&i, &p)| (i, p)).collect();
        for (index, pid) in retiring {
            if let Err(e) = self.launcher.signal(pid, sig) {
                if matches!(e, SpawnError::Gone { .. }) {
                    self.retiring.remove(&index);
                }
                self.bus.publish(
                    Event::new(EventKind::SignalFailed)
                        .with_slot(index)
                        .with_pid(pid.as_raw())
                        .with_reason(format!("{sig}: {e}")),
                );
            }
        }
    }

    fn take_retiring(&mut self, pid: Pid) -> Option<usize> {
        let index = self
            .retiring
            .iter()
            .find_map(|(&i, &p)| (p == pid).then_some(i))?;
        self.retiring.remove(&index);
        Some(index)
    }

    /// Records `mode` as the pool's mode and broadcasts it.
    pub fn broadcast_mode(&mut self, mode: Mode) -> usize {
        self.mode = mode;
        let delivered = self.broadcast(ControlSignal::for_mode(mode));
        self.bus.publish(
            Event::new(EventKind::ModeBroadcast)
                .with_mode(mode)
                .with_count(delivered),
        );
        delivered
    }

    /// Re-reads the workload document and propagates it.
    ///
    /// On error nothing changes and the error is returned (and published).
    pub fn reload(&mut self) -> Result<(), ConfigError> {
        self.bus.publish(Event::new(EventKind::ReloadRequested));
        let workload = match self.source.load() {
            Ok(w) => w,
            Err(e) => {
                self.bus.publish(
                    Event::new(EventKind::ReloadFailed).with_reason(e.to_string()),
                );
                return Err(e);
            }
        };

        let (window, max) = self.cfg.restart_limits(&workload);
        self.limiter.set_limits(window, max);
        self.workload = Arc::new(workload);
        self.write_assignments();
        self.parked.clear();

        let workers = self.workload.workers;
        self.retire_beyond(workers);
        self.broadcast(ControlSignal::Reload);
        self.reconcile();

        self.bus
            .publish(Event::new(EventKind::ReloadApplied).with_count(workers));
        Ok(())
    }

    /// Terminates every slot `>= workers`, highest index first, and moves it from the
    /// registry to `retiring` until its exit is reaped.
    fn retire_beyond(&mut self, workers: usize) {
        let extra: Vec<usize> = self
            .registry
            .indices()
            .into_iter()
            .rev()
            .filter(|&i| i >= workers)
            .collect();
        for index in extra {
            let Some(slot) = self.registry.remove(index) else {
                continue;
            };
            let mut ev = Event::new(EventKind::WorkerRetired).with_slot(index);
            if let Some(pid) = slot.pid {
                ev = ev.with_pid(pid.as_raw());
                match self.launcher.signal(pid, ControlSignal::Terminate) {
                    Ok(()) => {
                        self.retiring.insert(index, pid);
                    }
                    Err(e) => {
                        if !matches!(e, SpawnError::Gone { .. }) {
                            self.retiring.insert(index, pid);
                        }
                        ev = ev.with_reason(e.to_string());
                    }
                }
            }
            self.bus.publish(ev);
        }
        self.parked.retain(|&i| i < workers);
    }

    /// Spawns every slot in `[0, workers)` that has neither a live nor a retiring pid.
    ///
    /// A parked slot is reconsidered once its restart window has room again.
    pub fn reconcile(&mut self) {
        if self.state != SupervisorState::Running {
            return;
        }
        let now = Instant::now();
        let max = self.limiter.max_restarts();
        for index in 0..self.workload.workers {
            if self.registry.pid_of(index).is_some() || self.retiring.contains_key(&index) {
                continue;
            }
            if self.parked.contains(&index) {
                if self.limiter.in_window(index, now) >= max {
                    continue;
                }
                self.parked.remove(&index);
            }
            self.spawn(index);
        }
    }

    /// Graceful-then-forced shutdown; releases the assignment channel.
    ///
    /// Returns [`RuntimeError::GraceExceeded`] if any worker had to be force-killed.
    /// Calling it again after completion is a no-op.
    pub async fn shutdown(&mut self) -> Result<(), RuntimeError> {
        if matches!(
            self.state,
            SupervisorState::ShuttingDown | SupervisorState::Terminated
        ) {
            return Ok(());
        }
        self.state = SupervisorState::ShuttingDown;
        self.bus.publish(Event::new(EventKind::ShutdownRequested));

        let grace = self.cfg.grace;
        self.broadcast(ControlSignal::Terminate);
        self.signal_retiring(ControlSignal::Terminate);
        let stuck = self.wait_all_with_grace(grace).await;

        let res = if stuck.is_empty() {
            self.bus.publish(Event::new(EventKind::AllStoppedWithin));
            Ok(())
        } else {
            self.bus
                .publish(Event::new(EventKind::GraceExceeded).with_count(stuck.len()));
            for &(index, pid) in &stuck {
                if let Err(e) = self.launcher.signal(pid, ControlSignal::ForceKill) {
                    warn!(slot = index, pid = pid.as_raw(), err = %e, "force kill failed");
                }
                self.bus.publish(
                    Event::new(EventKind::WorkerForceKilled)
                        .with_slot(index)
                        .with_pid(pid.as_raw()),
                );
            }
            self.wait_all_with_grace(KILL_REAP_TIMEOUT).await;
            Err(RuntimeError::GraceExceeded {
                grace,
                stuck: stuck.into_iter().map(|(i, _)| i).collect(),
            })
        };

        for index in self.registry.indices() {
            self.registry.remove(index);
        }
        self.retiring.clear();
        if let Some(channel) = self.channel.take() {
            if let Err(e) = channel.release() {
                warn!(err = %e, label = e.as_label(), "cannot release assignment channel");
            }
        }
        self.state = SupervisorState::Terminated;
        self.bus.publish(Event::new(EventKind::SupervisorStopped));
        res
    }

    /// Reaps until no slot is live or retiring, or `limit` elapses; returns the
    /// processes still outstanding.
    async fn wait_all_with_grace(&mut self, limit: Duration) -> Vec<(usize, Pid)> {
        let deadline = Instant::now() + limit;
        loop {
            self.reap();
            if self.registry.live_count() == 0 && self.retiring.is_empty() {
                return Vec::new();
            }
            let now = Instant::now();
            if now >= deadline {
                let mut outstanding = self.registry.live();
                outstanding.extend(self.retiring.iter().map(|(&i, &p)| (i, p)));
                return outstanding;
            }
            let slice = SHUTDOWN_POLL.min(deadline - now);
            tokio::select! {
                _ = tokio::time::sleep(slice) => {}
                _ = self.pending.notified() => {}
            }
        }
    }

    /// Serializes the current assignments into the channel; rejections keep the old table.
    fn write_assignments(&mut self) {
        let Some(channel) = self.channel.as_mut() else {
            return;
        };
        let table = AssignmentTable::from_config(&self.workload);
        match channel.write(&table) {
            Ok(bytes) => self.bus.publish(
                Event::new(EventKind::ChannelWritten)
                    .with_count(table.len())
                    .with_reason(bytes.to_string()),
            ),
            Err(e) => self.bus.publish(
                Event::new(EventKind::ChannelRejected).with_reason(e.to_string()),
            ),
        }
    }

    /// Subscribes to the bus and forwards events to the subscriber set.
    ///
    /// The listener stops after forwarding [`EventKind::SupervisorStopped`] and then
    /// flushes every subscriber queue.
    fn subscriber_listener(&mut self) {
        let subs = std::mem::take(&mut self.subscribers);
        if subs.is_empty() {
            return;
        }
        let set = SubscriberSet::new(subs, self.bus.clone());
        let mut rx = self.bus.subscribe();
        self.listener = Some(tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(ev) => {
                        set.emit(&ev);
                        if ev.kind == EventKind::SupervisorStopped {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                }
            }
            set.shutdown().await;
        }));
    }

    /// Handle used by signal listeners (and tests) to raise pending flags.
    pub fn pending(&self) -> Arc<PendingEvents> {
        Arc::clone(&self.pending)
    }

    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn workload(&self) -> Arc<WorkloadConfig> {
        Arc::clone(&self.workload)
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.cfg
    }

    /// Last broadcast mode; new workers start in it.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    /// Slots dropped by a shrinking reload whose process has not been reaped yet.
    pub fn retiring(&self) -> impl Iterator<Item = (usize, Pid)> + '_ {
        self.retiring.iter().map(|(&i, &p)| (i, p))
    }

    /// Slots refused by the restart limiter and not reconsidered yet.
    pub fn parked(&self) -> impl Iterator<Item = usize> + '_ {
        self.parked.iter().copied()
    }

    pub fn channel_path(&self) -> Option<&Path> {
        self.channel.as_ref().map(|c| c.path())
    }
}
