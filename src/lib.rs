//! # dutyvisor
//!
//! **dutyvisor** supervises a fixed pool of worker processes that each run a
//! configurable duty cycle (busy-work phase + sleep phase).
//!
//! It launches the pool, restarts crashed workers under a sliding-window rate limit,
//! switches the whole pool between a *heavy* and a *light* profile, reassigns niceness
//! and CPU affinity live through a shared memory channel, and shuts down gracefully
//! (TERMINATE, grace period, FORCE_KILL).
//!
//! ## Architecture
//! ### Overview
//! ```text
//!                 workload.toml
//!                       │ ConfigSource::load (start + every SIGHUP)
//!                       ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Supervisor (single control loop)                                 │
//! │  - PendingEvents  ◄── signal listeners (TERM/INT/HUP/USR1/USR2/CHLD)
//! │  - Registry       slot → pid                                      │
//! │  - RestartLimiter slot → sliding window of launches               │
//! │  - Bus            lifecycle events ─► SubscriberSet ─► LogWriter  │
//! └──────┬──────────────────────┬─────────────────────────────┬───────┘
//!        │ write(table)         │ launch / kill / waitpid     │ Events
//!        ▼                      ▼                             ▼
//! ┌──────────────────┐   ┌──────────────┐ ┌──────────────┐   tracing
//! │ AssignmentChannel│   │  worker #0   │ │  worker #N   │
//! │ (shared mapping) │◄──│ DutyCycle    │ │ DutyCycle    │
//! └──────────────────┘   │ sched::apply │ │ sched::apply │
//!         read_entry     └──────────────┘ └──────────────┘
//! ```
//!
//! ### Control protocol
//! ```text
//! TERMINATE  SIGTERM  supervisor: graceful shutdown   worker: exit 0
//! RELOAD     SIGHUP   supervisor: reload + propagate  worker: re-read own entry
//! MODE_LIGHT SIGUSR1  supervisor: broadcast           worker: light profile
//! MODE_HEAVY SIGUSR2  supervisor: broadcast           worker: heavy profile
//! CHILD      SIGCHLD  supervisor: reap + respawn
//! FORCE_KILL SIGKILL  after the grace deadline only
//! ```
//!
//! ## Features
//! | Area              | Description                                                  | Key types                              |
//! |-------------------|--------------------------------------------------------------|----------------------------------------|
//! | **Supervision**   | Spawn, reap, rate-limited restart, reload, shutdown          | [`Supervisor`], [`SupervisorConfig`]   |
//! | **Workload**      | Pool size, duty profiles, assignments (TOML/JSON)            | [`WorkloadConfig`], [`ConfigSource`]   |
//! | **Channel**       | Shared per-slot scheduling assignments                       | [`AssignmentChannel`], [`AssignmentReader`] |
//! | **Worker**        | Duty-cycle executor and signal handling                      | [`DutyCycle`], [`run_worker`]          |
//! | **Events**        | Lifecycle events on a broadcast bus                          | [`Event`], [`EventKind`], [`Bus`]      |
//! | **Subscriber API**| Hook into events (logging, custom sinks)                     | [`Subscribe`], [`LogWriter`]           |
//!
//! ## Example
//! ```rust,no_run
//! use dutyvisor::{FileSource, LogWriter, OsLauncher, Supervisor, SupervisorConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let sup = Supervisor::new(
//!         SupervisorConfig::default(),
//!         Box::new(FileSource::new("workload.toml")),
//!         Box::new(OsLauncher::current_exe()?),
//!         vec![Arc::new(LogWriter::new())],
//!     );
//!     sup.run().await?;
//!     Ok(())
//! }
//! ```

mod channel;
mod config;
mod core;
mod error;
mod events;
mod mode;
mod policies;
mod sched;
mod signals;
mod subscribers;
mod worker;

// ---- Public re-exports ----

pub use channel::{
    Assignment, AssignmentChannel, AssignmentReader, AssignmentTable, DEFAULT_CAPACITY,
    segment_name,
};
pub use config::{AssignmentSpec, ConfigSource, FileSource, RestartLimit, WorkloadConfig};
pub use core::{
    ExitKind, LaunchSpec, Launcher, OsLauncher, PendingEvents, Registry, SpawnOutcome,
    Supervisor, SupervisorConfig, SupervisorState, WorkerSlot,
};
pub use error::{ChannelError, ConfigError, RuntimeError, SchedError, SpawnError};
pub use events::{Bus, Event, EventKind};
pub use mode::{DutyProfile, Mode, ModeProfiles};
pub use policies::{RestartLimiter, RestartWindow};
pub use sched::{ApplyReport, SchedSnapshot};
pub use signals::ControlSignal;
pub use subscribers::{LogWriter, Subscribe, SubscriberSet};
pub use worker::{DutyCycle, TickReport, WorkerArgs, WorkerFlags, WorkerPhase, run_worker};
