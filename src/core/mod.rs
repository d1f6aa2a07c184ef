//! Runtime core: the supervisor side of dutyvisor.
//!
//! The public entry point is [`Supervisor`], which owns the worker pool, drives the
//! control protocol and performs graceful shutdown.
//!
//! Internal modules:
//! - [`supervisor`]: control loop, spawn/reap/reload/broadcast/shutdown;
//! - [`registry`]: slot index → live process;
//! - [`launcher`]: starting, signalling and reaping worker processes;
//! - [`pending`]: flags raised by signal listeners;
//! - [`listener`]: OS signal streams feeding the pending flags;
//! - [`config`]: runtime knobs of the supervisor.

mod config;
mod launcher;
mod listener;
mod pending;
mod registry;
mod supervisor;

pub use config::SupervisorConfig;
pub use launcher::{ExitKind, LaunchSpec, Launcher, OsLauncher};
pub use pending::PendingEvents;
pub use registry::{Registry, WorkerSlot};
pub use supervisor::{SpawnOutcome, Supervisor, SupervisorState};
