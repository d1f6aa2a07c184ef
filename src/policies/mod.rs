//! Restart policies.
//!
//! This module groups the knobs that control **whether** a worker slot may be launched
//! again after its process exited.
//!
//! ## Contents
//! - [`RestartWindow`] sliding window of launch timestamps for one slot
//! - [`RestartLimiter`] one window per slot index, consulted on every spawn
//!
//! ## Quick wiring
//! ```text
//! Supervisor::spawn(slot)
//!      └─► RestartLimiter::allow(slot)
//!           ├─ true  → launch, timestamp recorded
//!           └─ false → slot removed and parked until the next reload
//! ```
//!
//! ## Defaults
//! - `window = 30s`, `max_restarts = 5` (overridable by the workload document).

mod restart;

pub use restart::{RestartLimiter, RestartWindow};
