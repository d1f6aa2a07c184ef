//! # Event subscribers for the dutyvisor supervisor.
//!
//! This module provides the [`Subscribe`] trait, the [`SubscriberSet`] fan-out and the
//! built-in [`LogWriter`] that turns runtime events into the diagnostic log stream.
//!
//! ## Architecture
//! ```text
//! Event flow:
//!   Supervisor ── publish(Event) ──► Bus ──► subscriber_listener ──► SubscriberSet::emit
//!                                                                      │
//!                                                            ┌─────────┴─────────┐
//!                                                            ▼                   ▼
//!                                                        LogWriter            Custom
//! ```

mod log;
mod set;
mod subscribe;

pub use log::LogWriter;
pub use set::SubscriberSet;
pub use subscribe::Subscribe;
