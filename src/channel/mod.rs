//! Assignment channel: per-slot scheduling attributes shared across processes.
//!
//! ## Contents
//! - [`Assignment`], [`AssignmentTable`] data model and JSON encoding
//! - [`AssignmentChannel`] writer (supervisor), [`AssignmentReader`] reader (worker)
//!
//! ## Quick reference
//! ```text
//! Supervisor: AssignmentTable::from_config(cfg) ─► AssignmentChannel::write
//!                                                        │  (shared mapping)
//! Worker:     AssignmentReader::read_entry(slot) ◄───────┘ ─► sched::apply
//! ```

mod segment;
mod table;

pub use segment::{AssignmentChannel, AssignmentReader, DEFAULT_CAPACITY, segment_name};
pub use table::{Assignment, AssignmentTable};
