//! # Assignment table: per-slot scheduling attributes.
//!
//! The table is computed by the supervisor from a [`WorkloadConfig`] and serialized as
//! JSON into the shared segment:
//!
//! ```text
//! {"assignments":[{"nice":5,"cpus":[0,1]},{"nice":null,"cpus":null}]}
//!                  └──────── slot 0 ───────┘ └────────── slot 1 ───────┘
//! ```
//!
//! ## Rules
//! - One entry per slot in `[0, workers)`; slots without a config entry get
//!   [`Assignment::default`] (no attributes).
//! - Config entries with `worker_index >= workers` are dropped with a warning.
//! - Duplicate `worker_index` entries: the last one wins.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::WorkloadConfig;
use crate::error::ChannelError;

/// Scheduling attributes for one slot.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Assignment {
    #[serde(default)]
    pub nice: Option<i32>,
    #[serde(default)]
    pub cpus: Option<BTreeSet<usize>>,
}

impl Assignment {
    /// True when neither attribute is requested.
    pub fn is_empty(&self) -> bool {
        self.nice.is_none() && self.cpus.is_none()
    }
}

/// Serialized array of [`Assignment`]s, indexed by slot.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AssignmentTable {
    assignments: Vec<Assignment>,
}

impl AssignmentTable {
    /// Builds a table from explicit entries (slot `i` = `entries[i]`).
    pub fn new(entries: Vec<Assignment>) -> Self {
        Self {
            assignments: entries,
        }
    }

    /// Computes the table for `cfg.workers` slots.
    pub fn from_config(cfg: &WorkloadConfig) -> Self {
        let mut assignments = vec![Assignment::default(); cfg.workers];
        for spec in &cfg.assignments {
            match assignments.get_mut(spec.worker_index) {
                Some(slot) => {
                    *slot = Assignment {
                        nice: spec.nice,
                        cpus: spec.cpu_affinity.clone(),
                    };
                }
                None => warn!(
                    worker_index = spec.worker_index,
                    workers = cfg.workers,
                    "assignment ignored: worker_index out of range"
                ),
            }
        }
        Self { assignments }
    }

    /// Entry for `slot`, if the table covers it.
    pub fn get(&self, slot: usize) -> Option<&Assignment> {
        self.assignments.get(slot)
    }

    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Assignment> {
        self.assignments.iter()
    }

    /// JSON bytes as stored in the segment (without the trailing NUL).
    pub fn encode(&self) -> Result<Vec<u8>, ChannelError> {
        serde_json::to_vec(self).map_err(|e| ChannelError::Encode(e.to_string()))
    }

    /// Decodes a raw segment image: content up to the first NUL byte.
    pub fn decode(raw: &[u8]) -> Result<Self, ChannelError> {
        let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
        if end == 0 {
            return Err(ChannelError::Parse("segment is empty".into()));
        }
        let text = std::str::from_utf8(&raw[..end])
            .map_err(|e| ChannelError::Parse(format!("not utf-8: {e}")))?;
        serde_json::from_str(text).map_err(|e| ChannelError::Parse(e.to_string()))
    }
}
