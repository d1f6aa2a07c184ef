//! Error types used by the dutyvisor supervisor and its workers.
//!
//! One enum per concern:
//!
//! - [`RuntimeError`]: failures of the supervisor runtime itself (startup, shutdown).
//! - [`ConfigError`]: unreadable or invalid workload documents.
//! - [`ChannelError`]: assignment channel creation, write and parse failures.
//! - [`SpawnError`]: the OS refused to start or signal a worker process.
//! - [`SchedError`]: niceness / CPU-affinity could not be applied or read.
//!
//! Every enum provides `as_label` (a stable snake_case label for logs). Only
//! [`RuntimeError`] ever terminates the supervisor; the rest are handled where they occur.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// # Errors produced by the supervisor runtime.
///
/// These represent failures of the orchestration itself: the startup preconditions
/// (initial config, assignment channel, signal registration) and a shutdown sequence
/// that needed to escalate.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Shutdown grace period was exceeded; the listed slots had to be force-killed.
    #[error("shutdown timeout {grace:?} exceeded; force-killed slots: {stuck:?}")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// Slot indices that did not exit in time.
        stuck: Vec<usize>,
    },

    /// The initial workload configuration could not be loaded.
    #[error("initial configuration unavailable: {0}")]
    InitialConfig(#[from] ConfigError),

    /// The assignment channel could not be created at startup.
    #[error("assignment channel unavailable: {0}")]
    ChannelUnavailable(#[from] ChannelError),

    /// OS signal listeners could not be registered.
    #[error("signal registration failed: {0}")]
    Signals(#[source] std::io::Error),

    /// `start` was called on a supervisor that already left the created state.
    #[error("supervisor already started")]
    AlreadyStarted,
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use dutyvisor::RuntimeError;
    /// use std::time::Duration;
    ///
    /// let err = RuntimeError::GraceExceeded { grace: Duration::from_secs(5), stuck: vec![] };
    /// assert_eq!(err.as_label(), "runtime_grace_exceeded");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::GraceExceeded { .. } => "runtime_grace_exceeded",
            RuntimeError::InitialConfig(_) => "runtime_initial_config",
            RuntimeError::ChannelUnavailable(_) => "runtime_channel_unavailable",
            RuntimeError::Signals(_) => "runtime_signals",
            RuntimeError::AlreadyStarted => "runtime_already_started",
        }
    }
}

/// # Errors produced while loading a workload document.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The document could not be read from disk.
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The document is not valid TOML/JSON or does not match the schema.
    #[error("cannot parse {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    /// The document parsed but violates an invariant (e.g. `workers = 0`).
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl ConfigError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            ConfigError::Io { .. } => "config_io",
            ConfigError::Parse { .. } => "config_parse",
            ConfigError::Invalid(_) => "config_invalid",
        }
    }
}

/// # Errors produced by the assignment channel.
///
/// Only [`ChannelError::Io`] at creation time is fatal (see [`RuntimeError::ChannelUnavailable`]);
/// writes and reads report the other variants and leave prior state intact.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ChannelError {
    /// Creating, opening or mapping the segment failed.
    #[error("segment {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The serialized table does not fit (it needs a trailing NUL byte).
    #[error("assignment table needs {len} bytes, capacity is {capacity}")]
    TooLarge { len: usize, capacity: usize },

    /// The segment content is not a valid table (torn read, garbage, empty).
    #[error("cannot decode assignment table: {0}")]
    Parse(String),

    /// The table could not be serialized.
    #[error("cannot encode assignment table: {0}")]
    Encode(String),
}

impl ChannelError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            ChannelError::Io { .. } => "channel_io",
            ChannelError::TooLarge { .. } => "channel_too_large",
            ChannelError::Parse(_) => "channel_parse",
            ChannelError::Encode(_) => "channel_encode",
        }
    }
}

/// # Errors produced while launching or signalling worker processes.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum SpawnError {
    /// The OS refused to create the process.
    #[error("cannot launch worker for slot {slot}: {source}")]
    Launch {
        slot: usize,
        #[source]
        source: std::io::Error,
    },

    /// The target process no longer exists.
    #[error("process {pid} is gone")]
    Gone { pid: i32 },

    /// Any other signal delivery failure.
    #[error("cannot signal process {pid}: {reason}")]
    Signal { pid: i32, reason: String },
}

impl SpawnError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            SpawnError::Launch { .. } => "spawn_launch",
            SpawnError::Gone { .. } => "spawn_gone",
            SpawnError::Signal { .. } => "spawn_signal",
        }
    }
}

/// # Errors produced by the scheduling applier.
///
/// Never fatal: callers log them and keep running with whatever the OS currently has.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedError {
    /// The syscall failed (typically `EPERM`/`EACCES` without `CAP_SYS_NICE`).
    #[error("{op} failed: {errno}")]
    Os {
        op: &'static str,
        errno: nix::errno::Errno,
    },

    /// A CPU index outside what the platform's cpu set can express.
    #[error("cpu {0} is out of range")]
    InvalidCpu(usize),

    /// An empty affinity set was requested.
    #[error("empty cpu set")]
    EmptyCpuSet,

    /// The attribute is not supported on this platform.
    #[error("{0} is not supported on this platform")]
    Unsupported(&'static str),
}

impl SchedError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            SchedError::Os { .. } => "sched_os",
            SchedError::InvalidCpu(_) => "sched_invalid_cpu",
            SchedError::EmptyCpuSet => "sched_empty_cpu_set",
            SchedError::Unsupported(_) => "sched_unsupported",
        }
    }

    /// True when the target thread or process no longer exists.
    pub fn is_gone(&self) -> bool {
        matches!(
            self,
            SchedError::Os {
                errno: nix::errno::Errno::ESRCH,
                ..
            }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_are_stable() {
        let err = ChannelError::TooLarge {
            len: 10,
            capacity: 4,
        };
        assert_eq!(err.as_label(), "channel_too_large");
        assert_eq!(
            err.to_string(),
            "assignment table needs 10 bytes, capacity is 4"
        );

        let err = RuntimeError::from(ConfigError::Invalid("workers must be >= 1".into()));
        assert_eq!(err.as_label(), "runtime_initial_config");

        assert_eq!(SpawnError::Gone { pid: 7 }.as_label(), "spawn_gone");
        assert_eq!(SchedError::EmptyCpuSet.as_label(), "sched_empty_cpu_set");
    }
}
