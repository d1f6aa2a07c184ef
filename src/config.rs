//! # Workload configuration document.
//!
//! [`WorkloadConfig`] is what the supervisor loads at start and on every reload:
//! pool size, the two duty profiles, per-slot scheduling assignments and an optional
//! restart limit.
//!
//! Loading goes through the [`ConfigSource`] trait so the supervisor never touches the
//! filesystem directly; [`FileSource`] is the production implementation (TOML, or JSON
//! when the path ends in `.json`).
//!
//! ## Document shape (TOML)
//! ```toml
//! workers = 2
//!
//! [mode_heavy]
//! work_us = 9000
//! sleep_us = 1000
//!
//! [mode_light]
//! work_us = 2000
//! sleep_us = 8000
//!
//! [restart_limit]
//! count = 5
//! window_seconds = 30
//!
//! [[assignments]]
//! worker_index = 0
//! nice = 5
//! cpu_affinity = [0, 1]
//! ```
//!
//! ## Rules
//! - `workers >= 1`, otherwise [`ConfigError::Invalid`].
//! - Missing modes fall back to [`DutyProfile::HEAVY`] / [`DutyProfile::LIGHT`].
//! - A loaded config is never mutated; reload replaces it wholesale.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::mode::{DutyProfile, ModeProfiles};

/// Scheduling attributes requested for one slot.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AssignmentSpec {
    /// Target slot; entries outside `[0, workers)` are ignored with a warning.
    pub worker_index: usize,
    #[serde(default)]
    pub nice: Option<i32>,
    #[serde(default)]
    pub cpu_affinity: Option<BTreeSet<usize>>,
}

/// Restart-rate limit override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RestartLimit {
    pub count: usize,
    pub window_seconds: u64,
}

impl RestartLimit {
    #[inline]
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_seconds)
    }
}

/// Parsed workload document.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WorkloadConfig {
    pub workers: usize,
    #[serde(default = "default_heavy")]
    pub mode_heavy: DutyProfile,
    #[serde(default = "default_light")]
    pub mode_light: DutyProfile,
    #[serde(default)]
    pub assignments: Vec<AssignmentSpec>,
    #[serde(default)]
    pub restart_limit: Option<RestartLimit>,
}

fn default_heavy() -> DutyProfile {
    DutyProfile::HEAVY
}

fn default_light() -> DutyProfile {
    DutyProfile::LIGHT
}

impl WorkloadConfig {
    /// A pool of `workers` with calibration-default profiles and no assignments.
    pub fn with_workers(workers: usize) -> Self {
        Self {
            workers,
            mode_heavy: DutyProfile::HEAVY,
            mode_light: DutyProfile::LIGHT,
            assignments: Vec::new(),
            restart_limit: None,
        }
    }

    /// Profiles handed to every worker launched under this config.
    #[inline]
    pub fn profiles(&self) -> ModeProfiles {
        ModeProfiles {
            heavy: self.mode_heavy,
            light: self.mode_light,
        }
    }

    /// Checks document invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::Invalid("workers must be >= 1".into()));
        }
        if let Some(limit) = self.restart_limit {
            if limit.count == 0 {
                return Err(ConfigError::Invalid("restart_limit.count must be >= 1".into()));
            }
            if limit.window_seconds == 0 {
                return Err(ConfigError::Invalid(
                    "restart_limit.window_seconds must be >= 1".into(),
                ));
            }
        }
        Ok(())
    }

    /// Parses and validates a TOML document.
    pub fn from_toml_str(raw: &str, origin: &Path) -> Result<Self, ConfigError> {
        let cfg: WorkloadConfig = toml::from_str(raw).map_err(|e| ConfigError::Parse {
            path: origin.to_path_buf(),
            reason: e.to_string(),
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parses and validates a JSON document.
    pub fn from_json_str(raw: &str, origin: &Path) -> Result<Self, ConfigError> {
        let cfg: WorkloadConfig = serde_json::from_str(raw).map_err(|e| ConfigError::Parse {
            path: origin.to_path_buf(),
            reason: e.to_string(),
        })?;
        cfg.validate()?;
        Ok(cfg)
    }
}

/// Collaborator that produces a fresh [`WorkloadConfig`] on demand.
///
/// Called once at startup and once per reload, always from the supervisor control loop.
pub trait ConfigSource: Send {
    /// Loads the current document.
    fn load(&self) -> Result<WorkloadConfig, ConfigError>;

    /// Human-readable origin for logs.
    fn describe(&self) -> String {
        std::any::type_name::<Self>().to_string()
    }
}

/// Reads the workload document from a file on every call.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn is_json(&self) -> bool {
        self.path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"))
    }
}

impl ConfigSource for FileSource {
    fn load(&self) -> Result<WorkloadConfig, ConfigError> {
        let raw = fs::read_to_string(&self.path).map_err(|source| ConfigError::Io {
            path: self.path.clone(),
            source,
        })?;
        if self.is_json() {
            WorkloadConfig::from_json_str(&raw, &self.path)
        } else {
            WorkloadConfig::from_toml_str(&raw, &self.path)
        }
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_toml() -> &'static str {
        r#"
workers = 3

[mode_heavy]
work_us = 7000
sleep_us = 3000

[restart_limit]
count = 2
window_seconds = 10

[[assignments]]
worker_index = 0
nice = 5
cpu_affinity = [0, 1]

[[assignments]]
worker_index = 2
"#
    }

    #[test]
    fn test_load_toml_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("workload.toml");
        fs::write(&path, sample_toml()).unwrap();

        let cfg = FileSource::new(&path).load().unwrap();
        assert_eq!(cfg.workers, 3);
        assert_eq!(
            cfg.mode_heavy,
            DutyProfile {
                work_us: 7000,
                sleep_us: 3000
            }
        );
        assert_eq!(cfg.mode_light, DutyProfile::LIGHT);
        assert_eq!(cfg.assignments.len(), 2);
        assert_eq!(cfg.assignments[0].nice, Some(5));
        assert_eq!(
            cfg.assignments[0].cpu_affinity,
            Some(BTreeSet::from([0, 1]))
        );
        assert_eq!(cfg.assignments[1].nice, None);
        assert_eq!(cfg.restart_limit.unwrap().window(), Duration::from_secs(10));
    }

    #[test]
    fn test_load_json_by_extension() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("workload.json");
        fs::write(
            &path,
            r#"{"workers": 2, "assignments": [{"worker_index": 1, "nice": 10}]}"#,
        )
        .unwrap();

        let cfg = FileSource::new(&path).load().unwrap();
        assert_eq!(cfg.workers, 2);
        assert_eq!(cfg.profiles(), ModeProfiles::default());
        assert_eq!(cfg.assignments[0].worker_index, 1);
    }

    #[test]
    fn test_zero_workers_is_invalid() {
        let err = WorkloadConfig::from_toml_str("workers = 0", Path::new("x.toml")).unwrap_err();
        assert_eq!(err.as_label(), "config_invalid");
    }

    #[test]
    fn test_malformed_document_is_parse_error() {
        let err =
            WorkloadConfig::from_toml_str("workers = [oops", Path::new("x.toml")).unwrap_err();
        assert_eq!(err.as_label(), "config_parse");
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempdir().unwrap();
        let err = FileSource::new(dir.path().join("absent.toml"))
            .load()
            .unwrap_err();
        assert_eq!(err.as_label(), "config_io");
    }
}
