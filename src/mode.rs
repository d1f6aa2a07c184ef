//! # Duty-cycle modes and their timing profiles.
//!
//! Every worker runs in one of two [`Mode`]s. Each mode maps to a [`DutyProfile`]
//! (`work_us` of busy-work followed by `sleep_us` of sleep). The pair of profiles
//! travels with a worker from launch as [`ModeProfiles`].
//!
//! ## Calibration defaults
//! ```text
//! heavy: work_us = 9000, sleep_us = 1000   (~90% duty)
//! light: work_us = 2000, sleep_us = 8000   (~20% duty)
//! ```

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Process-wide worker mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Long busy-work phase, short sleep (default).
    #[default]
    Heavy,
    /// Short busy-work phase, long sleep.
    Light,
}

impl Mode {
    /// Stable lowercase name used on the command line and in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Heavy => "heavy",
            Mode::Light => "light",
        }
    }

    /// Compact encoding for atomics (`0 = heavy`, `1 = light`).
    #[inline]
    pub(crate) fn to_u8(self) -> u8 {
        match self {
            Mode::Heavy => 0,
            Mode::Light => 1,
        }
    }

    /// Inverse of [`Mode::to_u8`]; unknown values decode as `Heavy`.
    #[inline]
    pub(crate) fn from_u8(v: u8) -> Self {
        match v {
            1 => Mode::Light,
            _ => Mode::Heavy,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "heavy" => Ok(Mode::Heavy),
            "light" => Ok(Mode::Light),
            other => Err(format!("unknown mode {other:?} (expected heavy|light)")),
        }
    }
}

/// Busy-work / sleep durations of one duty cycle, in microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DutyProfile {
    pub work_us: u64,
    pub sleep_us: u64,
}

impl DutyProfile {
    /// Calibration default for [`Mode::Heavy`].
    pub const HEAVY: DutyProfile = DutyProfile {
        work_us: 9_000,
        sleep_us: 1_000,
    };

    /// Calibration default for [`Mode::Light`].
    pub const LIGHT: DutyProfile = DutyProfile {
        work_us: 2_000,
        sleep_us: 8_000,
    };

    #[inline]
    pub fn work(&self) -> Duration {
        Duration::from_micros(self.work_us)
    }

    #[inline]
    pub fn sleep(&self) -> Duration {
        Duration::from_micros(self.sleep_us)
    }
}

impl fmt::Display for DutyProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.work_us, self.sleep_us)
    }
}

/// Parses the `<work_us>:<sleep_us>` form used by the worker command line.
impl FromStr for DutyProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (work, sleep) = s
            .split_once(':')
            .ok_or_else(|| format!("expected <work_us>:<sleep_us>, got {s:?}"))?;
        let work_us = work
            .trim()
            .parse::<u64>()
            .map_err(|e| format!("work_us {work:?}: {e}"))?;
        let sleep_us = sleep
            .trim()
            .parse::<u64>()
            .map_err(|e| format!("sleep_us {sleep:?}: {e}"))?;
        Ok(DutyProfile { work_us, sleep_us })
    }
}

/// The profile pair a worker is launched with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeProfiles {
    pub heavy: DutyProfile,
    pub light: DutyProfile,
}

impl ModeProfiles {
    /// Returns the profile for `mode`.
    #[inline]
    pub fn get(&self, mode: Mode) -> DutyProfile {
        match mode {
            Mode::Heavy => self.heavy,
            Mode::Light => self.light,
        }
    }
}

impl Default for ModeProfiles {
    fn default() -> Self {
        Self {
            heavy: DutyProfile::HEAVY,
            light: DutyProfile::LIGHT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_parses_case_insensitively() {
        assert_eq!("LIGHT".parse::<Mode>(), Ok(Mode::Light));
        assert_eq!(" heavy ".parse::<Mode>(), Ok(Mode::Heavy));
        assert!("medium".parse::<Mode>().is_err());
    }

    #[test]
    fn mode_u8_encoding_is_total() {
        assert_eq!(Mode::from_u8(Mode::Light.to_u8()), Mode::Light);
        assert_eq!(Mode::from_u8(Mode::Heavy.to_u8()), Mode::Heavy);
        assert_eq!(Mode::from_u8(200), Mode::Heavy);
    }

    #[test]
    fn profile_parses_work_sleep_pair() {
        let p: DutyProfile = "2000:8000".parse().unwrap();
        assert_eq!(p, DutyProfile::LIGHT);
        assert_eq!(p.to_string(), "2000:8000");
        assert!("2000".parse::<DutyProfile>().is_err());
        assert!("a:1".parse::<DutyProfile>().is_err());
    }

    #[test]
    fn profiles_select_by_mode() {
        let profiles = ModeProfiles::default();
        assert_eq!(profiles.get(Mode::Heavy).work(), Duration::from_micros(9000));
        assert_eq!(profiles.get(Mode::Light).sleep(), Duration::from_micros(8000));
    }
}
