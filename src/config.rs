//! Runtime settings for the launcher.
//!
//! Every field has a default, so an empty JSON object is a valid
//! configuration. Version constants live here rather than in code because
//! they have to follow the releases of the external tools.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Error;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LauncherConfig {
    pub timeouts: TimeoutPolicy,
    pub priority: ProcessPriority,
    /// Skip the encoder and filter version checks (not recommended).
    pub skip_version_check: bool,
    pub requirements: RequirementsTable,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        LauncherConfig {
            timeouts: TimeoutPolicy::default(),
            priority: ProcessPriority::BelowNormal,
            skip_version_check: false,
            requirements: RequirementsTable::default(),
        }
    }
}

impl LauncherConfig {
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Reads a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| Error::Config {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_json_str(&text).map_err(|e| Error::Config {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}

/// Deadlock detection and shutdown timing for supervised processes.
///
/// A process that stays alive without writing anything is first reported
/// after `warn_after` empty polls and killed after `kill_after` empty polls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutPolicy {
    pub poll_interval_ms: u64,
    pub warn_after: u32,
    /// `None` disables deadlock detection entirely.
    pub kill_after: Option<u32>,
    pub grace_period_ms: u64,
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        TimeoutPolicy {
            poll_interval_ms: 1_000,
            warn_after: 60,
            kill_after: Some(600),
            grace_period_ms: 5_000,
        }
    }
}

impl TimeoutPolicy {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    /// Never kill a silent process.
    pub fn without_deadlock_detection(mut self) -> Self {
        self.kill_after = None;
        self
    }
}

/// Scheduling priority given to every spawned tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessPriority {
    Normal,
    BelowNormal,
    Idle,
}

/// Version constraints for one external tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolRequirements {
    /// Lowest acceptable value of the tool's primary version number.
    pub minimum: u32,
    /// Newest primary version known to work; anything newer only warns.
    pub tested: Option<u32>,
    /// Lowest acceptable secondary number (API level, core version...).
    pub minimum_secondary: Option<u32>,
    /// Secondary number the launcher was tested against; deviations warn.
    pub tested_secondary: Option<u32>,
    /// The only acceptable primary version, for tools without compatibility
    /// guarantees.
    pub exact: Option<u32>,
    /// Exit codes that still count as success for a version query.
    pub allowed_exit_codes: Vec<i32>,
}

impl Default for ToolRequirements {
    fn default() -> Self {
        ToolRequirements {
            minimum: 0,
            tested: None,
            minimum_secondary: None,
            tested_secondary: None,
            exact: None,
            allowed_exit_codes: vec![0],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequirementsTable {
    pub x264: ToolRequirements,
    pub nvencc: ToolRequirements,
    pub avs2yuv: ToolRequirements,
    pub vspipe: ToolRequirements,
}

impl Default for RequirementsTable {
    fn default() -> Self {
        RequirementsTable {
            x264: crate::encoder::x264::default_requirements(),
            nvencc: crate::encoder::nvencc::default_requirements(),
            avs2yuv: crate::filter::avs2yuv_requirements(),
            vspipe: crate::filter::vspipe_requirements(),
        }
    }
}
