use std::env;
use std::path::PathBuf;
use std::sync::Arc;

pub mod cmdline;
pub mod config;
pub mod control;
pub mod encoder;
mod error;
pub mod estimate;
mod event;
pub mod filter;
mod handle;
mod job;
mod options;
mod pass;
pub mod pattern;
pub mod process;
pub mod reporter;
pub mod supervisor;
pub mod toolset;
pub mod version;

#[cfg(unix)]
#[doc(hidden)]
pub mod testing;

pub use config::{LauncherConfig, ProcessPriority, TimeoutPolicy, ToolRequirements};
pub use error::Error;
pub use event::{JobEvent, JobId, JobNotification, JobOutcome, JobSnapshot, JobStatus, Log, LogLevel};
pub use handle::JobHandle;
pub use job::JobBuilder;
pub use options::{
    Architecture, EncodeOptions, EncoderFamily, EncoderVariant, PROFILE_AUTO,
    PROFILE_UNRESTRICTED, RateControl, TUNE_NONE,
};
pub use toolset::Toolset;

/// Environment variable naming the install root used by [`Launcher::from_env`].
pub const HOME_ENV: &str = "ENCODE_LAUNCHER_HOME";

/// Name of the optional configuration file inside the install root.
pub const CONFIG_FILE: &str = "launcher.json";

/// Entry point: an install root with its bundled tools, plus the settings
/// shared by every job started from it.
#[derive(Debug, Clone)]
pub struct Launcher {
    toolset: Toolset,
    config: Arc<LauncherConfig>,
    spawn_lock: process::SpawnLock,
}

impl Launcher {
    /// Creates a launcher for the install root at `root`.
    pub fn new(root: impl Into<PathBuf>, config: LauncherConfig) -> Result<Self, Error> {
        Ok(Launcher {
            toolset: Toolset::new(root)?,
            config: Arc::new(config),
            spawn_lock: process::SpawnLock::new(),
        })
    }

    /// Creates a launcher for the install root named by `ENCODE_LAUNCHER_HOME`.
    ///
    /// Reads `launcher.json` from the root if present, otherwise uses the
    /// default configuration.
    pub fn from_env() -> Result<Self, Error> {
        let root = env::var_os(HOME_ENV)
            .map(PathBuf::from)
            .ok_or_else(|| Error::InvalidInstallRoot {
                path: PathBuf::new(),
                reason: format!("{HOME_ENV} is not set"),
            })?;
        let config_path = root.join(CONFIG_FILE);
        let config = if config_path.is_file() {
            LauncherConfig::load(&config_path)?
        } else {
            LauncherConfig::default()
        };
        Self::new(root, config)
    }

    pub fn toolset(&self) -> &Toolset {
        &self.toolset
    }

    pub fn config(&self) -> &LauncherConfig {
        &self.config
    }

    /// Starts building a new encoding job.
    pub fn job(
        &self,
        source: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
        options: EncodeOptions,
    ) -> JobBuilder {
        JobBuilder::new(
            source.into(),
            output.into(),
            options,
            self.toolset.clone(),
            Arc::clone(&self.config),
            self.spawn_lock.clone(),
        )
    }
}
