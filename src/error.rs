use std::path::PathBuf;

use thiserror::Error;

use crate::options::{Architecture, EncoderFamily, EncoderVariant, RateControl};

#[derive(Error, Debug)]
pub enum Error {
    #[error("Executable '{name}' not found. Searched paths: {searched_paths:?}")]
    ExecutableNotFound {
        name: String,
        searched_paths: Vec<PathBuf>,
    },
    #[error("Invalid install root '{path}': {reason}")]
    InvalidInstallRoot { path: PathBuf, reason: String },
    #[error("Failed to spawn '{program}': {source}")]
    ProcessSpawnFailed {
        program: PathBuf,
        source: std::io::Error,
    },
    #[error("Bad rate-control mode: {family} does not support {mode}")]
    UnsupportedRateControl {
        family: EncoderFamily,
        mode: RateControl,
    },
    #[error("{family} does not support the {variant} variant")]
    UnsupportedVariant {
        family: EncoderFamily,
        variant: EncoderVariant,
    },
    #[error("{family} does not support the {arch} architecture")]
    UnsupportedArchitecture {
        family: EncoderFamily,
        arch: Architecture,
    },
    #[error("Invalid value for {mode}: {reason}")]
    InvalidRateControlValue { mode: RateControl, reason: String },
    #[error("Profile '{profile}' is not available for {family} ({variant})")]
    UnsupportedProfile {
        family: EncoderFamily,
        variant: EncoderVariant,
        profile: String,
    },
    #[error("Frames not set! Piped input requires a known, non-zero frame count")]
    MissingFrameCount,
    #[error("Pass {pass} of a two-pass encode requires a stats file")]
    MissingStatsFile { pass: u8 },
    #[error("Invalid custom parameters: {reason}")]
    InvalidCustomArgs { reason: String },
    #[error("Invalid line pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        source: regex::Error,
    },
    #[error("Failed to load configuration from '{path}': {reason}")]
    Config { path: PathBuf, reason: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Configuration errors are raised while building a command line and are
    /// never worth retrying.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::UnsupportedRateControl { .. }
                | Error::UnsupportedVariant { .. }
                | Error::UnsupportedArchitecture { .. }
                | Error::InvalidRateControlValue { .. }
                | Error::UnsupportedProfile { .. }
                | Error::MissingFrameCount
                | Error::MissingStatsFile { .. }
                | Error::InvalidCustomArgs { .. }
        )
    }
}
