//! Final output size extrapolation.

use std::path::Path;

use humansize::{BINARY, format_size};

const KEEP_WEIGHT: f64 = 0.667;
const NEW_WEIGHT: f64 = 0.333;

/// Extrapolates the final size of `output` from its current size.
///
/// `progress` is the completed fraction, 0.0 to 1.0. Returns zero while
/// nothing is known yet.
pub fn estimate_size(output: &Path, progress: f64) -> u64 {
    if progress.is_nan() || progress <= 0.0 {
        return 0;
    }
    match std::fs::metadata(output) {
        Ok(meta) => (meta.len() as f64 / progress.min(1.0)).round() as u64,
        Err(_) => 0,
    }
}

/// Damps the jitter of consecutive estimates with an exponential moving
/// average.
#[derive(Debug, Clone, Copy, Default)]
pub struct SizeEstimator {
    estimate: f64,
    last_progress: Option<f64>,
}

impl SizeEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds in a new observation and returns the smoothed estimate.
    /// Repeated progress values leave the estimate untouched.
    pub fn update(&mut self, output: &Path, progress: f64) -> u64 {
        if self.last_progress == Some(progress) {
            return self.current();
        }
        self.last_progress = Some(progress);
        let sample = estimate_size(output, progress) as f64;
        self.estimate = smooth(self.estimate, sample);
        self.current()
    }

    pub fn current(&self) -> u64 {
        self.estimate.round() as u64
    }
}

fn smooth(previous: f64, sample: f64) -> f64 {
    if previous == 0.0 {
        sample
    } else {
        KEEP_WEIGHT * previous + NEW_WEIGHT * sample
    }
}

/// e.g. "12.5 MiB"
pub fn format_bytes(bytes: u64) -> String {
    format_size(bytes, BINARY)
}
