//! Progress tracking for one encoding pass.

use std::path::Path;

use crate::estimate::{SizeEstimator, format_bytes};
use crate::event::JobStatus;
use crate::options::EncoderVariant;
use crate::pattern::{LineKind, RuleMatch};
use crate::reporter::Reporter;
use crate::supervisor::LineSink;

/// Turns recognised encoder lines into status, progress and details.
pub struct PassSink<'a> {
    pass: u8,
    variant: EncoderVariant,
    output: &'a Path,
    /// Frame count of the source, if known. Needed for encoders that report
    /// frames instead of percent.
    total_frames: u32,
    estimator: SizeEstimator,
}

impl<'a> PassSink<'a> {
    pub fn new(pass: u8, variant: EncoderVariant, output: &'a Path, total_frames: u32) -> Self {
        PassSink {
            pass,
            variant,
            output,
            total_frames,
            estimator: SizeEstimator::new(),
        }
    }

    fn running(&self) -> JobStatus {
        JobStatus::for_pass(self.pass)
    }

    fn on_frames(&mut self, reporter: &Reporter, tail: &str, frames: u32) {
        reporter.set_status(self.running());
        let mut fraction = 0.0;
        if self.total_frames > 0 {
            fraction = f64::from(frames) / f64::from(self.total_frames);
            reporter.set_progress((fraction * 100.0).floor() as u32);
            self.estimator.update(self.output, fraction);
        }
        reporter.set_details(format!(
            "[{:.1}%] {tail}, est. file size {}",
            fraction * 100.0,
            format_bytes(self.estimator.current())
        ));
    }
}

impl LineSink for PassSink<'_> {
    fn on_match(&mut self, reporter: &Reporter, line: &str, m: &RuleMatch) {
        let tail = m.tail(line);
        match m.kind {
            LineKind::PercentProgress => {
                reporter.set_status(self.running());
                let percent = m.value(0);
                reporter.set_progress(percent);
                let size = self
                    .estimator
                    .update(self.output, f64::from(percent.min(100)) / 100.0);
                reporter.set_details(format!("{tail}, est. file size {}", format_bytes(size)));
            }
            LineKind::Indexing => {
                reporter.set_status(JobStatus::Indexing);
                reporter.set_progress(m.value(0));
                reporter.set_details(tail);
            }
            LineKind::FrameSummary => {
                reporter.set_status(self.running());
                reporter.set_details(tail);
            }
            LineKind::FramesDone => self.on_frames(reporter, tail, m.value(0)),
            LineKind::HardwareUnsupported => reporter.error(format!(
                "ERROR: YOUR HARDWARE DOES *NOT* SUPPORT THE '{}' CODEC !!!",
                self.variant
            )),
            LineKind::ApiUnavailable => {
                reporter.error("ERROR: NVIDIA ENCODER API (NVENCODEAPI) IS *NOT* AVAILABLE !!!")
            }
            _ => reporter.info(line),
        }
    }

    fn on_success(&mut self, reporter: &Reporter) {
        reporter.set_status(self.running());
        reporter.set_progress(100);
        reporter.set_details(match self.pass {
            1 => "First pass completed. Preparing for second pass...",
            2 => "Second pass completed successfully.",
            _ => "Encode completed successfully.",
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::EncoderFamily;
    use tokio::sync::watch;

    fn feed(sink: &mut PassSink<'_>, family: EncoderFamily, reporter: &Reporter, line: &str) {
        let m = family.pass_dialect().match_line(line).expect("line should match");
        sink.on_match(reporter, line, &m);
    }

    fn reporter() -> (Reporter, watch::Receiver<crate::JobSnapshot>) {
        Reporter::new(uuid::Uuid::new_v4(), None)
    }

    #[test]
    fn test_x264_percent_line() {
        let (reporter, snapshot) = reporter();
        let mut sink = PassSink::new(1, EncoderVariant::Bit8, Path::new("/nonexistent"), 0);
        feed(
            &mut sink,
            EncoderFamily::X264,
            &reporter,
            "[33.3%] 400/1200 frames, 30.00 fps, 1000.00 kb/s, eta 0:00:26",
        );
        let s = snapshot.borrow();
        assert_eq!(s.status, JobStatus::RunningPass1);
        assert_eq!(s.progress, 33);
        assert_eq!(
            s.details,
            "[33.3%] 400/1200 frames, 30.00 fps, 1000.00 kb/s, eta 0:00:26, est. file size 0 B"
        );
    }

    #[test]
    fn test_indexing_then_running_resets_progress() {
        let (reporter, snapshot) = reporter();
        let mut sink = PassSink::new(0, EncoderVariant::Bit8, Path::new("/nonexistent"), 0);
        feed(&mut sink, EncoderFamily::X264, &reporter, "indexing input file [80.2%]");
        assert_eq!(snapshot.borrow().status, JobStatus::Indexing);
        assert_eq!(snapshot.borrow().progress, 80);

        feed(&mut sink, EncoderFamily::X264, &reporter, "[1.0%] 10/1000 frames");
        assert_eq!(snapshot.borrow().status, JobStatus::Running);
        assert_eq!(snapshot.borrow().progress, 1);
    }

    #[test]
    fn test_frame_count_progress() {
        let (reporter, snapshot) = reporter();
        let mut sink = PassSink::new(0, EncoderVariant::Hevc, Path::new("/nonexistent"), 400);
        feed(&mut sink, EncoderFamily::NvEncC, &reporter, "100 frames: 240.0 fps");
        let s = snapshot.borrow().clone();
        assert_eq!(s.progress, 25);
        assert!(s.details.starts_with("[25.0%] 100 frames: 240.0 fps"), "{}", s.details);
    }

    #[test]
    fn test_error_signature_is_logged() {
        let (reporter, _snapshot) = reporter();
        let mut sink = PassSink::new(0, EncoderVariant::Hevc, Path::new("/nonexistent"), 400);
        feed(
            &mut sink,
            EncoderFamily::NvEncC,
            &reporter,
            "Selected codec is not supported",
        );
        let log = reporter.log_lines();
        assert!(log[0].message.contains("'HEVC' CODEC"));
    }

    #[test]
    fn test_success_completes_pass() {
        let (reporter, snapshot) = reporter();
        let mut sink = PassSink::new(1, EncoderVariant::Bit8, Path::new("/nonexistent"), 0);
        sink.on_success(&reporter);
        let s = snapshot.borrow();
        assert_eq!((s.status, s.progress), (JobStatus::RunningPass1, 100));
        assert!(s.details.starts_with("First pass completed"));
    }
}
