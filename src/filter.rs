//! Script front-ends that decode Avisynth and VapourSynth sources into a
//! y4m stream for the encoder.

use std::fmt;
use std::path::Path;

use once_cell::sync::Lazy;

use crate::config::{RequirementsTable, ToolRequirements};
use crate::error::Error;
use crate::pattern::{Dialect, LineKind, RuleMatch, builtin};
use crate::reporter::Reporter;
use crate::supervisor::{LineSink, ProcessSpec, RunContext, RunResult, Supervisor};
use crate::version::{ToolVersion, VersionDecoder, VersionNaming};

#[cfg(windows)]
const NULL_DEVICE: &str = "NUL";
#[cfg(not(windows))]
const NULL_DEVICE: &str = "/dev/null";

/// How the encoder gets at the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    /// The encoder opens the file itself.
    Native,
    Avisynth,
    VapourSynth,
}

impl InputKind {
    /// Decides by file extension, ignoring case.
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "avs" => InputKind::Avisynth,
            "vpy" | "py" => InputKind::VapourSynth,
            _ => InputKind::Native,
        }
    }

    pub fn filter(self) -> Option<FilterTool> {
        match self {
            InputKind::Native => None,
            InputKind::Avisynth => Some(FilterTool::Avs2Yuv),
            InputKind::VapourSynth => Some(FilterTool::VsPipe),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterTool {
    Avs2Yuv,
    VsPipe,
}

static AVS2YUV_VERSION: Lazy<Dialect> = Lazy::new(|| {
    Dialect::new(
        "avs2yuv version",
        vec![builtin(LineKind::Version, r"Avs2YUV (\d+)\.(\d+)bm(\d)")],
    )
});

static AVS2YUV_INFO: Lazy<Dialect> = Lazy::new(|| {
    Dialect::new(
        "avs2yuv info",
        vec![
            builtin(
                LineKind::SourceSummary,
                r": (\d+)x(\d+), (\d+) fps, (\d+) frames",
            ),
            builtin(
                LineKind::SourceSummaryFraction,
                r": (\d+)x(\d+), (\d+)/(\d+) fps, (\d+) frames",
            ),
        ],
    )
});

static VSPIPE_VERSION: Lazy<Dialect> = Lazy::new(|| {
    Dialect::new(
        "vspipe version",
        vec![builtin(LineKind::Version, r"\bCore\s+R(\d+)")],
    )
});

static VSPIPE_INFO: Lazy<Dialect> = Lazy::new(|| {
    Dialect::new(
        "vspipe info",
        vec![
            builtin(LineKind::SourceWidth, r"^Width:\s+(\d+)"),
            builtin(LineKind::SourceHeight, r"^Height:\s+(\d+)"),
            builtin(LineKind::SourceFrames, r"^Frames:\s+(\d+)"),
            builtin(LineKind::SourceFrameRate, r"^FPS:\s+(\d+)/(\d+)"),
        ],
    )
});

static AVS2YUV_NAMING: VersionNaming = VersionNaming {
    tool: "avs2yuv",
    primary: |v| format!("0.{}bm{}", v / 10, v % 10),
    secondary: |v| v.to_string(),
    display: |v| {
        format!(
            "Avs2YUV version: {}.{}.{}",
            v.secondary,
            v.primary / 10,
            v.primary % 10
        )
    },
};

static VSPIPE_NAMING: VersionNaming = VersionNaming {
    tool: "VapourSynth",
    primary: |v| format!("R{v}"),
    secondary: |v| v.to_string(),
    display: |v| format!("VapourSynth version: Core R{}", v.primary),
};

/// Only v0.24bm2 is known to produce a correct pipe.
pub fn avs2yuv_requirements() -> ToolRequirements {
    ToolRequirements {
        exact: Some(242),
        allowed_exit_codes: vec![0, 2],
        ..ToolRequirements::default()
    }
}

pub fn vspipe_requirements() -> ToolRequirements {
    ToolRequirements {
        minimum: 45,
        tested: Some(65),
        allowed_exit_codes: vec![0],
        ..ToolRequirements::default()
    }
}

/// `Avs2YUV M.mmbmB`: primary is `mm * 10 + B`, secondary is `M`.
fn decode_avs2yuv(m: &RuleMatch, version: &mut ToolVersion) {
    version.secondary = m.value(0);
    version.primary = m.value(1) * 10 + m.value(2);
}

fn decode_vspipe(m: &RuleMatch, version: &mut ToolVersion) {
    version.primary = m.value(0);
}

impl FilterTool {
    pub fn label(self) -> &'static str {
        match self {
            FilterTool::Avs2Yuv => "avs2yuv",
            FilterTool::VsPipe => "vspipe",
        }
    }

    /// Binary location relative to the install root. `{arch}` expands like
    /// in encoder templates.
    pub fn binary(self) -> &'static str {
        match self {
            FilterTool::Avs2Yuv => "toolset/{arch}/avs2yuv_{arch}",
            FilterTool::VsPipe => "extra/vapoursynth/vspipe",
        }
    }

    pub fn version_args(self) -> Vec<String> {
        match self {
            FilterTool::Avs2Yuv => Vec::new(),
            FilterTool::VsPipe => vec!["--version".into()],
        }
    }

    pub fn version_dialect(self) -> &'static Dialect {
        match self {
            FilterTool::Avs2Yuv => &AVS2YUV_VERSION,
            FilterTool::VsPipe => &VSPIPE_VERSION,
        }
    }

    pub fn version_decoder(self) -> VersionDecoder {
        match self {
            FilterTool::Avs2Yuv => decode_avs2yuv,
            FilterTool::VsPipe => decode_vspipe,
        }
    }

    pub fn version_naming(self) -> &'static VersionNaming {
        match self {
            FilterTool::Avs2Yuv => &AVS2YUV_NAMING,
            FilterTool::VsPipe => &VSPIPE_NAMING,
        }
    }

    pub fn requirements(self, table: &RequirementsTable) -> &ToolRequirements {
        match self {
            FilterTool::Avs2Yuv => &table.avs2yuv,
            FilterTool::VsPipe => &table.vspipe,
        }
    }

    /// Arguments that print the source properties without decoding it all.
    pub fn info_args(self, source: &Path) -> Vec<String> {
        let source = source.display().to_string();
        match self {
            FilterTool::Avs2Yuv => vec!["-frames".into(), "1".into(), source, NULL_DEVICE.into()],
            FilterTool::VsPipe => vec!["--info".into(), source, "-".into()],
        }
    }

    pub fn info_dialect(self) -> &'static Dialect {
        match self {
            FilterTool::Avs2Yuv => &AVS2YUV_INFO,
            FilterTool::VsPipe => &VSPIPE_INFO,
        }
    }

    /// Arguments that stream the decoded source as y4m to stdout.
    pub fn pipe_args(self, source: &Path, output: &Path, custom: &str) -> Result<Vec<String>, Error> {
        let custom = crate::cmdline::tokenize(custom, source, output)?;
        let mut args = Vec::with_capacity(custom.len() + 3);
        if self == FilterTool::VsPipe {
            args.push("--y4m".to_string());
        }
        args.extend(custom);
        args.extend([source.display().to_string(), "-".to_string()]);
        Ok(args)
    }
}

impl fmt::Display for FilterTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterTool::Avs2Yuv => f.write_str("Avisynth"),
            FilterTool::VsPipe => f.write_str("VapourSynth"),
        }
    }
}

/// What a filter reported about its source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceInfo {
    pub width: u32,
    pub height: u32,
    pub fps_num: u32,
    /// Zero for an integer frame rate.
    pub fps_den: u32,
    pub frames: u32,
}

impl SourceInfo {
    /// Writes resolution, frame rate and frame count to the job log.
    pub fn log_to(&self, reporter: &Reporter) {
        if self.width > 0 && self.height > 0 {
            reporter.info(format!("Resolution: {}x{}", self.width, self.height));
        }
        if self.fps_num > 0 && self.fps_den > 0 {
            reporter.info(format!("Frame Rate: {}/{}", self.fps_num, self.fps_den));
        } else if self.fps_num > 0 {
            reporter.info(format!("Frame Rate: {}", self.fps_num));
        }
        if self.frames > 0 {
            reporter.info(format!("No. Frames: {}", self.frames));
        }
    }
}

#[derive(Default)]
struct PropertySink {
    info: SourceInfo,
}

impl LineSink for PropertySink {
    fn on_match(&mut self, _reporter: &Reporter, _line: &str, m: &RuleMatch) {
        let info = &mut self.info;
        match m.kind {
            LineKind::SourceSummary => {
                info.width = m.value(0);
                info.height = m.value(1);
                info.fps_num = m.value(2);
                info.fps_den = 0;
                info.frames = m.value(3);
            }
            LineKind::SourceSummaryFraction => {
                info.width = m.value(0);
                info.height = m.value(1);
                info.fps_num = m.value(2);
                info.fps_den = m.value(3);
                info.frames = m.value(4);
            }
            LineKind::SourceWidth => info.width = m.value(0),
            LineKind::SourceHeight => info.height = m.value(0),
            LineKind::SourceFrames => info.frames = m.value(0),
            LineKind::SourceFrameRate => {
                info.fps_num = m.value(0);
                info.fps_den = m.value(1);
            }
            _ => {}
        }
    }

    fn echo_matched(&self) -> bool {
        true
    }
}

/// Runs the filter's info command and collects the source properties.
pub async fn probe_source(
    ctx: RunContext<'_>,
    tool: FilterTool,
    spec: &ProcessSpec,
) -> (SourceInfo, RunResult) {
    let ctx = RunContext { pause: None, ..ctx };
    let mut sink = PropertySink::default();
    let result = Supervisor::new(ctx)
        .run(spec, None, tool.info_dialect(), &mut sink, &[0])
        .await;
    (sink.info, result)
}
