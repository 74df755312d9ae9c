//! The encoder families and everything that differs between them.
//!
//! Each family lives in its own module and exposes the same handful of
//! items; [`EncoderFamily`] dispatches to them with a `match`.

use std::path::{Path, PathBuf};

use crate::config::{RequirementsTable, ToolRequirements};
use crate::error::Error;
use crate::options::{Architecture, EncodeOptions, EncoderFamily, EncoderVariant, RateControl};
use crate::pattern::Dialect;
use crate::version::{VersionDecoder, VersionNaming};

pub mod nvencc;
pub mod x264;

/// Static facts about an encoder family.
///
/// Path templates are relative to the install root. `{arch}` and `{variant}`
/// are replaced by [`Architecture::as_str`] and [`EncoderVariant::as_str`].
#[derive(Debug)]
pub struct EncoderDescriptor {
    pub family: EncoderFamily,
    pub name: &'static str,
    /// Codec name shown next to the family name.
    pub codec: &'static str,
    pub architectures: &'static [Architecture],
    pub variants: &'static [EncoderVariant],
    pub rate_controls: &'static [RateControl],
    pub max_quantizer: f64,
    pub presets: &'static [&'static str],
    pub tunings: &'static [&'static str],
    pub(crate) profiles: &'static [(EncoderVariant, &'static [&'static str])],
    /// File extensions the encoder reads without a filter front-end.
    pub input_formats: &'static [&'static str],
    pub output_formats: &'static [&'static str],
    pub binary: &'static str,
    /// Files that must sit next to the binary.
    pub dependencies: &'static [&'static str],
    pub version_args: &'static [&'static str],
}

impl EncoderDescriptor {
    /// Profiles selectable for `variant`, lower case.
    pub fn profiles(&self, variant: EncoderVariant) -> &'static [&'static str] {
        self.profiles
            .iter()
            .find(|(v, _)| *v == variant)
            .map(|(_, profiles)| *profiles)
            .unwrap_or(&[])
    }

    /// e.g. "x264 (H.264/AVC), 64-Bit (x64), 8-Bit"
    pub fn full_name(&self, arch: Architecture, variant: EncoderVariant) -> String {
        format!("{} ({}), {arch}, {variant}", self.name, self.codec)
    }

    pub fn accepts_input(&self, extension: &str) -> bool {
        self.input_formats
            .iter()
            .any(|ext| ext.eq_ignore_ascii_case(extension))
    }
}

pub fn descriptor(family: EncoderFamily) -> &'static EncoderDescriptor {
    match family {
        EncoderFamily::X264 => &x264::DESCRIPTOR,
        EncoderFamily::NvEncC => &nvencc::DESCRIPTOR,
    }
}

/// How one encoder invocation is fed and which pass it runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunMode {
    /// Read y4m from stdin instead of opening the source directly.
    pub piped: bool,
    /// Frame count of the piped source.
    pub frames: u32,
    /// 0 for a single pass, else 1 or 2.
    pub pass: u8,
    pub stats_file: Option<PathBuf>,
}

impl RunMode {
    pub fn direct() -> Self {
        Self::default()
    }

    pub fn piped(frames: u32) -> Self {
        RunMode {
            piped: true,
            frames,
            ..Self::default()
        }
    }

    pub fn pass(mut self, pass: u8, stats_file: impl Into<PathBuf>) -> Self {
        self.pass = pass;
        self.stats_file = Some(stats_file.into());
        self
    }
}

/// A built argument list plus anything worth telling the user about it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandLine {
    pub args: Vec<String>,
    pub warnings: Vec<String>,
}

impl EncoderFamily {
    /// Builds the encoder arguments for one invocation.
    ///
    /// Pure: the same inputs always yield the same arguments.
    pub fn build_command_line(
        self,
        options: &EncodeOptions,
        mode: &RunMode,
        source: &Path,
        output: &Path,
    ) -> Result<CommandLine, Error> {
        let desc = descriptor(self);
        if !desc.rate_controls.contains(&options.rate_control) {
            return Err(Error::UnsupportedRateControl {
                family: self,
                mode: options.rate_control,
            });
        }
        if mode.piped && mode.frames == 0 {
            return Err(Error::MissingFrameCount);
        }
        match self {
            EncoderFamily::X264 => x264::build_command_line(options, mode, source, output),
            EncoderFamily::NvEncC => nvencc::build_command_line(options, mode, source, output),
        }
    }

    pub fn version_dialect(self) -> &'static Dialect {
        match self {
            EncoderFamily::X264 => &x264::VERSION_DIALECT,
            EncoderFamily::NvEncC => &nvencc::VERSION_DIALECT,
        }
    }

    pub fn version_decoder(self) -> VersionDecoder {
        match self {
            EncoderFamily::X264 => x264::decode_version,
            EncoderFamily::NvEncC => nvencc::decode_version,
        }
    }

    pub fn version_naming(self) -> &'static VersionNaming {
        match self {
            EncoderFamily::X264 => &x264::NAMING,
            EncoderFamily::NvEncC => &nvencc::NAMING,
        }
    }

    pub fn pass_dialect(self) -> &'static Dialect {
        match self {
            EncoderFamily::X264 => &x264::PASS_DIALECT,
            EncoderFamily::NvEncC => &nvencc::PASS_DIALECT,
        }
    }

    pub fn requirements(self, table: &RequirementsTable) -> &ToolRequirements {
        match self {
            EncoderFamily::X264 => &table.x264,
            EncoderFamily::NvEncC => &table.nvencc,
        }
    }

    /// Exit codes of an encoding run that count as success.
    pub fn encode_exit_codes(self) -> &'static [i32] {
        &[0]
    }
}

/// Appends the custom arguments, stripped of pipe conflicts when piped.
pub(crate) fn push_custom_args(
    cmd: &mut CommandLine,
    custom: &str,
    piped: bool,
    source: &Path,
    output: &Path,
) -> Result<(), Error> {
    let args = crate::cmdline::tokenize(custom, source, output)?;
    if piped {
        let (kept, warnings) = crate::cmdline::strip_pipe_conflicts(args);
        cmd.args.extend(kept);
        cmd.warnings.extend(warnings);
    } else {
        cmd.args.extend(args);
    }
    Ok(())
}

pub(crate) fn path_arg(path: &Path) -> String {
    path.display().to_string()
}
