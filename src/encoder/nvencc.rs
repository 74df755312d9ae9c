use std::path::Path;

use once_cell::sync::Lazy;

use super::{CommandLine, EncoderDescriptor, RunMode, path_arg, push_custom_args};
use crate::config::ToolRequirements;
use crate::error::Error;
use crate::options::{
    Architecture, EncodeOptions, EncoderFamily, EncoderVariant, RateControl, is_profile_sentinel,
};
use crate::pattern::{Dialect, LineKind, RuleMatch, builtin, builtin_nocase};
use crate::version::{ToolVersion, VersionNaming};

#[cfg(windows)]
const DEPENDENCIES: &[&str] = &[
    "toolset/{arch}/avcodec-57.dll",
    "toolset/{arch}/avfilter-6.dll",
    "toolset/{arch}/avformat-57.dll",
    "toolset/{arch}/avutil-55.dll",
    "toolset/{arch}/swresample-2.dll",
];
#[cfg(not(windows))]
const DEPENDENCIES: &[&str] = &[];

pub static DESCRIPTOR: EncoderDescriptor = EncoderDescriptor {
    family: EncoderFamily::NvEncC,
    name: "NVEncC",
    codec: "NVENC",
    architectures: &[Architecture::X86, Architecture::X64],
    variants: &[EncoderVariant::Avc, EncoderVariant::Hevc],
    rate_controls: &[
        RateControl::Cqp,
        RateControl::Vbr,
        RateControl::Vbr2,
        RateControl::Cbr,
    ],
    max_quantizer: 51.0,
    presets: &[],
    tunings: &[],
    profiles: &[
        (EncoderVariant::Avc, &["baseline", "main", "high"]),
        (EncoderVariant::Hevc, &["main"]),
    ],
    input_formats: &["y4m"],
    output_formats: &["mp4", "264", "hevc"],
    binary: "toolset/{arch}/nvencc_{arch}",
    dependencies: DEPENDENCIES,
    version_args: &["--version"],
};

pub(super) static VERSION_DIALECT: Lazy<Dialect> = Lazy::new(|| {
    Dialect::new(
        "NVEncC version",
        vec![builtin_nocase(
            LineKind::Version,
            r"\bNVEncC\s+\(x\d+\)\s+(\d)\.(\d+).*\[NVENC\s+API\s+v(\d+)\.(\d+)[^\d]+",
        )],
    )
});

pub(super) static PASS_DIALECT: Lazy<Dialect> = Lazy::new(|| {
    Dialect::new(
        "NVEncC",
        vec![
            builtin(LineKind::FramesDone, r"^(\d+) frames:"),
            builtin_nocase(
                LineKind::HardwareUnsupported,
                r"Selected\s+codec\s+is\s+not\s+supported",
            ),
            builtin_nocase(
                LineKind::ApiUnavailable,
                r"nvEncodeAPI(64)?\.dll\s+does\s+not\s+exists\s+in\s+your\s+system",
            )
            .groups(&[]),
        ],
    )
});

fn release(v: u32) -> String {
    format!("{}.{:02}", v / 100, v % 100)
}

fn api(v: u32) -> String {
    format!("{}.{}", v / 10, v % 10)
}

pub(super) static NAMING: VersionNaming = VersionNaming {
    tool: "NVEncC",
    primary: release,
    secondary: api,
    display: |v| {
        format!(
            "NVEncC version: {} [API: {}]",
            release(v.primary),
            api(v.secondary)
        )
    },
};

/// Release 3.07 with NVENC API 7.0 or newer; 3.07 is the tested release.
pub fn default_requirements() -> ToolRequirements {
    ToolRequirements {
        minimum: 307,
        tested: Some(307),
        minimum_secondary: Some(70),
        allowed_exit_codes: vec![0, 1],
        ..ToolRequirements::default()
    }
}

/// `NVEncC (x64) M.mm ... [NVENC API vA.B]`
pub(super) fn decode_version(m: &RuleMatch, version: &mut ToolVersion) {
    version.primary = 100 * m.value(0) + m.value(1);
    version.secondary = 10 * m.value(2) + m.value(3);
}

pub(super) fn build_command_line(
    options: &EncodeOptions,
    mode: &RunMode,
    source: &Path,
    output: &Path,
) -> Result<CommandLine, Error> {
    let codec = match options.variant {
        EncoderVariant::Avc => "avc",
        EncoderVariant::Hevc => "hevc",
        variant => {
            return Err(Error::UnsupportedVariant {
                family: EncoderFamily::NvEncC,
                variant,
            });
        }
    };

    let mut cmd = CommandLine::default();
    let args = &mut cmd.args;
    args.extend(["--codec".into(), codec.to_string()]);

    let bitrate = options.bitrate.to_string();
    match options.rate_control {
        RateControl::Cqp => {
            args.extend(["--cqp".into(), format!("{}", options.quantizer.round() as u32)]);
        }
        RateControl::Vbr => args.extend(["--vbr".into(), bitrate]),
        RateControl::Vbr2 => args.extend(["--vbr2".into(), bitrate]),
        RateControl::Cbr => args.extend(["--cbr".into(), bitrate]),
        other => {
            return Err(Error::UnsupportedRateControl {
                family: EncoderFamily::NvEncC,
                mode: other,
            });
        }
    }

    if !is_profile_sentinel(&options.profile) {
        let profile = options
            .profile
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();
        args.extend(["--profile".into(), profile]);
    }

    push_custom_args(&mut cmd, &options.custom_encoder, mode.piped, source, output)?;

    let args = &mut cmd.args;
    args.extend(["--output".into(), path_arg(output)]);
    if mode.piped {
        args.extend([
            "--frames".into(),
            mode.frames.to_string(),
            "--y4m".into(),
            "--input".into(),
            "-".into(),
        ]);
    } else {
        args.extend(["--input".into(), path_arg(source)]);
    }
    Ok(cmd)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::{Compatibility, classify};

    fn build(options: &EncodeOptions, mode: &RunMode) -> Result<CommandLine, Error> {
        EncoderFamily::NvEncC.build_command_line(
            options,
            mode,
            Path::new("/src/clip.y4m"),
            Path::new("/out/clip.mp4"),
        )
    }

    #[test]
    fn test_direct_layout() {
        let options = EncodeOptions::nvencc()
            .variant(EncoderVariant::Hevc)
            .bitrate(RateControl::Vbr2, 8000)
            .profile("Main");
        let cmd = build(&options, &RunMode::direct()).unwrap();
        assert_eq!(
            cmd.args,
            [
                "--codec", "hevc", "--vbr2", "8000", "--profile", "main", "--output",
                "/out/clip.mp4", "--input", "/src/clip.y4m",
            ]
        );
    }

    #[test]
    fn test_piped_layout() {
        let cmd = build(&EncodeOptions::nvencc(), &RunMode::piped(240)).unwrap();
        assert_eq!(
            cmd.args,
            [
                "--codec", "avc", "--cqp", "20", "--output", "/out/clip.mp4", "--frames", "240",
                "--y4m", "--input", "-",
            ]
        );
    }

    #[test]
    fn test_bit_depth_variant_is_rejected() {
        let options = EncodeOptions::nvencc().variant(EncoderVariant::Bit10);
        assert!(matches!(
            build(&options, &RunMode::direct()),
            Err(Error::UnsupportedVariant { .. })
        ));
    }

    #[test]
    fn test_version_line() {
        let line = "NVEncC (x64) 3.07 (r1172) by rigaya, Jun 10 2017 [NVENC API v8.0], CUDA 8.0";
        let m = VERSION_DIALECT.match_line(line).unwrap();
        let mut version = ToolVersion::default();
        decode_version(&m, &mut version);
        assert_eq!(version, ToolVersion::new(307, 80));
        assert_eq!((NAMING.display)(&version), "NVEncC version: 3.07 [API: 8.0]");
    }

    #[test]
    fn test_error_signatures_follow_progress() {
        let m = PASS_DIALECT.match_line("1234 frames: 98.1 fps").unwrap();
        assert_eq!((m.kind, m.value(0)), (LineKind::FramesDone, 1234));

        let m = PASS_DIALECT
            .match_line("Error: Selected codec is not supported by your GPU")
            .unwrap();
        assert_eq!(m.kind, LineKind::HardwareUnsupported);

        let m = PASS_DIALECT
            .match_line("nvEncodeAPI64.dll does not exists in your system.")
            .unwrap();
        assert_eq!(m.kind, LineKind::ApiUnavailable);
    }

    #[test]
    fn test_requirements() {
        let req = default_requirements();
        assert_eq!(
            classify(&ToolVersion::new(307, 80), &req, &NAMING),
            Compatibility::Supported
        );
        assert!(matches!(
            classify(&ToolVersion::new(310, 80), &req, &NAMING),
            Compatibility::Warning(_)
        ));
        assert!(!classify(&ToolVersion::new(306, 80), &req, &NAMING).is_usable());
        assert!(!classify(&ToolVersion::new(307, 60), &req, &NAMING).is_usable());
    }
}
