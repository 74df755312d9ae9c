use std::path::Path;

use once_cell::sync::Lazy;

use super::{CommandLine, EncoderDescriptor, RunMode, path_arg, push_custom_args};
use crate::config::ToolRequirements;
use crate::error::Error;
use crate::options::{
    Architecture, EncodeOptions, EncoderFamily, EncoderVariant, RateControl, is_profile_sentinel,
    is_tune_sentinel,
};
use crate::pattern::{Dialect, LineKind, RuleMatch, builtin, builtin_nocase};
use crate::version::{ToolVersion, VersionNaming};

pub static DESCRIPTOR: EncoderDescriptor = EncoderDescriptor {
    family: EncoderFamily::X264,
    name: "x264",
    codec: "H.264/AVC",
    architectures: &[Architecture::X86, Architecture::X64],
    variants: &[EncoderVariant::Bit8, EncoderVariant::Bit10],
    rate_controls: &[
        RateControl::Crf,
        RateControl::Cqp,
        RateControl::Abr,
        RateControl::TwoPass,
    ],
    max_quantizer: 69.0,
    presets: &[
        "ultrafast",
        "superfast",
        "veryfast",
        "faster",
        "fast",
        "medium",
        "slow",
        "slower",
        "veryslow",
        "placebo",
    ],
    tunings: &[
        "film",
        "animation",
        "grain",
        "stillimage",
        "psnr",
        "ssim",
        "fastdecode",
        "zerolatency",
        "touhou",
    ],
    profiles: &[
        (EncoderVariant::Bit8, &["baseline", "main", "high"]),
        (EncoderVariant::Bit10, &["high10", "high422", "high444"]),
    ],
    input_formats: &[
        "avi", "mp4", "mkv", "flv", "mpg", "m2v", "m2ts", "ts", "wmv", "ogm", "vob", "y4m",
    ],
    output_formats: &["264", "mkv", "mp4"],
    binary: "toolset/{arch}/x264_{variant}_{arch}",
    dependencies: &[],
    version_args: &["--version"],
};

pub(super) static VERSION_DIALECT: Lazy<Dialect> = Lazy::new(|| {
    Dialect::new(
        "x264 version",
        vec![
            builtin_nocase(
                LineKind::Version,
                r"\bx264\s(\d)\.(\d+)\.(\d+)\s([a-f0-9]{7})",
            )
            .groups(&[2, 3]),
            builtin_nocase(LineKind::ModifiedVersion, r"\bx264 (\d)\.(\d+)\.(\d+)").groups(&[2, 3]),
        ],
    )
});

pub(super) static PASS_DIALECT: Lazy<Dialect> = Lazy::new(|| {
    Dialect::new(
        "x264",
        vec![
            builtin(LineKind::PercentProgress, r"\[(\d+)\.\d+%\].+frames"),
            builtin(LineKind::Indexing, r"indexing.+\[(\d+)\.\d+%\]"),
            builtin(LineKind::FrameSummary, r"^(\d+) frames:"),
            // Layout of builds with custom progress output.
            builtin(
                LineKind::PercentProgress,
                r"\[\s*(\d+)\.(\d+)%\]\s+(\d+)/(\d+)\s(\d+).(\d+)\s(\d+).(\d+)\s+(\d+):(\d+):(\d+)\s+(\d+):(\d+):(\d+)",
            )
            .groups(&[1]),
        ],
    )
});

pub(super) static NAMING: VersionNaming = VersionNaming {
    tool: "x264",
    primary: |rev| format!("r{rev}"),
    secondary: |api| api.to_string(),
    display: |v| {
        let mut text = format!("x264 revision: {} (core #{})", v.primary, v.secondary);
        if v.modified {
            text.push_str(" - with custom patches!");
        }
        text
    },
};

/// Revision 2397 or newer, built against core API 142.
pub fn default_requirements() -> ToolRequirements {
    ToolRequirements {
        minimum: 2397,
        tested_secondary: Some(142),
        allowed_exit_codes: vec![0],
        ..ToolRequirements::default()
    }
}

/// `x264 0.<core>.<revision> <hash>`: revision is primary, core secondary.
pub(super) fn decode_version(m: &RuleMatch, version: &mut ToolVersion) {
    version.secondary = m.value(0);
    version.primary = m.value(1);
    version.modified = m.kind == LineKind::ModifiedVersion;
}

pub(super) fn build_command_line(
    options: &EncodeOptions,
    mode: &RunMode,
    source: &Path,
    output: &Path,
) -> Result<CommandLine, Error> {
    if !DESCRIPTOR.variants.contains(&options.variant) {
        return Err(Error::UnsupportedVariant {
            family: EncoderFamily::X264,
            variant: options.variant,
        });
    }

    let mut cmd = CommandLine::default();
    let args = &mut cmd.args;

    match options.rate_control {
        RateControl::Crf => {
            args.extend(["--crf".into(), format!("{:.1}", options.quantizer)]);
        }
        RateControl::Cqp => {
            args.extend(["--qp".into(), format!("{}", options.quantizer.round() as u32)]);
        }
        RateControl::Abr | RateControl::TwoPass => {
            args.extend(["--bitrate".into(), options.bitrate.to_string()]);
        }
        other => {
            return Err(Error::UnsupportedRateControl {
                family: EncoderFamily::X264,
                mode: other,
            });
        }
    }

    if matches!(mode.pass, 1 | 2) {
        let stats = mode
            .stats_file
            .as_deref()
            .ok_or(Error::MissingStatsFile { pass: mode.pass })?;
        args.extend([
            "--pass".into(),
            mode.pass.to_string(),
            "--stats".into(),
            path_arg(stats),
        ]);
    }

    let preset = options.preset.trim();
    if !preset.is_empty() {
        args.extend(["--preset".into(), preset.to_lowercase()]);
    }
    if !is_tune_sentinel(&options.tune) {
        args.extend(["--tune".into(), options.tune.trim().to_lowercase()]);
    }
    if !is_profile_sentinel(&options.profile) && options.variant == EncoderVariant::Bit8 {
        args.extend(["--profile".into(), options.profile.trim().to_lowercase()]);
    }

    push_custom_args(&mut cmd, &options.custom_encoder, mode.piped, source, output)?;

    let args = &mut cmd.args;
    args.extend(["--output".into(), path_arg(output)]);
    if mode.piped {
        args.extend([
            "--frames".into(),
            mode.frames.to_string(),
            "--demuxer".into(),
            "y4m".into(),
            "--stdin".into(),
            "y4m".into(),
            "-".into(),
        ]);
    } else {
        args.push(path_arg(source));
    }
    Ok(cmd)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(options: &EncodeOptions, mode: &RunMode) -> Result<CommandLine, Error> {
        EncoderFamily::X264.build_command_line(
            options,
            mode,
            Path::new("/src/clip.mkv"),
            Path::new("/out/clip.264"),
        )
    }

    #[test]
    fn test_quality_flags() {
        let crf = build(&EncodeOptions::x264().quality(RateControl::Crf, 22.5), &RunMode::direct())
            .unwrap();
        assert_eq!(crf.args[..2], ["--crf", "22.5"]);

        let cqp = build(&EncodeOptions::x264().quality(RateControl::Cqp, 18.4), &RunMode::direct())
            .unwrap();
        assert_eq!(cqp.args[..2], ["--qp", "18"]);
    }

    #[test]
    fn test_direct_layout() {
        let options = EncodeOptions::x264()
            .preset("Slow")
            .tune("Film")
            .profile("High");
        let cmd = build(&options, &RunMode::direct()).unwrap();
        assert_eq!(
            cmd.args,
            [
                "--crf", "22.0", "--preset", "slow", "--tune", "film", "--profile", "high",
                "--output", "/out/clip.264", "/src/clip.mkv",
            ]
        );
        assert!(cmd.warnings.is_empty());
    }

    #[test]
    fn test_profile_only_for_8bit() {
        let options = EncodeOptions::x264()
            .variant(EncoderVariant::Bit10)
            .profile("high10");
        let cmd = build(&options, &RunMode::direct()).unwrap();
        assert!(!cmd.args.contains(&"--profile".to_string()));
    }

    #[test]
    fn test_pass_requires_stats_file() {
        let options = EncodeOptions::x264().bitrate(RateControl::TwoPass, 1500);
        let mode = RunMode {
            pass: 1,
            ..RunMode::direct()
        };
        assert!(matches!(
            build(&options, &mode),
            Err(Error::MissingStatsFile { pass: 1 })
        ));

        let cmd = build(&options, &RunMode::direct().pass(2, "/out/clip.stats")).unwrap();
        assert_eq!(
            cmd.args[..6],
            ["--bitrate", "1500", "--pass", "2", "--stats", "/out/clip.stats"]
        );
    }

    #[test]
    fn test_variant_must_match() {
        let options = EncodeOptions::x264().variant(EncoderVariant::Hevc);
        assert!(matches!(
            build(&options, &RunMode::direct()),
            Err(Error::UnsupportedVariant { .. })
        ));
    }

    #[test]
    fn test_version_lines() {
        let official = VERSION_DIALECT.match_line("x264 0.142.2431 ac76440").unwrap();
        let mut version = ToolVersion::default();
        decode_version(&official, &mut version);
        assert_eq!(version, ToolVersion::new(2431, 142));

        let patched = VERSION_DIALECT.match_line("x264 0.148.2744+12 tMod").unwrap();
        decode_version(&patched, &mut version);
        assert_eq!(version.primary, 2744);
        assert!(version.modified);
    }

    #[test]
    fn test_pass_lines() {
        let m = PASS_DIALECT
            .match_line("[42.7%] 512/1200 frames, 31.02 fps, 1500.10 kb/s, eta 0:00:22")
            .unwrap();
        assert_eq!((m.kind, m.value(0)), (LineKind::PercentProgress, 42));

        let m = PASS_DIALECT
            .match_line("ffms [info]: indexing input file [13.0%]")
            .unwrap();
        assert_eq!((m.kind, m.value(0)), (LineKind::Indexing, 13));

        let m = PASS_DIALECT
            .match_line("1200 frames: 31.20 fps, 1499.83 kb/s")
            .unwrap();
        assert_eq!((m.kind, m.value(0)), (LineKind::FrameSummary, 1200));

        let m = PASS_DIALECT
            .match_line("[ 42.7%] 512/1200 31.02 1500.10 0:00:16 0:00:38")
            .unwrap();
        assert_eq!((m.kind, m.captures.clone()), (LineKind::PercentProgress, vec![42]));
    }

    #[test]
    fn test_default_requirements_accept_tested_build() {
        use crate::version::{Compatibility, classify};
        let req = default_requirements();
        assert_eq!(
            classify(&ToolVersion::new(2431, 142), &req, &NAMING),
            Compatibility::Supported
        );
        assert!(!classify(&ToolVersion::new(2396, 142), &req, &NAMING).is_usable());
        assert!(matches!(
            classify(&ToolVersion::new(2431, 148), &req, &NAMING),
            Compatibility::Warning(_)
        ));
    }
}
