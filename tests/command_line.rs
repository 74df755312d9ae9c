use encode_launcher::encoder::RunMode;
use encode_launcher::{EncodeOptions, EncoderFamily, EncoderVariant, Error, RateControl};
use std::path::Path;

fn build(options: &EncodeOptions, mode: &RunMode) -> Result<Vec<String>, Error> {
    options
        .encoder
        .build_command_line(
            options,
            mode,
            Path::new("/videos/input.avs"),
            Path::new("/videos/output.264"),
        )
        .map(|cmd| cmd.args)
}

#[test]
fn test_x264_crf_piped() {
    let options = EncodeOptions::x264().quality(RateControl::Crf, 20.0);
    let args = build(&options, &RunMode::piped(1440)).unwrap();

    assert_eq!(
        args,
        vec![
            "--crf",
            "20.0",
            "--preset",
            "medium",
            "--output",
            "/videos/output.264",
            "--frames",
            "1440",
            "--demuxer",
            "y4m",
            "--stdin",
            "y4m",
            "-",
        ]
    );
}

#[test]
fn test_x264_direct_input_with_tune_and_profile() {
    let options = EncodeOptions::x264()
        .quality(RateControl::Cqp, 18.4)
        .preset("Slow")
        .tune("Film")
        .profile("High");
    let args = build(&options, &RunMode::direct()).unwrap();

    assert_eq!(
        args,
        vec![
            "--qp",
            "18",
            "--preset",
            "slow",
            "--tune",
            "film",
            "--profile",
            "high",
            "--output",
            "/videos/output.264",
            "/videos/input.avs",
        ]
    );
}

#[test]
fn test_x264_profile_is_dropped_for_10bit() {
    let options = EncodeOptions::x264()
        .variant(EncoderVariant::Bit10)
        .profile("high10");
    let args = build(&options, &RunMode::direct()).unwrap();
    assert!(!args.iter().any(|a| a == "--profile"));
}

#[test]
fn test_x264_two_pass() {
    let options = EncodeOptions::x264().bitrate(RateControl::TwoPass, 2500);
    let stats = Path::new("/videos/output.stats");

    let first = build(&options, &RunMode::piped(100).pass(1, stats)).unwrap();
    assert_eq!(
        first[..6],
        ["--bitrate", "2500", "--pass", "1", "--stats", "/videos/output.stats"]
    );

    let second = build(&options, &RunMode::piped(100).pass(2, stats)).unwrap();
    assert_eq!(second[2..4], ["--pass", "2"]);

    let without_stats = RunMode {
        stats_file: None,
        ..RunMode::piped(100).pass(1, stats)
    };
    let err = build(&options, &without_stats);
    assert!(matches!(err, Err(Error::MissingStatsFile { pass: 1 })));
}

#[test]
fn test_quantizer_and_bitrate_flags_are_disjoint() {
    let quantizer_flags = ["--crf", "--qp", "--cqp"];
    let bitrate_flags = ["--bitrate", "--vbr", "--vbr2", "--cbr"];

    for family in [EncoderFamily::X264, EncoderFamily::NvEncC] {
        let base = match family {
            EncoderFamily::X264 => EncodeOptions::x264(),
            EncoderFamily::NvEncC => EncodeOptions::nvencc(),
        };
        let desc = encode_launcher::encoder::descriptor(family);
        for &mode in desc.rate_controls {
            let options = if mode.is_bitrate_based() {
                base.clone().bitrate(mode, 3000)
            } else {
                base.clone().quality(mode, 20.0)
            };
            let run = if mode == RateControl::TwoPass {
                RunMode::direct().pass(1, "/videos/output.stats")
            } else {
                RunMode::direct()
            };
            let args = build(&options, &run).unwrap();
            let has_quantizer = args.iter().any(|a| quantizer_flags.contains(&a.as_str()));
            let has_bitrate = args.iter().any(|a| bitrate_flags.contains(&a.as_str()));
            assert_ne!(has_quantizer, has_bitrate, "{family} {mode}: {args:?}");
            assert_eq!(has_bitrate, mode.is_bitrate_based(), "{family} {mode}");
        }
    }
}

#[test]
fn test_unsupported_rate_control_is_a_configuration_error() {
    let err = build(
        &EncodeOptions::nvencc().bitrate(RateControl::Abr, 3000),
        &RunMode::direct(),
    )
    .unwrap_err();
    assert!(matches!(err, Error::UnsupportedRateControl { .. }));
    assert!(err.is_configuration());

    let err = build(
        &EncodeOptions::x264().bitrate(RateControl::Vbr, 3000),
        &RunMode::direct(),
    )
    .unwrap_err();
    assert!(err.is_configuration());
}

#[test]
fn test_piped_mode_requires_frames() {
    let err = build(&EncodeOptions::x264(), &RunMode::piped(0)).unwrap_err();
    assert!(matches!(err, Error::MissingFrameCount));
}

#[test]
fn test_custom_args_conflicting_with_pipe_are_removed() {
    let options = EncodeOptions::x264().custom_encoder("--fps 24 --preset slow");
    let cmd = options
        .encoder
        .build_command_line(
            &options,
            &RunMode::piped(100),
            Path::new("in.avs"),
            Path::new("out.264"),
        )
        .unwrap();

    assert!(!cmd.args.iter().any(|a| a == "--fps" || a == "24"));
    let custom_preset = cmd
        .args
        .windows(2)
        .filter(|w| w[0] == "--preset" && w[1] == "slow")
        .count();
    assert_eq!(custom_preset, 1);
    assert_eq!(cmd.warnings.len(), 1);
    assert!(cmd.warnings[0].contains("--fps"));
}

#[test]
fn test_custom_args_keep_fps_without_pipe() {
    let options = EncodeOptions::x264().custom_encoder("--fps 24");
    let args = build(&options, &RunMode::direct()).unwrap();
    assert!(args.windows(2).any(|w| w == ["--fps", "24"]));
}

#[test]
fn test_custom_args_expand_placeholders() {
    let options = EncodeOptions::x264().custom_encoder("--qpfile \"$(INPUT).qp\" --dump $(OUTPUT)");
    let args = build(&options, &RunMode::direct()).unwrap();
    assert!(args.windows(2).any(|w| w == ["--qpfile", "/videos/input.avs.qp"]));
    assert!(args.windows(2).any(|w| w == ["--dump", "/videos/output.264"]));
}

#[test]
fn test_nvencc_hevc_vbr_piped() {
    let options = EncodeOptions::nvencc()
        .variant(EncoderVariant::Hevc)
        .bitrate(RateControl::Vbr2, 8000)
        .profile("Main");
    let args = build(&options, &RunMode::piped(250)).unwrap();

    assert_eq!(
        args,
        vec![
            "--codec",
            "hevc",
            "--vbr2",
            "8000",
            "--profile",
            "main",
            "--output",
            "/videos/output.264",
            "--frames",
            "250",
            "--y4m",
            "--input",
            "-",
        ]
    );
}

#[test]
fn test_build_is_idempotent() {
    let options = EncodeOptions::x264()
        .bitrate(RateControl::TwoPass, 1800)
        .tune("animation")
        .custom_encoder("--fps 24 --keyint \"240\"");
    let mode = RunMode::piped(500).pass(2, "/videos/output.stats");

    let first = options
        .encoder
        .build_command_line(&options, &mode, Path::new("in.vpy"), Path::new("out.264"))
        .unwrap();
    let second = options
        .encoder
        .build_command_line(&options, &mode, Path::new("in.vpy"), Path::new("out.264"))
        .unwrap();
    assert_eq!(first, second);
}
