use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use encode_launcher::{
    Architecture, EncodeOptions, JobEvent, JobStatus, Launcher, LauncherConfig, LogLevel,
    RateControl,
};
use futures::StreamExt;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Encoder {
    X264,
    Nvencc,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    Crf,
    Cqp,
    Abr,
    TwoPass,
    Vbr,
    Vbr2,
    Cbr,
}

impl From<Mode> for RateControl {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Crf => RateControl::Crf,
            Mode::Cqp => RateControl::Cqp,
            Mode::Abr => RateControl::Abr,
            Mode::TwoPass => RateControl::TwoPass,
            Mode::Vbr => RateControl::Vbr,
            Mode::Vbr2 => RateControl::Vbr2,
            Mode::Cbr => RateControl::Cbr,
        }
    }
}

/// Encodes one source with a bundled encoder and prints the job's progress.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// The source file (.avs, .vpy or a format the encoder reads natively).
    input: PathBuf,
    /// The output file.
    output: PathBuf,
    /// Install root. Defaults to $ENCODE_LAUNCHER_HOME.
    #[arg(long)]
    root: Option<PathBuf>,
    /// JSON configuration file.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = Encoder::X264)]
    encoder: Encoder,
    #[arg(long, value_enum, default_value_t = Mode::Crf)]
    mode: Mode,
    /// Quantizer for crf/cqp.
    #[arg(short, long, default_value_t = 22.0)]
    quantizer: f64,
    /// Bitrate in kbps for the bitrate-based modes.
    #[arg(short, long, default_value_t = 2000)]
    bitrate: u32,
    #[arg(long)]
    preset: Option<String>,
    /// Use the 32-bit tool builds.
    #[arg(long)]
    x86: bool,
    /// Extra encoder arguments.
    #[arg(long, default_value = "")]
    custom: String,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let launcher = match build_launcher(&cli) {
        Ok(launcher) => launcher,
        Err(e) => {
            error!("Failed to set up the launcher: {e}");
            return;
        }
    };

    let mut options = match cli.encoder {
        Encoder::X264 => EncodeOptions::x264(),
        Encoder::Nvencc => EncodeOptions::nvencc(),
    };
    let mode = RateControl::from(cli.mode);
    options = if mode.is_bitrate_based() {
        options.bitrate(mode, cli.bitrate)
    } else {
        options.quality(mode, cli.quantizer)
    };
    if let Some(preset) = &cli.preset {
        options = options.preset(preset);
    }
    if cli.x86 {
        options = options.arch(Architecture::X86);
    }
    options = options.custom_encoder(cli.custom.clone());

    let mut handle = launcher.job(&cli.input, &cli.output, options).start();
    info!("Job {} started. Press Ctrl-C to abort.", handle.id());

    let mut events = handle.events();
    loop {
        tokio::select! {
            event = events.next() => match event {
                Some(JobEvent::Log(line)) => match line.level {
                    LogLevel::Error => error!("{}", line.message),
                    LogLevel::Warning => warn!("{}", line.message),
                    _ => info!("{}", line.message),
                },
                Some(JobEvent::Details(details)) => info!("{details}"),
                Some(JobEvent::Status(status)) => info!(%status, "Status changed"),
                Some(JobEvent::Progress(_)) => {}
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                warn!("Aborting...");
                break;
            }
        }
    }
    drop(events);

    if !handle.status().is_terminal() {
        handle.abort();
    }
    let outcome = handle.wait().await;
    match outcome.status {
        JobStatus::Completed => info!("Done in {:.1?}", outcome.elapsed),
        status => error!("Job ended as {status}"),
    }
}

fn build_launcher(cli: &Cli) -> Result<Launcher, encode_launcher::Error> {
    match &cli.root {
        Some(root) => {
            let config = match &cli.config {
                Some(path) => LauncherConfig::load(path)?,
                None => LauncherConfig::default(),
            };
            Launcher::new(root, config)
        }
        None => Launcher::from_env(),
    }
}
