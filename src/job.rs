use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::{LauncherConfig, ToolRequirements};
use crate::control::PauseSwitch;
use crate::encoder::{self, RunMode};
use crate::event::{JobId, JobNotification, JobOutcome, JobStatus};
use crate::filter::{self, FilterTool, InputKind, SourceInfo};
use crate::handle::JobHandle;
use crate::options::{EncodeOptions, RateControl};
use crate::pass::PassSink;
use crate::process::SpawnLock;
use crate::reporter::Reporter;
use crate::supervisor::{Outcome, ProcessSpec, RunContext, RunResult, Supervisor};
use crate::toolset::Toolset;
use crate::version::{self, Compatibility, VersionDecoder, VersionNaming};
use crate::{cmdline, pattern::Dialect};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d, %H:%M:%S";

/// Configures one encoding job before it starts.
///
/// Created through [`crate::Launcher::job`].
pub struct JobBuilder {
    id: JobId,
    source: PathBuf,
    output: PathBuf,
    options: EncodeOptions,
    toolset: Toolset,
    config: Arc<LauncherConfig>,
    spawn_lock: SpawnLock,
    notify: Option<mpsc::UnboundedSender<JobNotification>>,
}

impl JobBuilder {
    pub(crate) fn new(
        source: PathBuf,
        output: PathBuf,
        options: EncodeOptions,
        toolset: Toolset,
        config: Arc<LauncherConfig>,
        spawn_lock: SpawnLock,
    ) -> Self {
        JobBuilder {
            id: Uuid::new_v4(),
            source,
            output,
            options,
            toolset,
            config,
            spawn_lock,
            notify: None,
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    /// Sends this job's notifications to a channel shared with other jobs
    /// instead of a private one. [`JobHandle::events`] then yields nothing.
    pub fn notify(mut self, sender: mpsc::UnboundedSender<JobNotification>) -> Self {
        self.notify = Some(sender);
        self
    }

    /// Spawns the job onto the current tokio runtime.
    pub fn start(self) -> JobHandle {
        let JobBuilder {
            id: job,
            source,
            output,
            options,
            toolset,
            config,
            spawn_lock,
            notify,
        } = self;
        let (sender, event_rx) = match notify {
            Some(sender) => (sender, None),
            None => {
                let (tx, rx) = mpsc::unbounded_channel();
                (tx, Some(rx))
            }
        };
        let (reporter, snapshot) = Reporter::new(job, Some(sender));
        let abort = CancellationToken::new();
        let pause = PauseSwitch::new();

        let task_abort = abort.clone();
        let task_pause = pause.clone();
        let task = tokio::spawn(async move {
            let started = Instant::now();
            let runner = JobRunner {
                reporter: &reporter,
                abort: &task_abort,
                pause: &task_pause,
                source: &source,
                output: &output,
                options: &options,
                toolset: &toolset,
                config: &config,
                spawn_lock: &spawn_lock,
            };
            let status = match AssertUnwindSafe(runner.run()).catch_unwind().await {
                Ok(status) => status,
                Err(panic) => {
                    reporter.error(format!("EXCEPTION ERROR: {}", panic_message(&*panic)));
                    reporter.set_status(JobStatus::Failed);
                    JobStatus::Failed
                }
            };
            JobOutcome {
                job,
                status,
                log: reporter.log_lines(),
                elapsed: started.elapsed(),
            }
        });

        JobHandle::new(job, abort, pause, snapshot, event_rx, task)
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        *msg
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "unknown panic"
    }
}

/// Why a job stopped early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Halt {
    Failed,
    Aborted,
}

impl From<RunResult> for Result<(), Halt> {
    fn from(result: RunResult) -> Self {
        match result.outcome {
            Outcome::Succeeded => Ok(()),
            Outcome::Aborted => Err(Halt::Aborted),
            Outcome::Failed | Outcome::TimedOut => Err(Halt::Failed),
        }
    }
}

/// A tool the job depends on, ready to be probed.
struct Tool<'t> {
    label: &'static str,
    program: PathBuf,
    version_args: Vec<String>,
    dialect: &'static Dialect,
    decoder: VersionDecoder,
    naming: &'static VersionNaming,
    requirements: &'t ToolRequirements,
}

/// The sequential state machine of one job.
struct JobRunner<'a> {
    reporter: &'a Reporter,
    abort: &'a CancellationToken,
    pause: &'a PauseSwitch,
    source: &'a Path,
    output: &'a Path,
    options: &'a EncodeOptions,
    toolset: &'a Toolset,
    config: &'a LauncherConfig,
    spawn_lock: &'a SpawnLock,
}

impl JobRunner<'_> {
    async fn run(&self) -> JobStatus {
        let started = Instant::now();
        let status = match self.encode().await {
            Ok(()) => {
                let secs = started.elapsed().as_secs();
                self.reporter.info("--- DONE ---");
                self.reporter.info(format!(
                    "Job finished at {}. Process took {} minutes, {} seconds.",
                    chrono::Local::now().format(TIMESTAMP_FORMAT),
                    secs / 60,
                    secs % 60
                ));
                JobStatus::Completed
            }
            Err(Halt::Aborted) => {
                self.reporter.error("PROCESS ABORTED BY USER !!!");
                JobStatus::Aborted
            }
            Err(Halt::Failed) => JobStatus::Failed,
        };
        if status != JobStatus::Completed {
            self.remove_empty_output();
        }
        self.reporter.set_status(status);
        status
    }

    fn context(&self) -> RunContext<'_> {
        RunContext {
            reporter: self.reporter,
            abort: self.abort,
            pause: Some(self.pause),
            timeouts: &self.config.timeouts,
            priority: self.config.priority,
            spawn_lock: self.spawn_lock,
        }
    }

    fn checkpoint(&self) -> Result<(), Halt> {
        if self.abort.is_cancelled() {
            Err(Halt::Aborted)
        } else {
            Ok(())
        }
    }

    fn fail(&self, message: impl Into<String>) -> Halt {
        self.reporter.error(message);
        Halt::Failed
    }

    async fn encode(&self) -> Result<(), Halt> {
        let reporter = self.reporter;
        let options = self.options;
        let desc = encoder::descriptor(options.encoder);

        reporter.info(format!(
            "Job started at {}.",
            chrono::Local::now().format(TIMESTAMP_FORMAT)
        ));
        reporter.info(format!("Source file: {}", self.source.display()));
        reporter.info(format!("Output file: {}", self.output.display()));
        self.log_settings();
        options.validate().map_err(|e| self.fail(e.to_string()))?;
        self.checkpoint()?;

        let input = InputKind::from_path(self.source);
        if input == InputKind::Native {
            let ext = self
                .source
                .extension()
                .map(|e| e.to_string_lossy().into_owned())
                .unwrap_or_default();
            if !desc.accepts_input(&ext) {
                return Err(self.fail(format!(
                    "The {} encoder does not support the input format '{ext}'!",
                    desc.name
                )));
            }
        }

        reporter.set_status(JobStatus::CheckingVersion);
        reporter.info("--- CHECK VERSION ---");
        let binary = self
            .toolset
            .locate_encoder(options)
            .map_err(|e| self.fail(e.to_string()))?;
        let filter = match input.filter() {
            Some(tool) => {
                let program = self
                    .toolset
                    .locate_filter(tool, options.arch)
                    .map_err(|e| self.fail(format!("{tool} input is not available: {e}")))?;
                Some((tool, program))
            }
            None => None,
        };

        if self.config.skip_version_check {
            reporter.warning("Version checks are disabled. Use at your own risk!");
        } else {
            let family = options.encoder;
            self.check_version(Tool {
                label: desc.name,
                program: binary.clone(),
                version_args: desc.version_args.iter().map(|a| a.to_string()).collect(),
                dialect: family.version_dialect(),
                decoder: family.version_decoder(),
                naming: family.version_naming(),
                requirements: family.requirements(&self.config.requirements),
            })
            .await?;
            if let Some((tool, program)) = &filter {
                self.check_version(Tool {
                    label: tool.label(),
                    program: program.clone(),
                    version_args: tool.version_args(),
                    dialect: tool.version_dialect(),
                    decoder: tool.version_decoder(),
                    naming: tool.version_naming(),
                    requirements: tool.requirements(&self.config.requirements),
                })
                .await?;
            }
        }
        self.checkpoint()?;

        let info = match &filter {
            Some((tool, program)) => self.probe_source(*tool, program).await?,
            None => SourceInfo::default(),
        };
        self.checkpoint()?;

        let passes: Vec<RunMode> = {
            let base = match filter {
                Some(_) => RunMode::piped(info.frames),
                None => RunMode::direct(),
            };
            if options.rate_control == RateControl::TwoPass {
                let stats = stats_file_path(self.output);
                vec![base.clone().pass(1, stats.clone()), base.pass(2, stats)]
            } else {
                vec![base]
            }
        };

        for mode in &passes {
            self.checkpoint()?;
            self.run_pass(mode, &binary, filter.as_ref(), info.frames)
                .await?;
        }
        self.checkpoint()
    }

    fn log_settings(&self) {
        let reporter = self.reporter;
        let options = self.options;
        let desc = encoder::descriptor(options.encoder);
        reporter.info("--- SETTINGS ---");
        reporter.info(format!(
            "Encoder: {}",
            desc.full_name(options.arch, options.variant)
        ));
        if options.rate_control.is_bitrate_based() {
            reporter.info(format!(
                "RC Mode: {} @ {} kbps",
                options.rate_control, options.bitrate
            ));
        } else {
            reporter.info(format!(
                "RC Mode: {} @ {}",
                options.rate_control, options.quantizer
            ));
        }
        reporter.info(format!("Preset:  {}", options.preset));
        reporter.info(format!("Tuning:  {}", options.tune));
        reporter.info(format!("Profile: {}", options.profile));
        let custom = |args: &str| {
            if args.trim().is_empty() {
                "(None)".to_string()
            } else {
                args.to_string()
            }
        };
        reporter.info(format!("Custom:  {}", custom(&options.custom_encoder)));
        reporter.info(format!("Filter:  {}", custom(&options.custom_filter)));
    }

    async fn check_version(&self, tool: Tool<'_>) -> Result<(), Halt> {
        let spec = ProcessSpec::new(tool.label, tool.program, tool.version_args);
        let probe = version::probe_version(
            self.context(),
            &spec,
            tool.dialect,
            tool.decoder,
            &tool.requirements.allowed_exit_codes,
        )
        .await;
        Result::<(), Halt>::from(probe.result)?;

        let Some(found) = probe.version else {
            return Err(self.fail(format!(
                "FAILED TO DETERMINE {} VERSION !!!",
                tool.label.to_uppercase()
            )));
        };
        self.reporter.info((tool.naming.display)(&found));
        match version::classify(&found, tool.requirements, tool.naming) {
            Compatibility::Supported => Ok(()),
            Compatibility::Warning(messages) => {
                for message in messages {
                    self.reporter.warning(message);
                }
                Ok(())
            }
            Compatibility::Unsupported(message) => Err(self.fail(message)),
        }
    }

    async fn probe_source(&self, tool: FilterTool, program: &Path) -> Result<SourceInfo, Halt> {
        self.reporter.info("--- SOURCE INFO ---");
        let spec = ProcessSpec::new(tool.label(), program, tool.info_args(self.source));
        let (info, result) = filter::probe_source(self.context(), tool, &spec).await;
        Result::<(), Halt>::from(result)?;
        if info.frames == 0 {
            return Err(self.fail("FAILED TO DETERMINE SOURCE PROPERTIES !!!"));
        }
        info.log_to(self.reporter);
        Ok(info)
    }

    async fn run_pass(
        &self,
        mode: &RunMode,
        binary: &Path,
        filter: Option<&(FilterTool, PathBuf)>,
        frames: u32,
    ) -> Result<(), Halt> {
        let reporter = self.reporter;
        let options = self.options;
        let family = options.encoder;

        match mode.pass {
            1 | 2 => reporter.info(format!("--- PASS {} ---", mode.pass)),
            _ => reporter.info("--- ENCODING ---"),
        }
        reporter.set_status(JobStatus::for_pass(mode.pass));

        let cmd = family
            .build_command_line(options, mode, self.source, self.output)
            .map_err(|e| self.fail(e.to_string()))?;
        for warning in &cmd.warnings {
            reporter.warning(warning.clone());
        }

        let upstream = match filter {
            Some((tool, program)) => {
                let args = tool
                    .pipe_args(self.source, self.output, &options.custom_filter)
                    .map_err(|e| self.fail(e.to_string()))?;
                reporter.info(format!("Creating {tool} process:"));
                reporter.info(cmdline::display(program, &args));
                Some(ProcessSpec::new(tool.label(), program, args))
            }
            None => None,
        };

        let desc = encoder::descriptor(family);
        reporter.info(format!("Creating {} process:", desc.name));
        reporter.info(cmdline::display(binary, &cmd.args));
        let spec = ProcessSpec::new(desc.name, binary, cmd.args);

        let mut sink = PassSink::new(mode.pass, options.variant, self.output, frames);
        let result = Supervisor::new(self.context())
            .run(
                &spec,
                upstream.as_ref(),
                family.pass_dialect(),
                &mut sink,
                family.encode_exit_codes(),
            )
            .await;
        result.into()
    }

    fn remove_empty_output(&self) {
        if let Ok(meta) = std::fs::metadata(self.output) {
            if meta.is_file() && meta.len() == 0 {
                if let Err(e) = std::fs::remove_file(self.output) {
                    tracing::warn!("Failed to remove empty output file: {e}");
                }
            }
        }
    }
}

/// `<dir>/<stem>.stats`, or the first free `<dir>/<stem>.N.stats`.
pub(crate) fn stats_file_path(output: &Path) -> PathBuf {
    let dir = output.parent().unwrap_or_else(|| Path::new(""));
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".into());
    let mut candidate = dir.join(format!("{stem}.stats"));
    let mut n = 2u32;
    while candidate.exists() {
        candidate = dir.join(format!("{stem}.{n}.stats"));
        n += 1;
    }
    candidate
}
