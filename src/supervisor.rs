//! Runs one encoder invocation, optionally fed by a filter process, and turns
//! its output into job events.

use std::collections::VecDeque;
use std::io;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use futures::{Stream, StreamExt, stream};
use tokio::io::AsyncRead;
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::bytes::BytesMut;
use tokio_util::codec::{Decoder, FramedRead};
use tokio_util::sync::CancellationToken;

use crate::config::{ProcessPriority, TimeoutPolicy};
use crate::control::PauseSwitch;
use crate::error::Error;
use crate::event::JobStatus;
use crate::pattern::{Dialect, RuleMatch};
use crate::process::{ProcessGroup, SpawnLock};
use crate::reporter::Reporter;

/// Longest line kept in one piece. Tools that never terminate a line get it
/// cut into chunks of this size.
const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Filter stderr lines kept for the log after a pass.
const FILTER_LOG_LIMIT: usize = 1_000;

/// A program and its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Short tool name used as a log prefix.
    pub label: String,
}

impl ProcessSpec {
    pub fn new(label: impl Into<String>, program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        ProcessSpec {
            program: program.into(),
            args,
            label: label.into(),
        }
    }
}

/// Everything a supervised run borrows from its job.
#[derive(Debug, Clone, Copy)]
pub struct RunContext<'a> {
    pub reporter: &'a Reporter,
    pub abort: &'a CancellationToken,
    /// `None` for runs that cannot be paused, such as version probes.
    pub pause: Option<&'a PauseSwitch>,
    pub timeouts: &'a TimeoutPolicy,
    pub priority: ProcessPriority,
    pub spawn_lock: &'a SpawnLock,
}

/// Receives the lines a [`Dialect`] recognised.
pub trait LineSink: Send {
    fn on_match(&mut self, reporter: &Reporter, line: &str, m: &RuleMatch);

    /// Also copy recognised lines to the job log.
    fn echo_matched(&self) -> bool {
        false
    }

    /// Called once the process exited with an allowed code.
    fn on_success(&mut self, _reporter: &Reporter) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Succeeded,
    Failed,
    /// Killed after staying silent for too long.
    TimedOut,
    Aborted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunResult {
    pub outcome: Outcome,
    pub exit_code: Option<i32>,
}

impl RunResult {
    fn new(outcome: Outcome, exit_code: Option<i32>) -> Self {
        RunResult { outcome, exit_code }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == Outcome::Succeeded
    }
}

/// How the read loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopEnd {
    /// All output streams reached end of file.
    Closed,
    /// The process exited while something else kept its pipes open.
    Exited,
    TimedOut,
    Aborted,
}

pub struct Supervisor<'a> {
    ctx: RunContext<'a>,
}

impl<'a> Supervisor<'a> {
    pub fn new(ctx: RunContext<'a>) -> Self {
        Supervisor { ctx }
    }

    /// Runs `encoder` to completion. When `filter` is given it is started
    /// first and its stdout becomes the encoder's stdin.
    pub async fn run(
        &self,
        encoder: &ProcessSpec,
        filter: Option<&ProcessSpec>,
        dialect: &Dialect,
        sink: &mut dyn LineSink,
        allowed_exit_codes: &[i32],
    ) -> RunResult {
        let reporter = self.ctx.reporter;
        let mut group = ProcessGroup::new();

        let mut upstream = None;
        let mut encoder_stdin = Stdio::null();
        if let Some(spec) = filter {
            let mut cmd = Command::new(&spec.program);
            cmd.args(&spec.args)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped());
            let mut child = match self.spawn(&mut group, &mut cmd, spec) {
                Some(child) => child,
                None => return RunResult::new(Outcome::Failed, None),
            };
            let piped: Option<io::Result<Stdio>> = child.stdout.take().map(|out| out.try_into());
            encoder_stdin = match piped {
                Some(Ok(stdio)) => stdio,
                Some(Err(e)) => {
                    reporter.error(format!("Failed to connect {} to the encoder: {e}", spec.label));
                    return RunResult::new(Outcome::Failed, None);
                }
                None => {
                    reporter.error(format!("No output pipe for {}", spec.label));
                    return RunResult::new(Outcome::Failed, None);
                }
            };
            let drain = child
                .stderr
                .take()
                .map(|stderr| collect_lines(stderr, FILTER_LOG_LIMIT));
            upstream = Some((child, drain, spec));
        }

        let mut cmd = Command::new(&encoder.program);
        cmd.args(&encoder.args)
            .stdin(encoder_stdin)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        let Some(mut child) = self.spawn(&mut group, &mut cmd, encoder) else {
            // Dropping `group` takes the filter down with it.
            return RunResult::new(Outcome::Failed, None);
        };
        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            reporter.error(format!("No output pipes for {}", encoder.label));
            return RunResult::new(Outcome::Failed, None);
        };

        let mut lines = stream::select(
            FramedRead::new(stdout, OutputLineCodec::new()),
            FramedRead::new(stderr, OutputLineCodec::new()),
        );
        let end = self
            .read_loop(&mut child, &mut lines, dialect, sink)
            .await;

        if matches!(end, LoopEnd::Aborted | LoopEnd::TimedOut) {
            group.kill();
            let _ = child.start_kill();
        } else if end == LoopEnd::Exited {
            self.drain_remaining(&mut lines, dialect, sink).await;
        }

        let status = self.wait(&mut child, &group, &encoder.label).await;

        if let Some((mut filter_child, drain, spec)) = upstream {
            let filter_status = self.wait(&mut filter_child, &group, &spec.label).await;
            if let Some(drain) = drain {
                let captured = match timeout(self.ctx.timeouts.grace_period(), drain).await {
                    Ok(Ok(captured)) => captured,
                    _ => Captured::default(),
                };
                if captured.dropped > 0 {
                    reporter.debug(format!(
                        "{} [info]: {} earlier lines omitted",
                        spec.label, captured.dropped
                    ));
                }
                for line in captured.lines {
                    let line = collapse_whitespace(&line);
                    if !line.is_empty() {
                        reporter.debug(format!("{} [info]: {line}", spec.label));
                    }
                }
            }
            if matches!(end, LoopEnd::Closed | LoopEnd::Exited) {
                if let Some(code) = filter_status.and_then(|s| s.code()).filter(|c| *c != 0) {
                    reporter.warning(format!(
                        "The {} process has exited with a non-zero exit code: {code}",
                        spec.label
                    ));
                }
            }
        }
        group.release();

        let exit_code = status.and_then(|s| s.code());
        match end {
            LoopEnd::Aborted => RunResult::new(Outcome::Aborted, exit_code),
            LoopEnd::TimedOut => RunResult::new(Outcome::TimedOut, exit_code),
            LoopEnd::Closed | LoopEnd::Exited => {
                self.classify(status, sink, allowed_exit_codes)
            }
        }
    }

    fn spawn(&self, group: &mut ProcessGroup, cmd: &mut Command, spec: &ProcessSpec) -> Option<Child> {
        match group.spawn(cmd, self.ctx.spawn_lock, self.ctx.priority) {
            Ok(child) => Some(child),
            Err(source) => {
                let reporter = self.ctx.reporter;
                reporter.error("Process creation has failed :-(");
                let err = Error::ProcessSpawnFailed {
                    program: spec.program.clone(),
                    source,
                };
                reporter.error(err.to_string());
                None
            }
        }
    }

    async fn read_loop<S>(
        &self,
        child: &mut Child,
        lines: &mut S,
        dialect: &Dialect,
        sink: &mut dyn LineSink,
    ) -> LoopEnd
    where
        S: Stream<Item = io::Result<String>> + Unpin,
    {
        let ctx = self.ctx;
        let poll_interval = ctx.timeouts.poll_interval();
        let mut idle_cycles: u32 = 0;

        loop {
            if let Some(pause) = ctx.pause {
                if pause.is_requested() {
                    if !self.suspend(pause).await {
                        return LoopEnd::Aborted;
                    }
                    idle_cycles = 0;
                }
            }

            let next = tokio::select! {
                biased;
                _ = ctx.abort.cancelled() => return LoopEnd::Aborted,
                next = timeout(poll_interval, lines.next()) => next,
            };

            match next {
                Ok(Some(Ok(line))) => {
                    idle_cycles = 0;
                    self.dispatch(&line, dialect, sink);
                }
                Ok(Some(Err(e))) => {
                    ctx.reporter.warning(format!("Failed to read process output: {e}"));
                    return LoopEnd::Closed;
                }
                Ok(None) => return LoopEnd::Closed,
                Err(_) => {
                    match child.try_wait() {
                        Ok(Some(_)) => return LoopEnd::Exited,
                        Ok(None) => {}
                        Err(e) => tracing::warn!("Failed to poll process state: {e}"),
                    }
                    idle_cycles = idle_cycles.saturating_add(1);
                    if idle_cycles == ctx.timeouts.warn_after {
                        ctx.reporter.warning(format!(
                            "Process has not written anything for {} seconds!",
                            silence_secs(poll_interval, idle_cycles)
                        ));
                    }
                    if ctx.timeouts.kill_after.is_some_and(|limit| idle_cycles >= limit) {
                        ctx.reporter.error(
                            "Process is not responding anymore, deadlock assumed. Killing process!",
                        );
                        return LoopEnd::TimedOut;
                    }
                }
            }
        }
    }

    /// Reads what is still buffered in the pipes of an exited process.
    async fn drain_remaining<S>(&self, lines: &mut S, dialect: &Dialect, sink: &mut dyn LineSink)
    where
        S: Stream<Item = io::Result<String>> + Unpin,
    {
        let poll_interval = self.ctx.timeouts.poll_interval();
        while let Ok(Some(Ok(line))) = timeout(poll_interval, lines.next()).await {
            self.dispatch(&line, dialect, sink);
        }
    }

    fn dispatch(&self, raw: &str, dialect: &Dialect, sink: &mut dyn LineSink) {
        let line = collapse_whitespace(raw);
        if line.is_empty() {
            return;
        }
        let reporter = self.ctx.reporter;
        match dialect.match_line(&line) {
            Some(m) => {
                if sink.echo_matched() {
                    reporter.info(line.clone());
                }
                sink.on_match(reporter, &line, &m);
            }
            None => reporter.info(line),
        }
    }

    /// Holds the run until resumed. Returns `false` if aborted meanwhile.
    async fn suspend(&self, pause: &PauseSwitch) -> bool {
        let reporter = self.ctx.reporter;
        let previous = reporter.status();
        reporter.set_status(JobStatus::Pausing);
        reporter.set_status(JobStatus::Paused);
        reporter.info(format!(
            "Job paused by user at {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
        ));

        tokio::select! {
            biased;
            _ = self.ctx.abort.cancelled() => return false,
            _ = pause.resumed() => {}
        }

        reporter.set_status(JobStatus::Resuming);
        reporter.info(format!(
            "Job resumed by user at {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
        ));
        reporter.set_status(previous);
        true
    }

    /// Waits for `child` up to the grace period, then kills it.
    async fn wait(&self, child: &mut Child, group: &ProcessGroup, label: &str) -> Option<ExitStatus> {
        let grace = self.ctx.timeouts.grace_period();
        match timeout(grace, child.wait()).await {
            Ok(Ok(status)) => return Some(status),
            Ok(Err(e)) => {
                tracing::warn!("Failed to wait for {label}: {e}");
                return None;
            }
            Err(_) => {}
        }

        tracing::warn!("{label} process still running, going to kill it!");
        group.kill();
        let _ = child.start_kill();
        match timeout(grace, child.wait()).await {
            Ok(Ok(status)) => Some(status),
            _ => {
                self.ctx
                    .reporter
                    .warning(format!("The {label} process could not be terminated!"));
                None
            }
        }
    }

    fn classify(
        &self,
        status: Option<ExitStatus>,
        sink: &mut dyn LineSink,
        allowed_exit_codes: &[i32],
    ) -> RunResult {
        let reporter = self.ctx.reporter;
        let Some(status) = status else {
            reporter.error("Failed to determine the exit code of the process!");
            return RunResult::new(Outcome::Failed, None);
        };

        match status.code() {
            Some(code) if allowed_exit_codes.contains(&code) => {
                sink.on_success(reporter);
                RunResult::new(Outcome::Succeeded, Some(code))
            }
            Some(code) => {
                reporter.error(format!("PROCESS EXITED WITH ERROR CODE: {code}"));
                RunResult::new(Outcome::Failed, Some(code))
            }
            None => {
                reporter.error(format!("PROCESS TERMINATED ABNORMALLY: {}", describe_signal(&status)));
                RunResult::new(Outcome::Failed, None)
            }
        }
    }
}

#[cfg(unix)]
fn describe_signal(status: &ExitStatus) -> String {
    use std::os::unix::process::ExitStatusExt;
    match status.signal() {
        Some(signal) => format!("killed by signal {signal}"),
        None => status.to_string(),
    }
}

#[cfg(not(unix))]
fn describe_signal(status: &ExitStatus) -> String {
    status.to_string()
}

/// How long `idle_cycles` empty polls took, saturating on absurd settings.
fn silence_secs(poll_interval: Duration, idle_cycles: u32) -> u64 {
    poll_interval.saturating_mul(idle_cycles).as_secs()
}

/// The tail of a pipe's output.
#[derive(Debug, Default)]
struct Captured {
    lines: VecDeque<String>,
    dropped: usize,
}

/// Collects a pipe's lines on a background task so the writer never blocks.
///
/// Only the last `limit` lines are kept.
fn collect_lines<R>(pipe: R, limit: usize) -> JoinHandle<Captured>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = FramedRead::new(pipe, OutputLineCodec::new());
        let mut captured = Captured::default();
        while let Some(Ok(line)) = lines.next().await {
            if captured.lines.len() == limit {
                captured.lines.pop_front();
                captured.dropped += 1;
            }
            if limit > 0 {
                captured.lines.push_back(line);
            } else {
                captured.dropped += 1;
            }
        }
        captured
    })
}

/// Collapses runs of whitespace into single spaces and trims the ends.
pub(crate) fn collapse_whitespace(line: &str) -> String {
    line.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Splits tool output on `\r` as well as `\n`.
///
/// Progress meters redraw their line with a bare carriage return, so a plain
/// lines codec would hold every update back until the pass ends. Invalid
/// UTF-8 is replaced rather than rejected.
#[derive(Debug, Default)]
pub struct OutputLineCodec {
    next_index: usize,
}

impl OutputLineCodec {
    pub fn new() -> Self {
        Self::default()
    }

    fn take(&mut self, buf: &mut BytesMut, len: usize, skip: usize) -> String {
        let chunk = buf.split_to(len + skip);
        self.next_index = 0;
        String::from_utf8_lossy(&chunk[..len]).into_owned()
    }
}

impl Decoder for OutputLineCodec {
    type Item = String;
    type Error = io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<String>, io::Error> {
        let start = self.next_index.min(buf.len());
        if let Some(pos) = buf[start..].iter().position(|b| *b == b'\n' || *b == b'\r') {
            return Ok(Some(self.take(buf, start + pos, 1)));
        }
        if buf.len() >= MAX_LINE_LENGTH {
            return Ok(Some(self.take(buf, MAX_LINE_LENGTH, 0)));
        }
        self.next_index = buf.len();
        Ok(None)
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<String>, io::Error> {
        if let Some(line) = self.decode(buf)? {
            return Ok(Some(line));
        }
        if buf.is_empty() {
            return Ok(None);
        }
        let len = buf.len();
        Ok(Some(self.take(buf, len, 0)))
    }
}


#[cfg(all(test, unix))]
mod process_tests {
    use std::time::{Duration, Instant};

    use super::*;
    use crate::event::LogLevel;
    use crate::options::EncoderFamily;
    use crate::testing::{FakeRun, FakeTool};

    #[derive(Default)]
    struct Recorder {
        matched: Vec<String>,
        succeeded: bool,
    }

    impl LineSink for Recorder {
        fn on_match(&mut self, _reporter: &Reporter, line: &str, _m: &RuleMatch) {
            self.matched.push(line.to_string());
        }

        fn on_success(&mut self, _reporter: &Reporter) {
            self.succeeded = true;
        }
    }

    struct Harness {
        reporter: Reporter,
        abort: CancellationToken,
        timeouts: TimeoutPolicy,
        lock: SpawnLock,
        dir: tempfile::TempDir,
    }

    impl Harness {
        fn new() -> Self {
            let (reporter, _snapshot) = Reporter::new(uuid::Uuid::new_v4(), None);
            Harness {
                reporter,
                abort: CancellationToken::new(),
                timeouts: TimeoutPolicy {
                    poll_interval_ms: 50,
                    warn_after: 2,
                    kill_after: Some(6),
                    grace_period_ms: 1_000,
                },
                lock: SpawnLock::new(),
                dir: tempfile::tempdir().unwrap(),
            }
        }

        fn ctx(&self) -> RunContext<'_> {
            RunContext {
                reporter: &self.reporter,
                abort: &self.abort,
                pause: None,
                timeouts: &self.timeouts,
                priority: ProcessPriority::Normal,
                spawn_lock: &self.lock,
            }
        }

        fn tool(&self, name: &str, run: FakeRun) -> ProcessSpec {
            let mut tool = FakeTool::new(self.dir.path().join(name));
            tool.otherwise(run);
            tool.install().unwrap();
            ProcessSpec::new(name, tool.path(), vec!["--crf".into(), "22".into()])
        }

        async fn run(&self, encoder: &ProcessSpec, filter: Option<&ProcessSpec>, sink: &mut Recorder) -> RunResult {
            Supervisor::new(self.ctx())
                .run(encoder, filter, EncoderFamily::X264.pass_dialect(), sink, &[0])
                .await
        }

        fn logged(&self, level: LogLevel, needle: &str) -> bool {
            self.reporter
                .log_lines()
                .iter()
                .any(|l| l.level == level && l.message.contains(needle))
        }
    }

    #[tokio::test]
    async fn test_carriage_return_progress_is_split() {
        let h = Harness::new();
        let encoder = h.tool(
            "x264",
            FakeRun::success()
                .with_raw_stdout("[10.0%] 10/100 frames\r[20.0%] 20/100 frames\r")
                .with_stdout("encoded 100 frames"),
        );
        let mut sink = Recorder::default();
        let result = h.run(&encoder, None, &mut sink).await;

        assert!(result.is_success());
        assert!(sink.succeeded);
        assert_eq!(sink.matched, vec!["[10.0%] 10/100 frames", "[20.0%] 20/100 frames"]);
        assert!(h.logged(LogLevel::Info, "encoded 100 frames"));
    }

    #[tokio::test]
    async fn test_nonzero_exit_fails() {
        let h = Harness::new();
        let encoder = h.tool("x264", FakeRun::failure(3).with_stderr("x264 [error]: could not open input file"));
        let mut sink = Recorder::default();
        let result = h.run(&encoder, None, &mut sink).await;

        assert_eq!(result.outcome, Outcome::Failed);
        assert_eq!(result.exit_code, Some(3));
        assert!(!sink.succeeded);
        assert!(h.logged(LogLevel::Error, "PROCESS EXITED WITH ERROR CODE: 3"));
        assert!(h.logged(LogLevel::Info, "could not open input file"));
    }

    #[tokio::test]
    async fn test_allowed_exit_code_succeeds() {
        let h = Harness::new();
        let encoder = h.tool("nvencc", FakeRun::failure(1));
        let mut sink = Recorder::default();
        let result = Supervisor::new(h.ctx())
            .run(&encoder, None, EncoderFamily::NvEncC.pass_dialect(), &mut sink, &[0, 1])
            .await;
        assert_eq!(result.outcome, Outcome::Succeeded);
        assert!(sink.succeeded);
    }

    #[tokio::test]
    async fn test_silent_process_is_killed() {
        let h = Harness::new();
        let encoder = h.tool("x264", FakeRun::success().with_stdout("starting").hangs());
        let mut sink = Recorder::default();
        let started = Instant::now();
        let result = h.run(&encoder, None, &mut sink).await;

        assert_eq!(result.outcome, Outcome::TimedOut);
        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(h.logged(LogLevel::Warning, "has not written anything"));
        assert!(h.logged(LogLevel::Error, "deadlock assumed"));
    }

    #[tokio::test]
    async fn test_silent_process_without_kill_limit_is_awaited() {
        let mut h = Harness::new();
        h.timeouts.kill_after = None;
        let encoder = h.tool(
            "x264",
            FakeRun::success()
                .with_stdout("starting")
                .with_delay(Duration::from_millis(1_500))
                .with_stdout("encoded 100 frames"),
        );
        let mut sink = Recorder::default();
        let result = h.run(&encoder, None, &mut sink).await;

        assert_eq!(result.outcome, Outcome::Succeeded);
        assert!(sink.succeeded);
        assert!(h.logged(LogLevel::Warning, "has not written anything"));
        assert!(!h.logged(LogLevel::Error, "deadlock assumed"));
        assert!(h.logged(LogLevel::Info, "encoded 100 frames"));
    }

    #[test]
    fn test_silence_saturates_on_huge_settings() {
        assert_eq!(silence_secs(Duration::from_millis(500), 10), 5);
        assert_eq!(silence_secs(Duration::from_millis(u64::MAX), u32::MAX), u64::MAX);
    }

    #[tokio::test]
    async fn test_abort_kills_process() {
        let h = Harness::new();
        let encoder = h.tool("x264", FakeRun::success().hangs());
        let mut sink = Recorder::default();
        let abort = h.abort.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            abort.cancel();
        });
        let started = Instant::now();
        let result = h.run(&encoder, None, &mut sink).await;

        assert_eq!(result.outcome, Outcome::Aborted);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_filter_feeds_encoder() {
        let h = Harness::new();
        let filter = h.tool(
            "avs2yuv",
            FakeRun::success()
                .with_raw_stdout("YUV4MPEG2 W640 H480 F25:1\n")
                .with_stderr("avs2yuv [info]: 640x480, 25 fps, 100 frames"),
        );
        let encoder = h.tool(
            "x264",
            FakeRun::success().reads_stdin().with_stdout("[100.0%] 100/100 frames"),
        );
        let mut sink = Recorder::default();
        let result = h.run(&encoder, Some(&filter), &mut sink).await;

        assert!(result.is_success());
        assert_eq!(sink.matched.len(), 1);
        assert!(h.logged(LogLevel::Debug, "avs2yuv [info]:"));
    }

    #[tokio::test]
    async fn test_filter_stderr_keeps_only_the_tail() {
        let text: String = (1..=5).map(|n| format!("line {n}\n")).collect();
        let captured = collect_lines(std::io::Cursor::new(text.into_bytes()), 3)
            .await
            .unwrap();

        assert_eq!(captured.lines, ["line 3", "line 4", "line 5"]);
        assert_eq!(captured.dropped, 2);
    }

    #[tokio::test]
    async fn test_failing_filter_only_warns() {
        let h = Harness::new();
        let filter = h.tool("vspipe", FakeRun::failure(1));
        let encoder = h.tool("x264", FakeRun::success().reads_stdin());
        let mut sink = Recorder::default();
        let result = h.run(&encoder, Some(&filter), &mut sink).await;

        assert!(result.is_success());
        assert!(h.logged(LogLevel::Warning, "non-zero exit code: 1"));
    }

    #[tokio::test]
    async fn test_spawn_failure_is_reported() {
        let h = Harness::new();
        let encoder = ProcessSpec::new("x264", h.dir.path().join("missing"), Vec::new());
        let mut sink = Recorder::default();
        let result = h.run(&encoder, None, &mut sink).await;

        assert_eq!(result.outcome, Outcome::Failed);
        assert!(h.logged(LogLevel::Error, "Process creation has failed :-("));
        assert!(h.logged(LogLevel::Error, "Failed to spawn"));
    }
}
