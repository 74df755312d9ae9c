//! Scripted stand-ins for the external tools, used by the test suites.
//!
//! A [`FakeTool`] is a small `/bin/sh` script installed where the launcher
//! expects a real binary. It picks its behaviour from its first argument and
//! records every invocation.

use std::fmt::Write as _;
use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

const CALL_END: &str = "<end-of-call>";

#[derive(Debug, Clone)]
enum Step {
    Stdout(String),
    Stderr(String),
    Sleep(Duration),
    WriteOutput(usize),
    Hang,
}

/// What one invocation of a fake tool does.
#[derive(Debug, Clone)]
pub struct FakeRun {
    exit_code: i32,
    reads_stdin: bool,
    steps: Vec<Step>,
}

impl FakeRun {
    pub fn success() -> Self {
        Self::failure(0)
    }

    pub fn failure(exit_code: i32) -> Self {
        FakeRun {
            exit_code,
            reads_stdin: false,
            steps: Vec::new(),
        }
    }

    /// Prints `line` and a newline to stdout.
    pub fn with_stdout(self, line: impl Into<String>) -> Self {
        let mut line = line.into();
        line.push('\n');
        self.with_raw_stdout(line)
    }

    /// Prints `text` to stdout as is, e.g. `\r`-terminated progress.
    pub fn with_raw_stdout(mut self, text: impl Into<String>) -> Self {
        self.steps.push(Step::Stdout(text.into()));
        self
    }

    pub fn with_stderr(mut self, line: impl Into<String>) -> Self {
        let mut line = line.into();
        line.push('\n');
        self.steps.push(Step::Stderr(line));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.steps.push(Step::Sleep(delay));
        self
    }

    /// Writes `bytes` zero bytes to the path following `--output`.
    pub fn writes_output(mut self, bytes: usize) -> Self {
        self.steps.push(Step::WriteOutput(bytes));
        self
    }

    /// Consumes stdin in the background, like an encoder reading a pipe.
    pub fn reads_stdin(mut self) -> Self {
        self.reads_stdin = true;
        self
    }

    /// Stops producing output and never exits.
    pub fn hangs(mut self) -> Self {
        self.steps.push(Step::Hang);
        self
    }

    fn render(&self, script: &mut String) {
        if self.reads_stdin {
            // Asynchronous lists get /dev/null as stdin unless redirected.
            script.push_str("  exec 3<&0\n  cat <&3 > /dev/null &\n");
        }
        for step in &self.steps {
            // Writing into a String cannot fail.
            let _ = match step {
                Step::Stdout(text) => writeln!(script, "  printf '%s' {}", quote(text)),
                Step::Stderr(text) => writeln!(script, "  printf '%s' {} >&2", quote(text)),
                Step::Sleep(delay) => writeln!(script, "  sleep {:.3}", delay.as_secs_f64()),
                Step::WriteOutput(bytes) => writeln!(
                    script,
                    "  [ -n \"$out\" ] && head -c {bytes} /dev/zero > \"$out\""
                ),
                Step::Hang => writeln!(script, "  exec sleep 3600"),
            };
        }
        if self.reads_stdin {
            script.push_str("  wait\n");
        }
        let _ = writeln!(script, "  exit {}", self.exit_code);
    }
}

/// A fake tool binary, dispatching on its first argument.
#[derive(Debug)]
pub struct FakeTool {
    path: PathBuf,
    calls: PathBuf,
    cases: Vec<(String, FakeRun)>,
    fallback: FakeRun,
}

/// Builder for one branch of a [`FakeTool`].
pub struct FakeToolExpect<'a> {
    tool: &'a mut FakeTool,
    first_arg: String,
}

impl FakeToolExpect<'_> {
    pub fn returns(self, run: FakeRun) {
        self.tool.cases.push((self.first_arg, run));
    }
}

impl FakeTool {
    /// A tool that will be installed at `path` and succeeds silently unless
    /// told otherwise.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut calls = path.clone().into_os_string();
        calls.push(".calls");
        FakeTool {
            path,
            calls: PathBuf::from(calls),
            cases: Vec::new(),
            fallback: FakeRun::success(),
        }
    }

    /// Start describing what happens when the first argument is `first_arg`.
    /// An empty string matches an invocation without arguments.
    pub fn when(&mut self, first_arg: impl Into<String>) -> FakeToolExpect<'_> {
        FakeToolExpect {
            tool: self,
            first_arg: first_arg.into(),
        }
    }

    /// What happens for every other invocation.
    pub fn otherwise(&mut self, run: FakeRun) {
        self.fallback = run;
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes the script, replacing any previous version.
    pub fn install(&self) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, self.script())?;
        fs::set_permissions(&self.path, fs::Permissions::from_mode(0o755))
    }

    /// The argument lists of every invocation so far, oldest first.
    pub fn calls(&self) -> io::Result<Vec<Vec<String>>> {
        let text = match fs::read_to_string(&self.calls) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let mut calls = Vec::new();
        let mut current = Vec::new();
        for line in text.lines() {
            if line == CALL_END {
                calls.push(std::mem::take(&mut current));
            } else {
                current.push(line.to_string());
            }
        }
        Ok(calls)
    }

    fn script(&self) -> String {
        let mut script = String::from("#!/bin/sh\n");
        let _ = writeln!(
            script,
            "{{ for a in \"$@\"; do printf '%s\\n' \"$a\"; done; printf '%s\\n' {}; }} >> {}",
            quote(CALL_END),
            quote(&self.calls.to_string_lossy())
        );
        script.push_str("out=\nprev=\nfor a in \"$@\"; do\n");
        script.push_str("  if [ \"$prev\" = \"--output\" ]; then out=\"$a\"; fi\n");
        script.push_str("  prev=\"$a\"\ndone\n");
        script.push_str("case \"$1\" in\n");
        for (first_arg, run) in &self.cases {
            let _ = writeln!(script, "{})", quote(first_arg));
            run.render(&mut script);
            script.push_str("  ;;\n");
        }
        script.push_str("*)\n");
        self.fallback.render(&mut script);
        script.push_str("  ;;\nesac\n");
        script
    }
}

fn quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', "'\\''"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;

    #[test]
    fn test_fake_tool_dispatch_and_record() {
        let dir = tempfile::tempdir().unwrap();
        let mut tool = FakeTool::new(dir.path().join("bin/x264"));
        tool.when("--version")
            .returns(FakeRun::success().with_stdout("x264 0.142.2431 ac76440"));
        tool.otherwise(FakeRun::failure(3).with_stderr("it's broken"));
        tool.install().unwrap();

        let version = Command::new(tool.path()).arg("--version").output().unwrap();
        assert!(version.status.success());
        assert_eq!(String::from_utf8_lossy(&version.stdout), "x264 0.142.2431 ac76440\n");

        let other = Command::new(tool.path()).args(["--crf", "22"]).output().unwrap();
        assert_eq!(other.status.code(), Some(3));
        assert_eq!(String::from_utf8_lossy(&other.stderr), "it's broken\n");

        assert_eq!(
            tool.calls().unwrap(),
            vec![vec!["--version".to_string()], vec!["--crf".to_string(), "22".to_string()]]
        );
    }

    #[test]
    fn test_fake_tool_writes_output() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.264");
        let mut tool = FakeTool::new(dir.path().join("x264"));
        tool.otherwise(FakeRun::success().writes_output(1234));
        tool.install().unwrap();

        let status = Command::new(tool.path())
            .args(["--crf", "22", "--output"])
            .arg(&output)
            .status()
            .unwrap();
        assert!(status.success());
        assert_eq!(fs::metadata(&output).unwrap().len(), 1234);
    }
}
