//! Tool version probing and compatibility rules.

use serde::Serialize;

use crate::config::ToolRequirements;
use crate::pattern::{Dialect, RuleMatch};
use crate::reporter::Reporter;
use crate::supervisor::{LineSink, ProcessSpec, RunContext, RunResult, Supervisor};

/// A tool version reduced to two comparable numbers.
///
/// What the numbers mean depends on the tool: x264 reports its revision and
/// core API, NVEncC its release and NVENC API level, and so on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ToolVersion {
    pub primary: u32,
    pub secondary: u32,
    /// The build identifies itself as carrying custom patches.
    pub modified: bool,
}

impl ToolVersion {
    pub fn new(primary: u32, secondary: u32) -> Self {
        ToolVersion {
            primary,
            secondary,
            modified: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Compatibility {
    Supported,
    /// Usable, but outside what was tested.
    Warning(Vec<String>),
    Unsupported(String),
}

impl Compatibility {
    pub fn is_usable(&self) -> bool {
        !matches!(self, Compatibility::Unsupported(_))
    }
}

/// How a tool and its version numbers are spelled in log messages.
#[derive(Debug, Clone, Copy)]
pub struct VersionNaming {
    pub tool: &'static str,
    pub primary: fn(u32) -> String,
    pub secondary: fn(u32) -> String,
    pub display: fn(&ToolVersion) -> String,
}

/// Decides whether `version` may be used under `req`.
///
/// Hard requirements are checked first and the first violation wins. Only a
/// version that passes all of them collects warnings.
pub fn classify(
    version: &ToolVersion,
    req: &ToolRequirements,
    naming: &VersionNaming,
) -> Compatibility {
    let tool = naming.tool;

    if let Some(exact) = req.exact {
        if version.primary != exact {
            return Compatibility::Unsupported(format!(
                "Your version of {tool} is unsupported (Required version is v{})",
                (naming.primary)(exact)
            ));
        }
    }
    if version.primary < req.minimum {
        return Compatibility::Unsupported(format!(
            "Your version of {tool} is too old! (Minimum required version is {})",
            (naming.primary)(req.minimum)
        ));
    }
    if let Some(minimum) = req.minimum_secondary {
        if version.secondary < minimum {
            return Compatibility::Unsupported(format!(
                "The API version of {tool} is too old! (Minimum required version is {})",
                (naming.secondary)(minimum)
            ));
        }
    }

    let mut warnings = Vec::new();
    if let Some(tested) = req.tested {
        if version.primary > tested {
            warnings.push(format!(
                "Your version of {tool} is newer than the latest tested version, take care!"
            ));
            warnings.push(format!(
                "This application works best with {tool} version {}. Newer versions may work or not.",
                (naming.primary)(tested)
            ));
        }
    }
    if let Some(tested) = req.tested_secondary {
        if version.secondary != tested {
            warnings.push(format!(
                "Your {tool} binary uses an untested core (API) version, take care!"
            ));
            warnings.push(format!(
                "This application works best with {tool} core (API) version {}. Newer versions may work or not.",
                (naming.secondary)(tested)
            ));
        }
    }

    if warnings.is_empty() {
        Compatibility::Supported
    } else {
        Compatibility::Warning(warnings)
    }
}

/// Fills in a [`ToolVersion`] from one recognised line.
pub type VersionDecoder = fn(&RuleMatch, &mut ToolVersion);

/// Collects version fields while echoing every line to the job log.
struct VersionSink {
    decode: VersionDecoder,
    version: ToolVersion,
    found: bool,
}

impl LineSink for VersionSink {
    fn on_match(&mut self, _reporter: &Reporter, _line: &str, m: &RuleMatch) {
        (self.decode)(m, &mut self.version);
        self.found = true;
    }

    fn echo_matched(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionProbe {
    /// `None` if the tool printed nothing recognisable.
    pub version: Option<ToolVersion>,
    pub result: RunResult,
}

/// Runs `tool` with its version arguments and extracts its version.
///
/// Probes cannot be paused but can be aborted.
pub async fn probe_version(
    ctx: RunContext<'_>,
    tool: &ProcessSpec,
    dialect: &Dialect,
    decode: VersionDecoder,
    allowed_exit_codes: &[i32],
) -> VersionProbe {
    let ctx = RunContext { pause: None, ..ctx };
    let mut sink = VersionSink {
        decode,
        version: ToolVersion::default(),
        found: false,
    };
    let result = Supervisor::new(ctx)
        .run(tool, None, dialect, &mut sink, allowed_exit_codes)
        .await;
    VersionProbe {
        version: sink.found.then_some(sink.version),
        result,
    }
}
