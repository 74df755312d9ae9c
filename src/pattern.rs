//! Ordered, declarative line-recognition rules.
//!
//! Each external tool family speaks its own "dialect": a fixed list of
//! patterns that is tried top to bottom against every line of output. The
//! first rule that matches wins. Rules are plain data so that adding a tool
//! never touches the supervisor.

use regex::{Regex, RegexBuilder};

use crate::error::Error;

/// What a recognised line means to whoever consumes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LineKind {
    /// Encoding progress in percent; first capture is the integer percentage.
    PercentProgress,
    /// Input indexing progress in percent.
    Indexing,
    /// Final "N frames:" summary written at the end of a pass.
    FrameSummary,
    /// Number of frames encoded so far; progress is derived from the source.
    FramesDone,
    /// The GPU does not support the selected codec.
    HardwareUnsupported,
    /// The vendor encoding API library is missing.
    ApiUnavailable,
    /// Version signature of an official build.
    Version,
    /// Version signature of a build carrying custom patches.
    ModifiedVersion,
    /// `: WxH, F fps, N frames`
    SourceSummary,
    /// `: WxH, A/B fps, N frames`
    SourceSummaryFraction,
    SourceWidth,
    SourceHeight,
    SourceFrames,
    SourceFrameRate,
}

/// One rule: a pattern, what it means, and which groups to read as numbers.
#[derive(Debug, Clone)]
pub struct PatternRule {
    kind: LineKind,
    regex: Regex,
    groups: Option<Vec<usize>>,
}

impl PatternRule {
    /// Compiles a rule. All capture groups are extracted unless
    /// [`PatternRule::groups`] narrows them down.
    pub fn new(kind: LineKind, pattern: &str) -> Result<Self, Error> {
        Self::build(kind, pattern, false)
    }

    /// Same as [`PatternRule::new`] but matches without regard to case.
    pub fn case_insensitive(kind: LineKind, pattern: &str) -> Result<Self, Error> {
        Self::build(kind, pattern, true)
    }

    fn build(kind: LineKind, pattern: &str, ignore_case: bool) -> Result<Self, Error> {
        let regex = RegexBuilder::new(pattern)
            .case_insensitive(ignore_case)
            .build()
            .map_err(|source| Error::InvalidPattern {
                pattern: pattern.to_string(),
                source,
            })?;
        Ok(PatternRule {
            kind,
            regex,
            groups: None,
        })
    }

    /// Restricts extraction to the given capture group indices, in order.
    pub fn groups(mut self, groups: &[usize]) -> Self {
        self.groups = Some(groups.to_vec());
        self
    }

    pub fn kind(&self) -> LineKind {
        self.kind
    }

    /// Matches against the last occurrence of the pattern in `line`.
    fn apply(&self, line: &str) -> Option<(Vec<u32>, usize)> {
        let caps = self.regex.captures_iter(line).last()?;
        let offset = caps.get(0).map_or(0, |m| m.start());

        let indices: Vec<usize> = match &self.groups {
            Some(groups) => groups.clone(),
            None => (1..caps.len()).collect(),
        };

        let mut values = Vec::with_capacity(indices.len());
        for index in indices {
            let value = caps.get(index)?.as_str().trim().parse::<u32>().ok()?;
            values.push(value);
        }
        Some((values, offset))
    }
}

/// A successful match of one rule against one line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleMatch {
    /// Position of the rule within its dialect.
    pub index: usize,
    pub kind: LineKind,
    pub captures: Vec<u32>,
    /// Byte offset where the match starts.
    pub offset: usize,
}

impl RuleMatch {
    /// The part of `line` from the match onwards, trimmed.
    pub fn tail<'l>(&self, line: &'l str) -> &'l str {
        line.get(self.offset..).unwrap_or(line).trim()
    }

    /// The n-th numeric capture, or zero when the rule extracted fewer.
    pub fn value(&self, n: usize) -> u32 {
        self.captures.get(n).copied().unwrap_or_default()
    }
}

/// An ordered rule set for one tool and one kind of invocation.
#[derive(Debug, Clone)]
pub struct Dialect {
    name: &'static str,
    rules: Vec<PatternRule>,
}

impl Dialect {
    pub fn new(name: &'static str, rules: Vec<PatternRule>) -> Self {
        Dialect { name, rules }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn rules(&self) -> &[PatternRule] {
        &self.rules
    }

    /// Returns the first rule (in declaration order) that matches `line`.
    pub fn match_line(&self, line: &str) -> Option<RuleMatch> {
        self.rules.iter().enumerate().find_map(|(index, rule)| {
            rule.apply(line).map(|(captures, offset)| RuleMatch {
                index,
                kind: rule.kind,
                captures,
                offset,
            })
        })
    }
}

/// Compiles a built-in rule; built-in patterns are known to be valid.
pub(crate) fn builtin(kind: LineKind, pattern: &str) -> PatternRule {
    PatternRule::new(kind, pattern).expect("BUG: Failed to compile built-in line pattern")
}

pub(crate) fn builtin_nocase(kind: LineKind, pattern: &str) -> PatternRule {
    PatternRule::case_insensitive(kind, pattern)
        .expect("BUG: Failed to compile built-in line pattern")
}
