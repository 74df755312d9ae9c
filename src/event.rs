use std::fmt;
use std::time::Duration;

use serde::Serialize;
use uuid::Uuid;

/// Unique identifier of a job, stable for the job's lifetime.
pub type JobId = Uuid;

/// Life-cycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum JobStatus {
    /// Version checks and source probing.
    Starting,
    /// Probing tool versions.
    CheckingVersion,
    /// The encoder is indexing its input before the first frame.
    Indexing,
    /// Single-pass encode in progress.
    Running,
    RunningPass1,
    RunningPass2,
    /// A pause was requested and will take effect at the next checkpoint.
    Pausing,
    Paused,
    Resuming,
    Completed,
    Failed,
    Aborted,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Aborted
        )
    }

    /// The suspend states, which sit on top of whatever phase was running.
    pub fn is_suspended(self) -> bool {
        matches!(
            self,
            JobStatus::Pausing | JobStatus::Paused | JobStatus::Resuming
        )
    }

    /// States from which a pause may be requested.
    pub fn is_running(self) -> bool {
        matches!(
            self,
            JobStatus::Indexing
                | JobStatus::Running
                | JobStatus::RunningPass1
                | JobStatus::RunningPass2
        )
    }

    /// Running state for a pass number (0 = single pass).
    pub fn for_pass(pass: u8) -> Self {
        match pass {
            1 => JobStatus::RunningPass1,
            2 => JobStatus::RunningPass2,
            _ => JobStatus::Running,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            JobStatus::Starting => "Starting",
            JobStatus::CheckingVersion => "Checking Version",
            JobStatus::Indexing => "Indexing",
            JobStatus::Running => "Running",
            JobStatus::RunningPass1 => "Running (Pass 1)",
            JobStatus::RunningPass2 => "Running (Pass 2)",
            JobStatus::Pausing => "Pausing",
            JobStatus::Paused => "Paused",
            JobStatus::Resuming => "Resuming",
            JobStatus::Completed => "Completed",
            JobStatus::Failed => "Failed",
            JobStatus::Aborted => "Aborted",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum LogLevel {
    /// Diagnostic chatter, e.g. drained filter output.
    Debug,
    Info,
    Warning,
    Error,
}

/// One line of a job's log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Log {
    pub level: LogLevel,
    pub message: String,
}

/// A change inside a job, as seen by observers.
#[derive(Debug, Clone, PartialEq)]
pub enum JobEvent {
    Status(JobStatus),
    /// Progress of the current phase, 0 to 100.
    Progress(u8),
    /// Short human-readable description of what is happening.
    Details(String),
    /// A line appended to the job log.
    Log(Log),
}

/// A [`JobEvent`] tagged with the job it belongs to, so that many jobs can
/// share one channel to the owner of the queue.
#[derive(Debug, Clone, PartialEq)]
pub struct JobNotification {
    pub job: JobId,
    pub event: JobEvent,
}

/// Current state of a job, for observers that subscribe late.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobSnapshot {
    pub status: JobStatus,
    pub progress: u8,
    pub details: String,
}

impl Default for JobSnapshot {
    fn default() -> Self {
        JobSnapshot {
            status: JobStatus::Starting,
            progress: 0,
            details: String::new(),
        }
    }
}

/// What a job left behind once it reached a terminal state.
#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub job: JobId,
    pub status: JobStatus,
    pub log: Vec<Log>,
    pub elapsed: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_check_cannot_be_paused() {
        assert!(!JobStatus::CheckingVersion.is_running());
        assert!(!JobStatus::CheckingVersion.is_terminal());
        assert!(JobStatus::RunningPass1.is_running());
        assert_eq!(JobStatus::CheckingVersion.to_string(), "Checking Version");
    }
}
