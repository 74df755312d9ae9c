use std::sync::{Mutex, PoisonError};

use tokio::sync::{mpsc, watch};

use crate::event::{JobEvent, JobId, JobNotification, JobSnapshot, JobStatus, Log, LogLevel};

const FAILED_DETAILS: &str = "The job has failed. See log for details!";
const ABORTED_DETAILS: &str = "The job was aborted by the user!";

/// Owns the observable state of one job.
///
/// Only the job's own task writes through a `Reporter`; everybody else sees
/// its effects as [`JobNotification`]s or through the snapshot channel.
#[derive(Debug)]
pub struct Reporter {
    job: JobId,
    state: watch::Sender<JobSnapshot>,
    events: Option<mpsc::UnboundedSender<JobNotification>>,
    log: Mutex<Vec<Log>>,
}

impl Reporter {
    pub(crate) fn new(
        job: JobId,
        events: Option<mpsc::UnboundedSender<JobNotification>>,
    ) -> (Self, watch::Receiver<JobSnapshot>) {
        let (state, snapshot) = watch::channel(JobSnapshot::default());
        let reporter = Reporter {
            job,
            state,
            events,
            log: Mutex::new(Vec::new()),
        };
        (reporter, snapshot)
    }

    pub fn job(&self) -> JobId {
        self.job
    }

    pub fn status(&self) -> JobStatus {
        self.state.borrow().status
    }

    pub fn progress(&self) -> u8 {
        self.state.borrow().progress
    }

    pub fn snapshot(&self) -> JobSnapshot {
        self.state.borrow().clone()
    }

    /// Moves the job to `status`.
    ///
    /// Entering a new working phase resets progress to zero; the suspend
    /// states and terminal states keep it. `Failed` and `Aborted` come with
    /// default details.
    pub fn set_status(&self, status: JobStatus) {
        let mut previous = status;
        let changed = self.state.send_if_modified(|s| {
            if s.status == status {
                return false;
            }
            previous = s.status;
            s.status = status;
            true
        });
        if !changed {
            return;
        }
        self.emit(JobEvent::Status(status));

        let keeps_progress =
            status.is_terminal() || status.is_suspended() || previous.is_suspended();
        if !keeps_progress {
            self.set_progress(0);
        }
        match status {
            JobStatus::Failed => self.set_details(FAILED_DETAILS),
            JobStatus::Aborted => self.set_details(ABORTED_DETAILS),
            _ => {}
        }
    }

    /// Sets progress in percent, clamped to 100.
    pub fn set_progress(&self, progress: u32) {
        let progress = progress.min(100) as u8;
        let changed = self.state.send_if_modified(|s| {
            if s.progress == progress {
                return false;
            }
            s.progress = progress;
            true
        });
        if changed {
            self.emit(JobEvent::Progress(progress));
        }
    }

    pub fn set_details(&self, details: impl Into<String>) {
        let details = details.into();
        self.state.send_modify(|s| s.details.clone_from(&details));
        self.emit(JobEvent::Details(details));
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(LogLevel::Info, message.into());
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.log(LogLevel::Warning, message.into());
    }

    pub fn error(&self, message: impl Into<String>) {
        self.log(LogLevel::Error, message.into());
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.log(LogLevel::Debug, message.into());
    }

    /// Appends a line to the job log and mirrors it to `tracing`.
    pub fn log(&self, level: LogLevel, message: String) {
        match level {
            LogLevel::Debug => tracing::debug!(job = %self.job, "{message}"),
            LogLevel::Info => tracing::info!(job = %self.job, "{message}"),
            LogLevel::Warning => tracing::warn!(job = %self.job, "{message}"),
            LogLevel::Error => tracing::error!(job = %self.job, "{message}"),
        }
        let entry = Log { level, message };
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry.clone());
        self.emit(JobEvent::Log(entry));
    }

    /// A copy of the log so far.
    pub fn log_lines(&self) -> Vec<Log> {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn emit(&self, event: JobEvent) {
        if let Some(events) = &self.events {
            // The receiver going away only means nobody is listening anymore.
            let _ = events.send(JobNotification {
                job: self.job,
                event,
            });
        }
    }
}
