use std::pin::Pin;
use std::time::Duration;

use async_stream::stream;
use futures::Stream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::control::PauseSwitch;
use crate::event::{JobEvent, JobId, JobNotification, JobOutcome, JobSnapshot, JobStatus, Log, LogLevel};

/// A handle to a running encoding job.
///
/// This struct provides two key functionalities:
/// 1.  An async stream of `JobEvent`s describing the job's progress.
/// 2.  Control methods (`abort`, `pause`, `resume`) to steer the job.
///
/// Dropping the handle does not stop the job.
#[derive(Debug)]
pub struct JobHandle {
    id: JobId,
    abort: CancellationToken,
    pause: PauseSwitch,
    snapshot: watch::Receiver<JobSnapshot>,
    /// `None` when the job reports to a shared channel.
    event_rx: Option<mpsc::UnboundedReceiver<JobNotification>>,
    task: JoinHandle<JobOutcome>,
}

impl JobHandle {
    pub(crate) fn new(
        id: JobId,
        abort: CancellationToken,
        pause: PauseSwitch,
        snapshot: watch::Receiver<JobSnapshot>,
        event_rx: Option<mpsc::UnboundedReceiver<JobNotification>>,
        task: JoinHandle<JobOutcome>,
    ) -> Self {
        JobHandle {
            id,
            abort,
            pause,
            snapshot,
            event_rx,
            task,
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    /// Requests the job to stop. Running tools are killed; the job ends as
    /// [`JobStatus::Aborted`].
    pub fn abort(&self) {
        self.abort.cancel();
    }

    /// Requests the job to pause at its next opportunity.
    ///
    /// Returns `false` if the job is not in a state that can be paused.
    pub fn pause(&self) -> bool {
        if !self.status().is_running() {
            return false;
        }
        self.pause.pause();
        true
    }

    /// Lifts a previous pause request.
    ///
    /// Returns `false` if no pause was requested.
    pub fn resume(&self) -> bool {
        if !self.pause.is_requested() {
            return false;
        }
        self.pause.resume();
        true
    }

    pub fn status(&self) -> JobStatus {
        self.snapshot.borrow().status
    }

    /// The job's current status, progress and details.
    pub fn snapshot(&self) -> JobSnapshot {
        self.snapshot.borrow().clone()
    }

    /// A receiver that observes every snapshot change.
    pub fn subscribe(&self) -> watch::Receiver<JobSnapshot> {
        self.snapshot.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Returns an async stream of `JobEvent`s from the running job.
    ///
    /// The stream ends once the job has finished. It is empty if the job was
    /// started with [`crate::JobBuilder::notify`].
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// # use encode_launcher::{EncodeOptions, JobEvent, Launcher};
    /// # use futures::StreamExt;
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// # let launcher = Launcher::from_env()?;
    /// let mut handle = launcher
    ///     .job("movie.avs", "movie.264", EncodeOptions::x264())
    ///     .start();
    /// while let Some(event) = handle.events().next().await {
    ///     match event {
    ///         JobEvent::Progress(p) => println!("Progress: {p}%"),
    ///         JobEvent::Log(line) => println!("{}", line.message),
    ///         _ => {}
    ///     }
    /// }
    /// let outcome = handle.wait().await;
    /// # Ok(())
    /// # }
    /// ```
    pub fn events(&mut self) -> Pin<Box<impl Stream<Item = JobEvent> + '_>> {
        let s = stream! {
            if let Some(rx) = self.event_rx.as_mut() {
                while let Some(notification) = rx.recv().await {
                    yield notification.event;
                }
            }
        };
        Box::pin(s)
    }

    /// Waits for the job to finish.
    pub async fn wait(self) -> JobOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => JobOutcome {
                job: self.id,
                status: JobStatus::Failed,
                log: vec![Log {
                    level: LogLevel::Error,
                    message: format!("EXCEPTION ERROR: {e}"),
                }],
                elapsed: Duration::ZERO,
            },
        }
    }
}
