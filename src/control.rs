//! Cooperative job control shared between a [`crate::JobHandle`] and the
//! job's task.

use std::sync::Arc;

use tokio::sync::watch;
pub use tokio_util::sync::CancellationToken;

/// A pause request gate.
///
/// The supervisor checks it between two lines of output. While it is set the
/// supervisor stops reading, which leaves the tool blocked on its own output
/// pipe without losing anything it already wrote.
#[derive(Debug, Clone)]
pub struct PauseSwitch {
    requested: Arc<watch::Sender<bool>>,
}

impl Default for PauseSwitch {
    fn default() -> Self {
        PauseSwitch {
            requested: Arc::new(watch::Sender::new(false)),
        }
    }
}

impl PauseSwitch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pause(&self) {
        self.requested.send_replace(true);
    }

    pub fn resume(&self) {
        self.requested.send_replace(false);
    }

    pub fn is_requested(&self) -> bool {
        *self.requested.borrow()
    }

    /// Completes once no pause is requested.
    pub async fn resumed(&self) {
        let mut rx = self.requested.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|paused| !*paused).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_resumed_waits_for_resume() {
        let switch = PauseSwitch::new();
        switch.pause();
        assert!(switch.is_requested());

        let waiter = switch.clone();
        let task = tokio::spawn(async move { waiter.resumed().await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!task.is_finished());

        switch.resume();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("resume was not observed")
            .unwrap();
    }

    #[tokio::test]
    async fn test_resumed_is_immediate_when_running() {
        let switch = PauseSwitch::new();
        tokio::time::timeout(Duration::from_millis(100), switch.resumed())
            .await
            .expect("should not block");
    }
}
