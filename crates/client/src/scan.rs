//! Polls the "latest scanned card" endpoint while the operator holds a card
//! to the reader.

use std::sync::Arc;
use std::time::Duration;

use labgate_shared::ScanResult;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::api_client::ScanSource;

#[derive(Debug, Clone, PartialEq)]
pub enum ScanOutcome {
    Scanned(ScanResult),
    /// `max_attempts` polls came back empty.
    TimedOut,
    Cancelled,
}

pub struct ScanPoller {
    task: Option<JoinHandle<()>>,
    result: Option<oneshot::Receiver<ScanOutcome>>,
}

impl ScanPoller {
    /// Start polling every `interval`, at most `max_attempts` times. Must be
    /// called from within a tokio runtime.
    pub fn start(source: Arc<dyn ScanSource>, interval: Duration, max_attempts: u32) -> Self {
        let (tx, rx) = oneshot::channel();
        let task = tokio::spawn(async move {
            let outcome = poll(source.as_ref(), interval, max_attempts).await;
            let _ = tx.send(outcome);
        });
        Self {
            task: Some(task),
            result: Some(rx),
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Wait for the outcome. Delivered once; later calls yield `Cancelled`.
    pub async fn result(&mut self) -> ScanOutcome {
        let Some(rx) = self.result.take() else {
            return ScanOutcome::Cancelled;
        };
        rx.await.unwrap_or(ScanOutcome::Cancelled)
    }

    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            if !task.is_finished() {
                crate::log_debug!("card scan polling stopped");
            }
            task.abort();
        }
    }
}

impl Drop for ScanPoller {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn poll(source: &dyn ScanSource, interval: Duration, max_attempts: u32) -> ScanOutcome {
    for attempt in 1..=max_attempts {
        match source.latest_scan().await {
            Ok(Some(scan)) if !scan.uid.trim().is_empty() => {
                crate::log_info!("card {} scanned after {} polls", scan.uid, attempt);
                return ScanOutcome::Scanned(scan);
            }
            Ok(_) => {}
            Err(e) => crate::log_warn!("scan poll {} failed: {}", attempt, e),
        }
        if attempt < max_attempts {
            tokio::time::sleep(interval).await;
        }
    }
    crate::log_info!("no card scanned after {} polls", max_attempts);
    ScanOutcome::TimedOut
}
