//! Cooperative shutdown signal with interruptible pauses.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::debug;

/// How a pause ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseOutcome {
    /// The full duration elapsed.
    Elapsed,
    /// Shutdown was requested before the duration elapsed.
    Interrupted,
}

/// Cloneable shutdown handle shared by the process and its workers.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    triggered: Arc<AtomicBool>,
    stop_tx: broadcast::Sender<()>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (stop_tx, _) = broadcast::channel::<()>(1);
        Self {
            triggered: Arc::new(AtomicBool::new(false)),
            stop_tx,
        }
    }

    /// Request shutdown and release every pending pause.
    pub fn trigger(&self) {
        if !self.triggered.swap(true, Ordering::SeqCst) {
            debug!("Shutdown requested");
        }
        let _ = self.stop_tx.send(());
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    /// Sleep for `duration` unless shutdown is requested first.
    ///
    /// A zero duration always elapses. The receiver is subscribed before the
    /// flag is checked so a trigger between the two is still observed.
    pub async fn pause(&self, duration: Duration) -> PauseOutcome {
        if duration.is_zero() {
            return PauseOutcome::Elapsed;
        }
        let mut stop_rx = self.stop_tx.subscribe();
        if self.is_triggered() {
            return PauseOutcome::Interrupted;
        }

        tokio::select! {
            _ = tokio::time::sleep(duration) => PauseOutcome::Elapsed,
            _ = stop_rx.recv() => PauseOutcome::Interrupted,
        }
    }

    /// Wait until shutdown is requested.
    pub async fn wait(&self) {
        let mut stop_rx = self.stop_tx.subscribe();
        if self.is_triggered() {
            return;
        }
        let _ = stop_rx.recv().await;
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}
