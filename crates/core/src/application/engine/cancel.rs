// Export Cancellation Token

use std::sync::Arc;
use tokio::sync::watch;

/// Cancellation signal for one export run.
///
/// Cancellation is cooperative: the engine checks between chunks, never
/// mid-chunk, so the in-flight fetch/encode/persist always completes.
#[derive(Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    /// Check if cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait for the cancel signal.
    ///
    /// Pends forever once every sender is gone without having cancelled,
    /// so pacing sleeps are not cut short by a dropped handle.
    pub async fn wait(&mut self) {
        if self.rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Cancel handle; cloneable so a registry can keep one per running export
#[derive(Clone)]
pub struct CancelSender {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelSender {
    /// Request cooperative cancellation
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

/// Create a cancellation channel
pub fn cancel_channel() -> (CancelSender, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelSender { tx: Arc::new(tx) }, CancelToken { rx })
}
