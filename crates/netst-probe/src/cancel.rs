//! Cooperative cancellation shared by scheduler runs and discovery sessions

use tokio::sync::watch;

/// Owner side: flips every linked [`CancelToken`] to cancelled
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

/// Observer side, cheap to clone
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

/// Create a linked handle/token pair
pub fn cancel_pair() -> (CancelHandle, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelToken { rx })
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn token(&self) -> CancelToken {
        CancelToken {
            rx: self.tx.subscribe(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

impl CancelToken {
    /// A token that is never cancelled
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancelled; pends forever if the handle is gone
    pub async fn cancelled(&mut self) {
        if self.rx.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_cancel_wakes_all_tokens() {
        let (handle, mut token) = cancel_pair();
        let mut other = handle.token();
        assert!(!token.is_cancelled());

        handle.cancel();
        token.cancelled().await;
        other.cancelled().await;
        assert!(handle.is_cancelled());
        assert!(other.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_token_pends() {
        let mut token = CancelToken::never();
        let waited = tokio::time::timeout(Duration::from_secs(60), token.cancelled()).await;
        assert!(waited.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_handle_is_not_cancellation() {
        let (handle, mut token) = cancel_pair();
        drop(handle);
        let waited = tokio::time::timeout(Duration::from_secs(1), token.cancelled()).await;
        assert!(waited.is_err());
        assert!(!token.is_cancelled());
    }
}
