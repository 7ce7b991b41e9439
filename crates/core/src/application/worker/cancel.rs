// Cooperative cancellation token (one per job)

use tokio::sync::watch;

/// Cancellation signal observed by workers
#[derive(Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    /// Token that is never cancelled (direct container control)
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    /// Check if cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once cancellation is requested; pends forever if it never is
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                // Sender gone without cancelling
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Owner side of a job's cancellation signal
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// Signal cancellation to every token of this job
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn token(&self) -> CancelToken {
        CancelToken {
            rx: self.tx.subscribe(),
        }
    }
}

/// Create a cancellation channel
pub fn cancel_channel() -> (CancelHandle, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelToken { rx })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_pending, assert_ready, task};

    #[test]
    fn test_cancel_wakes_waiters() {
        let (handle, token) = cancel_channel();
        let mut waiter = task::spawn(token.cancelled());

        assert_pending!(waiter.poll());
        assert!(!token.is_cancelled());

        handle.cancel();
        assert!(waiter.is_woken());
        assert_ready!(waiter.poll());
        assert!(token.is_cancelled());
        assert!(handle.token().is_cancelled());
    }

    #[test]
    fn test_never_token_stays_pending() {
        let token = CancelToken::never();
        let mut waiter = task::spawn(token.cancelled());

        assert_pending!(waiter.poll());
        assert!(!token.is_cancelled());
    }
}
