//! Completion barrier -- counts in-flight pipelines and wakes the dispatcher at zero.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Notify;

/// Counter of registered participants that have not finished yet
#[derive(Debug, Default)]
pub(crate) struct CompletionBarrier {
    pending: AtomicUsize,
    notify: Notify,
}

impl CompletionBarrier {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register one participant; it finishes when the guard is dropped
    pub(crate) fn register(self: &Arc<Self>) -> BarrierGuard {
        self.pending.fetch_add(1, Ordering::AcqRel);
        BarrierGuard {
            barrier: Arc::clone(self),
        }
    }

    pub(crate) fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Wait until every registered participant has finished
    pub(crate) async fn wait(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // register interest before checking, so a drop in between isn't lost
            notified.as_mut().enable();
            if self.pending() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Decrements the barrier exactly once, however the pipeline ends
#[derive(Debug)]
pub(crate) struct BarrierGuard {
    barrier: Arc<CompletionBarrier>,
}

impl Drop for BarrierGuard {
    fn drop(&mut self) {
        if self.barrier.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.barrier.notify.notify_waiters();
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn wait_returns_immediately_with_nothing_registered() {
        let barrier = CompletionBarrier::new();
        tokio::time::timeout(Duration::from_secs(1), barrier.wait())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn wait_blocks_until_every_guard_drops() {
        let barrier = CompletionBarrier::new();
        let guards: Vec<_> = (0..3).map(|_| barrier.register()).collect();
        assert_eq!(barrier.pending(), 3);

        let waiter = {
            let barrier = Arc::clone(&barrier);
            tokio::spawn(async move { barrier.wait().await })
        };

        for guard in guards {
            tokio::time::sleep(Duration::from_millis(5)).await;
            assert!(!waiter.is_finished());
            drop(guard);
        }

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(barrier.pending(), 0);
    }

    #[tokio::test]
    async fn guard_in_panicking_task_still_releases() {
        let barrier = CompletionBarrier::new();
        let guard = barrier.register();
        let handle = tokio::spawn(async move {
            let _guard = guard;
            panic!("pipeline blew up");
        });
        assert!(handle.await.is_err());

        tokio::time::timeout(Duration::from_secs(1), barrier.wait())
            .await
            .unwrap();
    }
}
