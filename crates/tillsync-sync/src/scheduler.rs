//! Cancellable timer for deferred queue passes.
//!
//! At most one deferred task is pending at a time. Scheduling an earlier
//! deadline replaces the pending one; a later deadline is dropped since the
//! pending task will pick the work up anyway. Every timer hangs off a root
//! [`CancellationToken`], so shutdown stops all of them at once.

use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

struct Pending {
    deadline: Instant,
    token: CancellationToken,
}

/// Single-slot cancellable scheduler.
pub struct RetryScheduler {
    root: CancellationToken,
    pending: Mutex<Option<Pending>>,
}

impl RetryScheduler {
    pub fn new() -> Self {
        Self {
            root: CancellationToken::new(),
            pending: Mutex::new(None),
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<Pending>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Run `task` after `delay` unless cancelled first.
    ///
    /// Returns `false` if the task was dropped, either because an earlier
    /// task is already pending or because the scheduler was shut down.
    /// Must be called from within a tokio runtime.
    pub fn schedule<F>(&self, delay: Duration, task: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.root.is_cancelled() {
            return false;
        }

        let deadline = Instant::now() + delay;
        let mut slot = self.slot();

        if let Some(pending) = slot.as_ref() {
            if !pending.token.is_cancelled() {
                if pending.deadline <= deadline {
                    return false;
                }
                pending.token.cancel();
            }
        }

        let token = self.root.child_token();
        *slot = Some(Pending {
            deadline,
            token: token.clone(),
        });
        drop(slot);

        tracing::debug!(delay_ms = delay.as_millis() as u64, "queue pass scheduled");

        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep_until(deadline) => {
                    // Free the slot before running so the task can reschedule.
                    token.cancel();
                    task.await;
                }
            }
        });
        true
    }

    /// Whether a task is waiting to run.
    pub fn has_pending(&self) -> bool {
        self.slot()
            .as_ref()
            .map_or(false, |p| !p.token.is_cancelled())
    }

    /// Cancel the pending task, if any. Later calls to `schedule` still work.
    pub fn cancel_pending(&self) {
        if let Some(pending) = self.slot().take() {
            if !pending.token.is_cancelled() {
                tracing::debug!("pending queue pass cancelled");
            }
            pending.token.cancel();
        }
    }

    /// Cancel everything, permanently.
    pub fn shutdown(&self) {
        self.root.cancel();
        self.slot().take();
    }

    pub fn is_shut_down(&self) -> bool {
        self.root.is_cancelled()
    }
}

impl Default for RetryScheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counter() -> (Arc<AtomicUsize>, impl Fn() -> std::pin::Pin<Box<dyn Future<Output = ()> + Send>>) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let make = move || {
            let c = Arc::clone(&c);
            Box::pin(async move {
                c.fetch_add(1, Ordering::SeqCst);
            }) as std::pin::Pin<Box<dyn Future<Output = ()> + Send>>
        };
        (count, make)
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_after_delay() {
        let scheduler = RetryScheduler::new();
        let (count, make) = counter();

        assert!(scheduler.schedule(Duration::from_secs(2), make()));
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!scheduler.has_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_earlier_deadline_wins() {
        let scheduler = RetryScheduler::new();
        let (count, make) = counter();

        assert!(scheduler.schedule(Duration::from_secs(10), make()));
        assert!(scheduler.schedule(Duration::from_secs(1), make()));
        assert!(!scheduler.schedule(Duration::from_secs(5), make()));

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_pending() {
        let scheduler = RetryScheduler::new();
        let (count, make) = counter();

        scheduler.schedule(Duration::from_secs(1), make());
        scheduler.cancel_pending();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        // Still usable afterwards.
        assert!(scheduler.schedule(Duration::from_secs(1), make()));
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_is_permanent() {
        let scheduler = RetryScheduler::new();
        let (count, make) = counter();

        scheduler.schedule(Duration::from_secs(1), make());
        scheduler.shutdown();
        assert!(!scheduler.schedule(Duration::from_secs(1), make()));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(scheduler.is_shut_down());
    }
}
