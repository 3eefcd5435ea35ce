use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::AbortHandle;

/// A pending proactive refresh, bound to one token pair generation.
///
/// Dropping the handle cancels the task, so replacing the manager's timer
/// slot is always cancel-then-arm.
#[derive(Debug)]
pub(crate) struct ScheduledRefresh {
    generation: u64,
    due_at: DateTime<Utc>,
    handle: Option<AbortHandle>,
}

impl ScheduledRefresh {
    /// Run `task` after `delay`. Must be called from within a tokio runtime.
    pub(crate) fn spawn<F>(generation: u64, due_at: DateTime<Utc>, delay: Duration, task: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            task.await;
        })
        .abort_handle();

        Self {
            generation,
            due_at,
            handle: Some(handle),
        }
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn due_at(&self) -> DateTime<Utc> {
        self.due_at
    }

    /// Release the handle without aborting. Used by the timer task itself
    /// once it has fired, so it does not cancel the refresh it is running.
    pub(crate) fn disarm(mut self) {
        self.handle = None;
    }
}

impl Drop for ScheduledRefresh {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting_timer(counter: &Arc<AtomicUsize>, delay_secs: u64) -> ScheduledRefresh {
        let counter = counter.clone();
        ScheduledRefresh::spawn(1, Utc::now(), Duration::from_secs(delay_secs), async move {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_after_delay() {
        let counter = Arc::new(AtomicUsize::new(0));
        let _timer = counting_timer(&counter, 10);

        tokio::time::sleep(Duration::from_secs(9)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels() {
        let counter = Arc::new(AtomicUsize::new(0));
        let timer = counting_timer(&counter, 10);
        drop(timer);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disarm_keeps_task_running() {
        let counter = Arc::new(AtomicUsize::new(0));
        counting_timer(&counter, 10).disarm();

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
