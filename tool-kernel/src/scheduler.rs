//! Concurrency limit for batched tool calls.

use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Semaphore;
use tokio::task::JoinError;

/// How many calls of one batch may run at the same time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    limit: NonZeroUsize,
}

impl SchedulerConfig {
    /// Calls allowed in flight when nothing is configured.
    pub const DEFAULT_LIMIT: usize = 3;

    /// Uses `limit` calls in flight, treating zero as one.
    #[must_use]
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit: NonZeroUsize::new(limit).unwrap_or(NonZeroUsize::MIN),
        }
    }

    /// Runs calls strictly one after another.
    #[must_use]
    pub const fn sequential() -> Self {
        Self {
            limit: NonZeroUsize::MIN,
        }
    }

    /// Configured limit.
    #[must_use]
    pub const fn limit(self) -> NonZeroUsize {
        self.limit
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::with_limit(Self::DEFAULT_LIMIT)
    }
}

/// Spawns each job of a batch on the runtime while holding at most
/// `limit` permits, and hands the outputs back in submission order.
#[derive(Debug, Clone)]
pub struct TaskScheduler {
    permits: Arc<Semaphore>,
    config: SchedulerConfig,
}

impl TaskScheduler {
    /// Scheduler sized by `config`.
    #[must_use]
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(config.limit().get())),
            config,
        }
    }

    /// Configuration this scheduler was built with.
    #[must_use]
    pub const fn config(&self) -> SchedulerConfig {
        self.config
    }

    /// Runs every job and returns one entry per job, in the order given.
    ///
    /// A job that panics yields its [`JoinError`] without disturbing the
    /// others. Permits are shared across concurrent batches, so the limit
    /// holds for the scheduler as a whole.
    pub async fn run_ordered<I, F, T>(&self, jobs: I) -> Vec<Result<T, JoinError>>
    where
        I: IntoIterator<Item = F>,
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let handles: Vec<_> = jobs
            .into_iter()
            .map(|job| {
                let permits = Arc::clone(&self.permits);
                tokio::spawn(async move {
                    // The semaphore is never closed, so acquiring only waits.
                    let _permit = permits.acquire_owned().await.ok();
                    job.await
                })
            })
            .collect();
        join_all(handles).await
    }
}

impl Default for TaskScheduler {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn never_exceeds_the_limit() {
        let scheduler = TaskScheduler::new(SchedulerConfig::with_limit(2));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let jobs = (0..6).map(|index| {
            let in_flight = Arc::clone(&in_flight);
            let peak = Arc::clone(&peak);
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                index
            }
        });
        let outputs: Vec<usize> = scheduler
            .run_ordered(jobs)
            .await
            .into_iter()
            .map(Result::unwrap)
            .collect();

        assert_eq!(outputs, [0, 1, 2, 3, 4, 5]);
        assert_eq!(peak.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_early_jobs_keep_their_slot() {
        let scheduler = TaskScheduler::default();
        let jobs = [30_u64, 10, 20].map(|millis| async move {
            tokio::time::sleep(Duration::from_millis(millis)).await;
            millis
        });
        let outputs: Vec<u64> = scheduler
            .run_ordered(jobs)
            .await
            .into_iter()
            .map(Result::unwrap)
            .collect();
        assert_eq!(outputs, [30, 10, 20]);
    }

    #[tokio::test]
    async fn a_panicking_job_is_reported_alone() {
        let scheduler = TaskScheduler::new(SchedulerConfig::sequential());
        let jobs: Vec<std::pin::Pin<Box<dyn Future<Output = u8> + Send>>> = vec![
            Box::pin(async { 1 }),
            Box::pin(async { panic!("job failed") }),
            Box::pin(async { 3 }),
        ];
        let outputs = scheduler.run_ordered(jobs).await;
        assert_eq!(outputs[0].as_ref().ok(), Some(&1));
        assert!(outputs[1].as_ref().is_err_and(JoinError::is_panic));
        assert_eq!(outputs[2].as_ref().ok(), Some(&3));
    }

    #[test]
    fn zero_means_sequential() {
        assert_eq!(SchedulerConfig::with_limit(0), SchedulerConfig::sequential());
        assert_eq!(SchedulerConfig::default().limit().get(), 3);
    }
}
