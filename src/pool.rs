//! Bounded pool of concurrently running attempts.
//!
//! A `tokio::sync::Semaphore` caps how many attempts are in flight. Acquiring
//! a slot is the backpressure point: callers wait instead of queueing work.
//! Finished attempts are recorded into the [`StatsAggregator`] and written to
//! the [`AttemptLog`]; nothing is returned to the dispatcher.

use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{error, warn};

use crate::attempt_log::AttemptLog;
use crate::backend::AttemptOutcome;
use crate::selector::AttemptParameters;
use crate::stats::StatsAggregator;

/// Largest accepted worker limit: `drain` takes every permit in one
/// `acquire_many(u32)` call and the semaphore caps its own permit count.
pub const MAX_WORKERS: usize = if Semaphore::MAX_PERMITS < u32::MAX as usize {
    Semaphore::MAX_PERMITS
} else {
    u32::MAX as usize
};

/// One unit of the concurrency budget, held for the life of an attempt.
#[derive(Debug)]
pub struct WorkerSlot {
    _permit: OwnedSemaphorePermit,
}

pub struct WorkerPool {
    limit: usize,
    permits: Arc<Semaphore>,
    stats: Arc<StatsAggregator>,
    log: Arc<AttemptLog>,
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    dispatched: AtomicU64,
}

impl WorkerPool {
    /// Create a pool allowing `limit` concurrent attempts (at least one).
    pub fn new(limit: usize, stats: Arc<StatsAggregator>, log: Arc<AttemptLog>) -> Self {
        let limit = limit.max(1);
        Self {
            limit,
            permits: Arc::new(Semaphore::new(limit)),
            stats,
            log,
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
            dispatched: AtomicU64::new(0),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn stats(&self) -> &Arc<StatsAggregator> {
        &self.stats
    }

    /// Wait for a free slot. Cancel-safe: dropping the future gives nothing up.
    pub async fn acquire(&self) -> Result<WorkerSlot> {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .context("worker pool closed")?;
        Ok(WorkerSlot { _permit: permit })
    }

    /// Run `attempt` on its own task, holding `slot` until it is recorded.
    ///
    /// A panic inside `attempt` is contained and recorded as a failure.
    pub fn dispatch<F>(&self, slot: WorkerSlot, params: AttemptParameters, attempt: F)
    where
        F: Future<Output = AttemptOutcome> + Send + 'static,
    {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        let stats = self.stats.clone();
        let log = self.log.clone();
        let in_flight = self.in_flight.clone();

        tokio::spawn(async move {
            let start = Instant::now();
            let outcome = match tokio::spawn(attempt).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    let reason = if e.is_panic() {
                        "attempt panicked"
                    } else {
                        "attempt cancelled"
                    };
                    error!(identity = %params.identity, error = %e, "{}", reason);
                    AttemptOutcome::failure(start.elapsed(), reason)
                }
            };

            stats.record(&outcome).await;
            if let Err(e) = log.log(&params, &outcome).await {
                warn!(error = %e, "failed to write attempt line");
            }
            in_flight.fetch_sub(1, Ordering::SeqCst);
            drop(slot);
        });
    }

    /// Acquire a slot and dispatch in one step.
    pub async fn submit<F>(&self, params: AttemptParameters, attempt: F) -> Result<()>
    where
        F: Future<Output = AttemptOutcome> + Send + 'static,
    {
        let slot = self.acquire().await?;
        self.dispatch(slot, params, attempt);
        Ok(())
    }

    /// Wait until every dispatched attempt has been recorded.
    pub async fn drain(&self) -> Result<()> {
        let all = u32::try_from(self.limit).context("worker limit too large")?;
        let _permits = self
            .permits
            .acquire_many(all)
            .await
            .context("worker pool closed")?;
        Ok(())
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of attempts observed in flight at once.
    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn dispatched(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn params(identity: &str) -> AttemptParameters {
        AttemptParameters {
            identity: identity.to_string(),
            secret: String::new(),
            hardware_id: None,
        }
    }

    fn make_pool(limit: usize) -> (WorkerPool, Arc<StatsAggregator>) {
        let stats = Arc::new(StatsAggregator::new());
        let log = Arc::new(AttemptLog::from_writer(Box::new(tokio::io::sink())));
        (WorkerPool::new(limit, stats.clone(), log), stats)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_never_exceeds_limit() {
        for limit in [1usize, 2, 5] {
            let (pool, stats) = make_pool(limit);
            let active = Arc::new(AtomicUsize::new(0));
            let max_seen = Arc::new(AtomicUsize::new(0));

            for i in 0..40 {
                let active = active.clone();
                let max_seen = max_seen.clone();
                pool.submit(params(&format!("u{}", i)), async move {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    max_seen.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(2)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                    AttemptOutcome::success(Duration::from_millis(2))
                })
                .await
                .unwrap();
            }
            pool.drain().await.unwrap();

            assert!(max_seen.load(Ordering::SeqCst) <= limit);
            assert!(pool.peak_in_flight() <= limit);
            assert_eq!(pool.in_flight(), 0);
            assert_eq!(pool.dispatched(), 40);
            assert_eq!(stats.snapshot().await.requests_started, 40);
        }
    }

    async fn explode() -> AttemptOutcome {
        panic!("backend exploded")
    }

    #[tokio::test]
    async fn test_panicking_attempt_is_recorded_as_failure() {
        let (pool, stats) = make_pool(2);
        pool.submit(params("boom"), explode()).await.unwrap();
        pool.submit(params("fine"), async {
            AttemptOutcome::success(Duration::from_millis(1))
        })
        .await
        .unwrap();
        pool.drain().await.unwrap();

        let snap = stats.snapshot().await;
        assert_eq!(snap.requests_started, 2);
        assert_eq!(snap.successes, 1);
        assert_eq!(snap.failures, 1);
    }

    #[tokio::test]
    async fn test_acquire_blocks_at_capacity() {
        let (pool, _stats) = make_pool(1);
        let held = pool.acquire().await.unwrap();
        let waiting = tokio::time::timeout(Duration::from_millis(20), pool.acquire()).await;
        assert!(waiting.is_err(), "second slot granted while first is held");
        drop(held);
        assert!(tokio::time::timeout(Duration::from_millis(200), pool.acquire())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_drain_waits_for_in_flight() {
        let (pool, stats) = make_pool(3);
        for i in 0..3 {
            pool.submit(params(&format!("slow{}", i)), async {
                tokio::time::sleep(Duration::from_millis(30)).await;
                AttemptOutcome::success(Duration::from_millis(30))
            })
            .await
            .unwrap();
        }
        pool.drain().await.unwrap();
        assert_eq!(stats.snapshot().await.requests_started, 3);
    }

    #[test]
    fn test_zero_limit_is_clamped() {
        let (pool, _) = make_pool(0);
        assert_eq!(pool.limit(), 1);
    }
}
