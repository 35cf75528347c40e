//! Run-wide attempt statistics.
//!
//! All counters and the latency sample live behind one `tokio::sync::Mutex`
//! so every `record` call commits as a single unit: a reader never sees a
//! success counted without its request and duration.

use std::fmt;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::backend::AttemptOutcome;

#[derive(Debug, Default)]
struct RunStats {
    requests_started: u64,
    successes: u64,
    failures: u64,
    durations: Vec<f64>,
}

/// Thread-safe aggregator shared by every in-flight attempt.
#[derive(Debug)]
pub struct StatsAggregator {
    run_id: Uuid,
    started_at: DateTime<Utc>,
    start: Instant,
    inner: Mutex<RunStats>,
}

impl Default for StatsAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsAggregator {
    pub fn new() -> Self {
        Self::with_run_id(Uuid::new_v4())
    }

    pub fn with_run_id(run_id: Uuid) -> Self {
        Self {
            run_id,
            started_at: Utc::now(),
            start: Instant::now(),
            inner: Mutex::new(RunStats::default()),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Commit one finished attempt.
    pub async fn record(&self, outcome: &AttemptOutcome) {
        let mut stats = self.inner.lock().await;
        stats.requests_started += 1;
        if outcome.succeeded {
            stats.successes += 1;
        } else {
            stats.failures += 1;
        }
        stats.durations.push(outcome.duration.as_secs_f64());
    }

    pub async fn requests_started(&self) -> u64 {
        self.inner.lock().await.requests_started
    }

    /// Copy the counters and derive latency statistics from the full sample.
    pub async fn snapshot(&self) -> StatsSnapshot {
        let (requests_started, successes, failures, mut sample) = {
            let stats = self.inner.lock().await;
            (
                stats.requests_started,
                stats.successes,
                stats.failures,
                stats.durations.clone(),
            )
        };
        // Sorting happens outside the lock.
        sample.sort_by(|a, b| a.total_cmp(b));

        StatsSnapshot {
            run_id: self.run_id,
            started_at: self.started_at,
            elapsed_secs: self.start.elapsed().as_secs_f64(),
            requests_started,
            successes,
            failures,
            min_secs: sample.first().copied(),
            max_secs: sample.last().copied(),
            median_secs: median(&sample),
            mean_secs: mean(&sample),
        }
    }
}

/// Median of an ascending sample; even-sized samples average the middle pair.
fn median(sorted: &[f64]) -> Option<f64> {
    let n = sorted.len();
    if n == 0 {
        return None;
    }
    if n % 2 == 1 {
        Some(sorted[n / 2])
    } else {
        Some((sorted[n / 2 - 1] + sorted[n / 2]) / 2.0)
    }
}

fn mean(sample: &[f64]) -> Option<f64> {
    if sample.is_empty() {
        None
    } else {
        Some(sample.iter().sum::<f64>() / sample.len() as f64)
    }
}

/// Immutable view of the run statistics at one point in time.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub elapsed_secs: f64,
    pub requests_started: u64,
    pub successes: u64,
    pub failures: u64,
    pub min_secs: Option<f64>,
    pub max_secs: Option<f64>,
    pub median_secs: Option<f64>,
    pub mean_secs: Option<f64>,
}

impl StatsSnapshot {
    pub fn elapsed(&self) -> Duration {
        Duration::from_secs_f64(self.elapsed_secs)
    }

    /// Completed attempts per second of wall time.
    pub fn throughput(&self) -> f64 {
        if self.elapsed_secs > 0.0 {
            self.requests_started as f64 / self.elapsed_secs
        } else {
            0.0
        }
    }

    /// Human-readable end-of-run report.
    pub fn report(&self) -> String {
        self.to_string()
    }
}

fn secs(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.3} s", v),
        None => "n/a".to_string(),
    }
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== radload report ===")?;
        writeln!(f, "Run id:           {}", self.run_id)?;
        writeln!(f, "Started:          {}", self.started_at.to_rfc3339())?;
        writeln!(f, "Total time:       {:.3} s", self.elapsed_secs)?;
        writeln!(f, "Requests started: {}", self.requests_started)?;
        writeln!(f, "Successes:        {}", self.successes)?;
        writeln!(f, "Failures:         {}", self.failures)?;
        writeln!(f, "Throughput:       {:.2} req/s", self.throughput())?;
        writeln!(f, "Max duration:     {}", secs(self.max_secs))?;
        writeln!(f, "Min duration:     {}", secs(self.min_secs))?;
        write!(f, "Median duration:  {}", secs(self.median_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn outcome(ok: bool, ms: u64) -> AttemptOutcome {
        if ok {
            AttemptOutcome::success(Duration::from_millis(ms))
        } else {
            AttemptOutcome::failure(Duration::from_millis(ms), "rejected")
        }
    }

    #[tokio::test]
    async fn test_empty_snapshot() {
        let stats = StatsAggregator::new();
        let snap = stats.snapshot().await;
        assert_eq!(snap.requests_started, 0);
        assert!(snap.min_secs.is_none());
        assert!(snap.median_secs.is_none());
        assert!(snap.report().contains("Median duration:  n/a"));
    }

    #[tokio::test]
    async fn test_counts_and_derived_stats() {
        let stats = StatsAggregator::new();
        for (ok, ms) in [(true, 300), (false, 100), (true, 200), (true, 400)] {
            stats.record(&outcome(ok, ms)).await;
        }
        let snap = stats.snapshot().await;
        assert_eq!(snap.requests_started, 4);
        assert_eq!(snap.successes, 3);
        assert_eq!(snap.failures, 1);
        assert_eq!(snap.min_secs, Some(0.1));
        assert_eq!(snap.max_secs, Some(0.4));
        assert!((snap.median_secs.unwrap() - 0.25).abs() < 1e-9);
        assert!((snap.mean_secs.unwrap() - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_median_odd_and_even() {
        assert_eq!(median(&[1.0]), Some(1.0));
        assert_eq!(median(&[1.0, 2.0, 9.0]), Some(2.0));
        assert_eq!(median(&[1.0, 2.0, 4.0, 9.0]), Some(3.0));
        assert_eq!(median(&[]), None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_records_keep_invariant() {
        let stats = Arc::new(StatsAggregator::new());
        let mut handles = Vec::new();
        for task in 0..16u64 {
            let stats = stats.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..250u64 {
                    stats.record(&outcome((task + i) % 3 != 0, i % 7)).await;
                }
            }));
        }

        // Readers racing the writers must always observe a consistent view.
        let reader = {
            let stats = stats.clone();
            tokio::spawn(async move {
                for _ in 0..200 {
                    let snap = stats.snapshot().await;
                    assert_eq!(snap.successes + snap.failures, snap.requests_started);
                    tokio::task::yield_now().await;
                }
            })
        };

        for h in futures::future::join_all(handles).await {
            h.unwrap();
        }
        reader.await.unwrap();

        let snap = stats.snapshot().await;
        assert_eq!(snap.requests_started, 16 * 250);
        assert_eq!(snap.successes + snap.failures, snap.requests_started);
        let inner = stats.inner.lock().await;
        assert_eq!(inner.durations.len() as u64, snap.requests_started);
    }

    #[tokio::test]
    async fn test_report_lists_all_fields() {
        let stats = StatsAggregator::new();
        stats.record(&outcome(true, 1500)).await;
        let report = stats.snapshot().await.report();
        for needle in [
            "Total time:",
            "Requests started: 1",
            "Successes:        1",
            "Failures:         0",
            "Max duration:     1.500 s",
            "Min duration:     1.500 s",
            "Median duration:  1.500 s",
        ] {
            assert!(report.contains(needle), "missing {:?} in\n{}", needle, report);
        }
    }

    #[tokio::test]
    async fn test_snapshot_serializes_to_json() {
        let stats = StatsAggregator::new();
        stats.record(&outcome(false, 10)).await;
        let json = serde_json::to_value(stats.snapshot().await).unwrap();
        assert_eq!(json["failures"], 1);
        assert_eq!(json["run_id"], stats.run_id().to_string());
    }
}
