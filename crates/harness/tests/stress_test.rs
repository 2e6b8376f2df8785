//! Stress test behaviour against an in-memory session source
//!
//! Runs on tokio's paused clock, so multi-second deadlines finish instantly.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use bulkbench_harness::config::StressConfig;
use bulkbench_harness::error::{HarnessError, Result};
use bulkbench_harness::stress::{
    ProbeSession, SessionIdentity, SessionSource, StressTest, WorkerState,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Behavior {
    /// Identity query returns a row
    Present,
    /// Identity query returns no row
    Missing,
    /// Identity query never completes
    Hang,
}

struct FakeSource {
    behavior: Behavior,
    fail_first_open: bool,
    open_attempts: AtomicUsize,
    opens: AtomicUsize,
    closes: Arc<AtomicUsize>,
}

impl FakeSource {
    fn new(behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            fail_first_open: false,
            open_attempts: AtomicUsize::new(0),
            opens: AtomicUsize::new(0),
            closes: Arc::new(AtomicUsize::new(0)),
        })
    }

    fn failing_first_open(behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            fail_first_open: true,
            open_attempts: AtomicUsize::new(0),
            opens: AtomicUsize::new(0),
            closes: Arc::new(AtomicUsize::new(0)),
        })
    }

    fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionSource for FakeSource {
    async fn open(&self) -> Result<Box<dyn ProbeSession>> {
        let attempt = self.open_attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_first_open && attempt == 0 {
            return Err(HarnessError::Database(sqlx::Error::PoolTimedOut));
        }
        let pid = 1000 + self.opens.fetch_add(1, Ordering::SeqCst) as i32;
        Ok(Box::new(FakeSession {
            pid,
            behavior: self.behavior,
            closes: Arc::clone(&self.closes),
        }))
    }
}

struct FakeSession {
    pid: i32,
    behavior: Behavior,
    closes: Arc<AtomicUsize>,
}

#[async_trait]
impl ProbeSession for FakeSession {
    async fn identity(&mut self) -> Result<Option<SessionIdentity>> {
        match self.behavior {
            Behavior::Present => Ok(Some(SessionIdentity {
                pid: self.pid,
                backend_start: None,
            })),
            Behavior::Missing => Ok(None),
            Behavior::Hang => std::future::pending().await,
        }
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn config(workers: usize, run_secs: u64) -> StressConfig {
    StressConfig::default()
        .with_workers(workers)
        .with_run_duration(Duration::from_secs(run_secs))
        .with_wait_range(Duration::from_secs(1), Duration::from_secs(2))
        .with_call_timeout(Duration::from_secs(5))
        .with_seed(7)
}

#[test_log::test(tokio::test(start_paused = true))]
async fn test_all_workers_finish_at_deadline() {
    let source = FakeSource::new(Behavior::Present);
    let test = StressTest::new(source.clone(), config(4, 10));

    let start = Instant::now();
    let report = test.run().await;
    let elapsed = start.elapsed();

    assert!(elapsed >= Duration::from_secs(10), "finished early: {elapsed:?}");
    assert!(elapsed < Duration::from_secs(11), "finished late: {elapsed:?}");

    assert_eq!(report.workers.len(), 4);
    assert_eq!(report.panicked, 0);
    assert_eq!(report.failure_count(), 0);
    assert_eq!(report.missing_identities(), 0);
    // Each round waits at most 2s, so 10s fits at least 4 full rounds
    assert!(report.total_rounds() >= 16, "rounds: {}", report.total_rounds());

    let ids: Vec<usize> = report.workers.iter().map(|w| w.worker_id).collect();
    assert_eq!(ids, vec![0, 1, 2, 3]);

    assert_eq!(source.opens(), source.closes());
}

#[test_log::test(tokio::test(start_paused = true))]
async fn test_missing_identity_is_logged_not_fatal() {
    let source = FakeSource::new(Behavior::Missing);
    let test = StressTest::new(source.clone(), config(2, 6));

    let report = test.run().await;

    assert_eq!(report.failure_count(), 0);
    assert!(report.total_rounds() > 0);
    // Two probes per completed round
    assert!(report.missing_identities() >= 2 * report.total_rounds());
    assert_eq!(source.opens(), source.closes());
}

#[test_log::test(tokio::test(start_paused = true))]
async fn test_hung_query_released_by_deadline() {
    let source = FakeSource::new(Behavior::Hang);
    let config = config(3, 8).with_call_timeout(Duration::from_secs(3600));
    let test = StressTest::new(source.clone(), config);

    let start = Instant::now();
    let report = test.run().await;
    let elapsed = start.elapsed();

    assert!(elapsed >= Duration::from_secs(8));
    assert!(elapsed < Duration::from_secs(9), "finished late: {elapsed:?}");

    // Cancellation is expected and never reported as a failure
    assert_eq!(report.failure_count(), 0);
    assert_eq!(report.total_rounds(), 0);
    assert!(report.workers.iter().all(|w| w.error.is_none()));

    // Sessions left open by the hung probe are closed on exit
    assert_eq!(source.opens(), 3);
    assert_eq!(source.closes(), 3);
}

#[test_log::test(tokio::test(start_paused = true))]
async fn test_call_timeout_fails_worker() {
    let source = FakeSource::new(Behavior::Hang);
    let config = config(2, 60).with_call_timeout(Duration::from_secs(1));
    let test = StressTest::new(source.clone(), config);

    let start = Instant::now();
    let report = test.run().await;

    // Workers fail long before the deadline
    assert!(start.elapsed() < Duration::from_secs(5));
    assert_eq!(report.failure_count(), 2);
    for worker in &report.workers {
        assert_eq!(worker.failed_state, Some(WorkerState::QueryingBefore));
        assert!(matches!(
            worker.error,
            Some(HarnessError::Timeout {
                operation: "identity query",
                ..
            })
        ));
    }
    assert_eq!(source.opens(), source.closes());
}

#[test_log::test(tokio::test(start_paused = true))]
async fn test_failing_worker_does_not_stop_others() {
    let source = FakeSource::failing_first_open(Behavior::Present);
    let test = StressTest::new(source.clone(), config(3, 10));

    let report = test.run().await;

    assert_eq!(report.workers.len(), 3);
    assert_eq!(report.failure_count(), 1);

    let failed: Vec<_> = report.failures().collect();
    assert_eq!(failed[0].failed_state, Some(WorkerState::Connecting));
    assert_eq!(failed[0].rounds, 0);
    assert!(matches!(failed[0].error, Some(HarnessError::Database(_))));

    let healthy_rounds: u64 = report
        .workers
        .iter()
        .filter(|w| w.error.is_none())
        .map(|w| w.rounds)
        .sum();
    assert!(healthy_rounds >= 8);
    assert_eq!(source.opens(), source.closes());
}

#[test_log::test(tokio::test(start_paused = true))]
async fn test_external_cancellation_stops_run() {
    let source = FakeSource::new(Behavior::Present);
    let test = StressTest::new(source.clone(), config(2, 3600));
    let token = CancellationToken::new();

    let canceller = {
        let token = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(3)).await;
            token.cancel();
        })
    };

    let start = Instant::now();
    let report = test.run_with_token(token).await;
    let elapsed = start.elapsed();
    canceller.await.unwrap();

    assert!(elapsed >= Duration::from_secs(3));
    assert!(elapsed < Duration::from_secs(4), "finished late: {elapsed:?}");
    assert_eq!(report.failure_count(), 0);
    assert_eq!(source.opens(), source.closes());
}

#[test_log::test(tokio::test(start_paused = true))]
async fn test_zero_duration_finishes_immediately() {
    let source = FakeSource::new(Behavior::Present);
    let test = StressTest::new(source.clone(), config(2, 0));

    let report = test.run().await;

    assert_eq!(report.workers.len(), 2);
    assert_eq!(report.failure_count(), 0);
    assert_eq!(report.total_rounds(), 0);
    assert_eq!(source.opens(), source.closes());
}

#[test_log::test(tokio::test(start_paused = true))]
async fn test_unbounded_duration_runs_until_cancelled() {
    let source = FakeSource::new(Behavior::Present);
    let config = config(2, 0).with_run_duration(Duration::from_secs(u64::MAX));
    let test = StressTest::new(source.clone(), config);
    let token = CancellationToken::new();

    let canceller = {
        let token = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            token.cancel();
        })
    };

    let start = Instant::now();
    let report = test.run_with_token(token).await;
    let elapsed = start.elapsed();
    canceller.await.unwrap();

    assert!(elapsed >= Duration::from_secs(5));
    assert!(elapsed < Duration::from_secs(6), "finished late: {elapsed:?}");
    assert_eq!(report.workers.len(), 2);
    assert_eq!(report.failure_count(), 0);
    assert!(report.total_rounds() > 0);
    assert_eq!(source.opens(), source.closes());
}
