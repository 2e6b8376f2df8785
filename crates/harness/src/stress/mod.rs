//! Long-running connection stress test
//!
//! A fixed set of workers churn connections until a single shared
//! cancellation token fires. The token is cancelled by a deadline timer, or
//! by the caller (Ctrl-C in the binary). The test waits for every worker and
//! returns a per-worker report; cancellation is expected and never counts as
//! a failure.

mod session;
mod worker;

use std::sync::Arc;

use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::config::StressConfig;

pub use session::{ProbeSession, SessionIdentity, SessionSource};
pub use worker::{bounded, StressWorker, WaitSampler, WorkerReport, WorkerState};

/// Aggregated outcome of a stress run
#[derive(Debug, Default)]
pub struct StressReport {
    /// Reports of workers that ran to completion, ordered by worker id
    pub workers: Vec<WorkerReport>,
    /// Workers whose task panicked
    pub panicked: usize,
}

impl StressReport {
    /// Workers that stopped on an error other than cancellation
    pub fn failures(&self) -> impl Iterator<Item = &WorkerReport> {
        self.workers.iter().filter(|w| w.is_failure())
    }

    pub fn failure_count(&self) -> usize {
        self.failures().count() + self.panicked
    }

    pub fn total_rounds(&self) -> u64 {
        self.workers.iter().map(|w| w.rounds).sum()
    }

    pub fn missing_identities(&self) -> u64 {
        self.workers.iter().map(|w| w.missing_identities).sum()
    }
}

/// Stress test over any [`SessionSource`]
pub struct StressTest {
    source: Arc<dyn SessionSource>,
    config: StressConfig,
}

impl StressTest {
    pub fn new(source: Arc<dyn SessionSource>, config: StressConfig) -> Self {
        Self { source, config }
    }

    pub fn config(&self) -> &StressConfig {
        &self.config
    }

    /// Run until the configured duration elapses
    pub async fn run(&self) -> StressReport {
        self.run_with_token(CancellationToken::new()).await
    }

    /// Run until the configured duration elapses or `token` is cancelled
    #[instrument(skip_all, fields(workers = self.config.workers))]
    pub async fn run_with_token(&self, token: CancellationToken) -> StressReport {
        // Durations past the clock's range mean "until cancelled"
        let deadline = Instant::now().checked_add(self.config.run_duration);
        if deadline.is_none() {
            warn!(
                run_duration_secs = self.config.run_duration.as_secs(),
                "run duration exceeds the clock range, running until cancelled"
            );
        }
        info!(
            workers = self.config.workers,
            run_duration_secs = self.config.run_duration.as_secs(),
            "starting stress test"
        );

        let timer = {
            let token = token.clone();
            tokio::spawn(async move {
                let Some(deadline) = deadline else {
                    return;
                };
                tokio::select! {
                    _ = tokio::time::sleep_until(deadline) => {
                        info!("stress test deadline reached");
                        token.cancel();
                    }
                    _ = token.cancelled() => {}
                }
            })
        };

        let mut set = JoinSet::new();
        for worker_id in 0..self.config.workers {
            let sampler = WaitSampler::new(
                self.config.min_wait,
                self.config.max_wait,
                self.config
                    .seed
                    .map(|seed| seed.wrapping_add(worker_id as u64)),
            );
            let worker = StressWorker::new(
                worker_id,
                Arc::clone(&self.source),
                token.clone(),
                sampler,
                self.config.call_timeout,
            );
            set.spawn(worker.run());
            info!(worker_id, "started worker");
        }
        info!(workers = self.config.workers, "all workers started");

        let mut report = StressReport::default();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(worker) => report.workers.push(worker),
                Err(e) => {
                    error!(error = %e, "stress worker panicked");
                    report.panicked += 1;
                }
            }
        }
        timer.abort();

        report.workers.sort_by_key(|w| w.worker_id);
        for failed in report.failures() {
            if let Some(e) = &failed.error {
                error!(
                    worker_id = failed.worker_id,
                    state = ?failed.failed_state,
                    error = %e,
                    "stress worker failure"
                );
            }
        }

        info!(
            rounds = report.total_rounds(),
            missing_identities = report.missing_identities(),
            failures = report.failure_count(),
            "stress test finished"
        );
        report
    }
}
