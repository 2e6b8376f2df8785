//! Stress worker state machine
//!
//! Each worker loops `open -> identity -> sleep -> identity -> close` until the
//! shared token is cancelled. Every backend call is raced against the token
//! and bounded by the call timeout, so a stuck server cannot hold a worker
//! past the deadline.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::session::{ProbeSession, SessionSource};
use crate::error::{HarnessError, Result};

/// Worker lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Connecting,
    QueryingBefore,
    Sleeping,
    QueryingAfter,
    Closing,
    Done,
}

/// Per-worker uniform wait generator
pub struct WaitSampler {
    rng: StdRng,
    min_ms: u64,
    max_ms: u64,
}

impl WaitSampler {
    /// Seeded generators are reproducible; unseeded ones draw from entropy
    pub fn new(min: Duration, max: Duration, seed: Option<u64>) -> Self {
        let (min, max) = if min <= max { (min, max) } else { (max, min) };
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            rng,
            min_ms: min.as_millis() as u64,
            max_ms: max.as_millis() as u64,
        }
    }

    /// Next wait, uniform in `[min, max]` at millisecond resolution
    pub fn next_wait(&mut self) -> Duration {
        Duration::from_millis(self.rng.gen_range(self.min_ms..=self.max_ms))
    }
}

/// Race `fut` against the token and the call timeout
pub async fn bounded<T, F>(
    token: &CancellationToken,
    limit: Duration,
    operation: &'static str,
    fut: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(HarnessError::Cancelled),
        outcome = tokio::time::timeout(limit, fut) => match outcome {
            Ok(result) => result,
            Err(_) => Err(HarnessError::Timeout { operation, limit }),
        },
    }
}

/// Outcome of one worker
#[derive(Debug)]
pub struct WorkerReport {
    pub worker_id: usize,
    /// Completed open-to-close rounds
    pub rounds: u64,
    /// Identity queries that returned no row
    pub missing_identities: u64,
    /// State the worker was in when it failed
    pub failed_state: Option<WorkerState>,
    /// Failure other than deadline cancellation
    pub error: Option<HarnessError>,
}

impl WorkerReport {
    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }
}

/// One long-lived stress worker
pub struct StressWorker {
    id: usize,
    source: Arc<dyn SessionSource>,
    token: CancellationToken,
    sampler: WaitSampler,
    call_timeout: Duration,
    state: WorkerState,
    session: Option<Box<dyn ProbeSession>>,
    rounds: u64,
    missing_identities: u64,
}

impl StressWorker {
    pub fn new(
        id: usize,
        source: Arc<dyn SessionSource>,
        token: CancellationToken,
        sampler: WaitSampler,
        call_timeout: Duration,
    ) -> Self {
        Self {
            id,
            source,
            token,
            sampler,
            call_timeout,
            state: WorkerState::Idle,
            session: None,
            rounds: 0,
            missing_identities: 0,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// 1-based number of the round in progress
    pub fn current_round(&self) -> u64 {
        self.rounds + 1
    }

    /// Loop until the token is cancelled or a call fails
    ///
    /// Any session still open on exit is closed before the report is built.
    pub async fn run(mut self) -> WorkerReport {
        let outcome = self.run_rounds().await;
        self.close_leftover_session().await;

        let worker_id = self.id;
        let (failed_state, error) = match outcome {
            Ok(()) => (None, None),
            Err(e) if e.is_cancellation() => {
                debug!(worker_id, state = ?self.state, "worker cancelled by deadline");
                (None, None)
            }
            Err(e) => {
                error!(worker_id, state = ?self.state, error = %e, details = ?e, "worker failed");
                (Some(self.state), Some(e))
            }
        };

        info!(worker_id, rounds = self.rounds, "worker finished");
        self.state = WorkerState::Done;

        WorkerReport {
            worker_id,
            rounds: self.rounds,
            missing_identities: self.missing_identities,
            failed_state,
            error,
        }
    }

    async fn run_rounds(&mut self) -> Result<()> {
        while self.state != WorkerState::Done {
            let next = self.step().await?;
            self.state = next;
        }
        Ok(())
    }

    /// Perform the current state's action and return the next state
    pub async fn step(&mut self) -> Result<WorkerState> {
        let worker_id = self.id;
        let round = self.current_round();
        let state = self.state;

        let next = match state {
            WorkerState::Idle => {
                if self.token.is_cancelled() {
                    WorkerState::Done
                } else {
                    WorkerState::Connecting
                }
            }
            WorkerState::Connecting => {
                info!(worker_id, round, "opening connection");
                let source = Arc::clone(&self.source);
                let session = bounded(&self.token, self.call_timeout, "connect", source.open()).await?;
                self.session = Some(session);
                WorkerState::QueryingBefore
            }
            WorkerState::QueryingBefore => {
                self.probe("before wait").await?;
                WorkerState::Sleeping
            }
            WorkerState::Sleeping => {
                let wait = self.sampler.next_wait();
                info!(worker_id, round, wait_ms = wait.as_millis() as u64, "waiting");
                tokio::select! {
                    _ = self.token.cancelled() => {
                        info!(worker_id, round, "wait cancelled by deadline");
                        WorkerState::Done
                    }
                    _ = tokio::time::sleep(wait) => WorkerState::QueryingAfter,
                }
            }
            WorkerState::QueryingAfter => {
                self.probe("after wait").await?;
                WorkerState::Closing
            }
            WorkerState::Closing => {
                info!(worker_id, round, "closing connection");
                if let Some(session) = self.session.take() {
                    let limit = self.call_timeout;
                    tokio::time::timeout(limit, session.close())
                        .await
                        .map_err(|_| HarnessError::Timeout {
                            operation: "close",
                            limit,
                        })??;
                }
                self.rounds += 1;
                if self.token.is_cancelled() {
                    WorkerState::Done
                } else {
                    WorkerState::Idle
                }
            }
            WorkerState::Done => WorkerState::Done,
        };

        Ok(next)
    }

    async fn probe(&mut self, phase: &'static str) -> Result<()> {
        let worker_id = self.id;
        let round = self.current_round();
        let Some(session) = self.session.as_mut() else {
            warn!(worker_id, round, phase, "no open session to probe");
            return Ok(());
        };

        let identity = bounded(
            &self.token,
            self.call_timeout,
            "identity query",
            session.identity(),
        )
        .await?;

        match identity {
            Some(identity) => info!(worker_id, round, phase, session = %identity, "session id"),
            None => {
                self.missing_identities += 1;
                warn!(worker_id, round, phase, "could not retrieve session information");
            }
        }
        Ok(())
    }

    async fn close_leftover_session(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        let worker_id = self.id;
        debug!(worker_id, state = ?self.state, "closing session on exit");
        match tokio::time::timeout(self.call_timeout, session.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(worker_id, error = %e, "failed to close session"),
            Err(_) => warn!(worker_id, "timed out closing session"),
        }
    }
}
