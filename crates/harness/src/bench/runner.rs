//! Benchmark runner
//!
//! Runs one operation a fixed number of times, timing each invocation, then
//! probes the table size once and hands back an immutable result.

use std::fmt::Display;
use std::future::Future;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, error, info};

use super::metrics::BenchmarkResult;

/// What to do with the elapsed time of an iteration whose operation failed
///
/// The default keeps failed iterations out of the timings. Use `Include` to
/// time every iteration regardless of outcome, which is what older
/// harnesses report, when comparing numbers against them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Count the failure but keep its time out of the statistics
    #[default]
    Exclude,
    /// Record the time like any successful iteration
    Include,
}

/// Times repeated executions of a single operation
#[derive(Debug, Clone)]
pub struct BenchmarkRunner {
    iterations: usize,
    failure_policy: FailurePolicy,
}

impl BenchmarkRunner {
    pub fn new(iterations: usize) -> Self {
        Self {
            iterations,
            failure_policy: FailurePolicy::default(),
        }
    }

    /// Set the failed-iteration policy
    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Run `operation` once per iteration and probe the table size afterwards
    ///
    /// A failing operation never aborts the loop: the error is logged and the
    /// iteration is handled per the configured [`FailurePolicy`].
    pub async fn run<Op, OpFut, T, E, Probe, ProbeFut>(
        &self,
        name: &str,
        mut operation: Op,
        size_probe: Probe,
    ) -> BenchmarkResult
    where
        Op: FnMut() -> OpFut,
        OpFut: Future<Output = Result<T, E>>,
        E: Display,
        Probe: FnOnce() -> ProbeFut,
        ProbeFut: Future<Output = u64>,
    {
        info!(operation = name, iterations = self.iterations, "Running benchmark");

        let mut samples = Vec::with_capacity(self.iterations);
        let mut failures = 0;

        for iteration in 0..self.iterations {
            let start = Instant::now();
            let outcome = operation().await;
            let elapsed_ms = start.elapsed().as_millis() as u64;

            match outcome {
                Ok(_) => {
                    debug!(operation = name, iteration, elapsed_ms, "iteration complete");
                    samples.push(elapsed_ms);
                }
                Err(e) => {
                    failures += 1;
                    error!(operation = name, iteration, elapsed_ms, error = %e, "iteration failed");
                    if self.failure_policy == FailurePolicy::Include {
                        samples.push(elapsed_ms);
                    }
                }
            }
        }

        let table_size = size_probe().await;
        BenchmarkResult::new(name, samples, failures, table_size)
    }
}
