//! Benchmark support utilities
//!
//! Timed repetition of a single operation, summary statistics and the
//! plain-text histogram report.

mod metrics;
mod report;
mod runner;

pub use metrics::{BenchmarkResult, Histogram, BUCKET_WIDTH_MS, BYTES_PER_MIB};
pub use report::render_result;
pub use runner::{BenchmarkRunner, FailurePolicy};
