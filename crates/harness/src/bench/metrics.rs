//! Metrics for a single benchmarked operation
//!
//! Elapsed-time samples, mean/max and fixed-width bucketing.

use std::collections::BTreeMap;

/// Width of one histogram bucket, in milliseconds
pub const BUCKET_WIDTH_MS: u64 = 10;

/// Divisor for reporting table size in MiB
pub const BYTES_PER_MIB: u64 = 1_048_576;

/// Outcome of all iterations of one operation
///
/// Built once by the runner after the last iteration and not mutated
/// afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BenchmarkResult {
    name: String,
    samples_ms: Vec<u64>,
    failures: usize,
    table_size_bytes: u64,
}

impl BenchmarkResult {
    pub fn new(
        name: impl Into<String>,
        samples_ms: Vec<u64>,
        failures: usize,
        table_size_bytes: u64,
    ) -> Self {
        Self {
            name: name.into(),
            samples_ms,
            failures,
            table_size_bytes,
        }
    }

    /// Operation name as shown in the report
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Elapsed milliseconds, one per recorded iteration, in run order
    pub fn samples(&self) -> &[u64] {
        &self.samples_ms
    }

    /// Iterations whose operation returned an error
    pub fn failures(&self) -> usize {
        self.failures
    }

    /// Table size probed after the last iteration
    pub fn table_size_bytes(&self) -> u64 {
        self.table_size_bytes
    }

    /// Table size in whole MiB (integer division)
    pub fn table_size_mib(&self) -> u64 {
        self.table_size_bytes / BYTES_PER_MIB
    }

    /// Arithmetic mean, `None` when there are no samples
    pub fn mean(&self) -> Option<f64> {
        if self.samples_ms.is_empty() {
            return None;
        }
        let sum: u128 = self.samples_ms.iter().map(|&s| s as u128).sum();
        Some(sum as f64 / self.samples_ms.len() as f64)
    }

    /// Largest sample, `None` when there are no samples
    pub fn max(&self) -> Option<u64> {
        self.samples_ms.iter().copied().max()
    }

    /// Bucket the samples with the standard width
    pub fn histogram(&self) -> Histogram {
        Histogram::from_samples(&self.samples_ms, BUCKET_WIDTH_MS)
    }
}

/// Fixed-width latency histogram keyed by bucket start
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Histogram {
    width: u64,
    buckets: BTreeMap<u64, usize>,
}

impl Histogram {
    /// Bucket every sample into `floor(sample / width) * width`
    pub fn from_samples(samples: &[u64], width: u64) -> Self {
        let width = width.max(1);
        let mut buckets = BTreeMap::new();
        for &sample in samples {
            *buckets.entry(Self::bucket_start(sample, width)).or_insert(0) += 1;
        }
        Self { width, buckets }
    }

    /// Start of the bucket that `value` falls into
    pub fn bucket_start(value: u64, width: u64) -> u64 {
        (value / width) * width
    }

    pub fn width(&self) -> u64 {
        self.width
    }

    /// Count in the bucket starting at `start`
    pub fn count(&self, start: u64) -> usize {
        self.buckets.get(&start).copied().unwrap_or(0)
    }

    /// Sum of all bucket counts
    pub fn total(&self) -> usize {
        self.buckets.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// `(bucket_start, count)` in ascending bucket order
    pub fn iter(&self) -> impl Iterator<Item = (u64, usize)> + '_ {
        self.buckets.iter().map(|(&start, &count)| (start, count))
    }
}
