//! Plain-text report rendering
//!
//! ```text
//! BulkCopy	Average=42 ms	Max=57 ms	TableSize=12 MB
//!   Histogram (ms):
//!     040-049	: *******
//!     050-059	: ***
//! ```

use std::fmt;

use super::metrics::BenchmarkResult;

/// Tally mark drawn once per sample in a bucket
const TALLY: char = '*';

/// Render the summary line and histogram block for one result
pub fn render_result(result: &BenchmarkResult) -> String {
    result.to_string()
}

impl fmt::Display for BenchmarkResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (Some(mean), Some(max)) = (self.mean(), self.max()) else {
            write!(f, "{}\tNo data", self.name())?;
            if self.failures() > 0 {
                write!(f, "\tFailed={}", self.failures())?;
            }
            return writeln!(f);
        };

        // f64::round is half-away-from-zero, unlike `{:.0}`
        write!(
            f,
            "{}\tAverage={} ms\tMax={} ms\tTableSize={} MB",
            self.name(),
            mean.round() as u64,
            max,
            self.table_size_mib()
        )?;
        if self.failures() > 0 {
            write!(f, "\tFailed={}", self.failures())?;
        }
        writeln!(f)?;

        let histogram = self.histogram();
        writeln!(f, "  Histogram (ms):")?;
        for (start, count) in histogram.iter() {
            let bar: String = std::iter::repeat(TALLY).take(count).collect();
            let end = start + histogram.width() - 1;
            writeln!(f, "    {start:03}-{end:03}\t: {bar}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_summary_and_histogram() {
        let result = BenchmarkResult::new("BulkInsert", vec![5, 8, 14, 7], 0, 3 * 1_048_576);
        let text = render_result(&result);
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(
            lines,
            vec![
                "BulkInsert\tAverage=9 ms\tMax=14 ms\tTableSize=3 MB",
                "  Histogram (ms):",
                "    000-009\t: ***",
                "    010-019\t: *",
            ]
        );
    }

    #[test]
    fn test_render_no_data() {
        let result = BenchmarkResult::new("SelectData", vec![], 0, 1_048_576);
        assert_eq!(render_result(&result), "SelectData\tNo data\n");
    }

    #[test]
    fn test_render_no_data_with_failures() {
        let result = BenchmarkResult::new("ProcInsert", vec![], 3, 0);
        assert_eq!(render_result(&result), "ProcInsert\tNo data\tFailed=3\n");
    }

    #[test]
    fn test_render_reports_failures() {
        let result = BenchmarkResult::new("BulkCopy", vec![120], 2, 0);
        let text = render_result(&result);
        assert!(text.starts_with("BulkCopy\tAverage=120 ms\tMax=120 ms\tTableSize=0 MB\tFailed=2\n"));
        assert!(text.contains("    120-129\t: *\n"));
    }

    #[test]
    fn test_mean_rounds_half_away_from_zero() {
        // 2.5 would print as "2" with `{:.0}`
        let result = BenchmarkResult::new("op", vec![2, 3], 0, 0);
        assert!(render_result(&result).starts_with("op\tAverage=3 ms\tMax=3 ms"));
    }

    #[test]
    fn test_wide_buckets_are_not_truncated() {
        let result = BenchmarkResult::new("op", vec![12_345], 0, 0);
        assert!(render_result(&result).contains("    12340-12349\t: *\n"));
    }
}
