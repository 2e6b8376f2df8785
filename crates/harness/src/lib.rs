//! # Bulkbench Harness
//!
//! Benchmarks bulk-insert and query strategies against PostgreSQL and runs a
//! long-lived connection churn test against the same server.
//!
//! ## Features
//!
//! - **Benchmark runner**: repeated timed execution of a named operation,
//!   reported as mean, max, a 10 ms histogram and the table size
//! - **Insert strategies**: column arrays, multi-row `VALUES`, typed arrays,
//!   `COPY FROM STDIN` and a stored procedure
//! - **Select strategies**: inlined condition, array bind, literal `IN` list
//! - **Stress test**: fixed worker set opening, probing and closing sessions
//!   until one shared cancellation token fires
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                     HarnessConfig                         │
//! │  (bulkbench.json + BULKBENCH_* env + CLI overrides)      │
//! └──────────────────────────────────────────────────────────┘
//!                 │                            │
//!                 ▼                            ▼
//! ┌──────────────────────────────┐  ┌───────────────────────┐
//! │ Workload + BenchmarkRunner   │  │      StressTest       │
//! │ (sequential, timed ops)      │  │ (N workers, 1 token)  │
//! └──────────────────────────────┘  └───────────────────────┘
//!                 │                            │
//!                 └──────────┬─────────────────┘
//!                            ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │                        Database                           │
//! │  (sqlx PgPool when pooling is enabled, else dedicated)   │
//! └──────────────────────────────────────────────────────────┘
//! ```

pub mod bench;
pub mod config;
pub mod db;
pub mod error;
pub mod stress;
pub mod telemetry;
pub mod workload;

pub use bench::{render_result, BenchmarkResult, BenchmarkRunner, FailurePolicy, Histogram};
pub use config::{
    BenchmarkConfig, DatabaseConfig, HarnessConfig, PoolingConfig, StressConfig,
    DEFAULT_CONFIG_FILE,
};
pub use db::{Database, DbConnection, TableSchema};
pub use error::{ConfigError, HarnessError, Result};
pub use stress::{SessionIdentity, StressReport, StressTest};
pub use telemetry::{init_telemetry, TelemetryConfig};
pub use workload::{BenchmarkOperation, RowSet, Workload};
