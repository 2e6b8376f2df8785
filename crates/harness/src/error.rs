// Error types for the benchmark harness

use std::time::Duration;

use thiserror::Error;

/// Result type alias for harness operations
pub type Result<T> = std::result::Result<T, HarnessError>;

/// Errors that can occur while benchmarking or stress testing
#[derive(Debug, Error)]
pub enum HarnessError {
    /// Driver-level failure (connect, execute, fetch, COPY)
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A bounded call did not finish in time
    #[error("{operation} timed out after {limit:?}")]
    Timeout {
        operation: &'static str,
        limit: Duration,
    },

    /// The shared deadline fired while the call was in flight
    #[error("cancelled by stress test deadline")]
    Cancelled,

    /// A generated value does not fit the target column
    #[error("value {value} out of range for column '{column}'")]
    OutOfRange { column: String, value: i64 },

    /// The table has no columns we know how to populate
    #[error("table '{0}' has no insertable columns")]
    EmptySchema(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl HarnessError {
    /// Whether this error is the expected consequence of the shared deadline
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Configuration loading and validation errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid JSON for the expected shape
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    /// An environment override could not be parsed
    #[error("invalid value '{value}' for environment variable {name}")]
    InvalidEnv { name: &'static str, value: String },

    /// Table or procedure name is not a plain SQL identifier
    #[error("'{0}' is not a valid SQL identifier")]
    InvalidIdentifier(String),

    /// A value fails a range or consistency check
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}
