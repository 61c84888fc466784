//! Error types for Driftwatch

use std::time::Instant;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Database pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Decimal error: {0}")]
    Decimal(#[from] rust_decimal::Error),

    #[error("Import error: {0}")]
    Import(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Message surfaced to callers when a computation fails unexpectedly.
///
/// The underlying error is logged, never returned.
pub const GENERIC_FAILURE_MESSAGE: &str = "Computation failed due to an internal error";

/// Unexpected failure of a computation entry point
///
/// Carries the elapsed time so the caller can still report timing on the
/// FAILED result record.
#[derive(Error, Debug)]
#[error("computation failed after {elapsed_ms}ms: {source}")]
pub struct ComputationError {
    #[source]
    pub source: Error,
    pub elapsed_ms: i64,
}

impl ComputationError {
    pub fn new(source: Error, elapsed_ms: i64) -> Self {
        Self { source, elapsed_ms }
    }

    /// Wrap `source`, measuring elapsed time from `started`
    pub fn since(source: Error, started: Instant) -> Self {
        Self::new(source, elapsed_ms(started))
    }

    /// Convert into the FAILED record of a computation result type
    pub fn into_result<R: FailedResult>(self, user_id: i64) -> R {
        R::failed(user_id, self.elapsed_ms)
    }
}

/// Result records that can represent an unexpected failure
pub trait FailedResult {
    /// FAILED record carrying `GENERIC_FAILURE_MESSAGE` and the elapsed time
    fn failed(user_id: i64, elapsed_ms: i64) -> Self;
}

/// Milliseconds since `started`, saturating
pub fn elapsed_ms(started: Instant) -> i64 {
    i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX)
}
