use crate::core::weather::WeatherVariable;
use std::path::PathBuf;
use thiserror::Error;

/// Top-level error for a calculation run.
#[derive(Debug, Error)]
pub enum RecfError {
    #[error("Request was considered invalid due to error: {0}")]
    InvalidConfig(#[from] anyhow::Error),
    #[error("Weather source unavailable: {0}")]
    WeatherSource(#[from] WeatherSourceError),
    #[error("Batch flush failed: {0}")]
    FlushFailure(#[from] FlushError),
    #[error("{count} of {requested} requested years aborted: {years:?}")]
    AbortedYears {
        count: usize,
        requested: usize,
        years: Vec<i32>,
    },
}

/// A missing or unreadable weather file. Fatal: processing for the affected
/// year stops, there is no partial-data fallback.
#[derive(Debug, Error)]
#[error("missing or unreadable weather file for {variable} in {year} at {path:?}: {reason}")]
pub struct WeatherSourceError {
    pub year: i32,
    pub variable: WeatherVariable,
    pub path: PathBuf,
    pub reason: String,
}

/// A rejected batch commit. The whole batch is rolled back and the error
/// propagates; there is no partial-row retry.
#[derive(Debug, Error)]
pub enum FlushError {
    #[error("duplicate key ({unit_id}, {year}) within one {table} batch")]
    DuplicateKey {
        table: String,
        unit_id: String,
        year: i32,
    },
    #[error("{table} batch rejected: {reason}")]
    Rejected { table: String, reason: String },
}
