//! Error types for wattlens.

use thiserror::Error;

/// Failures raised by a time-series store backend.
///
/// An empty range is not an error: queries return an empty vector.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Throttling, busy or locked backend. Worth retrying with backoff.
    #[error("Transient store failure: {0}")]
    Transient(String),

    /// Anything else the backend reports.
    #[error("Store backend error: {0}")]
    Backend(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        use rusqlite::ErrorCode;
        match &err {
            rusqlite::Error::SqliteFailure(e, _)
                if matches!(e.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) =>
            {
                StoreError::Transient(err.to_string())
            }
            _ => StoreError::Backend(err.to_string()),
        }
    }
}

/// A window definition that violates its pattern invariants.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WindowError {
    #[error("window '{key}': invalid timestamp '{value}'")]
    InvalidTimestamp { key: String, value: String },

    #[error("window '{key}': end {end} is not after start {start}")]
    EmptySpan { key: String, start: String, end: String },

    #[error("window '{key}': duration_minutes is {declared} but the span covers {actual} minutes")]
    DurationMismatch { key: String, declared: i64, actual: i64 },

    #[error("window '{key}': cyclic windows need at least one active interval")]
    NoActiveIntervals { key: String },

    #[error("window '{key}': active intervals must be strictly increasing and non-overlapping")]
    OverlappingIntervals { key: String },

    #[error("window '{key}': active intervals must all last {expected} minutes, found {found}")]
    UnequalIntervals { key: String, expected: i64, found: i64 },

    #[error("window '{key}': active interval {start} - {end} lies outside the window")]
    IntervalOutsideWindow { key: String, start: String, end: String },

    #[error("window '{key}': {pattern} windows take exactly one interval equal to the window span")]
    SingleIntervalMismatch { key: String, pattern: String },
}

/// Why a record field could not be used.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FieldError {
    #[error("field '{0}' is missing")]
    Missing(&'static str),

    #[error("field '{field}' is malformed: '{value}'")]
    Malformed { field: &'static str, value: String },
}

/// Run-level failures. Window-level problems never surface here.
#[derive(Error, Debug)]
pub enum AnalysisError {
    /// Missing required identifiers at run start. Aborts the run.
    #[error("Fatal configuration error: {0}")]
    FatalConfiguration(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Window(#[from] WindowError),
}

/// Errors from the ingestion collaborator.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("message carries no ENERGY block")]
    NoEnergyData,

    #[error("invalid timestamp '{0}'")]
    InvalidTimestamp(String),

    #[error(transparent)]
    Field(#[from] FieldError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("feed carries no price data")]
    EmptyFeed,
}
