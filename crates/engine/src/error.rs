//! Engine error taxonomy
//!
//! Errors are absorbed at the smallest unit (one pair, one row, one signal)
//! and surfaced in run reports; none of them aborts a whole batch.

use persistence::DbError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("market data unavailable for {pair}: {reason}")]
    DataUnavailable { pair: String, reason: String },

    #[error("insufficient history for {pair}: {bars} bars, {required} required")]
    InsufficientHistory {
        pair: String,
        bars: usize,
        required: usize,
    },

    #[error("duplicate strategy id: {0}")]
    DuplicateStrategy(String),

    #[error("persistence failure: {0}")]
    Persistence(#[from] DbError),

    #[error("invalid stored {table} row {id}: {reason}")]
    InvalidRecord {
        table: &'static str,
        id: String,
        reason: String,
    },

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Division that resolves a zero or non-finite denominator to `fallback`
pub fn safe_div(numerator: f64, denominator: f64, fallback: f64) -> f64 {
    if denominator == 0.0 || !denominator.is_finite() {
        return fallback;
    }
    let value = numerator / denominator;
    if value.is_finite() {
        value
    } else {
        fallback
    }
}
