//! Category-level errors.
//!
//! Per-record problems never surface here: they are collected into the
//! `errors` list of a run's result. An [`EngineError`] means the whole call
//! was rejected or could not start.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Category name is not a valid key namespace.
    #[error("invalid category name: '{0}'")]
    InvalidCategory(String),

    /// No field schema is registered for the category.
    #[error("unknown category: '{0}'")]
    UnknownCategory(String),

    /// Another mutating run holds the category lock.
    #[error("category '{category}' is busy: {operation} already in progress, try again later")]
    Busy { category: String, operation: String },

    /// The store failed outside of per-record processing (scan, lock).
    #[error("store error: {0:#}")]
    Store(anyhow::Error),
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;
