//! Error types for timetabling runs.
//!
//! Demands that cannot be placed are never errors; they are reported in
//! the run result. Errors are reserved for inputs the engine refuses to
//! work with and for interrupted runs.

use thiserror::Error;

use crate::validation::ValidationError;

/// Main error type for u-timetable operations.
#[derive(Debug, Error)]
pub enum TimetableError {
    /// Configuration rejected before any placement.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Catalog references that do not resolve, or duplicate ids.
    #[error("Inconsistent catalog: {} problem(s), first: {}", .0.len(), first_message(.0))]
    InconsistentCatalog(Vec<ValidationError>),

    /// Run cancelled before any attempt completed.
    #[error("Run was cancelled after {completed} completed attempt(s)")]
    Cancelled { completed: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

fn first_message(errors: &[ValidationError]) -> &str {
    errors.first().map_or("none", |e| e.message.as_str())
}

impl From<Vec<ValidationError>> for TimetableError {
    fn from(errors: Vec<ValidationError>) -> Self {
        TimetableError::InconsistentCatalog(errors)
    }
}

/// Result type alias for u-timetable operations.
pub type Result<T> = std::result::Result<T, TimetableError>;
