//! Error types for Mood Flux

use thiserror::Error;

use crate::schema::ValidationError;

/// Errors that can occur during correlation computation
#[derive(Debug, Error)]
pub enum CorrelationError {
    #[error("Insufficient data for habit {habit_id}: {n} paired observations")]
    InsufficientData { habit_id: String, n: usize },

    #[error("Failed to read from diary store: {0}")]
    SourceRead(String),

    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    #[error("Series length mismatch: {habit} habit values vs {mood} mood values")]
    LengthMismatch { habit: usize, mood: usize },

    #[error("Invalid window: {0}")]
    InvalidWindow(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid diary export: {0}")]
    InvalidExport(#[from] ValidationError),

    #[error("No async runtime available: {0}")]
    Runtime(String),

    #[error("Computation cancelled")]
    Cancelled,
}
