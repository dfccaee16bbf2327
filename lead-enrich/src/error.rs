//! Batch-level error types
//!
//! Per-record failures never surface here; they are recorded on the record's
//! outcome. `EnrichError` is reserved for conditions that abort a batch.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, EnrichError>;

#[derive(Debug, Error)]
pub enum EnrichError {
    /// Checkpoint snapshot could not be made durable
    #[error("Checkpoint write failed: {0}")]
    CheckpointWrite(String),

    /// Missing credentials or invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Input records could not be read
    #[error("Record source error: {0}")]
    Source(String),

    /// Write-back to the persistence boundary failed
    #[error("Write-back failed: {0}")]
    Sink(String),

    #[error(transparent)]
    Common(#[from] lead_common::Error),
}

impl From<sqlx::Error> for EnrichError {
    fn from(err: sqlx::Error) -> Self {
        EnrichError::Common(lead_common::Error::Database(err))
    }
}
