//! Error types for processing stages.

use gcodeforge_core::{DocumentError, VelocityError};
use thiserror::Error;

/// Errors raised while building or running stages.
#[derive(Error, Debug)]
pub enum ProcessorError {
    /// A stage was configured with unusable values.
    #[error("Invalid settings for stage '{stage}': {reason}")]
    InvalidSettings { stage: &'static str, reason: String },

    /// A speed lookup table cannot be interpolated.
    #[error("Invalid lookup table: {0}")]
    InvalidLookupTable(String),

    /// Profile construction or solving failed.
    #[error("Velocity error: {0}")]
    Velocity(#[from] VelocityError),

    /// The document structure is inconsistent.
    #[error("Document error: {0}")]
    Document(#[from] DocumentError),

    /// A stage failed during a pipeline run.
    #[error("Stage '{stage}' failed: {source}")]
    StageFailed {
        stage: String,
        #[source]
        source: Box<ProcessorError>,
    },
}

/// Result type alias for stage operations.
pub type ProcessorResult<T> = Result<T, ProcessorError>;
