//! Pipeline error types

use thiserror::Error;

/// Pipeline errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    /// Egress queue already holds its maximum number of waiting tasks
    #[error("egress queue full: {queued} task(s) waiting, limit {max}")]
    Capacity { queued: usize, max: usize },

    /// Pipeline has been closed and accepts no more data
    #[error("pipeline is closed")]
    Closed,
}

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;
