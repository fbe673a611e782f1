//! Error types for deferred execution.

use thiserror::Error;

use virtual_array::BuildError;

use crate::chunk::ChunkCoords;

/// Errors raised while executing a task graph.
#[derive(Debug, Error)]
pub enum ComputeError {
    /// The task graph cannot be executed as written.
    #[error("invalid task graph: {0}")]
    InvalidPlan(String),

    /// Applying a select/resample node failed (e.g., the selection left
    /// nothing to compute).
    #[error("plan narrowing failed: {0}")]
    Narrow(#[from] BuildError),

    /// A chunk read/compute failed after exhausting its retry budget.
    #[error("chunk {chunk} failed after {attempts} attempts reading {uri}: {message}")]
    ChunkFailed {
        chunk: ChunkCoords,
        uri: String,
        attempts: u32,
        message: String,
    },

    /// The execution was cancelled; no partial result is returned.
    #[error("execution cancelled")]
    Cancelled,

    /// The worker pool cannot run any tasks.
    #[error("worker pool unavailable: {0}")]
    PoolUnavailable(String),

    /// Writing a computed chunk in persist mode failed.
    #[error("failed to persist chunk {path}: {message}")]
    PersistFailed { path: String, message: String },
}
