//! Execution configuration.

use std::time::Duration;

/// Resource and retry budget for an executor.
#[derive(Debug, Clone)]
pub struct ComputeConfig {
    /// Maximum concurrent chunk tasks.
    pub workers: usize,
    /// Retries per tile read after the initial attempt.
    pub max_retries: u32,
    /// Initial retry delay (doubles each retry).
    pub initial_retry_delay: Duration,
    /// Maximum retry delay.
    pub max_retry_delay: Duration,
    /// Memory budget for the per-execution tile cache, in bytes.
    pub cache_bytes: usize,
}

impl Default for ComputeConfig {
    fn default() -> Self {
        let workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);

        Self {
            workers,
            max_retries: 3,
            initial_retry_delay: Duration::from_millis(100),
            max_retry_delay: Duration::from_secs(5),
            cache_bytes: 256 * 1024 * 1024,
        }
    }
}

/// What to do with the computed chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    /// Compute in memory and return the result.
    #[default]
    Compute,
    /// Additionally write each computed chunk through the sink for
    /// reuse, then return the result.
    Persist,
}

/// Per-execution options.
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    pub mode: ExecutionMode,
    /// When set, a chunk that exhausts its retries is filled with
    /// no-data and surfaced as a warning instead of failing the whole
    /// execution.
    pub allow_partial: bool,
}

impl ExecuteOptions {
    pub fn compute() -> Self {
        Self::default()
    }

    pub fn persist() -> Self {
        Self {
            mode: ExecutionMode::Persist,
            ..Self::default()
        }
    }

    pub fn with_partial_tolerance(mut self) -> Self {
        self.allow_partial = true;
        self
    }
}
