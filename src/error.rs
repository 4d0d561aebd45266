//! Error types for metastream
//!
//! Toyota Way: Clear error messages with actionable guidance (Respect for People)
//!
//! Schema, configuration and I/O errors are fatal for a run. Partition and
//! capability errors are scoped to a single task and may be skipped by the
//! driver when the failure policy allows it.

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// metastream error types
#[derive(Error, Debug)]
pub enum Error {
    /// Reserved or candidate column missing from the meta-dataset (fatal at startup)
    #[error("Schema error: {0}\nCheck the meta-dataset attributes against the configured candidates")]
    Schema(String),

    /// A row could not be rewritten into a derived schema for one task
    #[error("Partition error for task {task_id}: {reason}")]
    Partition {
        /// Task being partitioned
        task_id: i64,
        /// Which column or row was at fault
        reason: String,
    },

    /// The learning capability failed to train or predict for one task
    #[error("Capability error for task {task_id}: {reason}")]
    Capability {
        /// Task being evaluated
        task_id: i64,
        /// Learner failure message
        reason: String,
    },

    /// Learner failure not yet attributed to a task
    #[error("Learner error: {0}")]
    Learner(String),

    /// Table file could not be parsed or written
    #[error("Storage error: {0}")]
    Storage(String),

    /// Invalid run configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid argument passed to a table or aggregator operation
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Arrow error
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Parquet error
    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether the error only invalidates the task it was raised for.
    ///
    /// The driver's skip policy absorbs these; everything else ends the run.
    #[must_use]
    pub const fn is_task_scoped(&self) -> bool {
        matches!(self, Self::Partition { .. } | Self::Capability { .. })
    }

    /// Attribute a learner failure to the task being evaluated.
    #[must_use]
    pub fn for_task(self, task_id: i64) -> Self {
        match self {
            Self::Learner(reason) => Self::Capability { task_id, reason },
            other => other,
        }
    }
}
