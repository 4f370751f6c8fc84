//! Error types for the confsync CLI.
//!
//! Uses thiserror for derive macros and provides user-actionable error messages.

use crate::exit_codes;
use thiserror::Error;

/// Main error type for confsync operations.
///
/// Each variant maps to a specific exit code so that callers (CLI loops,
/// batch steppers) can distinguish validation failures from storage or
/// lock failures without parsing messages.
#[derive(Error, Debug)]
pub enum SyncError {
    /// User provided invalid arguments or the project is in an invalid state.
    #[error("{0}")]
    UserError(String),

    /// A dependency declaration could not be turned into a graph edge.
    #[error("dependency graph build failed: {0}")]
    GraphBuild(String),

    /// The dependency graph contains a cycle; no ordering exists.
    #[error("cyclic dependency between config objects: {}", .0.join(", "))]
    CyclicDependency(Vec<String>),

    /// Import validation failed (schema or dependency-completeness).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A storage read failed during comparison or import.
    #[error("storage read failed: {0}")]
    StorageRead(String),

    /// A storage write or delete failed during the apply phase.
    #[error("storage write failed: {0}")]
    StorageWrite(String),

    /// The sync lock could not be acquired.
    #[error("lock acquisition failed: {0}")]
    Lock(String),
}

impl SyncError {
    /// Returns the appropriate exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            SyncError::UserError(_) => exit_codes::USER_ERROR,
            SyncError::GraphBuild(_) => exit_codes::GRAPH_FAILURE,
            SyncError::CyclicDependency(_) => exit_codes::GRAPH_FAILURE,
            SyncError::Validation(_) => exit_codes::VALIDATION_FAILURE,
            SyncError::StorageRead(_) => exit_codes::STORAGE_FAILURE,
            SyncError::StorageWrite(_) => exit_codes::STORAGE_FAILURE,
            SyncError::Lock(_) => exit_codes::LOCK_FAILURE,
        }
    }
}

/// Result type alias for confsync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
