//! Exit code constants for the confsync CLI.
//!
//! - 0: Success
//! - 1: User error (bad args, uninitialized project)
//! - 2: Validation failure (dependency or schema errors, import aborted)
//! - 3: Storage failure (read during diff, write during apply)
//! - 4: Graph failure (malformed dependency declaration, cycle)
//! - 5: Lock acquisition failure

/// Successful execution.
pub const SUCCESS: i32 = 0;

/// User error: bad arguments, invalid state, or uninitialized project.
pub const USER_ERROR: i32 = 1;

/// Validation failure: the import was aborted before any write.
pub const VALIDATION_FAILURE: i32 = 2;

/// Storage failure: a read or write against a config storage failed.
pub const STORAGE_FAILURE: i32 = 3;

/// Graph failure: malformed dependency declaration or dependency cycle.
pub const GRAPH_FAILURE: i32 = 4;

/// Lock acquisition failure: another import holds the sync lock.
pub const LOCK_FAILURE: i32 = 5;
