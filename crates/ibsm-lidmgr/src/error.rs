//! Error types for the LID manager.

use thiserror::Error;

/// Result type alias for LID manager operations.
pub type LidMgrResult<T> = Result<T, LidMgrError>;

/// Errors surfaced to the caller.
///
/// Most failure modes inside a sweep are logged and worked around (a bad
/// persistent entry is dropped, a failed store retried on the next
/// sweep); only initialization can fail hard, and only when the
/// `exit_on_fatal` policy demands it.
#[derive(Debug, Error)]
pub enum LidMgrError {
    /// Restoring the persistent guid2lid database failed and the
    /// configuration requires treating that as fatal.
    #[error("guid2lid database error: {0}")]
    Db(#[from] ibsm_db::DbError),
}
