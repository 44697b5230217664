//! Persistent guid2lid database for the subnet manager.
//!
//! The `guid2lid` domain maps a port GUID to the inclusive LID range the
//! subnet manager assigned to it. Keeping this map on disk is what makes
//! LID assignments stable across manager restarts: a port that held
//! `[0x10:0x13]` before a restart is handed the same range afterwards.
//!
//! The domain is an in-memory map with explicit [`Guid2LidDb::load`] /
//! [`Guid2LidDb::store`] synchronization points; the manager decides when
//! to flush. A successful `store()` followed by `load()` round-trips all
//! entries exactly.

mod guid2lid;

pub use guid2lid::Guid2LidDb;

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;

/// Errors that can occur while loading or storing a database domain.
#[derive(Debug, Error)]
pub enum DbError {
    /// Reading or writing the backing file failed.
    #[error("guid2lid database I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The backing file exists but does not parse.
    #[error("guid2lid database format error at {path}: {source}")]
    Format {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
