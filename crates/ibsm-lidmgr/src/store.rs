//! Typed view over the persistent guid2lid domain.
//!
//! Wraps [`Guid2LidDb`] with the manager's error policy: a failed flush
//! is logged and retried on the next sweep, never propagated out of the
//! sweep itself.

use ibsm_db::{DbResult, Guid2LidDb};
use ibsm_types::{Guid, LidRange};
use std::path::PathBuf;
use tracing::{error, warn};

#[derive(Debug)]
pub struct Guid2Lid {
    db: Guid2LidDb,
}

impl Guid2Lid {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Guid2Lid {
            db: Guid2LidDb::open(path),
        }
    }

    /// Reloads the domain from disk, replacing the in-memory map.
    pub fn restore(&mut self) -> DbResult<()> {
        self.db.load()
    }

    /// Flushes the domain to disk. Failures are logged; the in-memory
    /// map stays authoritative and the next sweep flushes again.
    pub fn persist(&self) {
        if let Err(e) = self.db.store() {
            error!("failed to store guid2lid database: {e}");
        }
    }

    pub fn clear(&mut self) {
        self.db.clear();
    }

    pub fn get(&self, guid: Guid) -> Option<LidRange> {
        self.db.get(guid)
    }

    pub fn set(&mut self, guid: Guid, range: LidRange) {
        self.db.set(guid, range);
    }

    pub fn delete(&mut self, guid: Guid) {
        if !self.db.delete(guid) {
            warn!("no guid2lid entry to delete for guid {guid}");
        }
    }

    pub fn guids(&self) -> Vec<Guid> {
        self.db.guids()
    }

    pub fn len(&self) -> usize {
        self.db.len()
    }

    pub fn is_empty(&self) -> bool {
        self.db.is_empty()
    }
}
