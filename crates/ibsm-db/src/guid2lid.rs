//! The guid2lid domain implementation.

use crate::{DbError, DbResult};
use ibsm_types::{Guid, Lid, LidRange};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// On-disk entry. The range is stored as its two bounds rather than a
/// nested struct so the file stays diffable by operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct DbEntry {
    guid: Guid,
    min_lid: Lid,
    max_lid: Lid,
}

/// File-backed guid → LID-range map.
///
/// Entries are kept sorted by GUID (both in memory and on disk) so that
/// iteration order is deterministic. All mutation is in-memory; nothing
/// touches the file until [`Guid2LidDb::store`].
#[derive(Debug)]
pub struct Guid2LidDb {
    path: PathBuf,
    entries: BTreeMap<Guid, LidRange>,
}

impl Guid2LidDb {
    /// Opens a domain over `path` without touching the filesystem.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Guid2LidDb {
            path: path.into(),
            entries: BTreeMap::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replaces the in-memory map with the file contents.
    ///
    /// A missing file is a first boot, not an error: the map comes back
    /// empty. Unreadable or unparsable files are errors.
    pub fn load(&mut self) -> DbResult<()> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no guid2lid file yet, starting empty");
                self.entries.clear();
                return Ok(());
            }
            Err(source) => {
                return Err(DbError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let parsed: Vec<DbEntry> = serde_json::from_str(&text).map_err(|source| DbError::Format {
            path: self.path.clone(),
            source,
        })?;

        self.entries = parsed
            .into_iter()
            .map(|e| (e.guid, LidRange::new(e.min_lid, e.max_lid)))
            .collect();
        debug!(
            path = %self.path.display(),
            entries = self.entries.len(),
            "loaded guid2lid database"
        );
        Ok(())
    }

    /// Writes the in-memory map to disk.
    ///
    /// The file is written to a sibling temp path and renamed into place
    /// so a crash mid-write cannot truncate the previous generation.
    pub fn store(&self) -> DbResult<()> {
        let entries: Vec<DbEntry> = self
            .entries
            .iter()
            .map(|(&guid, &range)| DbEntry {
                guid,
                min_lid: range.min,
                max_lid: range.max,
            })
            .collect();
        let text = serde_json::to_string_pretty(&entries).map_err(|source| DbError::Format {
            path: self.path.clone(),
            source,
        })?;

        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, text).map_err(|source| DbError::Io {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &self.path).map_err(|source| DbError::Io {
            path: self.path.clone(),
            source,
        })?;
        debug!(
            path = %self.path.display(),
            entries = self.entries.len(),
            "stored guid2lid database"
        );
        Ok(())
    }

    /// Drops every in-memory entry. The file is untouched.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn get(&self, guid: Guid) -> Option<LidRange> {
        self.entries.get(&guid).copied()
    }

    pub fn set(&mut self, guid: Guid, range: LidRange) {
        self.entries.insert(guid, range);
    }

    /// Removes an entry; returns false if it was not present.
    pub fn delete(&mut self, guid: Guid) -> bool {
        self.entries.remove(&guid).is_some()
    }

    /// Snapshot of all keys, in ascending GUID order.
    pub fn guids(&self) -> Vec<Guid> {
        self.entries.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Guid, LidRange)> + '_ {
        self.entries.iter().map(|(&g, &r)| (g, r))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
