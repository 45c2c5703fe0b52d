//! # redb-backed Store
//!
//! The default engine: one redb database file per store with a single
//! `records` table of node id -> encoded record.
//!
//! Writes are buffered and applied on `flush` in one redb write
//! transaction, so one commit costs one fsync per store rather than one
//! per record. Store handles are short-lived (a read or a commit), which
//! keeps the file free for other handles in between.

use super::{EngineKind, KeyValueStore, storage_err};
use crate::types::HyperdbError;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition, TableError};
use std::collections::BTreeMap;
use std::path::Path;

/// Table for records: node id -> encoded record bytes.
const RECORDS: TableDefinition<&str, &[u8]> = TableDefinition::new("records");

/// A store backed by a redb database file.
pub struct RedbStore {
    db: Database,
    pending: BTreeMap<String, Vec<u8>>,
}

impl std::fmt::Debug for RedbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStore")
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

impl RedbStore {
    /// Open the database at `path`; with `create`, create it and its table.
    pub fn open(path: impl AsRef<Path>, create: bool) -> Result<Self, HyperdbError> {
        let db = if create {
            let db = Database::create(path.as_ref()).map_err(storage_err)?;
            let write_txn = db.begin_write().map_err(storage_err)?;
            let _ = write_txn.open_table(RECORDS).map_err(storage_err)?;
            write_txn.commit().map_err(storage_err)?;
            db
        } else {
            Database::open(path.as_ref()).map_err(storage_err)?
        };
        Ok(Self {
            db,
            pending: BTreeMap::new(),
        })
    }

    fn stored_keys(&self) -> Result<Vec<String>, HyperdbError> {
        let read_txn = self.db.begin_read().map_err(storage_err)?;
        let table = match read_txn.open_table(RECORDS) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
            Err(e) => return Err(storage_err(e)),
        };
        let mut keys = Vec::new();
        for entry in table.iter().map_err(storage_err)? {
            let (key, _) = entry.map_err(storage_err)?;
            keys.push(key.value().to_string());
        }
        Ok(keys)
    }
}

impl KeyValueStore for RedbStore {
    fn engine(&self) -> EngineKind {
        EngineKind::Redb
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, HyperdbError> {
        if let Some(bytes) = self.pending.get(key) {
            return Ok(Some(bytes.clone()));
        }
        let read_txn = self.db.begin_read().map_err(storage_err)?;
        let table = match read_txn.open_table(RECORDS) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(e) => return Err(storage_err(e)),
        };
        Ok(table
            .get(key)
            .map_err(storage_err)?
            .map(|guard| guard.value().to_vec()))
    }

    fn put(&mut self, key: &str, value: &[u8]) -> Result<(), HyperdbError> {
        self.pending.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, HyperdbError> {
        let mut keys = self.stored_keys()?;
        keys.extend(self.pending.keys().cloned());
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    fn flush(&mut self) -> Result<(), HyperdbError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let write_txn = self.db.begin_write().map_err(storage_err)?;
        {
            let mut table = write_txn.open_table(RECORDS).map_err(storage_err)?;
            for (key, value) in &self.pending {
                table
                    .insert(key.as_str(), value.as_slice())
                    .map_err(storage_err)?;
            }
        }
        write_txn.commit().map_err(storage_err)?;
        self.pending.clear();
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::REDB_MAGIC;
    use tempfile::tempdir;

    #[test]
    fn basic_operations() {
        let temp = tempdir().expect("temp dir");
        let path = temp.path().join("nodes.issue.redb");
        let mut store = RedbStore::open(&path, true).expect("open db");

        store.put("1", b"one").expect("put");
        assert_eq!(store.get("1").expect("get"), Some(b"one".to_vec()));
        assert_eq!(store.keys().expect("keys"), vec!["1"]);
        store.flush().expect("flush");
        assert_eq!(store.get("1").expect("get"), Some(b"one".to_vec()));
        assert_eq!(store.get("2").expect("get"), None);
    }

    #[test]
    fn persistence() {
        let temp = tempdir().expect("temp dir");
        let path = temp.path().join("nodes.issue.redb");
        {
            let mut store = RedbStore::open(&path, true).expect("open db");
            store.put("1", b"one").expect("put");
            store.put("10", b"ten").expect("put");
            store.flush().expect("flush");
        }
        let store = RedbStore::open(&path, false).expect("reopen db");
        assert_eq!(store.keys().expect("keys"), vec!["1", "10"]);
        assert_eq!(store.get("10").expect("get"), Some(b"ten".to_vec()));
    }

    #[test]
    fn file_carries_redb_magic() {
        let temp = tempdir().expect("temp dir");
        let path = temp.path().join("journals.issue.redb");
        drop(RedbStore::open(&path, true).expect("open db"));
        let bytes = std::fs::read(&path).expect("read");
        assert_eq!(EngineKind::detect(&bytes), Some(EngineKind::Redb));
        assert!(bytes.starts_with(REDB_MAGIC));
    }
}
