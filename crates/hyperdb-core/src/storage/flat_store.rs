//! # Flat-file Store
//!
//! The always-available engine: the whole store is one file holding a
//! header plus a postcard map, loaded on open and rewritten on flush.
//! Rewrites go through a temporary file and a rename, so readers see
//! either the old or the new store, never a torn one.

use super::{EngineKind, KeyValueStore, storage_err};
use crate::formats::{store_from_bytes, store_to_bytes};
use crate::types::HyperdbError;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// A store kept entirely in memory between open and flush.
#[derive(Debug)]
pub struct FlatStore {
    path: PathBuf,
    records: BTreeMap<String, Vec<u8>>,
    dirty: bool,
}

impl FlatStore {
    /// Load the store at `path`. With `create`, a missing file is an empty
    /// store that is written out on the first flush.
    pub fn open(path: impl AsRef<Path>, create: bool) -> Result<Self, HyperdbError> {
        let path = path.as_ref().to_path_buf();
        let records = if path.is_file() {
            store_from_bytes(&fs::read(&path).map_err(storage_err)?)?
        } else if create {
            BTreeMap::new()
        } else {
            return Err(HyperdbError::Io(format!(
                "store file {} not found",
                path.display()
            )));
        };
        let dirty = !path.is_file();
        Ok(Self {
            path,
            records,
            dirty,
        })
    }

    /// Number of records held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl KeyValueStore for FlatStore {
    fn engine(&self) -> EngineKind {
        EngineKind::Flat
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, HyperdbError> {
        Ok(self.records.get(key).cloned())
    }

    fn put(&mut self, key: &str, value: &[u8]) -> Result<(), HyperdbError> {
        self.records.insert(key.to_string(), value.to_vec());
        self.dirty = true;
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, HyperdbError> {
        Ok(self.records.keys().cloned().collect())
    }

    fn flush(&mut self) -> Result<(), HyperdbError> {
        if !self.dirty {
            return Ok(());
        }
        let bytes = store_to_bytes(&self.records)?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, &bytes).map_err(storage_err)?;
        fs::rename(&tmp, &self.path).map_err(storage_err)?;
        self.dirty = false;
        Ok(())
    }
}
