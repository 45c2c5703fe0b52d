//! # Id Counter
//!
//! Per-class node id allocation through a counter file `_ids.<classname>`
//! holding the last id handed out, as decimal text.
//!
//! The whole read-increment-write runs under an exclusive OS file lock.
//! Acquiring the lock blocks until any other handle (in this or another
//! process) has finished its own allocation, so two handles never receive
//! the same id.

use super::storage_err;
use crate::primitives::COUNTER_PREFIX;
use crate::types::HyperdbError;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{trace, warn};

/// The id counter of one class.
#[derive(Debug, Clone)]
pub struct IdCounter {
    path: PathBuf,
}

impl IdCounter {
    /// The counter for `classname` under `dir`.
    #[must_use]
    pub fn new(dir: &Path, classname: &str) -> Self {
        Self {
            path: dir.join(format!("{}.{}", COUNTER_PREFIX, classname)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Allocate the next id.
    ///
    /// A missing or empty counter is seeded with `seed()`, the highest id
    /// already present in the class's node store.
    pub fn next<F>(&self, seed: F) -> Result<u64, HyperdbError>
    where
        F: FnOnce() -> Result<u64, HyperdbError>,
    {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
            .map_err(storage_err)?;
        file.lock().map_err(storage_err)?;
        let result = Self::bump(&mut file, &self.path, seed);
        let unlocked = file.unlock().map_err(storage_err);
        let id = result?;
        unlocked?;
        trace!(counter = %self.path.display(), id, "allocate id");
        Ok(id)
    }

    fn bump<F>(file: &mut File, path: &Path, seed: F) -> Result<u64, HyperdbError>
    where
        F: FnOnce() -> Result<u64, HyperdbError>,
    {
        let mut text = String::new();
        file.read_to_string(&mut text).map_err(storage_err)?;
        let last = match text.trim() {
            "" => {
                let seeded = seed()?;
                warn!(counter = %path.display(), seeded, "id counter missing, reseeded from node store");
                seeded
            }
            n => n.parse::<u64>().map_err(|_| {
                HyperdbError::Database(format!("corrupt id counter {}: '{}'", path.display(), n))
            })?,
        };
        let next = last
            .checked_add(1)
            .ok_or_else(|| HyperdbError::Database(format!("id counter {} exhausted", path.display())))?;
        file.set_len(0).map_err(storage_err)?;
        file.seek(SeekFrom::Start(0)).map_err(storage_err)?;
        file.write_all(next.to_string().as_bytes())
            .map_err(storage_err)?;
        file.sync_all().map_err(storage_err)?;
        Ok(next)
    }
}
