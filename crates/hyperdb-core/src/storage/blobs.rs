//! # Blob Store
//!
//! File content of file-class nodes, one file per node property under
//! `files/<classname>/<designator>[.<property>]`. The `content` property
//! uses the bare designator.

use super::storage_err;
use crate::primitives::{BLOB_DIR, PROP_CONTENT};
use crate::types::{Designator, HyperdbError};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::trace;

/// The blob directory of one database.
#[derive(Debug, Clone)]
pub struct BlobStore {
    root: PathBuf,
}

impl BlobStore {
    /// The blob store under database directory `dir`.
    #[must_use]
    pub fn new(dir: &Path) -> Self {
        Self {
            root: dir.join(BLOB_DIR),
        }
    }

    /// Path of the blob for `property` of `classname<nodeid>`.
    #[must_use]
    pub fn path(&self, classname: &str, nodeid: &str, property: &str) -> PathBuf {
        let designator = Designator::new(classname, nodeid).to_string();
        let file = if property == PROP_CONTENT {
            designator
        } else {
            format!("{}.{}", designator, property)
        };
        self.root.join(classname).join(file)
    }

    pub fn write(
        &self,
        classname: &str,
        nodeid: &str,
        property: &str,
        content: &[u8],
    ) -> Result<(), HyperdbError> {
        let path = self.path(classname, nodeid, property);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(storage_err)?;
        }
        trace!(path = %path.display(), bytes = content.len(), "write blob");
        fs::write(&path, content).map_err(storage_err)
    }

    /// The stored blob, or `None` if it was never written.
    pub fn read(
        &self,
        classname: &str,
        nodeid: &str,
        property: &str,
    ) -> Result<Option<Vec<u8>>, HyperdbError> {
        match fs::read(self.path(classname, nodeid, property)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(storage_err(e)),
        }
    }

    /// Remove every blob of `classname`.
    pub fn clear_class(&self, classname: &str) -> Result<(), HyperdbError> {
        match fs::remove_dir_all(self.root.join(classname)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(storage_err(e)),
        }
    }
}
