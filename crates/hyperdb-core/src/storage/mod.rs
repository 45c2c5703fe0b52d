//! # Storage Module
//!
//! Key-value persistence under the hyperdatabase.
//!
//! Each class owns two independent stores, `nodes.<classname>` and
//! `journals.<classname>`, mapping node ids to encoded records. A store is
//! backed by one of the `EngineKind` engines; which one is sniffed from the
//! file header of an existing store, or picked from the preference order
//! when a store is first created.
//!
//! Also here: the lock-guarded id counter and the file-content blob store.

pub mod blobs;
pub mod counter;
pub mod flat_store;
#[cfg(feature = "redb")]
pub mod redb_store;

pub use blobs::BlobStore;
pub use counter::IdCounter;
pub use flat_store::FlatStore;
#[cfg(feature = "redb")]
pub use redb_store::RedbStore;

use crate::primitives::{FLAT_MAGIC, JOURNALS_PREFIX, NODES_PREFIX, REDB_MAGIC};
use crate::types::HyperdbError;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::trace;

// =============================================================================
// ENGINES
// =============================================================================

/// The embedded key-value engines a store can live in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EngineKind {
    /// A redb B-tree file (`.redb`).
    Redb,
    /// A single versioned postcard file (`.hdb`).
    Flat,
}

impl EngineKind {
    /// Preference order for new stores.
    pub const ALL: [EngineKind; 2] = [EngineKind::Redb, EngineKind::Flat];

    /// File extension of stores created by this engine.
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Redb => "redb",
            Self::Flat => "hdb",
        }
    }

    /// True if this engine's driver is compiled in.
    #[must_use]
    pub fn is_available(self) -> bool {
        match self {
            Self::Redb => cfg!(feature = "redb"),
            Self::Flat => true,
        }
    }

    /// The most preferred compiled-in engine.
    #[must_use]
    pub fn best_available() -> Self {
        Self::ALL
            .into_iter()
            .find(|kind| kind.is_available())
            .unwrap_or(Self::Flat)
    }

    /// Identify an engine from a store file's leading bytes.
    #[must_use]
    pub fn detect(header: &[u8]) -> Option<Self> {
        if header.starts_with(REDB_MAGIC) {
            Some(Self::Redb)
        } else if header.starts_with(FLAT_MAGIC) {
            Some(Self::Flat)
        } else {
            None
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Redb => write!(f, "redb"),
            Self::Flat => write!(f, "flat"),
        }
    }
}

impl FromStr for EngineKind {
    type Err = HyperdbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "redb" => Ok(Self::Redb),
            "flat" | "hdb" => Ok(Self::Flat),
            other => Err(HyperdbError::Value(format!(
                "unknown storage engine '{}' (expected redb or flat)",
                other
            ))),
        }
    }
}

// =============================================================================
// STORE CONTRACT
// =============================================================================

/// How a store is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Existing stores only; a missing store opens as nothing.
    Read,
    /// Open, creating the store with the preferred engine if absent.
    Create,
}

/// A key-value store holding one class's node records or journals.
///
/// Writes may be buffered until `flush`; `get` and `keys` always see them.
pub trait KeyValueStore {
    /// The engine backing this store.
    fn engine(&self) -> EngineKind;

    /// Encoded record stored under `key`.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, HyperdbError>;

    /// Store `value` under `key`, replacing any previous record.
    fn put(&mut self, key: &str, value: &[u8]) -> Result<(), HyperdbError>;

    /// Every key currently stored, sorted.
    fn keys(&self) -> Result<Vec<String>, HyperdbError>;

    /// Write buffered records through to disk.
    fn flush(&mut self) -> Result<(), HyperdbError>;
}

/// Convert an engine or filesystem error into `HyperdbError::Io`.
pub(crate) fn storage_err<E: fmt::Display>(e: E) -> HyperdbError {
    HyperdbError::Io(e.to_string())
}

// =============================================================================
// BACKEND
// =============================================================================

/// Opens the stores of one database directory.
#[derive(Debug, Clone)]
pub struct Backend {
    dir: PathBuf,
    preferred: Option<EngineKind>,
}

impl Backend {
    /// A backend over `dir`. `preferred` picks the engine for new stores;
    /// `None` means the best compiled-in engine.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, preferred: Option<EngineKind>) -> Self {
        Self {
            dir: dir.into(),
            preferred,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Store name of a class's node records.
    #[must_use]
    pub fn nodes_name(classname: &str) -> String {
        format!("{}.{}", NODES_PREFIX, classname)
    }

    /// Store name of a class's journals.
    #[must_use]
    pub fn journals_name(classname: &str) -> String {
        format!("{}.{}", JOURNALS_PREFIX, classname)
    }

    fn candidates(&self, name: &str) -> Vec<PathBuf> {
        let mut paths = vec![self.dir.join(name)];
        for kind in EngineKind::ALL {
            paths.push(self.dir.join(format!("{}.{}", name, kind.extension())));
        }
        paths
    }

    /// Find an existing store and identify its engine from the file header.
    ///
    /// An unrecognised header is a `Database` error; more than one file for
    /// the same store name is ambiguous and a `Value` error.
    pub fn locate(&self, name: &str) -> Result<Option<(EngineKind, PathBuf)>, HyperdbError> {
        let mut found = Vec::new();
        for path in self.candidates(name) {
            if !path.is_file() {
                continue;
            }
            let mut header = [0u8; 4];
            let read = fs::File::open(&path)
                .and_then(|mut f| f.read(&mut header))
                .map_err(storage_err)?;
            let kind = EngineKind::detect(&header[..read]).ok_or_else(|| {
                HyperdbError::Database(format!(
                    "cannot determine storage engine of {}",
                    path.display()
                ))
            })?;
            found.push((kind, path));
        }
        if found.len() > 1 {
            let names: Vec<String> = found.iter().map(|(_, p)| p.display().to_string()).collect();
            return Err(HyperdbError::Value(format!(
                "ambiguous store '{}': found {}",
                name,
                names.join(", ")
            )));
        }
        Ok(found.pop())
    }

    /// Open the store `name`.
    ///
    /// Returns `None` for a missing store in `Read` mode. An existing store
    /// whose engine isn't compiled in is a `Database` error.
    pub fn open(
        &self,
        name: &str,
        mode: OpenMode,
    ) -> Result<Option<Box<dyn KeyValueStore>>, HyperdbError> {
        let (kind, path, create) = match self.locate(name)? {
            Some((kind, path)) => (kind, path, false),
            None if mode == OpenMode::Read => return Ok(None),
            None => {
                let kind = self.preferred.unwrap_or_else(EngineKind::best_available);
                let path = self.dir.join(format!("{}.{}", name, kind.extension()));
                (kind, path, true)
            }
        };
        if !kind.is_available() {
            return Err(HyperdbError::Database(format!(
                "store '{}' uses the {} engine, which is not compiled in",
                name, kind
            )));
        }
        trace!(store = name, engine = %kind, create, "open store");
        let store: Box<dyn KeyValueStore> = match kind {
            EngineKind::Redb => open_redb(&path, create)?,
            EngineKind::Flat => Box::new(FlatStore::open(&path, create)?),
        };
        Ok(Some(store))
    }

    /// Delete the store `name` if it exists.
    pub fn remove(&self, name: &str) -> Result<(), HyperdbError> {
        for path in self.candidates(name) {
            if path.is_file() {
                trace!(path = %path.display(), "remove store");
                fs::remove_file(&path).map_err(storage_err)?;
            }
        }
        Ok(())
    }
}

#[cfg(feature = "redb")]
fn open_redb(path: &Path, create: bool) -> Result<Box<dyn KeyValueStore>, HyperdbError> {
    Ok(Box::new(RedbStore::open(path, create)?))
}

#[cfg(not(feature = "redb"))]
fn open_redb(path: &Path, _create: bool) -> Result<Box<dyn KeyValueStore>, HyperdbError> {
    Err(HyperdbError::Database(format!(
        "{} needs the redb engine, which is not compiled in",
        path.display()
    )))
}

// =============================================================================
// STORE POOL
// =============================================================================

/// Stores opened for writing during one commit, flushed together at the end.
pub struct StorePool<'a> {
    backend: &'a Backend,
    open: BTreeMap<String, Box<dyn KeyValueStore>>,
}

impl<'a> StorePool<'a> {
    #[must_use]
    pub fn new(backend: &'a Backend) -> Self {
        Self {
            backend,
            open: BTreeMap::new(),
        }
    }

    /// The store `name`, opened (and created) on first use.
    pub fn store(&mut self, name: &str) -> Result<&mut Box<dyn KeyValueStore>, HyperdbError> {
        if !self.open.contains_key(name) {
            let store = self
                .backend
                .open(name, OpenMode::Create)?
                .ok_or_else(|| HyperdbError::Database(format!("cannot create store '{}'", name)))?;
            self.open.insert(name.to_string(), store);
        }
        self.open
            .get_mut(name)
            .ok_or_else(|| HyperdbError::Database(format!("store '{}' not open", name)))
    }

    /// Flush every store opened through this pool.
    pub fn flush(&mut self) -> Result<(), HyperdbError> {
        for (name, store) in &mut self.open {
            trace!(store = %name, "flush store");
            store.flush()?;
        }
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
