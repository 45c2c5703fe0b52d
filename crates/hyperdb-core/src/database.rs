//! # Database
//!
//! The hyperdatabase handle. A `Database` owns:
//! - the class registry (classname -> `ClassDef`)
//! - the storage backend of its directory
//! - the transaction: read cache, new/dirty sets and deferred actions
//!
//! Classes are reached through `getclass`, which borrows the database for
//! the lifetime of the returned `Class` handle. Node-level reads go cache
//! first, then backend; node-level writes only ever reach the transaction.
//! `commit` is the single place anything is written to disk (apart from id
//! allocation and `pack`).

use crate::class::{Class, ClassDef};
use crate::config::Config;
use crate::formats::{NodeRecord, StoredJournalEntry, decode_record, encode_record};
use crate::journal::{JournalAction, JournalEntry, JournalParams, pack_entries};
use crate::storage::{Backend, BlobStore, IdCounter, OpenMode, StorePool, storage_err};
use crate::transaction::{Action, Transaction};
use crate::types::{Date, HyperdbError, sort_ids};
use std::collections::BTreeMap;
use std::fs;
use tracing::debug;

/// An open hyperdatabase.
#[derive(Debug)]
pub struct Database {
    pub(crate) config: Config,
    pub(crate) backend: Backend,
    pub(crate) blobs: BlobStore,
    pub(crate) classes: BTreeMap<String, ClassDef>,
    pub(crate) txn: Transaction,
}

impl Database {
    /// Open the database described by `config`.
    ///
    /// A writable handle creates the directory if needed; a read-only
    /// handle requires it to exist.
    pub fn open(config: Config) -> Result<Self, HyperdbError> {
        if config.is_read_only() {
            if !config.dir.is_dir() {
                return Err(HyperdbError::Database(format!(
                    "database directory {} does not exist",
                    config.dir.display()
                )));
            }
        } else {
            fs::create_dir_all(&config.dir).map_err(storage_err)?;
        }
        debug!(
            dir = %config.dir.display(),
            read_only = config.is_read_only(),
            "open database"
        );
        Ok(Self {
            backend: Backend::new(&config.dir, config.engine),
            blobs: BlobStore::new(&config.dir),
            classes: BTreeMap::new(),
            txn: Transaction::new(),
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The journal tag of this handle, `None` when read-only.
    pub fn journal_tag(&self) -> Option<&str> {
        self.config.journal_tag.as_deref()
    }

    pub fn is_read_only(&self) -> bool {
        self.config.is_read_only()
    }

    /// The journal tag, or a `Database` error naming `op` when read-only.
    pub(crate) fn require_writable(&self, op: &str) -> Result<String, HyperdbError> {
        self.config.journal_tag.clone().ok_or_else(|| {
            HyperdbError::Database(format!("{} not allowed: database is open read-only", op))
        })
    }

    // =========================================================================
    // CLASS REGISTRY
    // =========================================================================

    /// Register a class.
    pub fn addclass(&mut self, def: ClassDef) -> Result<(), HyperdbError> {
        if self.classes.contains_key(def.name()) {
            return Err(HyperdbError::Value(format!(
                "class '{}' already defined",
                def.name()
            )));
        }
        def.validate()?;
        op_trace!(self, class = def.name(), "addclass");
        self.classes.insert(def.name().to_string(), def);
        Ok(())
    }

    /// A handle on class `name`.
    pub fn getclass(&mut self, name: &str) -> Result<Class<'_>, HyperdbError> {
        self.classdef(name)?;
        Ok(Class::new(self, name))
    }

    pub(crate) fn classdef(&self, name: &str) -> Result<&ClassDef, HyperdbError> {
        self.classes
            .get(name)
            .ok_or_else(|| HyperdbError::Key(format!("no such class '{}'", name)))
    }

    pub(crate) fn classdef_mut(&mut self, name: &str) -> Result<&mut ClassDef, HyperdbError> {
        self.classes
            .get_mut(name)
            .ok_or_else(|| HyperdbError::Key(format!("no such class '{}'", name)))
    }

    /// Names of every registered class, sorted.
    pub fn getclasses(&self) -> Vec<String> {
        self.classes.keys().cloned().collect()
    }

    /// Delete every class's nodes, journals, counters and blobs.
    pub fn clear(&mut self) -> Result<(), HyperdbError> {
        self.require_writable("clear")?;
        self.txn.clear();
        for classname in self.classes.keys() {
            self.backend.remove(&Backend::nodes_name(classname))?;
            self.backend.remove(&Backend::journals_name(classname))?;
            self.blobs.clear_class(classname)?;
            let counter = IdCounter::new(&self.config.dir, classname);
            if counter.path().exists() {
                fs::remove_file(counter.path()).map_err(storage_err)?;
            }
        }
        debug!(classes = self.classes.len(), "clear database");
        Ok(())
    }

    // =========================================================================
    // NODES
    // =========================================================================

    /// The record of a node: cache first, then backend.
    pub(crate) fn getnode(&mut self, classname: &str, nodeid: &str) -> Result<NodeRecord, HyperdbError> {
        op_trace!(self, class = classname, nodeid, "getnode");
        if let Some(record) = self.txn.cached(classname, nodeid) {
            return Ok(record.clone());
        }
        let record = self
            .read_stored(classname, nodeid)?
            .ok_or_else(|| HyperdbError::Index(format!("no such {}: '{}'", classname, nodeid)))?;
        self.txn.cache_node(classname, nodeid, record.clone());
        Ok(record)
    }

    fn read_stored(&self, classname: &str, nodeid: &str) -> Result<Option<NodeRecord>, HyperdbError> {
        let Some(store) = self
            .backend
            .open(&Backend::nodes_name(classname), OpenMode::Read)?
        else {
            return Ok(None);
        };
        store
            .get(nodeid)?
            .map(|bytes| decode_record(&bytes))
            .transpose()
    }

    /// True if the node exists, committed or staged.
    pub(crate) fn hasnode(&self, classname: &str, nodeid: &str) -> Result<bool, HyperdbError> {
        if self.txn.cached(classname, nodeid).is_some() {
            return Ok(true);
        }
        Ok(self.read_stored(classname, nodeid)?.is_some())
    }

    /// Every node of a class with its current record, staged versions
    /// overriding stored ones, in ascending id order.
    pub(crate) fn getnodes(&self, classname: &str) -> Result<Vec<(String, NodeRecord)>, HyperdbError> {
        let mut nodes = BTreeMap::new();
        if let Some(store) = self
            .backend
            .open(&Backend::nodes_name(classname), OpenMode::Read)?
        {
            for key in store.keys()? {
                if let Some(bytes) = store.get(&key)? {
                    nodes.insert(key, decode_record::<NodeRecord>(&bytes)?);
                }
            }
        }
        for id in self.txn.new_ids(classname) {
            if let Some(record) = self.txn.cached(classname, id) {
                nodes.insert(id.to_string(), record.clone());
            }
        }
        let mut ids: Vec<String> = nodes.keys().cloned().collect();
        sort_ids(&mut ids);
        Ok(ids
            .into_iter()
            .filter_map(|id| {
                let record = self
                    .txn
                    .cached(classname, &id)
                    .cloned()
                    .or_else(|| nodes.remove(&id));
                record.map(|r| (id, r))
            })
            .collect())
    }

    /// Stage a new node.
    pub(crate) fn addnode(&mut self, classname: &str, nodeid: &str, record: NodeRecord) {
        op_trace!(self, class = classname, nodeid, "addnode");
        self.txn.create(classname, nodeid, record);
    }

    /// Stage a changed node, reading it into the cache first if needed.
    pub(crate) fn setnode(&mut self, classname: &str, nodeid: &str, record: NodeRecord) -> Result<(), HyperdbError> {
        op_trace!(self, class = classname, nodeid, "setnode");
        self.getnode(classname, nodeid)?;
        if self.txn.set(classname, nodeid, record) {
            Ok(())
        } else {
            Err(HyperdbError::Database(format!(
                "{}{} is not cache-resident",
                classname, nodeid
            )))
        }
    }

    /// Ids of every node of a class, retired included, ascending.
    pub(crate) fn getnodeids(&self, classname: &str) -> Result<Vec<String>, HyperdbError> {
        let mut ids = match self
            .backend
            .open(&Backend::nodes_name(classname), OpenMode::Read)?
        {
            Some(store) => store.keys()?,
            None => Vec::new(),
        };
        ids.extend(self.txn.new_ids(classname).map(str::to_string));
        ids.sort();
        ids.dedup();
        sort_ids(&mut ids);
        Ok(ids)
    }

    /// Allocate the next id of a class through its locked counter file.
    pub(crate) fn allocate_id(&self, classname: &str) -> Result<String, HyperdbError> {
        let counter = IdCounter::new(&self.config.dir, classname);
        let id = counter.next(|| {
            Ok(self
                .getnodeids(classname)?
                .iter()
                .filter_map(|id| id.parse::<u64>().ok())
                .max()
                .unwrap_or(0))
        })?;
        Ok(id.to_string())
    }

    // =========================================================================
    // BLOBS
    // =========================================================================

    pub(crate) fn stage_blob(&mut self, classname: &str, nodeid: &str, property: &str, content: Vec<u8>) {
        op_trace!(self, class = classname, nodeid, property, "stage blob");
        self.txn.write_blob(classname, nodeid, property, content);
    }

    /// A blob, staged version first.
    pub(crate) fn read_blob(&self, classname: &str, nodeid: &str, property: &str) -> Result<Option<Vec<u8>>, HyperdbError> {
        if let Some(content) = self.txn.pending_blob(classname, nodeid, property) {
            return Ok(Some(content.to_vec()));
        }
        self.blobs.read(classname, nodeid, property)
    }

    // =========================================================================
    // JOURNAL
    // =========================================================================

    /// Queue a journal entry for a node, stamped now.
    pub(crate) fn addjournal(
        &mut self,
        classname: &str,
        nodeid: &str,
        action: JournalAction,
        params: JournalParams,
    ) -> Result<(), HyperdbError> {
        let tag = self.require_writable("journal")?;
        op_trace!(self, class = classname, nodeid, %action, "addjournal");
        let entry = JournalEntry {
            nodeid: nodeid.to_string(),
            date: Date::now(),
            tag,
            action,
            params,
        };
        self.txn.append_journal(classname, entry.to_stored());
        Ok(())
    }

    /// The journal of a node: committed entries, then this handle's
    /// uncommitted ones. A node without a journal has an empty one.
    pub fn getjournal(&self, classname: &str, nodeid: &str) -> Result<Vec<JournalEntry>, HyperdbError> {
        self.classdef(classname)?;
        let mut stored = match self
            .backend
            .open(&Backend::journals_name(classname), OpenMode::Read)?
        {
            Some(store) => match store.get(nodeid)? {
                Some(bytes) => decode_record::<Vec<StoredJournalEntry>>(&bytes)?,
                None => Vec::new(),
            },
            None => Vec::new(),
        };
        stored.extend(self.txn.pending_journal(classname, nodeid).into_iter().cloned());
        stored.iter().map(JournalEntry::from_stored).collect()
    }

    // =========================================================================
    // TRANSACTIONS
    // =========================================================================

    /// Write every staged action to the backend in staging order.
    ///
    /// Staged state is cleared whether or not the writes succeed. An I/O
    /// failure part-way leaves the stores partially updated.
    pub fn commit(&mut self) -> Result<(), HyperdbError> {
        if self.txn.is_empty() {
            op_trace!(self, "commit: nothing to do");
            self.txn.clear();
            return Ok(());
        }
        let actions = self.txn.take_actions();
        let total = actions.len();
        let mut pool = StorePool::new(&self.backend);
        let (mut nodes, mut journals, mut blobs) = (0usize, 0usize, 0usize);
        for action in actions {
            match action {
                Action::WriteNode {
                    classname,
                    nodeid,
                    record,
                } => {
                    op_trace!(self, class = %classname, nodeid = %nodeid, "savenode");
                    let bytes = encode_record(&record)?;
                    pool.store(&Backend::nodes_name(&classname))?.put(&nodeid, &bytes)?;
                    nodes += 1;
                }
                Action::AppendJournal { classname, entry } => {
                    op_trace!(self, class = %classname, nodeid = %entry.nodeid, "savejournal");
                    let store = pool.store(&Backend::journals_name(&classname))?;
                    let mut entries = match store.get(&entry.nodeid)? {
                        Some(bytes) => decode_record::<Vec<StoredJournalEntry>>(&bytes)?,
                        None => Vec::new(),
                    };
                    let nodeid = entry.nodeid.clone();
                    entries.push(entry);
                    store.put(&nodeid, &encode_record(&entries)?)?;
                    journals += 1;
                }
                Action::WriteBlob {
                    classname,
                    nodeid,
                    property,
                    content,
                } => {
                    self.blobs.write(&classname, &nodeid, &property, &content)?;
                    blobs += 1;
                }
            }
        }
        pool.flush()?;
        debug!(actions = total, nodes, journals, blobs, "commit");
        Ok(())
    }

    /// Discard every staged change.
    pub fn rollback(&mut self) {
        let discarded = self.txn.len();
        self.txn.clear();
        debug!(discarded, "rollback");
    }

    /// Number of actions staged since the last commit or rollback.
    pub fn pending(&self) -> usize {
        self.txn.len()
    }

    // =========================================================================
    // PACK
    // =========================================================================

    /// Compact every journal against `cutoff`.
    ///
    /// Writes straight to the backend, outside the transaction.
    pub fn pack(&mut self, cutoff: &Date) -> Result<usize, HyperdbError> {
        self.require_writable("pack")?;
        let cutoff = cutoff.to_tuple();
        let mut removed = 0usize;
        for classname in self.classes.keys() {
            let Some(mut store) = self
                .backend
                .open(&Backend::journals_name(classname), OpenMode::Read)?
            else {
                continue;
            };
            for nodeid in store.keys()? {
                let Some(bytes) = store.get(&nodeid)? else {
                    continue;
                };
                let entries: Vec<StoredJournalEntry> = decode_record(&bytes)?;
                let before = entries.len();
                let packed = pack_entries(entries, &cutoff);
                if packed.len() != before {
                    removed += before - packed.len();
                    store.put(&nodeid, &encode_record(&packed)?)?;
                }
            }
            store.flush()?;
        }
        debug!(removed, "pack");
        Ok(removed)
    }
}

// =============================================================================
// TESTS
// =============================================================================
