//! # Transaction Layer
//!
//! In-memory staging between the class layer and the backend.
//!
//! A `Transaction` holds a read cache of node records, the sets of nodes
//! created and modified since the last commit, and the ordered queue of
//! deferred `Action`s. Nothing here touches disk: `Database::commit` drains
//! the queue in FIFO order and `Database::rollback` simply clears it.

use crate::formats::{NodeRecord, StoredJournalEntry};
use std::collections::{BTreeMap, BTreeSet};

/// A deferred backend write.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Store the full record of a node, replacing any earlier version.
    WriteNode {
        classname: String,
        nodeid: String,
        record: NodeRecord,
    },
    /// Append one entry to a node's journal.
    AppendJournal {
        classname: String,
        entry: StoredJournalEntry,
    },
    /// Write one file-content blob.
    WriteBlob {
        classname: String,
        nodeid: String,
        property: String,
        content: Vec<u8>,
    },
}

type NodeKey = (String, String);

fn key(classname: &str, nodeid: &str) -> NodeKey {
    (classname.to_string(), nodeid.to_string())
}

/// Staged state of one database handle.
#[derive(Debug, Default)]
pub struct Transaction {
    cache: BTreeMap<String, BTreeMap<String, NodeRecord>>,
    newnodes: BTreeSet<NodeKey>,
    dirtynodes: BTreeSet<NodeKey>,
    actions: Vec<Action>,
}

impl Transaction {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached record of a node, if resident.
    #[must_use]
    pub fn cached(&self, classname: &str, nodeid: &str) -> Option<&NodeRecord> {
        self.cache.get(classname).and_then(|nodes| nodes.get(nodeid))
    }

    /// Populate the cache from a backend read.
    pub fn cache_node(&mut self, classname: &str, nodeid: &str, record: NodeRecord) {
        self.cache
            .entry(classname.to_string())
            .or_default()
            .insert(nodeid.to_string(), record);
    }

    /// Stage a new node.
    pub fn create(&mut self, classname: &str, nodeid: &str, record: NodeRecord) {
        self.newnodes.insert(key(classname, nodeid));
        self.stage_write(classname, nodeid, record);
    }

    /// Stage a modified node. The node must already be cache-resident.
    ///
    /// Returns false, staging nothing, if it isn't.
    #[must_use]
    pub fn set(&mut self, classname: &str, nodeid: &str, record: NodeRecord) -> bool {
        if self.cached(classname, nodeid).is_none() {
            return false;
        }
        self.dirtynodes.insert(key(classname, nodeid));
        self.stage_write(classname, nodeid, record);
        true
    }

    fn stage_write(&mut self, classname: &str, nodeid: &str, record: NodeRecord) {
        self.cache_node(classname, nodeid, record.clone());
        self.actions.push(Action::WriteNode {
            classname: classname.to_string(),
            nodeid: nodeid.to_string(),
            record,
        });
    }

    /// True if the node was created in this transaction.
    #[must_use]
    pub fn is_new(&self, classname: &str, nodeid: &str) -> bool {
        self.newnodes.contains(&key(classname, nodeid))
    }

    /// True if the node was modified in this transaction.
    #[must_use]
    pub fn is_dirty(&self, classname: &str, nodeid: &str) -> bool {
        self.dirtynodes.contains(&key(classname, nodeid))
    }

    /// Ids of the nodes of `classname` created in this transaction.
    pub fn new_ids<'a>(&'a self, classname: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.newnodes
            .iter()
            .filter(move |(c, _)| c == classname)
            .map(|(_, id)| id.as_str())
    }

    /// Queue a journal entry.
    pub fn append_journal(&mut self, classname: &str, entry: StoredJournalEntry) {
        self.actions.push(Action::AppendJournal {
            classname: classname.to_string(),
            entry,
        });
    }

    /// Queued journal entries of one node, in staging order.
    #[must_use]
    pub fn pending_journal(&self, classname: &str, nodeid: &str) -> Vec<&StoredJournalEntry> {
        self.actions
            .iter()
            .filter_map(|action| match action {
                Action::AppendJournal {
                    classname: c,
                    entry,
                } if c == classname && entry.nodeid == nodeid => Some(entry),
                _ => None,
            })
            .collect()
    }

    /// Queue a blob write.
    pub fn write_blob(&mut self, classname: &str, nodeid: &str, property: &str, content: Vec<u8>) {
        self.actions.push(Action::WriteBlob {
            classname: classname.to_string(),
            nodeid: nodeid.to_string(),
            property: property.to_string(),
            content,
        });
    }

    /// The most recently queued blob for a node property.
    #[must_use]
    pub fn pending_blob(&self, classname: &str, nodeid: &str, property: &str) -> Option<&[u8]> {
        self.actions.iter().rev().find_map(|action| match action {
            Action::WriteBlob {
                classname: c,
                nodeid: n,
                property: p,
                content,
            } if c == classname && n == nodeid && p == property => Some(content.as_slice()),
            _ => None,
        })
    }

    /// Number of queued actions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Drain the action queue and reset all staged state.
    pub fn take_actions(&mut self) -> Vec<Action> {
        let actions = std::mem::take(&mut self.actions);
        self.clear();
        actions
    }

    /// Discard everything staged.
    pub fn clear(&mut self) {
        self.cache.clear();
        self.newnodes.clear();
        self.dirtynodes.clear();
        self.actions.clear();
    }
}

// =============================================================================
// TESTS
// =============================================================================
