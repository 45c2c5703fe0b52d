//! # Journal
//!
//! The append-only per-node history: one entry for every create, set,
//! link, unlink, retire and restore, stamped with the time the change was
//! staged and the journal tag of the handle that made it.
//!
//! Entries are only ever appended. `pack_entries` is the single exception
//! and backs `Database::pack`.

use crate::formats::{RawValue, StoredJournalEntry, StoredParams};
use crate::property::Value;
use crate::types::{Date, DateTuple, HyperdbError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// What a journal entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum JournalAction {
    Create,
    Set,
    /// This node was linked from another node's property.
    Link,
    /// This node was unlinked from another node's property.
    Unlink,
    Retire,
    Restore,
}

impl fmt::Display for JournalAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Create => "create",
            Self::Set => "set",
            Self::Link => "link",
            Self::Unlink => "unlink",
            Self::Retire => "retire",
            Self::Restore => "restore",
        };
        write!(f, "{}", name)
    }
}

/// Parameters of a journal entry; the shape follows the action.
#[derive(Debug, Clone, PartialEq)]
pub enum JournalParams {
    /// `create`: every declared property's initial value.
    /// `set`: the old value of each changed property.
    Properties(BTreeMap<String, Option<Value>>),
    /// `link` / `unlink`: the node and property holding the reference.
    Link {
        classname: String,
        nodeid: String,
        property: String,
    },
    /// `retire` / `restore`.
    None,
}

/// One history entry of a node.
#[derive(Debug, Clone, PartialEq)]
pub struct JournalEntry {
    pub nodeid: String,
    pub date: Date,
    pub tag: String,
    pub action: JournalAction,
    pub params: JournalParams,
}

impl JournalEntry {
    /// The stored form.
    #[must_use]
    pub fn to_stored(&self) -> StoredJournalEntry {
        let params = match &self.params {
            JournalParams::Properties(props) => StoredParams::Properties(
                props
                    .iter()
                    .map(|(k, v)| (k.clone(), v.as_ref().map(RawValue::from)))
                    .collect(),
            ),
            JournalParams::Link {
                classname,
                nodeid,
                property,
            } => StoredParams::Link {
                classname: classname.clone(),
                nodeid: nodeid.clone(),
                property: property.clone(),
            },
            JournalParams::None => StoredParams::None,
        };
        StoredJournalEntry {
            nodeid: self.nodeid.clone(),
            stamp: self.date.to_tuple(),
            tag: self.tag.clone(),
            action: self.action,
            params,
        }
    }

    /// Rebuild an entry from its stored form.
    pub fn from_stored(stored: &StoredJournalEntry) -> Result<Self, HyperdbError> {
        let params = match &stored.params {
            StoredParams::Properties(props) => {
                let mut values = BTreeMap::new();
                for (name, raw) in props {
                    values.insert(name.clone(), raw.as_ref().map(RawValue::to_value).transpose()?);
                }
                JournalParams::Properties(values)
            }
            StoredParams::Link {
                classname,
                nodeid,
                property,
            } => JournalParams::Link {
                classname: classname.clone(),
                nodeid: nodeid.clone(),
                property: property.clone(),
            },
            StoredParams::None => JournalParams::None,
        };
        Ok(Self {
            nodeid: stored.nodeid.clone(),
            date: Date::from_tuple(stored.stamp)?,
            tag: stored.tag.clone(),
            action: stored.action,
            params,
        })
    }
}

/// Compact one node's journal against `cutoff`.
///
/// Keeps every entry stamped after the cutoff, every `create`, and the
/// most recent `set` at or before the cutoff. Order is preserved.
#[must_use]
pub fn pack_entries(
    entries: Vec<StoredJournalEntry>,
    cutoff: &DateTuple,
) -> Vec<StoredJournalEntry> {
    let mut keep = BTreeSet::new();
    let mut last_old_set = None;
    for (i, entry) in entries.iter().enumerate() {
        if entry.stamp > *cutoff || entry.action == JournalAction::Create {
            keep.insert(i);
        } else if entry.action == JournalAction::Set {
            last_old_set = Some(i);
        }
    }
    keep.extend(last_old_set);
    entries
        .into_iter()
        .enumerate()
        .filter(|(i, _)| keep.contains(i))
        .map(|(_, entry)| entry)
        .collect()
}

// =============================================================================
// TESTS
// =============================================================================
