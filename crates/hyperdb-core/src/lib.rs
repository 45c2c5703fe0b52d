//! # hyperdb-core
//!
//! The hyperdatabase of an issue tracker - THE LOGIC.
//!
//! A schema-driven object store layered on simple key-value stores:
//! typed properties, deferred writes with commit/rollback, a per-node
//! journal and referential links between classes.
//!
//! ## Layers
//!
//! - `property` / `types`: the property type system and its values
//! - `storage`: key-value engines (redb, flat file), id counters, blobs
//! - `transaction`: read cache and the queue of deferred actions
//! - `database`: the open handle; commit, rollback, journal, pack
//! - `class`: class definitions and the typed record operations
//! - `filter`: filter and sort over a class
//! - `schema` / `config`: static configuration inputs
//!
//! ## Architectural Constraints
//!
//! - Nothing reaches disk before `Database::commit` (id counters and
//!   `pack` excepted)
//! - One writer per open handle; no async, no network
//! - BTreeMap only, so every listing is deterministic

/// Trace one database operation at `trace`, or at `debug` when the
/// handle was opened with `Config::debug`.
macro_rules! op_trace {
    ($db:expr, $($arg:tt)+) => {
        if $db.config.debug {
            tracing::debug!($($arg)+);
        } else {
            tracing::trace!($($arg)+);
        }
    };
}

// =============================================================================
// MODULES
// =============================================================================

pub mod class;
pub mod config;
pub mod database;
pub mod filter;
pub mod formats;
pub mod journal;
pub mod primitives;
pub mod property;
pub mod schema;
pub mod storage;
pub mod transaction;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types
// =============================================================================

pub use property::{PropertyType, Value};
pub use types::{Date, Designator, HyperdbError, Interval, Password};

// =============================================================================
// RE-EXPORTS: Database
// =============================================================================

pub use class::{Class, ClassDef, ClassKind, Node};
pub use config::Config;
pub use database::Database;
pub use filter::{FilterSpec, SortKey};
pub use journal::{JournalAction, JournalEntry, JournalParams};
pub use schema::{ClassSpec, PropertySpec, Schema};

// =============================================================================
// RE-EXPORTS: Storage
// =============================================================================

pub use storage::{Backend, EngineKind, KeyValueStore, OpenMode};
