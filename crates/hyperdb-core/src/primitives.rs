//! # Fixed Primitives
//!
//! Hardcoded constants for the hyperdatabase: on-disk naming, format
//! versions, reserved property names and environment switches.
//!
//! These are compiled in and immutable at runtime. Changing any of the
//! naming or format constants changes the on-disk layout.

// =============================================================================
// ON-DISK NAMING
// =============================================================================

/// Prefix of every per-class node store: `nodes.<classname>[.ext]`.
pub const NODES_PREFIX: &str = "nodes";

/// Prefix of every per-class journal store: `journals.<classname>[.ext]`.
pub const JOURNALS_PREFIX: &str = "journals";

/// Prefix of the per-class id counter file: `_ids.<classname>`.
pub const COUNTER_PREFIX: &str = "_ids";

/// Directory (under the database directory) holding file-content blobs.
pub const BLOB_DIR: &str = "files";

// =============================================================================
// FORMATS
// =============================================================================

/// Magic bytes heading a flat-engine store file.
pub const FLAT_MAGIC: &[u8; 4] = b"HDBF";

/// Leading bytes of every redb database file.
pub const REDB_MAGIC: &[u8; 4] = b"redb";

/// Current flat store file format version.
///
/// Increment this when making breaking changes to the flat file layout.
pub const STORE_FORMAT_VERSION: u8 = 1;

/// Current record encoding version (node records and journal lists).
pub const RECORD_VERSION: u8 = 1;

/// Largest flat store file accepted before decoding (256 MB).
pub const MAX_STORE_FILE_SIZE: usize = 256 * 1024 * 1024;

// =============================================================================
// RESERVED PROPERTIES
// =============================================================================

/// The fabricated id property, present on every class.
pub const PROP_ID: &str = "id";

/// Date the node was created.
pub const PROP_CREATION: &str = "creation";

/// Date the node was last modified.
pub const PROP_ACTIVITY: &str = "activity";

/// Journal tag of the creating handle.
pub const PROP_CREATOR: &str = "creator";

/// Journal tag of the last modifying handle.
pub const PROP_ACTOR: &str = "actor";

/// File-content property of file classes, kept in the blob directory.
pub const PROP_CONTENT: &str = "content";

/// Properties every class carries implicitly. None may be declared or set.
pub const PROTECTED_PROPERTIES: [&str; 5] =
    [PROP_ID, PROP_CREATION, PROP_ACTIVITY, PROP_CREATOR, PROP_ACTOR];

/// Filter term matching an empty Link or Multilink.
pub const NULL_LINK_TERM: &str = "-1";

// =============================================================================
// ENVIRONMENT
// =============================================================================

/// Non-empty value switches on verbose operation tracing.
pub const DEBUG_ENV: &str = "HYPERDBDEBUG";

/// Overrides the engine used for new stores (`redb` or `flat`).
pub const ENGINE_ENV: &str = "HYPERDB_ENGINE";

/// Returns true if `name` is one of the implicit per-node properties.
#[must_use]
pub fn is_protected(name: &str) -> bool {
    PROTECTED_PROPERTIES.contains(&name)
}
