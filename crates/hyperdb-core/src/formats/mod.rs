//! # Formats Module
//!
//! Byte-level encodings used by the storage engines.
//!
//! - `record`: versioned postcard encoding of node records and journals
//! - `persistence`: the flat engine's whole-file format

pub mod persistence;
pub mod record;

pub use persistence::{StoreHeader, store_from_bytes, store_to_bytes};
pub use record::{
    NodeRecord, RawValue, StoredJournalEntry, StoredParams, decode_record, encode_record,
};
